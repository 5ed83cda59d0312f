use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Faculty,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Faculty => "faculty",
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Faculty
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "faculty" => Ok(Role::Faculty),
            other => Err(format!("unknown role `{}`", other)),
        }
    }
}

/// Accounts are never removed; deactivation is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountState {
    Active,
    Deactivated { at: DateTime<Utc> },
}

impl AccountState {
    pub fn is_active(&self) -> bool {
        matches!(self, AccountState::Active)
    }

    pub fn deactivated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            AccountState::Active => None,
            AccountState::Deactivated { at } => Some(*at),
        }
    }

    /// Deactivating twice keeps the first timestamp.
    pub fn deactivate(self, at: DateTime<Utc>) -> AccountState {
        match self {
            AccountState::Active => AccountState::Deactivated { at },
            deactivated => deactivated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacultyAccount {
    pub id: Uuid,
    pub name: String,
    /// Stored lowercase.
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub department: String,
    pub role: Role,
    pub state: AccountState,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FacultyAccount {
    pub fn profile(&self) -> Profile {
        Profile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            department: self.department.clone(),
            role: self.role,
        }
    }
}

/// The identity embedded in a session token and returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub department: String,
    pub role: Role,
}

/// Year of study; only 2, 3 and 4 exist in the department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ClassYear(u8);

impl ClassYear {
    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ClassYear {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            2..=4 => Ok(ClassYear(value as u8)),
            other => Err(format!("year must be 2, 3, or 4 (got {})", other)),
        }
    }
}

impl From<ClassYear> for i64 {
    fn from(year: ClassYear) -> Self {
        year.0 as i64
    }
}

impl fmt::Display for ClassYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Section {
    A,
    B,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Section::A => "A",
            Section::B => "B",
        }
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" => Ok(Section::A),
            "B" => Ok(Section::B),
            _ => Err("section must be A or B".to_string()),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
        }
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(Status::Present),
            "absent" => Ok(Status::Absent),
            _ => Err("status must be present or absent".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub register_number: String,
    pub name: String,
    pub year: ClassYear,
    pub section: Section,
    pub department: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub date: NaiveDate,
    pub year: ClassYear,
    pub section: Section,
    pub register_number: String,
    pub student_name: String,
    pub status: Status,
    pub marked_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
