//! Persistence for faculty accounts, the student roster and attendance.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{AttendanceRecord, ClassYear, FacultyAccount, Section, StudentRecord};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("backend: {0}")]
    Backend(String),

    /// A stored row could not be mapped back into a model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Constraints for an attendance lookup; `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub year: Option<ClassYear>,
    pub section: Option<Section>,
    pub register_number: Option<String>,
}

impl AttendanceFilter {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            from: Some(date),
            to: Some(date),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.from.map_or(true, |from| record.date >= from)
            && self.to.map_or(true, |to| record.date <= to)
            && self.year.map_or(true, |year| record.year == year)
            && self.section.map_or(true, |section| record.section == section)
            && self
                .register_number
                .as_deref()
                .map_or(true, |reg| record.register_number == reg)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn count_faculty(&self) -> Result<i64, StoreError>;

    async fn count_students(&self) -> Result<i64, StoreError>;

    /// Active account whose email equals `email` or whose username equals `username`.
    async fn find_active_login(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<FacultyAccount>, StoreError>;

    async fn faculty_by_id(&self, id: Uuid) -> Result<Option<FacultyAccount>, StoreError>;

    async fn faculty_by_username(&self, username: &str)
        -> Result<Option<FacultyAccount>, StoreError>;

    /// Checks every account ever created, deactivated ones included.
    async fn faculty_exists(&self, email: &str, username: &str) -> Result<bool, StoreError>;

    async fn insert_faculty(&self, account: &FacultyAccount) -> Result<(), StoreError>;

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError>;

    async fn deactivate_faculty(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn insert_students(&self, students: &[StudentRecord]) -> Result<(), StoreError>;

    /// Active students of a class ordered by register number.
    async fn active_roster(
        &self,
        year: ClassYear,
        section: Section,
    ) -> Result<Vec<StudentRecord>, StoreError>;

    /// Removes every record for the class on `date` and inserts `records`
    /// as a single unit. Either all of it is applied or none of it.
    async fn replace_attendance(
        &self,
        date: NaiveDate,
        year: ClassYear,
        section: Section,
        records: &[AttendanceRecord],
    ) -> Result<usize, StoreError>;

    /// Unordered; callers sort for their view.
    async fn find_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError>;
}
