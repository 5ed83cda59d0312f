use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{AttendanceFilter, Store, StoreError};
use crate::models::{AttendanceRecord, ClassYear, FacultyAccount, Section, StudentRecord};

#[derive(Default)]
struct Tables {
    faculty: Vec<FacultyAccount>,
    students: BTreeMap<String, StudentRecord>,
    attendance: BTreeMap<(NaiveDate, String), AttendanceRecord>,
}

/// Process-local store. A single lock guards all tables, so every
/// operation is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(id: Uuid) -> StoreError {
    StoreError::Backend(format!("no faculty row with id {}", id))
}

#[async_trait]
impl Store for MemoryStore {
    fn backend_tag(&self) -> &'static str {
        "memory"
    }

    async fn count_faculty(&self) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.faculty.len() as i64)
    }

    async fn count_students(&self) -> Result<i64, StoreError> {
        Ok(self.tables.lock().await.students.len() as i64)
    }

    async fn find_active_login(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<FacultyAccount>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .faculty
            .iter()
            .find(|f| f.state.is_active() && (f.email == email || f.username == username))
            .cloned())
    }

    async fn faculty_by_id(&self, id: Uuid) -> Result<Option<FacultyAccount>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.faculty.iter().find(|f| f.id == id).cloned())
    }

    async fn faculty_by_username(
        &self,
        username: &str,
    ) -> Result<Option<FacultyAccount>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .faculty
            .iter()
            .find(|f| f.username == username)
            .cloned())
    }

    async fn faculty_exists(&self, email: &str, username: &str) -> Result<bool, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .faculty
            .iter()
            .any(|f| f.email == email || f.username == username))
    }

    async fn insert_faculty(&self, account: &FacultyAccount) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables
            .faculty
            .iter()
            .any(|f| f.email == account.email || f.username == account.username)
        {
            return Err(StoreError::Duplicate(
                "Email or username already exists".to_string(),
            ));
        }
        tables.faculty.push(account.clone());
        Ok(())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let account = tables
            .faculty
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| missing(id))?;
        account.last_login = Some(at);
        Ok(())
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let account = tables
            .faculty
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| missing(id))?;
        account.password_hash = hash.to_string();
        Ok(())
    }

    async fn deactivate_faculty(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let account = tables
            .faculty
            .iter_mut()
            .find(|f| f.id == id)
            .ok_or_else(|| missing(id))?;
        account.state = account.state.deactivate(at);
        Ok(())
    }

    async fn insert_students(&self, students: &[StudentRecord]) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        for student in students {
            if tables.students.contains_key(&student.register_number) {
                return Err(StoreError::Duplicate(format!(
                    "register number `{}` already exists",
                    student.register_number
                )));
            }
        }
        for student in students {
            tables
                .students
                .insert(student.register_number.clone(), student.clone());
        }
        Ok(())
    }

    async fn active_roster(
        &self,
        year: ClassYear,
        section: Section,
    ) -> Result<Vec<StudentRecord>, StoreError> {
        let tables = self.tables.lock().await;
        // BTreeMap iteration is already ordered by register number.
        Ok(tables
            .students
            .values()
            .filter(|s| s.is_active && s.year == year && s.section == section)
            .cloned()
            .collect())
    }

    async fn replace_attendance(
        &self,
        date: NaiveDate,
        year: ClassYear,
        section: Section,
        records: &[AttendanceRecord],
    ) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().await;
        let in_class = |r: &AttendanceRecord| r.date == date && r.year == year && r.section == section;

        // Check the (date, register number) constraint before touching anything.
        for (i, record) in records.iter().enumerate() {
            let key = (record.date, record.register_number.clone());
            let clashes_with_other_class = tables
                .attendance
                .get(&key)
                .map_or(false, |existing| !in_class(existing));
            let repeated = records[..i]
                .iter()
                .any(|r| r.date == record.date && r.register_number == record.register_number);
            if clashes_with_other_class || repeated {
                return Err(StoreError::Duplicate(format!(
                    "attendance for `{}` on {} already recorded",
                    record.register_number, record.date
                )));
            }
        }

        tables.attendance.retain(|_, r| !in_class(r));
        for record in records {
            tables.attendance.insert(
                (record.date, record.register_number.clone()),
                record.clone(),
            );
        }
        Ok(records.len())
    }

    async fn find_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .attendance
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect())
    }
}
