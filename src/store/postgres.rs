use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use super::{AttendanceFilter, Store, StoreError};
use crate::models::{
    AccountState, AttendanceRecord, ClassYear, FacultyAccount, Section, StudentRecord,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS faculty (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        department TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('admin', 'faculty')),
        deactivated_at TIMESTAMPTZ,
        last_login TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS students (
        register_number TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        year SMALLINT NOT NULL CHECK (year BETWEEN 2 AND 4),
        section TEXT NOT NULL CHECK (section IN ('A', 'B')),
        department TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE INDEX IF NOT EXISTS students_class_idx ON students (year, section)",
    "CREATE TABLE IF NOT EXISTS attendance (
        id UUID PRIMARY KEY,
        date DATE NOT NULL,
        year SMALLINT NOT NULL CHECK (year BETWEEN 2 AND 4),
        section TEXT NOT NULL CHECK (section IN ('A', 'B')),
        register_number TEXT NOT NULL,
        student_name TEXT NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('present', 'absent')),
        marked_by UUID NOT NULL REFERENCES faculty (id),
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (date, register_number)
    )",
    "CREATE INDEX IF NOT EXISTS attendance_class_idx ON attendance (date, year, section)",
    "CREATE INDEX IF NOT EXISTS attendance_student_idx ON attendance (register_number, date)",
];

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            // unique_violation
            if db.code().as_deref() == Some("23505") {
                return StoreError::Duplicate(
                    db.constraint().unwrap_or("unique constraint").to_string(),
                );
            }
        }
        StoreError::Backend(err.to_string())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FacultyRow {
    id: Uuid,
    name: String,
    email: String,
    username: String,
    password_hash: String,
    department: String,
    role: String,
    deactivated_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<FacultyRow> for FacultyAccount {
    type Error = StoreError;

    fn try_from(row: FacultyRow) -> Result<Self, Self::Error> {
        Ok(FacultyAccount {
            id: row.id,
            name: row.name,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            department: row.department,
            role: row.role.parse().map_err(StoreError::Corrupt)?,
            state: match row.deactivated_at {
                None => AccountState::Active,
                Some(at) => AccountState::Deactivated { at },
            },
            last_login: row.last_login,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StudentRow {
    register_number: String,
    name: String,
    year: i16,
    section: String,
    department: String,
    is_active: bool,
}

impl TryFrom<StudentRow> for StudentRecord {
    type Error = StoreError;

    fn try_from(row: StudentRow) -> Result<Self, Self::Error> {
        Ok(StudentRecord {
            register_number: row.register_number,
            name: row.name,
            year: ClassYear::try_from(row.year as i64).map_err(StoreError::Corrupt)?,
            section: row.section.parse().map_err(StoreError::Corrupt)?,
            department: row.department,
            is_active: row.is_active,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttendanceRow {
    id: Uuid,
    date: NaiveDate,
    year: i16,
    section: String,
    register_number: String,
    student_name: String,
    status: String,
    marked_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AttendanceRow> for AttendanceRecord {
    type Error = StoreError;

    fn try_from(row: AttendanceRow) -> Result<Self, Self::Error> {
        Ok(AttendanceRecord {
            id: row.id,
            date: row.date,
            year: ClassYear::try_from(row.year as i64).map_err(StoreError::Corrupt)?,
            section: row.section.parse().map_err(StoreError::Corrupt)?,
            register_number: row.register_number,
            student_name: row.student_name,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            marked_by: row.marked_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn faculty_from(row: Option<FacultyRow>) -> Result<Option<FacultyAccount>, StoreError> {
    row.map(FacultyAccount::try_from).transpose()
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        log::info!("Postgres schema ready ({} statements)", SCHEMA.len());
        Ok(())
    }

    async fn touch_faculty(&self, sql: &str, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let res = sqlx::query(sql).bind(at).bind(id).execute(&self.pool).await?;
        if res.rows_affected() < 1 {
            return Err(StoreError::Backend(format!("no faculty row with id {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend_tag(&self) -> &'static str {
        "postgres"
    }

    async fn count_faculty(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM faculty")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn count_students(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students")
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_active_login(
        &self,
        email: &str,
        username: &str,
    ) -> Result<Option<FacultyAccount>, StoreError> {
        let row = sqlx::query_as::<_, FacultyRow>(
            "SELECT * FROM faculty
             WHERE (email = $1 OR username = $2) AND deactivated_at IS NULL
             LIMIT 1",
        )
        .bind(email)
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        faculty_from(row)
    }

    async fn faculty_by_id(&self, id: Uuid) -> Result<Option<FacultyAccount>, StoreError> {
        let row = sqlx::query_as::<_, FacultyRow>("SELECT * FROM faculty WHERE id = $1 LIMIT 1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        faculty_from(row)
    }

    async fn faculty_by_username(
        &self,
        username: &str,
    ) -> Result<Option<FacultyAccount>, StoreError> {
        let row =
            sqlx::query_as::<_, FacultyRow>("SELECT * FROM faculty WHERE username = $1 LIMIT 1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;
        faculty_from(row)
    }

    async fn faculty_exists(&self, email: &str, username: &str) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM faculty WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn insert_faculty(&self, account: &FacultyAccount) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO faculty
                (id, name, email, username, password_hash, department, role,
                 deactivated_at, last_login, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.username)
        .bind(&account.password_hash)
        .bind(&account.department)
        .bind(account.role.as_str())
        .bind(account.state.deactivated_at())
        .bind(account.last_login)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.touch_faculty("UPDATE faculty SET last_login = $1 WHERE id = $2", id, at)
            .await
    }

    async fn set_password_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let res = sqlx::query("UPDATE faculty SET password_hash = $1 WHERE id = $2")
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() < 1 {
            return Err(StoreError::Backend(format!("no faculty row with id {}", id)));
        }
        Ok(())
    }

    async fn deactivate_faculty(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.touch_faculty(
            "UPDATE faculty SET deactivated_at = COALESCE(deactivated_at, $1) WHERE id = $2",
            id,
            at,
        )
        .await
    }

    async fn insert_students(&self, students: &[StudentRecord]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for student in students {
            sqlx::query(
                "INSERT INTO students
                    (register_number, name, year, section, department, is_active)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&student.register_number)
            .bind(&student.name)
            .bind(student.year.get() as i16)
            .bind(student.section.as_str())
            .bind(&student.department)
            .bind(student.is_active)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn active_roster(
        &self,
        year: ClassYear,
        section: Section,
    ) -> Result<Vec<StudentRecord>, StoreError> {
        sqlx::query_as::<_, StudentRow>(
            "SELECT * FROM students
             WHERE year = $1 AND section = $2 AND is_active
             ORDER BY register_number",
        )
        .bind(year.get() as i16)
        .bind(section.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StudentRecord::try_from)
        .collect()
    }

    async fn replace_attendance(
        &self,
        date: NaiveDate,
        year: ClassYear,
        section: Section,
        records: &[AttendanceRecord],
    ) -> Result<usize, StoreError> {
        // Dropping `tx` on any early return rolls the delete back.
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query(
            "DELETE FROM attendance WHERE date = $1 AND year = $2 AND section = $3",
        )
        .bind(date)
        .bind(year.get() as i16)
        .bind(section.as_str())
        .execute(&mut tx)
        .await?;

        for record in records {
            sqlx::query(
                "INSERT INTO attendance
                    (id, date, year, section, register_number, student_name, status,
                     marked_by, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(record.id)
            .bind(record.date)
            .bind(record.year.get() as i16)
            .bind(record.section.as_str())
            .bind(&record.register_number)
            .bind(&record.student_name)
            .bind(record.status.as_str())
            .bind(record.marked_by)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&mut tx)
            .await?;
        }
        tx.commit().await?;

        log::debug!(
            "replaced {} attendance rows with {} for {} {}{}",
            deleted.rows_affected(),
            records.len(),
            date,
            year,
            section
        );
        Ok(records.len())
    }

    async fn find_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> Result<Vec<AttendanceRecord>, StoreError> {
        sqlx::query_as::<_, AttendanceRow>(
            "SELECT * FROM attendance
             WHERE ($1::date IS NULL OR date >= $1)
               AND ($2::date IS NULL OR date <= $2)
               AND ($3::smallint IS NULL OR year = $3)
               AND ($4::text IS NULL OR section = $4)
               AND ($5::text IS NULL OR register_number = $5)",
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.year.map(|y| y.get() as i16))
        .bind(filter.section.map(|s| s.as_str()))
        .bind(filter.register_number.as_deref())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(AttendanceRecord::try_from)
        .collect()
    }
}
