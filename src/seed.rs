use std::path::Path;

use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::io::read_io_file;
use crate::models::{AccountState, ClassYear, FacultyAccount, Role, Section, StudentRecord};
use crate::store::Store;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub faculty: Vec<SeedFaculty>,
    #[serde(default)]
    pub students: Vec<SeedStudent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedFaculty {
    pub name: String,
    pub email: String,
    pub username: String,
    pub password: String,
    pub department: Option<String>,
    #[serde(default)]
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedStudent {
    pub register_number: String,
    pub name: String,
    pub year: ClassYear,
    pub section: Section,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Seeded {
    pub faculty: usize,
    pub students: usize,
}

pub async fn load_seed_file<P: AsRef<Path>>(path: P) -> anyhow::Result<SeedFile> {
    let bytes = read_io_file(path).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Seeds each table only while it is empty.
pub async fn seed(store: &dyn Store, file: SeedFile, department: &str) -> anyhow::Result<Seeded> {
    let mut seeded = Seeded::default();

    if store.count_faculty().await? == 0 && !file.faculty.is_empty() {
        log::info!("Seeding {} faculty accounts...", file.faculty.len());
        for f in file.faculty {
            let account = FacultyAccount {
                id: Uuid::new_v4(),
                name: f.name.trim().to_string(),
                email: f.email.trim().to_lowercase(),
                username: f.username.trim().to_string(),
                password_hash: hash_password(&f.password)?,
                department: f.department.unwrap_or_else(|| department.to_string()),
                role: f.role,
                state: AccountState::Active,
                last_login: None,
                created_at: Utc::now(),
            };
            store.insert_faculty(&account).await?;
            seeded.faculty += 1;
        }
    }

    if store.count_students().await? == 0 && !file.students.is_empty() {
        log::info!("Seeding {} students...", file.students.len());
        let students: Vec<StudentRecord> = file
            .students
            .into_iter()
            .map(|s| StudentRecord {
                register_number: s.register_number.trim().to_string(),
                name: s.name.trim().to_string(),
                year: s.year,
                section: s.section,
                department: s.department.unwrap_or_else(|| department.to_string()),
                is_active: true,
            })
            .collect();
        store.insert_students(&students).await?;
        seeded.students = students.len();
    }

    Ok(seeded)
}
