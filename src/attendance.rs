use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::{Extension, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{bearer, BearerHeader};
use crate::err::{Error, FieldError};
use crate::input::{self, collect};
use crate::models::{AttendanceRecord, ClassYear, Section, Status, StudentRecord};
use crate::store::{AttendanceFilter, Store};
use crate::{proceeds, AppState, Payload};

/// A class roster for one day. Students missing from `existing_attendance`
/// have not been marked yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Roster {
    pub students: Vec<StudentRecord>,
    pub existing_attendance: BTreeMap<String, Status>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    pub register_number: Option<String>,
    pub student_name: Option<String>,
    pub status: Option<String>,
}

/// A day's attendance for one class as submitted by a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitAttendance {
    pub date: Option<String>,
    pub year: Option<Value>,
    pub section: Option<String>,
    pub attendance: Option<Vec<RawEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    register_number: String,
    student_name: String,
    status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Submission {
    date: NaiveDate,
    year: ClassYear,
    section: Section,
    entries: Vec<Entry>,
}

fn parse_submission(raw: SubmitAttendance) -> Result<Submission, Error> {
    let mut errors = Vec::new();

    let date = collect(
        input::present("date", raw.date.as_deref()).and_then(|d| input::date("date", d)),
        &mut errors,
    );
    let year = match &raw.year {
        Some(value) => collect(
            input::json_number("year", value).and_then(|y| input::class_year("year", y)),
            &mut errors,
        ),
        None => {
            errors.push(FieldError::new("year", "Year must be 2, 3, or 4"));
            None
        }
    };
    let section = collect(
        input::present("section", raw.section.as_deref())
            .and_then(|s| input::section("section", s)),
        &mut errors,
    );

    let raw_entries = raw.attendance.unwrap_or_default();
    if raw_entries.is_empty() {
        errors.push(FieldError::new("attendance", "Attendance data is required"));
    }
    let mut entries = Vec::with_capacity(raw_entries.len());
    let mut seen = HashSet::new();
    for (i, entry) in raw_entries.iter().enumerate() {
        let field = |name: &str| format!("attendance[{}].{}", i, name);
        let register_number = collect(
            input::present(&field("registerNumber"), entry.register_number.as_deref()),
            &mut errors,
        );
        let student_name = collect(
            input::present(&field("studentName"), entry.student_name.as_deref()),
            &mut errors,
        );
        let status = collect(
            entry
                .status
                .as_deref()
                .unwrap_or_default()
                .parse::<Status>()
                .map_err(|msg| FieldError::new(field("status"), msg)),
            &mut errors,
        );
        if let Some(reg) = register_number {
            if !seen.insert(reg.to_string()) {
                errors.push(FieldError::new(
                    field("registerNumber"),
                    format!("`{}` is listed more than once", reg),
                ));
            }
        }
        if let (Some(register_number), Some(student_name), Some(status)) =
            (register_number, student_name, status)
        {
            entries.push(Entry {
                register_number: register_number.to_string(),
                student_name: student_name.to_string(),
                status,
            });
        }
    }

    match (date, year, section) {
        (Some(date), Some(year), Some(section)) if errors.is_empty() => Ok(Submission {
            date,
            year,
            section,
            entries,
        }),
        _ => Err(Error::invalid_input(errors)),
    }
}

pub struct AttendanceService {
    store: Arc<dyn Store>,
}

impl AttendanceService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn roster(
        &self,
        year: ClassYear,
        section: Section,
        date: NaiveDate,
    ) -> Result<Roster, Error> {
        let students = self.store.active_roster(year, section).await?;
        let filter = AttendanceFilter {
            year: Some(year),
            section: Some(section),
            ..AttendanceFilter::on(date)
        };
        let existing_attendance = self
            .store
            .find_attendance(&filter)
            .await?
            .into_iter()
            .map(|r| (r.register_number, r.status))
            .collect();
        Ok(Roster {
            students,
            existing_attendance,
        })
    }

    /// Replaces the whole day's attendance for the class. Students left out
    /// of the submission lose any status recorded for that day. Entries are
    /// stamped with the submitted year and section as given.
    pub async fn submit(&self, raw: SubmitAttendance, submitted_by: Uuid) -> Result<usize, Error> {
        let submission = parse_submission(raw)?;

        let now = Utc::now();
        let records: Vec<AttendanceRecord> = submission
            .entries
            .into_iter()
            .map(|entry| AttendanceRecord {
                id: Uuid::new_v4(),
                date: submission.date,
                year: submission.year,
                section: submission.section,
                register_number: entry.register_number,
                student_name: entry.student_name,
                status: entry.status,
                marked_by: submitted_by,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let written = self
            .store
            .replace_attendance(
                submission.date,
                submission.year,
                submission.section,
                &records,
            )
            .await?;
        log::info!(
            "attendance for {} year {} section {} replaced with {} records by {}",
            submission.date,
            submission.year,
            submission.section,
            written,
            submitted_by
        );
        Ok(written)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RosterQuery {
    year: Option<String>,
    section: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submitted {
    message: &'static str,
    records_count: usize,
}

pub async fn students(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    query: Result<Query<RosterQuery>, QueryRejection>,
) -> Payload<Roster> {
    state.auth.verify(bearer(&header)?).await?;
    let Query(query) = query?;

    let mut errors = Vec::new();
    let year = collect(
        input::present("year", query.year.as_deref())
            .and_then(|y| input::number("year", y))
            .and_then(|y| input::class_year("year", y)),
        &mut errors,
    );
    let section = collect(
        input::present("section", query.section.as_deref())
            .and_then(|s| input::section("section", s)),
        &mut errors,
    );
    let date = collect(
        input::present("date", query.date.as_deref()).and_then(|d| input::date("date", d)),
        &mut errors,
    );
    match (year, section, date) {
        (Some(year), Some(section), Some(date)) => {
            proceeds(state.attendance.roster(year, section, date).await?)
        }
        _ => Err(Error::invalid_input(errors)),
    }
}

pub async fn submit(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    body: Result<Json<SubmitAttendance>, JsonRejection>,
) -> Payload<Submitted> {
    let account = state.auth.verify(bearer(&header)?).await?;
    let Json(body) = body?;
    let records_count = state.attendance.submit(body, account.id).await?;
    proceeds(Submitted {
        message: "Attendance submitted successfully",
        records_count,
    })
}
