use std::cmp::Reverse;
use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::Extension;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::auth::{bearer, BearerHeader};
use crate::err::{Error, FieldError};
use crate::input::{self, collect};
use crate::models::{AttendanceRecord, ClassYear, Section, Status};
use crate::store::{AttendanceFilter, Store};
use crate::{proceeds, AppState, Payload};

/// Calendar years accepted for monthly and yearly windows.
pub const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1900..=9999;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_students: usize,
    pub present_count: usize,
    pub absent_count: usize,
    pub attendance_percentage: u32,
}

impl Summary {
    pub fn of(records: &[AttendanceRecord]) -> Self {
        let total = records.len();
        let present = records
            .iter()
            .filter(|r| r.status == Status::Present)
            .count();
        let absent = records
            .iter()
            .filter(|r| r.status == Status::Absent)
            .count();
        // Rounds half up without going through floats.
        let percentage = if total == 0 {
            0
        } else {
            ((present * 200 + total) / (2 * total)) as u32
        };
        Summary {
            total_students: total,
            present_count: present,
            absent_count: absent,
            attendance_percentage: percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub records: Vec<AttendanceRecord>,
    pub summary: Summary,
}

impl Report {
    fn new(records: Vec<AttendanceRecord>) -> Self {
        let summary = Summary::of(&records);
        Report { records, summary }
    }
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

fn newest_first(records: &mut [AttendanceRecord]) {
    records.sort_by(|a, b| {
        (Reverse(a.date), &a.register_number).cmp(&(Reverse(b.date), &b.register_number))
    });
}

pub struct ReportService {
    store: Arc<dyn Store>,
}

impl ReportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn daily(
        &self,
        date: NaiveDate,
        year: Option<ClassYear>,
        section: Option<Section>,
    ) -> Result<Report, Error> {
        let filter = AttendanceFilter {
            year,
            section,
            ..AttendanceFilter::on(date)
        };
        let mut records = self.store.find_attendance(&filter).await?;
        records.sort_by(|a, b| a.register_number.cmp(&b.register_number));
        Ok(Report::new(records))
    }

    pub async fn monthly(
        &self,
        month: u32,
        year: i32,
        class_year: Option<ClassYear>,
        section: Option<Section>,
    ) -> Result<Report, Error> {
        let (from, to) = month_bounds(year, month)
            .ok_or_else(|| Error::invalid_field("month", "Valid month is required"))?;
        self.ranged(from, to, class_year, section).await
    }

    pub async fn yearly(
        &self,
        academic_year: i32,
        class_year: Option<ClassYear>,
        section: Option<Section>,
    ) -> Result<Report, Error> {
        let (from, to) = year_bounds(academic_year).ok_or_else(|| {
            Error::invalid_field("academicYear", "Valid academic year is required")
        })?;
        self.ranged(from, to, class_year, section).await
    }

    async fn ranged(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        year: Option<ClassYear>,
        section: Option<Section>,
    ) -> Result<Report, Error> {
        let filter = AttendanceFilter {
            from: Some(from),
            to: Some(to),
            year,
            section,
            register_number: None,
        };
        let mut records = self.store.find_attendance(&filter).await?;
        newest_first(&mut records);
        Ok(Report::new(records))
    }

    pub async fn by_student(
        &self,
        register_number: &str,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Report, Error> {
        let filter = AttendanceFilter {
            from,
            to,
            register_number: Some(register_number.to_string()),
            ..AttendanceFilter::default()
        };
        let mut records = self.store.find_attendance(&filter).await?;
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(Report::new(records))
    }
}

fn optional<T>(
    raw: Option<&str>,
    parse: impl FnOnce(&str) -> Result<T, FieldError>,
    errors: &mut Vec<FieldError>,
) -> Option<T> {
    match raw.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => collect(parse(v), errors),
        None => None,
    }
}

fn class_year_param(field: &str, raw: &str) -> Result<ClassYear, FieldError> {
    input::number(field, raw).and_then(|y| input::class_year(field, y))
}

fn calendar_year(field: &str, raw: &str, message: &str) -> Result<i32, FieldError> {
    input::number(field, raw)
        .ok()
        .and_then(|y| i32::try_from(y).ok())
        .filter(|y| YEAR_RANGE.contains(y))
        .ok_or_else(|| FieldError::new(field, message))
}

fn finish<T>(value: Option<T>, errors: Vec<FieldError>) -> Result<T, Error> {
    match value {
        Some(value) if errors.is_empty() => Ok(value),
        _ => Err(Error::invalid_input(errors)),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyQuery {
    date: Option<String>,
    year: Option<String>,
    section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyQuery {
    month: Option<String>,
    year: Option<String>,
    class_year: Option<String>,
    section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlyQuery {
    academic_year: Option<String>,
    class_year: Option<String>,
    section: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    register_number: Option<String>,
    from_date: Option<String>,
    to_date: Option<String>,
}

pub async fn daily(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    query: Result<Query<DailyQuery>, QueryRejection>,
) -> Payload<Report> {
    state.auth.verify(bearer(&header)?).await?;
    let Query(q) = query?;

    let mut errors = Vec::new();
    let date = collect(
        input::present("date", q.date.as_deref()).and_then(|d| input::date("date", d)),
        &mut errors,
    );
    let year = optional(q.year.as_deref(), |y| class_year_param("year", y), &mut errors);
    let section = optional(
        q.section.as_deref(),
        |s| input::section("section", s),
        &mut errors,
    );
    let date = finish(date, errors)?;
    proceeds(state.reports.daily(date, year, section).await?)
}

pub async fn monthly(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    query: Result<Query<MonthlyQuery>, QueryRejection>,
) -> Payload<Report> {
    state.auth.verify(bearer(&header)?).await?;
    let Query(q) = query?;

    let mut errors = Vec::new();
    let month = collect(
        input::present("month", q.month.as_deref())
            .and_then(|m| input::number("month", m))
            .and_then(|m| match m {
                1..=12 => Ok(m as u32),
                _ => Err(FieldError::new("month", "Valid month is required")),
            }),
        &mut errors,
    );
    let year = collect(
        input::present("year", q.year.as_deref())
            .and_then(|y| calendar_year("year", y, "Valid year is required")),
        &mut errors,
    );
    let class_year = optional(
        q.class_year.as_deref(),
        |y| class_year_param("classYear", y),
        &mut errors,
    );
    let section = optional(
        q.section.as_deref(),
        |s| input::section("section", s),
        &mut errors,
    );
    let (month, year) = finish(month.zip(year), errors)?;
    proceeds(
        state
            .reports
            .monthly(month, year, class_year, section)
            .await?,
    )
}

pub async fn yearly(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    query: Result<Query<YearlyQuery>, QueryRejection>,
) -> Payload<Report> {
    state.auth.verify(bearer(&header)?).await?;
    let Query(q) = query?;

    let mut errors = Vec::new();
    let academic_year = collect(
        input::present("academicYear", q.academic_year.as_deref()).and_then(|y| {
            calendar_year("academicYear", y, "Valid academic year is required")
        }),
        &mut errors,
    );
    let class_year = optional(
        q.class_year.as_deref(),
        |y| class_year_param("classYear", y),
        &mut errors,
    );
    let section = optional(
        q.section.as_deref(),
        |s| input::section("section", s),
        &mut errors,
    );
    let academic_year = finish(academic_year, errors)?;
    proceeds(
        state
            .reports
            .yearly(academic_year, class_year, section)
            .await?,
    )
}

pub async fn student(
    Extension(state): Extension<Arc<AppState>>,
    header: BearerHeader,
    query: Result<Query<StudentQuery>, QueryRejection>,
) -> Payload<Report> {
    state.auth.verify(bearer(&header)?).await?;
    let Query(q) = query?;

    let mut errors = Vec::new();
    let register_number = collect(
        input::present("registerNumber", q.register_number.as_deref()).map(str::to_string),
        &mut errors,
    );
    let from = optional(
        q.from_date.as_deref(),
        |d| input::date("fromDate", d),
        &mut errors,
    );
    let to = optional(q.to_date.as_deref(), |d| input::date("toDate", d), &mut errors);
    let register_number = finish(register_number, errors)?;
    proceeds(state.reports.by_student(&register_number, from, to).await?)
}
