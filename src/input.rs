use chrono::{DateTime, NaiveDate};
use serde_json::Value;

use crate::err::FieldError;
use crate::models::{ClassYear, Section};

/// Keeps the value, or records the error and yields `None`.
pub fn collect<T>(result: Result<T, FieldError>, errors: &mut Vec<FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.push(err);
            None
        }
    }
}

pub fn present<'a>(field: &str, raw: Option<&'a str>) -> Result<&'a str, FieldError> {
    match raw.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(FieldError::new(field, format!("`{}` is required", field))),
    }
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp reduced to its UTC calendar date.
pub fn date(field: &str, raw: &str) -> Result<NaiveDate, FieldError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc().date()))
        .map_err(|_| FieldError::new(field, "Valid date is required"))
}

pub fn number(field: &str, raw: &str) -> Result<i64, FieldError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| FieldError::new(field, "must be a whole number"))
}

/// Accepts a JSON number or a numeric string.
pub fn json_number(field: &str, raw: &Value) -> Result<i64, FieldError> {
    match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| FieldError::new(field, "must be a whole number")),
        Value::String(s) => number(field, s),
        _ => Err(FieldError::new(field, "must be a whole number")),
    }
}

pub fn class_year(field: &str, value: i64) -> Result<ClassYear, FieldError> {
    ClassYear::try_from(value).map_err(|_| FieldError::new(field, "Year must be 2, 3, or 4"))
}

pub fn section(field: &str, raw: &str) -> Result<Section, FieldError> {
    raw.parse()
        .map_err(|_| FieldError::new(field, "Section must be A or B"))
}
