use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

use crate::store::StoreError;

pub async fn handler404(path: Uri) -> Error {
    Error::NotFound {
        message: format!("Invalid path: {}", path),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

impl<V: Serialize> IntoResponse for Success<V> {
    fn into_response(self) -> Response {
        Json::into_response(Json(self))
    }
}

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    #[error("{message}")]
    Validation {
        message: String,
        errors: Vec<FieldError>,
    },
    #[error("{message}")]
    Unauthorized { message: String },
    #[error("{message}")]
    Forbidden { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("{message}")]
    Store { message: String },
}

#[derive(Serialize)]
struct Failure<'a> {
    success: bool,
    #[serde(flatten)]
    error: &'a Error,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = Json(Failure {
            success: false,
            error: &self,
        });
        (self.status(), body).into_response()
    }
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Every authentication failure looks the same to the caller.
    pub fn invalid_credentials() -> Error {
        Error::Unauthorized {
            message: "Invalid credentials".to_string(),
        }
    }

    pub fn invalid_token() -> Error {
        Error::Unauthorized {
            message: "Invalid or expired token".to_string(),
        }
    }

    pub fn access_denied() -> Error {
        Error::Forbidden {
            message: "Access denied".to_string(),
        }
    }

    pub fn invalid_input(errors: Vec<FieldError>) -> Error {
        Error::Validation {
            message: "Invalid input data".to_string(),
            errors,
        }
    }

    pub fn invalid_field<F: Into<String>, M: Into<String>>(field: F, message: M) -> Error {
        Error::invalid_input(vec![FieldError::new(field, message)])
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(detail) => {
                log::warn!("store rejected a duplicate: {}", detail);
                Error::Conflict {
                    message: "Record already exists".to_string(),
                }
            }
            other => {
                log::error!("store failure: {}", other);
                Error::Store {
                    message: "Server error".to_string(),
                }
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Error::Validation {
            message: "Malformed JSON body".to_string(),
            errors: vec![FieldError::new("body", rejection.to_string())],
        }
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Error::Validation {
            message: "Malformed query string".to_string(),
            errors: vec![FieldError::new("query", rejection.to_string())],
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        log::error!("password hashing failed: {}", err);
        Error::Store {
            message: "Server error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_body_carries_kind_and_success_flag() {
        let err = Error::Conflict {
            message: "Email or username already exists".to_string(),
        };
        let body = serde_json::to_value(Failure {
            success: false,
            error: &err,
        })
        .unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Conflict");
        assert_eq!(body["message"], "Email or username already exists");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn duplicate_store_errors_become_conflicts() {
        let err: Error = StoreError::Duplicate(
            "duplicate key value violates unique constraint \"attendance_date_register_number_key\""
                .to_string(),
        )
        .into();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Record already exists");
        let err: Error = StoreError::Backend("connection reset".to_string()).into();
        assert_eq!(
            err,
            Error::Store {
                message: "Server error".to_string()
            }
        );
    }
}
