pub mod attendance;
pub mod auth;
pub mod config;
pub mod err;
pub mod input;
pub mod io;
pub mod models;
pub mod reports;
pub mod seed;
pub mod store;
pub mod token;

use std::sync::Arc;

use axum::handler::Handler;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Serialize;

use crate::attendance::AttendanceService;
use crate::auth::AuthService;
use crate::err::{Error, Success};
use crate::reports::ReportService;
use crate::store::Store;
use crate::token::TokenSigner;

pub type Payload<T> = Result<Success<T>, Error>;

pub fn proceeds<V>(value: V) -> Payload<V>
where
    V: Serialize,
{
    Ok(Success::of(value))
}

pub struct AppState {
    pub auth: AuthService,
    pub attendance: AttendanceService,
    pub reports: ReportService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, tokens: TokenSigner, department: String) -> Arc<Self> {
        Arc::new(Self {
            auth: AuthService::new(store.clone(), tokens, department),
            attendance: AttendanceService::new(store.clone()),
            reports: ReportService::new(store),
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/verify", get(auth::verify))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/signup", post(auth::signup))
        .route("/auth/remove-user", post(auth::remove_user))
        .route("/attendance/students", get(attendance::students))
        .route("/attendance/submit", post(attendance::submit))
        .route("/reports/daily", get(reports::daily))
        .route("/reports/monthly", get(reports::monthly))
        .route("/reports/yearly", get(reports::yearly))
        .route("/reports/student", get(reports::student))
        .fallback(err::handler404.into_service())
        .layer(Extension(state))
}
