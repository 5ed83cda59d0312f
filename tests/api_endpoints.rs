use std::sync::Arc;

use attendance_server::seed::{self, SeedFile};
use attendance_server::store::MemoryStore;
use attendance_server::token::TokenSigner;
use attendance_server::{router, AppState};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Duration;
use serde_json::{json, Value};
use tower::ServiceExt;

fn seed_file() -> SeedFile {
    serde_json::from_value(json!({
        "faculty": [
            { "name": "Head", "email": "head@dept.edu", "username": "head",
              "password": "password123", "role": "admin" },
            { "name": "Dr. M. Ratnababu", "email": "ratnababu@dept.edu", "username": "ratnababu",
              "password": "password123" }
        ],
        "students": [
            { "registerNumber": "A01", "name": "Asha", "year": 2, "section": "A" },
            { "registerNumber": "A02", "name": "Bala", "year": 2, "section": "A" },
            { "registerNumber": "A03", "name": "Chitra", "year": 2, "section": "A" },
            { "registerNumber": "B01", "name": "Dev", "year": 2, "section": "B" }
        ]
    }))
    .expect("seed json")
}

async fn app() -> Router {
    let store = Arc::new(MemoryStore::new());
    seed::seed(&*store, seed_file(), "AIML")
        .await
        .expect("seed store");
    let tokens = TokenSigner::new(b"integration-secret", Duration::hours(24)).expect("signer");
    router(AppState::new(store, tokens, "AIML".to_string()))
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => req.body(Body::empty()),
    }
    .expect("request");

    let resp = app.clone().oneshot(req).await.expect("response");
    let status = resp.status();
    let bytes = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("body bytes");
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}

async fn login(app: &Router, identifier: &str, password: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "identifier": identifier, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {}", body);
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn login_then_verify_returns_profile() {
    let app = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "email": "RatnaBabu@dept.edu", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["role"], "faculty");
    assert_eq!(body["user"]["department"], "AIML");
    assert!(body["expiresAt"].is_string());

    let token = body["token"].as_str().unwrap();
    let (status, body) = call(&app, Method::GET, "/auth/verify", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "ratnababu@dept.edu");
}

#[tokio::test]
async fn credential_failures_share_one_shape() {
    let app = app().await;
    let admin = login(&app, "head", "password123").await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/remove-user",
        Some(&admin),
        Some(json!({ "username": "ratnababu" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let attempt = |identifier: &'static str, password: &'static str| {
        let app = app.clone();
        async move {
            call(
                &app,
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "identifier": identifier, "password": password })),
            )
            .await
        }
    };
    let wrong_password = attempt("head", "password999").await;
    let inactive = attempt("ratnababu", "password123").await;
    let unknown = attempt("nobody", "password123").await;
    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, inactive);
    assert_eq!(wrong_password, unknown);
    assert_eq!(wrong_password.1["message"], "Invalid credentials");
}

#[tokio::test]
async fn protected_routes_need_a_live_token() {
    let app = app().await;
    let uri = "/attendance/students?year=2&section=A&date=2025-03-03";

    let (status, body) = call(&app, Method::GET, uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app, Method::GET, uri, Some("deadbeef.cafe"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = login(&app, "head", "password123").await;
    let faculty = login(&app, "ratnababu", "password123").await;
    let (status, _) = call(&app, Method::GET, uri, Some(&faculty), None).await;
    assert_eq!(status, StatusCode::OK);

    call(
        &app,
        Method::POST,
        "/auth/remove-user",
        Some(&admin),
        Some(json!({ "username": "ratnababu" })),
    )
    .await;
    let (status, _) = call(&app, Method::GET, uri, Some(&faculty), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, Method::GET, "/auth/verify", Some(&faculty), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submit_then_roster_and_daily_report_agree() {
    let app = app().await;
    let token = login(&app, "ratnababu", "password123").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/attendance/submit",
        Some(&token),
        Some(json!({
            "date": "2025-03-03",
            "year": "2",
            "section": "A",
            "attendance": [
                { "registerNumber": "A01", "studentName": "Asha", "status": "present" },
                { "registerNumber": "A02", "studentName": "Bala", "status": "absent" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["recordsCount"], 2);

    let (status, body) = call(
        &app,
        Method::GET,
        "/attendance/students?year=2&section=A&date=2025-03-03",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["students"].as_array().unwrap().len(), 3);
    assert_eq!(
        body["existingAttendance"],
        json!({ "A01": "present", "A02": "absent" })
    );

    let (status, body) = call(
        &app,
        Method::GET,
        "/reports/daily?date=2025-03-03",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["summary"],
        json!({
            "totalStudents": 2,
            "presentCount": 1,
            "absentCount": 1,
            "attendancePercentage": 50
        })
    );
    assert_eq!(body["records"][0]["registerNumber"], "A01");
    assert_eq!(body["records"][0]["date"], "2025-03-03");

    let (status, body) = call(
        &app,
        Method::GET,
        "/reports/monthly?month=3&year=2025&classYear=2&section=A",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["totalStudents"], 2);

    let (status, body) = call(
        &app,
        Method::GET,
        "/reports/student?registerNumber=A02&fromDate=2025-03-01",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["absentCount"], 1);
    assert_eq!(body["summary"]["attendancePercentage"], 0);
}

#[tokio::test]
async fn bad_input_is_reported_per_field() {
    let app = app().await;
    let token = login(&app, "ratnababu", "password123").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/attendance/submit",
        Some(&token),
        Some(json!({ "date": "not-a-date", "year": 9, "section": "A", "attendance": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Validation");
    let fields: Vec<_> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(fields, vec!["date", "year", "attendance"]);

    let (status, _) = call(
        &app,
        Method::GET,
        "/reports/monthly?month=13&year=2025",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, Method::GET, "/reports/yearly", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn account_administration_is_admin_only() {
    let app = app().await;
    let admin = login(&app, "head", "password123").await;
    let faculty = login(&app, "ratnababu", "password123").await;
    let new_account = json!({
        "name": "Mrs. D. Sushma",
        "email": "sushma@dept.edu",
        "username": "sushma",
        "password": "welcome1",
        "department": "AIML"
    });

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/signup",
        Some(&faculty),
        Some(new_account.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app,
        Method::POST,
        "/auth/signup",
        Some(&admin),
        Some(new_account.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "faculty");

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/signup",
        Some(&admin),
        Some(new_account),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/remove-user",
        Some(&admin),
        Some(json!({ "username": "head" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/remove-user",
        Some(&admin),
        Some(json!({ "username": "ghost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(
        &app,
        Method::POST,
        "/auth/change-password",
        Some(&faculty),
        Some(json!({ "oldPassword": "password123", "newPassword": "s3cret!" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    login(&app, "ratnababu", "s3cret!").await;
}

#[tokio::test]
async fn unknown_paths_get_a_json_404() {
    let app = app().await;
    let (status, body) = call(&app, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
    assert_eq!(body["success"], false);
}
