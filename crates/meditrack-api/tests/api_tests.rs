//! API Integration Tests
//!
//! Every test drives the full router against a fresh in-memory store.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use meditrack_api::auth::Claims;
use meditrack_api::create_router_for_testing;
use meditrack_api::testing::TEST_JWT_SECRET;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Helper to create a JSON request, optionally authenticated
fn create_json_request(method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    match body {
        Some(json_body) => builder
            .body(Body::from(serde_json::to_string(&json_body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(Value::Null)
    };
    (status, json)
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    send(app, create_json_request(method, uri, token, body)).await
}

/// Sign up and return (token, account id)
async fn signup(app: &Router, email: &str) -> (String, String) {
    let (status, json) = call(
        app,
        "POST",
        "/api/signup",
        None,
        Some(json!({
            "email": email,
            "firstName": "Test",
            "lastName": "User",
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup failed: {json}");
    (
        json["token"].as_str().unwrap().to_string(),
        json["data"]["id"].as_str().unwrap().to_string(),
    )
}

async fn create_doctor(app: &Router, token: &str, name: &str) -> String {
    let (status, json) = call(
        app,
        "POST",
        "/api/doctors",
        Some(token),
        Some(json!({
            "name": name,
            "specialization": "Cardiologist",
            "hospital": "City Heart Center",
            "phone": "555-0101"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create doctor failed: {json}");
    json["data"]["id"].as_str().unwrap().to_string()
}

async fn create_report(app: &Router, token: &str, body: Value) -> (StatusCode, Value) {
    call(app, "POST", "/api/reports", Some(token), Some(body)).await
}

fn lab_report(title: &str, date: &str) -> Value {
    json!({ "title": title, "category": "Lab", "reportDate": date })
}

/// A file part: (file name, content type, bytes)
type FilePart<'a> = (&'a str, &'a str, &'a str);

/// Helper to create an authenticated multipart report request
fn multipart_request(
    method: &str,
    uri: &str,
    token: &str,
    fields: &[(&str, &str)],
    file: Option<FilePart<'_>>,
) -> Request<Body> {
    let boundary = "meditrack-test-boundary";
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n{bytes}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// Fetch an uploaded file without credentials
async fn fetch_file(app: &Router, url: &str) -> (StatusCode, Option<String>, Vec<u8>) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, bytes.to_vec())
}

const X_RAY_FIELDS: [(&str, &str); 3] = [
    ("title", "Chest X-Ray"),
    ("category", "Lab"),
    ("reportDate", "2024-05-05"),
];

// =============================================================================
// Health Check Tests
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let app = create_router_for_testing();

    for uri in ["/health", "/api/health"] {
        let (status, json) = call(&app, "GET", uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "OK");
        assert_eq!(json["message"], "MediTrack API is running");
        assert!(json["timestamp"].is_string());
        assert!(json["version"].is_string());
    }
}

#[tokio::test]
async fn test_readiness_check() {
    let app = create_router_for_testing();

    let (status, json) = call(&app, "GET", "/api/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ready"], true);
    assert_eq!(json["backend"], "memory");
}

#[tokio::test]
async fn test_unknown_route_returns_json_404() {
    let app = create_router_for_testing();

    let (status, json) = call(&app, "GET", "/api/nope", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"]["code"], "NOT_FOUND");
    assert_eq!(json["error"]["message"], "Route not found");
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let app = create_router_for_testing();

    let (status, json) = call(&app, "GET", "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/api/reports"].is_object());
}

// =============================================================================
// Signup / Login Tests
// =============================================================================

#[tokio::test]
async fn test_signup_rejects_duplicate_normalized_email() {
    let app = create_router_for_testing();
    let (token, id) = signup(&app, "Jane@Example.com").await;

    let (status, json) = call(&app, "GET", "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], id.as_str());
    assert_eq!(json["data"]["email"], "jane@example.com");

    let (status, json) = call(
        &app,
        "POST",
        "/api/signup",
        None,
        Some(json!({
            "email": "  JANE@example.COM ",
            "firstName": "Other",
            "password": "secret123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "DUPLICATE");
}

#[tokio::test]
async fn test_signup_missing_fields() {
    let app = create_router_for_testing();

    let (status, json) = call(
        &app,
        "POST",
        "/api/signup",
        None,
        Some(json!({ "email": "a@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_malformed_json_body() {
    let app = create_router_for_testing();

    let request = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_login_success_and_uniform_failures() {
    let app = create_router_for_testing();
    let (_, id) = signup(&app, "login@example.com").await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "LOGIN@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["id"], id.as_str());
    assert!(json["expiresIn"].as_u64().unwrap() > 0);

    let token = json["token"].as_str().unwrap();
    let (status, _) = call(&app, "GET", "/api/profile", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (wrong_status, wrong_body) = call(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "login@example.com", "password": "wrong-password" })),
    )
    .await;
    let (missing_status, missing_body) = call(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "secret123" })),
    )
    .await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(missing_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body, missing_body);
}

#[tokio::test]
async fn test_password_hash_never_returned() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "hash@example.com").await;

    let (_, profile) = call(&app, "GET", "/api/profile", Some(&token), None).await;
    let (_, login) = call(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "hash@example.com", "password": "secret123" })),
    )
    .await;

    for body in [profile.to_string(), login.to_string()] {
        assert!(!body.contains("password"), "leaked: {body}");
        assert!(!body.contains("$argon2"), "leaked: {body}");
    }
}

// =============================================================================
// Authentication Middleware Tests
// =============================================================================

#[tokio::test]
async fn test_protected_routes_reject_bad_tokens() {
    let app = create_router_for_testing();
    let (_, id) = signup(&app, "expired@example.com").await;

    let expired = encode(
        &Header::default(),
        &Claims {
            iss: "meditrack".to_string(),
            sub: id,
            iat: 1_000_000,
            exp: 1_000_060,
        },
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .unwrap();

    for token in [None, Some("not-a-token"), Some(expired.as_str())] {
        for uri in ["/api/profile", "/api/doctors", "/api/reports"] {
            let (status, json) = call(&app, "GET", uri, token, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri} with {token:?}");
            assert_eq!(json["error"]["code"], "UNAUTHENTICATED");
        }
    }
}

// =============================================================================
// Profile Tests
// =============================================================================

#[tokio::test]
async fn test_profile_update() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "profile@example.com").await;

    let (status, json) = call(
        &app,
        "PUT",
        "/api/profile",
        Some(&token),
        Some(json!({
            "bloodGroup": "O+",
            "height": 172.5,
            "gender": "Female",
            "dateOfBirth": "1990-04-12"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["bloodGroup"], "O+");
    assert_eq!(json["data"]["height"], 172.5);
    assert_eq!(json["data"]["firstName"], "Test");

    // Changed password works for login
    let (status, _) = call(
        &app,
        "PUT",
        "/api/profile",
        Some(&token),
        Some(json!({ "password": "new-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(
        &app,
        "POST",
        "/api/login",
        None,
        Some(json!({ "email": "profile@example.com", "password": "new-secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_profile_email_conflict() {
    let app = create_router_for_testing();
    signup(&app, "taken@example.com").await;
    let (token, _) = signup(&app, "mine@example.com").await;

    let (status, _) = call(
        &app,
        "PUT",
        "/api/profile",
        Some(&token),
        Some(json!({ "email": "Taken@Example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// =============================================================================
// Doctor Tests
// =============================================================================

#[tokio::test]
async fn test_doctor_crud() {
    let app = create_router_for_testing();
    let (token, account_id) = signup(&app, "doctors@example.com").await;
    let id = create_doctor(&app, &token, "Dr. Sarah Smith").await;
    create_doctor(&app, &token, "Dr. Adam Able").await;

    let (status, json) = call(&app, "GET", "/api/doctors", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = json["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Dr. Adam Able", "Dr. Sarah Smith"]);

    let (status, json) = call(&app, "GET", &format!("/api/doctors/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["user"], account_id.as_str());

    let (status, json) = call(&app, "DELETE", &format!("/api/doctors/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Doctor deleted successfully");

    let (status, _) = call(&app, "GET", &format!("/api/doctors/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_doctor_partial_update_changes_only_phone() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "phone@example.com").await;
    let id = create_doctor(&app, &token, "Dr. Sarah Smith").await;
    let uri = format!("/api/doctors/{id}");

    let (_, before) = call(&app, "GET", &uri, Some(&token), None).await;
    let (status, after) = call(&app, "PUT", &uri, Some(&token), Some(json!({ "phone": "555-9999" }))).await;
    assert_eq!(status, StatusCode::OK);

    let mut expected = before["data"].clone();
    expected["phone"] = json!("555-9999");
    assert_eq!(after["data"], expected);
}

#[tokio::test]
async fn test_doctor_requires_fields() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "fields@example.com").await;

    let (status, json) = call(
        &app,
        "POST",
        "/api/doctors",
        Some(&token),
        Some(json!({ "name": "Dr. Nobody" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_foreign_records_are_not_found() {
    let app = create_router_for_testing();
    let (alice, _) = signup(&app, "alice@example.com").await;
    let (bob, _) = signup(&app, "bob@example.com").await;

    let doctor = create_doctor(&app, &alice, "Dr. Sarah Smith").await;
    let (_, report) = create_report(&app, &alice, lab_report("Blood Test", "2024-01-10")).await;
    let report = report["data"]["id"].as_str().unwrap().to_string();

    for uri in [format!("/api/doctors/{doctor}"), format!("/api/reports/{report}")] {
        let (status, _) = call(&app, "GET", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "GET {uri}");

        let (status, _) = call(&app, "PUT", &uri, Some(&bob), Some(json!({ "title": "x", "name": "x" }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "PUT {uri}");

        let (status, _) = call(&app, "DELETE", &uri, Some(&bob), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "DELETE {uri}");

        // Still there for the owner
        let (status, _) = call(&app, "GET", &uri, Some(&alice), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, _) = call(&app, "GET", "/api/doctors/not-a-uuid", Some(&alice), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Report Tests
// =============================================================================

#[tokio::test]
async fn test_report_with_doctor_is_expanded() {
    let app = create_router_for_testing();
    let (token, account_id) = signup(&app, "reports@example.com").await;
    let doctor = create_doctor(&app, &token, "Dr. Sarah Smith").await;

    let (status, json) = create_report(
        &app,
        &token,
        json!({
            "title": "Lipid Panel",
            "category": "Lab",
            "reportDate": "2024-03-01",
            "description": "Fasting",
            "doctor": doctor
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["data"]["user"], account_id.as_str());
    assert_eq!(json["data"]["doctor"]["name"], "Dr. Sarah Smith");
    let id = json["data"]["id"].as_str().unwrap().to_string();

    // Deleting the doctor keeps the report without a doctor
    call(&app, "DELETE", &format!("/api/doctors/{doctor}"), Some(&token), None).await;
    let (status, json) = call(&app, "GET", &format!("/api/reports/{id}"), Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["doctor"].is_null());
}

#[tokio::test]
async fn test_report_with_foreign_doctor_rejected() {
    let app = create_router_for_testing();
    let (alice, _) = signup(&app, "alice2@example.com").await;
    let (bob, _) = signup(&app, "bob2@example.com").await;
    let doctor = create_doctor(&app, &alice, "Dr. Sarah Smith").await;

    let mut body = lab_report("Blood Test", "2024-01-10");
    body["doctor"] = json!(doctor);
    let (status, json) = create_report(&app, &bob, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_report_update_with_foreign_doctor_rejected() {
    let app = create_router_for_testing();
    let (alice, _) = signup(&app, "alice3@example.com").await;
    let (bob, _) = signup(&app, "bob3@example.com").await;
    let alice_doctor = create_doctor(&app, &alice, "Dr. Sarah Smith").await;
    let bob_doctor = create_doctor(&app, &bob, "Dr. James Jones").await;

    let mut body = lab_report("Blood Test", "2024-01-10");
    body["doctor"] = json!(bob_doctor);
    let (_, json) = create_report(&app, &bob, body).await;
    let uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());

    let (status, json) = call(
        &app,
        "PUT",
        &uri,
        Some(&bob),
        Some(json!({ "doctor": alice_doctor, "title": "Renamed" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    // Nothing changed
    let (_, json) = call(&app, "GET", &uri, Some(&bob), None).await;
    assert_eq!(json["data"]["title"], "Blood Test");
    assert_eq!(json["data"]["doctor"]["id"], bob_doctor);
}

#[tokio::test]
async fn test_report_validation() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "invalid@example.com").await;

    let cases = [
        json!({ "category": "Lab", "reportDate": "2024-01-10" }),
        json!({ "title": "X", "category": "Imaging", "reportDate": "2024-01-10" }),
        json!({ "title": "X", "category": "Lab", "reportDate": "yesterday" }),
    ];
    for body in cases {
        let (status, _) = create_report(&app, &token, body.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    }
}

#[tokio::test]
async fn test_report_update_and_delete() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "update@example.com").await;
    let (_, json) = create_report(&app, &token, lab_report("Blood Test", "2024-01-10")).await;
    let uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());

    let (status, json) = call(
        &app,
        "PUT",
        &uri,
        Some(&token),
        Some(json!({ "category": "Prescription" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["category"], "Prescription");
    assert_eq!(json["data"]["title"], "Blood Test");

    let (status, json) = call(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["message"], "Report deleted successfully");

    let (status, _) = call(&app, "GET", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_report_pagination() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "pages@example.com").await;

    for i in 0..25 {
        let (status, _) = create_report(&app, &token, lab_report(&format!("Report {i}"), "2024-01-10")).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, json) = call(&app, "GET", "/api/reports?page=2&limit=10", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"].as_array().unwrap().len(), 10);
    assert_eq!(json["pagination"]["total"], 25);
    assert_eq!(json["pagination"]["pages"], 3);
    assert_eq!(json["pagination"]["page"], 2);

    let (_, json) = call(&app, "GET", "/api/reports?page=3&limit=10", Some(&token), None).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 5);

    let (status, _) = call(&app, "GET", "/api/reports?page=zero", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_search_is_case_insensitive() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "search@example.com").await;
    create_report(&app, &token, lab_report("Blood Test", "2024-01-10")).await;
    create_report(&app, &token, lab_report("X-Ray", "2024-01-11")).await;

    for term in ["blood", "BLOOD", "Blood"] {
        let (status, json) = call(&app, "GET", &format!("/api/reports?search={term}"), Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        let data = json["data"].as_array().unwrap();
        assert_eq!(data.len(), 1, "search {term}");
        assert_eq!(data[0]["title"], "Blood Test");
    }
}

#[tokio::test]
async fn test_report_filter_and_sort() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "sort@example.com").await;
    let doctor = create_doctor(&app, &token, "Dr. Sarah Smith").await;

    create_report(&app, &token, lab_report("Old", "2023-01-01")).await;
    create_report(&app, &token, lab_report("New", "2024-06-01")).await;
    create_report(
        &app,
        &token,
        json!({
            "title": "Rx",
            "category": "Prescription",
            "reportDate": "2024-02-01",
            "doctor": doctor
        }),
    )
    .await;

    let titles = |json: &Value| -> Vec<String> {
        json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["title"].as_str().unwrap().to_string())
            .collect()
    };

    let (_, json) = call(&app, "GET", "/api/reports?sort=date", Some(&token), None).await;
    assert_eq!(titles(&json), vec!["Old", "Rx", "New"]);

    let (_, json) = call(&app, "GET", "/api/reports?sort=-date", Some(&token), None).await;
    assert_eq!(titles(&json), vec!["New", "Rx", "Old"]);

    let (_, json) = call(&app, "GET", "/api/reports?category=Prescription", Some(&token), None).await;
    assert_eq!(titles(&json), vec!["Rx"]);

    let (_, json) = call(&app, "GET", &format!("/api/reports?doctor={doctor}"), Some(&token), None).await;
    assert_eq!(titles(&json), vec!["Rx"]);

    let (status, _) = call(&app, "GET", "/api/reports?sort=shoeSize", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_multipart_report_upload() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "upload@example.com").await;

    let request = multipart_request(
        "POST",
        "/api/reports",
        &token,
        &X_RAY_FIELDS,
        Some(("scan.png", "image/png", "fake-png-bytes")),
    );
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let file_url = json["data"]["fileUrl"].as_str().unwrap().to_string();
    assert!(file_url.starts_with("/uploads/"));
    assert!(file_url.ends_with(".png"));

    // The stored file is served back without authentication
    let (status, content_type, bytes) = fetch_file(&app, &file_url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    assert_eq!(&bytes[..], b"fake-png-bytes");
}

#[tokio::test]
async fn test_upload_extension_follows_content_type_not_file_name() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "evil@example.com").await;

    let request = multipart_request(
        "POST",
        "/api/reports",
        &token,
        &X_RAY_FIELDS,
        Some(("evil.html", "image/png", "<script>alert(1)</script>")),
    );
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    let file_url = json["data"]["fileUrl"].as_str().unwrap().to_string();
    assert!(!file_url.ends_with(".html"), "{file_url}");
    assert!(file_url.ends_with(".png"), "{file_url}");

    let (status, content_type, _) = fetch_file(&app, &file_url).await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn test_upload_rejects_svg_and_html() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "svg@example.com").await;

    for (file_name, content_type) in [("logo.svg", "image/svg+xml"), ("page.html", "text/html")] {
        let request = multipart_request(
            "POST",
            "/api/reports",
            &token,
            &X_RAY_FIELDS,
            Some((file_name, content_type, "<svg onload=\"alert(1)\"/>")),
        );
        let (status, json) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{content_type}");
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    let (_, json) = call(&app, "GET", "/api/reports", Some(&token), None).await;
    assert_eq!(json["pagination"]["total"], 0);
}

#[tokio::test]
async fn test_multipart_report_update() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "replace@example.com").await;

    let request = multipart_request(
        "POST",
        "/api/reports",
        &token,
        &X_RAY_FIELDS,
        Some(("scan.png", "image/png", "first-scan")),
    );
    let (_, json) = send(&app, request).await;
    let uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());
    let old_url = json["data"]["fileUrl"].as_str().unwrap().to_string();

    let request = multipart_request(
        "PUT",
        &uri,
        &token,
        &[("title", "Chest X-Ray (follow-up)")],
        Some(("scan.pdf", "application/pdf", "second-scan")),
    );
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["title"], "Chest X-Ray (follow-up)");
    assert_eq!(json["data"]["category"], "Lab");
    let new_url = json["data"]["fileUrl"].as_str().unwrap().to_string();
    assert_ne!(new_url, old_url);
    assert!(new_url.ends_with(".pdf"));

    // The replaced file is gone, the new one is served
    let (status, _, _) = fetch_file(&app, &old_url).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _, bytes) = fetch_file(&app, &new_url).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&bytes[..], b"second-scan");

    // Fields-only multipart update keeps the file
    let request = multipart_request("PUT", &uri, &token, &[("category", "Prescription")], None);
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["data"]["category"], "Prescription");
    assert_eq!(json["data"]["fileUrl"], new_url.as_str());

    // Clearing fileUrl removes the file
    let (status, json) = call(&app, "PUT", &uri, Some(&token), Some(json!({ "fileUrl": null }))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["data"]["fileUrl"].is_null());
    let (status, _, _) = fetch_file(&app, &new_url).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_deleting_report_removes_its_file() {
    let app = create_router_for_testing();
    let (token, _) = signup(&app, "cleanup@example.com").await;

    let request = multipart_request(
        "POST",
        "/api/reports",
        &token,
        &X_RAY_FIELDS,
        Some(("scan.png", "image/png", "private-scan")),
    );
    let (_, json) = send(&app, request).await;
    let uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());
    let file_url = json["data"]["fileUrl"].as_str().unwrap().to_string();

    let (status, _) = call(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = fetch_file(&app, &file_url).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejected_update_leaves_no_stored_file() {
    let app = create_router_for_testing();
    let (alice, _) = signup(&app, "orphan-a@example.com").await;
    let (bob, _) = signup(&app, "orphan-b@example.com").await;
    let alice_doctor = create_doctor(&app, &alice, "Dr. Sarah Smith").await;
    let (_, json) = create_report(&app, &bob, lab_report("Blood Test", "2024-01-10")).await;
    let uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());

    let request = multipart_request(
        "PUT",
        &uri,
        &bob,
        &[("doctor", alice_doctor.as_str())],
        Some(("scan.png", "image/png", "never-stored")),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, json) = call(&app, "GET", &uri, Some(&bob), None).await;
    assert!(json["data"]["fileUrl"].is_null());
}

#[tokio::test]
async fn test_file_url_cannot_claim_another_upload() {
    let app = create_router_for_testing();
    let (alice, _) = signup(&app, "claim-a@example.com").await;
    let (bob, _) = signup(&app, "claim-b@example.com").await;

    let request = multipart_request(
        "POST",
        "/api/reports",
        &alice,
        &X_RAY_FIELDS,
        Some(("scan.png", "image/png", "alice-scan")),
    );
    let (_, json) = send(&app, request).await;
    let alice_uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());
    let alice_url = json["data"]["fileUrl"].as_str().unwrap().to_string();

    // Bob cannot attach Alice's upload, and so cannot delete it later
    let mut body = lab_report("Copied", "2024-01-10");
    body["fileUrl"] = json!(alice_url);
    let (status, json) = create_report(&app, &bob, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");

    let (_, json) = create_report(&app, &bob, lab_report("Own", "2024-01-10")).await;
    let bob_uri = format!("/api/reports/{}", json["data"]["id"].as_str().unwrap());
    let (status, _) = call(&app, "PUT", &bob_uri, Some(&bob), Some(json!({ "fileUrl": alice_url }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Resending the current value is fine; external links are too
    let (status, _) = call(&app, "PUT", &alice_uri, Some(&alice), Some(json!({ "fileUrl": alice_url }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, json) = call(
        &app,
        "PUT",
        &bob_uri,
        Some(&bob),
        Some(json!({ "fileUrl": "https://files.example.com/scan.pdf" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["fileUrl"], "https://files.example.com/scan.pdf");

    let (status, _, _) = fetch_file(&app, &alice_url).await;
    assert_eq!(status, StatusCode::OK);
}
