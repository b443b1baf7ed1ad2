mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::setup;

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn register(app: &Router, name: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({
            "name": name,
            "email": format!("{}@example.com", name.to_lowercase()),
            "password": "correct horse battery",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_is_public() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_routes_need_a_valid_token() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());

    let (status, body) = send(&app, Method::GET, "/api/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");

    let (status, _) = send(&app, Method::GET, "/api/projects", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_grants_the_default_role() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());
    let token = register(&app, "Dana").await;

    let (status, me) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "dana@example.com");
    assert_eq!(me["roles"], json!(["member"]));
    assert_eq!(me["permissions"], json!(["manage_comments", "manage_tasks"]));

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/register",
        None,
        Some(json!({"name": "Dana", "email": "DANA@example.com", "password": "another password"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "conflict");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "dana@example.com", "password": "wrong password"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "dana@example.com", "password": "correct horse battery"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].is_string());
}

#[tokio::test]
async fn error_kinds_map_to_distinct_statuses() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());
    let token = register(&app, "Eve").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/comments",
        Some(&token),
        Some(json!({"on": "widget", "id": 1, "body": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "invalid_target");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/comments",
        Some(&token),
        Some(json!({"on": "project", "id": 404, "body": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    // The default role carries no manage_projects.
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/projects",
        Some(&token),
        Some(json!({"name": "Mine", "owner_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tasks/bulk-status",
        Some(&token),
        Some(json!({"updates": []})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");
}

#[tokio::test]
async fn bulk_status_reports_skipped_items() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());
    let token = register(&app, "Finn").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tasks/bulk-status",
        Some(&token),
        Some(json!({"updates": [{"id": 999, "status": "blocked"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"updated": [], "skipped": [999]}));
}

#[tokio::test]
async fn malformed_requests_keep_the_error_body_shape() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());
    let token = register(&app, "Gus").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/tasks/bulk-status",
        Some(&token),
        Some(json!({"updates": [{"id": 1, "status": "finished"}]})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");
    assert!(body["error"].as_str().unwrap().contains("finished"), "{body}");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/comments",
        Some(&token),
        Some(json!({"on": "project", "body": "hello"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "validation_error");

    let (status, body) = send(&app, Method::GET, "/api/tasks?status=finished", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");

    let (status, body) = send(&app, Method::GET, "/api/tasks/abc", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn logout_revokes_the_token() {
    let test = setup().await;
    let app = taskboard_server::app(test.state.clone());
    let token = register(&app, "Hana").await;

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::POST, "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");

    // A fresh login issues a token with a new id.
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/auth/login",
        None,
        Some(json!({"email": "hana@example.com", "password": "correct horse battery"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap();

    let (status, _) = send(&app, Method::GET, "/api/auth/me", Some(fresh), None).await;
    assert_eq!(status, StatusCode::OK);
}
