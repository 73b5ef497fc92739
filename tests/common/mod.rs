#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode};
use codecollab::config::RelayConfig;
use codecollab::server::{AppState, create_router};
use codecollab::store::{MemoryStore, Store};
use serde_json::Value;
use tower::ServiceExt;

pub fn test_state() -> AppState {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    store.initialize().expect("initialize store");
    AppState::new(store, RelayConfig::default())
}

pub fn test_app() -> Router {
    create_router(Arc::new(test_state()))
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user_id: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user_id) = user_id {
        builder = builder.header("x-user-id", user_id);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).expect("build request"))
        .await
        .expect("send request");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, json)
}

pub async fn get(app: &Router, uri: &str, user_id: &str) -> (StatusCode, Value) {
    send(app, Method::GET, uri, Some(user_id), None).await
}

pub async fn post(app: &Router, uri: &str, user_id: &str, body: Value) -> (StatusCode, Value) {
    send(app, Method::POST, uri, Some(user_id), Some(body)).await
}

/// Creates a user over HTTP and returns its id.
pub async fn create_user(app: &Router, name: &str, email: &str) -> String {
    let (status, json) = send(
        app,
        Method::POST,
        "/api/v1/users",
        None,
        Some(serde_json::json!({ "name": name, "email": email })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create user: {json}");
    json["data"]["id"].as_str().expect("user id").to_string()
}

/// Creates a project owned by `admin` and returns its id.
pub async fn create_project(app: &Router, admin: &str, name: &str) -> String {
    let (status, json) = post(
        app,
        "/api/v1/projects",
        admin,
        serde_json::json!({ "name": name }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create project: {json}");
    json["data"]["id"].as_str().expect("project id").to_string()
}

/// Requests access for `member` and has `admin` approve it.
pub async fn grant_access(app: &Router, project: &str, member: &str, admin: &str) {
    let (status, json) = post(
        app,
        &format!("/api/v1/projects/{project}/access"),
        member,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "request access: {json}");
    let access_id = json["data"]["id"].as_str().expect("access id").to_string();

    let (status, json) = post(
        app,
        &format!("/api/v1/access/{access_id}/approve"),
        admin,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "approve access: {json}");
}

/// Id of the project's starter file.
pub async fn first_file(app: &Router, project: &str, user_id: &str) -> String {
    let (status, json) = get(app, &format!("/api/v1/projects/{project}/files"), user_id).await;
    assert_eq!(status, StatusCode::OK, "list files: {json}");
    json["data"][0]["id"].as_str().expect("file id").to_string()
}
