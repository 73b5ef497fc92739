//! HTTP API tests driven through the router with `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use codecollab::error::Result;
use codecollab::exec::{CodeRunner, ExecutionLimits, ExecutionRequest, ExecutionResponse};
use codecollab::server::create_router;
use serde_json::{Value, json};

use common::{
    create_project, create_user, first_file, get, grant_access, post, send, test_app, test_state,
};

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));

    let (status, body) = send(&app, Method::GET, "/health/detail", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["relay"]["rooms"], 0);
}

#[tokio::test]
async fn test_identity_header_is_required() {
    let app = test_app();

    let (status, body) = send(&app, Method::GET, "/api/v1/projects", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Authentication required");

    let (status, _) = get(&app, "/api/v1/projects", "no-such-user").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_email_conflicts() {
    let app = test_app();
    create_user(&app, "Alice", "alice@example.com").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/users",
        None,
        Some(json!({ "name": "Other", "email": "ALICE@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_project_creation_seeds_main_branch_and_file() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let project = create_project(&app, &admin, "demo").await;

    let (status, files) = get(&app, &format!("/api/v1/projects/{project}/files"), &admin).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(files["data"].as_array().unwrap().len(), 1);
    assert_eq!(files["data"][0]["file_name"], "main.py");

    let (_, branches) = get(&app, &format!("/api/v1/projects/{project}/branches"), &admin).await;
    assert_eq!(branches["data"][0]["name"], "main");
    assert_eq!(branches["data"][0]["is_main"], true);

    let (_, projects) = get(&app, "/api/v1/projects", &admin).await;
    assert_eq!(projects["data"][0]["id"], project.as_str());
}

/// A member joins, proposes "x" -> "y", and the admin approves it.
#[tokio::test]
async fn test_access_and_change_request_flow() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let member = create_user(&app, "Bob", "bob@example.com").await;
    let project = create_project(&app, &admin, "demo").await;
    let file = first_file(&app, &project, &admin).await;

    let (status, _) = get(&app, &format!("/api/v1/projects/{project}"), &member).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let own_access = format!("/api/v1/projects/{project}/access/me");
    let (status, mine) = get(&app, &own_access, &member).await;
    assert_eq!(status, StatusCode::OK);
    assert!(mine["data"].is_null());

    let (status, access) = post(
        &app,
        &format!("/api/v1/projects/{project}/access"),
        &member,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(access["data"]["status"], "pending");
    let access_id = access["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = get(
        &app,
        &format!("/api/v1/projects/{project}/access?status=pending"),
        &member,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, pending) = get(
        &app,
        &format!("/api/v1/projects/{project}/access?status=pending"),
        &admin,
    )
    .await;
    assert_eq!(pending["data"].as_array().unwrap().len(), 1);

    let (status, approved) = post(
        &app,
        &format!("/api/v1/access/{access_id}/approve"),
        &admin,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["data"]["status"], "approved");

    let (_, mine) = get(&app, &own_access, &member).await;
    assert_eq!(mine["data"]["id"], access_id.as_str());
    assert_eq!(mine["data"]["status"], "approved");

    let (status, _) = get(&app, &format!("/api/v1/projects/{project}"), &member).await;
    assert_eq!(status, StatusCode::OK);

    let (_, members) = get(&app, &format!("/api/v1/projects/{project}/members"), &member).await;
    assert_eq!(members["data"][0]["user_id"], member.as_str());

    // The admin writes directly.
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/files/{file}/content"),
        Some(&admin),
        Some(json!({ "content": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // A member cannot.
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/files/{file}/content"),
        Some(&member),
        Some(json!({ "content": "z" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, request) = post(
        &app,
        &format!("/api/v1/projects/{project}/change-requests"),
        &member,
        json!({
            "file_id": file,
            "old_content": "x",
            "new_content": "y",
            "message": "use y",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let request_id = request["data"]["id"].as_str().unwrap().to_string();

    let (_, review) = get(&app, &format!("/api/v1/change-requests/{request_id}"), &admin).await;
    assert_eq!(review["data"]["status"], "pending");
    assert_eq!(review["data"]["diff"]["added"], 1);
    assert_eq!(review["data"]["diff"]["removed"], 1);

    let (status, _) = post(
        &app,
        &format!("/api/v1/change-requests/{request_id}/approve"),
        &member,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, approval) = post(
        &app,
        &format!("/api/v1/change-requests/{request_id}/approve"),
        &admin,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approval["data"]["request"]["status"], "approved");
    assert_eq!(approval["data"]["file"]["content"], "y");

    let (_, current) = get(&app, &format!("/api/v1/files/{file}"), &member).await;
    assert_eq!(current["data"]["content"], "y");

    let (status, _) = post(
        &app,
        &format!("/api/v1/change-requests/{request_id}/reject"),
        &admin,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_rejected_change_leaves_file_untouched() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let member = create_user(&app, "Bob", "bob@example.com").await;
    let project = create_project(&app, &admin, "demo").await;
    grant_access(&app, &project, &member, &admin).await;
    let file = first_file(&app, &project, &member).await;

    let (_, before) = get(&app, &format!("/api/v1/files/{file}"), &member).await;
    let (_, request) = post(
        &app,
        &format!("/api/v1/projects/{project}/change-requests"),
        &member,
        json!({
            "file_id": file,
            "old_content": before["data"]["content"],
            "new_content": "print('nope')",
            "message": "try this",
        }),
    )
    .await;
    let request_id = request["data"]["id"].as_str().unwrap().to_string();

    let (status, rejected) = post(
        &app,
        &format!("/api/v1/change-requests/{request_id}/reject"),
        &admin,
        Value::Null,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["data"]["status"], "rejected");

    let (_, after) = get(&app, &format!("/api/v1/files/{file}"), &member).await;
    assert_eq!(after["data"]["content"], before["data"]["content"]);

    let (_, listed) = get(
        &app,
        &format!("/api/v1/projects/{project}/change-requests?status=rejected"),
        &member,
    )
    .await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);

    let (status, _) = get(
        &app,
        &format!("/api/v1/projects/{project}/change-requests?status=maybe"),
        &member,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_file_management() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let project = create_project(&app, &admin, "demo").await;
    let starter = first_file(&app, &project, &admin).await;

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/files/{starter}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, created) = post(
        &app,
        &format!("/api/v1/projects/{project}/files"),
        &admin,
        json!({ "file_name": "util.py" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["data"]["content"], "");
    let util = created["data"]["id"].as_str().unwrap().to_string();

    let (status, renamed) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/files/{util}"),
        Some(&admin),
        Some(json!({ "file_name": "helpers.py" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["data"]["file_name"], "helpers.py");

    let (status, _) = send(
        &app,
        Method::DELETE,
        &format!("/api/v1/files/{starter}"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = get(&app, &format!("/api/v1/files/{starter}"), &admin).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_messages() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let outsider = create_user(&app, "Eve", "eve@example.com").await;
    let project = create_project(&app, &admin, "demo").await;

    let (status, message) = post(
        &app,
        &format!("/api/v1/projects/{project}/messages"),
        &admin,
        json!({ "content": "hello" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["data"]["user_name"], "Alice");

    let (status, _) = post(
        &app,
        &format!("/api/v1/projects/{project}/messages"),
        &outsider,
        json!({ "content": "let me in" }),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, snapshot) = get(&app, &format!("/api/v1/projects/{project}/snapshot"), &admin).await;
    assert_eq!(snapshot["data"]["messages"].as_array().unwrap().len(), 1);
    assert_eq!(snapshot["data"]["project"]["id"], project.as_str());
}

/// Two commits on main come back newest first.
#[tokio::test]
async fn test_commit_history() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let project = create_project(&app, &admin, "demo").await;
    let file = first_file(&app, &project, &admin).await;

    let (_, branches) = get(&app, &format!("/api/v1/projects/{project}/branches"), &admin).await;
    let main = branches["data"][0]["id"].as_str().unwrap().to_string();

    let mut ids = Vec::new();
    for (message, old, new) in [("C1", "", "a"), ("C2", "a", "a\nb")] {
        let (status, commit) = post(
            &app,
            &format!("/api/v1/branches/{main}/commits"),
            &admin,
            json!({
                "message": message,
                "files": [{
                    "file_id": file,
                    "file_name": "main.py",
                    "old_content": old,
                    "new_content": new,
                    "action": "update",
                }],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{commit}");
        ids.push(commit["data"]["id"].as_str().unwrap().to_string());
    }

    let (_, history) = get(&app, &format!("/api/v1/branches/{main}/history"), &admin).await;
    let history: Vec<&str> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_str().unwrap())
        .collect();
    assert_eq!(history, vec![ids[1].as_str(), ids[0].as_str()]);

    let (_, detail) = get(&app, &format!("/api/v1/commits/{}", ids[1]), &admin).await;
    assert_eq!(detail["data"]["message"], "C2");
    assert_eq!(detail["data"]["parent_commit_id"], ids[0].as_str());
    assert_eq!(detail["data"]["diffs"][0]["diff"]["added"], 1);

    let (status, _) = post(
        &app,
        &format!("/api/v1/branches/{main}/commits"),
        &admin,
        json!({ "message": "empty", "files": [] }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pull_request_lifecycle() {
    let app = test_app();
    let admin = create_user(&app, "Alice", "alice@example.com").await;
    let member = create_user(&app, "Bob", "bob@example.com").await;
    let project = create_project(&app, &admin, "demo").await;
    grant_access(&app, &project, &member, &admin).await;

    let (_, branches) = get(&app, &format!("/api/v1/projects/{project}/branches"), &member).await;
    let main = branches["data"][0]["id"].as_str().unwrap().to_string();

    let (status, _) = post(
        &app,
        &format!("/api/v1/projects/{project}/branches"),
        &member,
        json!({ "name": "bad name" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, feature) = post(
        &app,
        &format!("/api/v1/projects/{project}/branches"),
        &member,
        json!({ "name": "feature/login" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let feature = feature["data"]["id"].as_str().unwrap().to_string();

    let (status, pr) = post(
        &app,
        &format!("/api/v1/projects/{project}/pull-requests"),
        &member,
        json!({
            "source_branch_id": feature,
            "target_branch_id": main,
            "title": "Add login",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(pr["data"]["status"], "open");
    let pr = pr["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = post(&app, &format!("/api/v1/pull-requests/{pr}/merge"), &member, Value::Null).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, merged) = post(&app, &format!("/api/v1/pull-requests/{pr}/merge"), &admin, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(merged["data"]["status"], "merged");
    assert_eq!(merged["data"]["merged_by"], admin.as_str());

    let (status, closed) = post(&app, &format!("/api/v1/pull-requests/{pr}/close"), &member, Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(closed["data"]["status"], "merged");

    let (_, open) = get(
        &app,
        &format!("/api/v1/projects/{project}/pull-requests?status=open"),
        &member,
    )
    .await;
    assert!(open["data"].as_array().unwrap().is_empty());
}

struct EchoRunner;

#[async_trait]
impl CodeRunner for EchoRunner {
    async fn run(
        &self,
        request: ExecutionRequest,
        limits: ExecutionLimits,
    ) -> Result<ExecutionResponse> {
        Ok(ExecutionResponse {
            output: format!(
                "{}:{}:{}",
                request.language,
                request.code,
                limits.timeout.as_secs()
            ),
        })
    }
}

#[tokio::test]
async fn test_execute_boundary() {
    let app = test_app();
    let user = create_user(&app, "Alice", "alice@example.com").await;

    let (status, _) = post(
        &app,
        "/api/v1/execute",
        &user,
        json!({ "code": "print(1)", "language": "python" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let app = create_router(Arc::new(test_state().with_runner(Arc::new(EchoRunner))));
    let user = create_user(&app, "Alice", "alice@example.com").await;

    let (status, body) = post(
        &app,
        "/api/v1/execute",
        &user,
        json!({ "code": "print(1)", "language": "python" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["output"], "python:print(1):5");

    let (status, body) = post(
        &app,
        "/api/v1/execute",
        &user,
        json!({ "code": "fn main() {}", "language": "rust" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Unsupported language");

    let (status, _) = post(
        &app,
        "/api/v1/execute",
        &user,
        json!({ "code": "  ", "language": "python" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, languages) = get(&app, "/api/v1/execute/languages", &user).await;
    assert_eq!(languages["data"].as_array().unwrap().len(), 5);
}
