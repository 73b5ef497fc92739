mod access;
mod change_requests;
mod execute;
mod files;
mod messages;
mod projects;
mod users;
mod versioning;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::server::AppState;
use crate::server::response::{ApiError, StoreOptionExt, StoreResultExt};
use crate::types::{Project, User};

pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Users
        .route("/users", post(users::create_user))
        .route("/users/{id}", get(users::get_user))
        // Projects
        .route("/projects", get(projects::list_projects).post(projects::create_project))
        .route("/projects/{id}", get(projects::get_project))
        .route("/projects/{id}/snapshot", get(projects::get_snapshot))
        .route("/projects/{id}/members", get(access::list_members))
        // Access requests
        .route(
            "/projects/{id}/access",
            get(access::list_requests).post(access::request_access),
        )
        .route("/projects/{id}/access/me", get(access::my_access))
        .route("/access/{id}/approve", post(access::approve))
        .route("/access/{id}/reject", post(access::reject))
        // Files
        .route(
            "/projects/{id}/files",
            get(files::list_files).post(files::create_file),
        )
        .route(
            "/files/{id}",
            get(files::get_file)
                .patch(files::rename_file)
                .delete(files::delete_file),
        )
        .route("/files/{id}/content", put(files::write_file))
        // Chat
        .route(
            "/projects/{id}/messages",
            get(messages::list_messages).post(messages::post_message),
        )
        // Change requests
        .route(
            "/projects/{id}/change-requests",
            get(change_requests::list_change_requests).post(change_requests::propose),
        )
        .route("/change-requests/{id}", get(change_requests::get_change_request))
        .route("/change-requests/{id}/approve", post(change_requests::approve))
        .route("/change-requests/{id}/reject", post(change_requests::reject))
        // Branches and commits
        .route(
            "/projects/{id}/branches",
            get(versioning::list_branches).post(versioning::create_branch),
        )
        .route("/branches/{id}/history", get(versioning::history))
        .route("/branches/{id}/commits", post(versioning::commit))
        .route("/commits/{id}", get(versioning::get_commit))
        // Pull requests
        .route(
            "/projects/{id}/pull-requests",
            get(versioning::list_pull_requests).post(versioning::open_pull_request),
        )
        .route("/pull-requests/{id}/merge", post(versioning::merge))
        .route("/pull-requests/{id}/close", post(versioning::close))
        // Execution
        .route("/execute", post(execute::execute))
        .route("/execute/languages", get(execute::list_languages))
}

/// Loads a project the caller may read: 404 if unknown, 403 without access.
fn require_access(state: &AppState, project_id: &str, user: &User) -> Result<Project, ApiError> {
    let services = &state.services;
    let project = services
        .projects
        .get_project(project_id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    if !services
        .access
        .has_access(&project.id, &user.id)
        .api_err("Failed to check access")?
    {
        return Err(ApiError::forbidden("You do not have access to this project"));
    }
    Ok(project)
}
