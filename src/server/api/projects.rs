use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::require_access;
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::CreateProjectRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_project_name;

/// Projects the caller administers, then projects they were approved into.
pub async fn list_projects(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let projects = state
        .services
        .access
        .accessible_projects(&auth.user.id)
        .api_err("Failed to list projects")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(projects)))
}

pub async fn create_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateProjectRequest>,
) -> impl IntoResponse {
    validate_project_name(&req.name)?;

    let project = state
        .services
        .projects
        .create_project(&auth.user.id, &req.name)
        .api_err("Failed to create project")?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(project))))
}

pub async fn get_project(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let project = require_access(&state, &id, &auth.user)?;
    Ok::<_, ApiError>(Json(ApiResponse::success(project)))
}

/// The `{project, files, messages}` tuple a client needs to render the editor.
pub async fn get_snapshot(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let project = require_access(&state, &id, &auth.user)?;

    let snapshot = state
        .services
        .projects
        .snapshot(&project.id)
        .api_err("Failed to load project")?
        .or_not_found("Project not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(snapshot)))
}
