use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::require_access;
use crate::auth::RequireUser;
use crate::server::AppState;
use crate::server::dto::StatusFilterParams;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::parse_status_filter;
use crate::types::AccessStatus;

pub async fn request_access(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let access = state
        .services
        .access
        .request_access(&project_id, &auth.user.id)
        .api_err("Failed to request access")?
        .or_not_found("Project not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(access))))
}

/// The caller's own most recent request, or `null` if they never asked.
pub async fn my_access(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let project = state
        .services
        .projects
        .get_project(&project_id)
        .api_err("Failed to get project")?
        .or_not_found("Project not found")?;

    let access = state
        .services
        .access
        .access_for(&project.id, &auth.user.id)
        .api_err("Failed to look up access request")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(access)))
}

pub async fn list_requests(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(params): Query<StatusFilterParams>,
) -> impl IntoResponse {
    let status = parse_status_filter(params.status.as_deref(), AccessStatus::parse)?;

    let requests = state
        .services
        .access
        .list_requests(&project_id, status, &auth.user.id)
        .api_err("Failed to list access requests")?
        .or_not_found("Project not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(requests)))
}

pub async fn approve(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let access = state
        .services
        .access
        .approve(&id, &auth.user.id)
        .api_err("Failed to approve access request")?
        .or_not_found("Access request not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(access)))
}

pub async fn reject(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let access = state
        .services
        .access
        .reject(&id, &auth.user.id)
        .api_err("Failed to reject access request")?
        .or_not_found("Access request not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(access)))
}

pub async fn list_members(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let project = require_access(&state, &project_id, &auth.user)?;

    let members = state
        .services
        .access
        .list_members(&project.id)
        .api_err("Failed to list members")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(members)))
}
