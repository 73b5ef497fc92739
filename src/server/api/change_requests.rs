use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::require_access;
use crate::auth::RequireUser;
use crate::relay::{CodeChange, RelayEvent};
use crate::server::AppState;
use crate::server::dto::{ProposeChangeRequest, StatusFilterParams};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::parse_status_filter;
use crate::types::ReviewStatus;

pub async fn list_change_requests(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(params): Query<StatusFilterParams>,
) -> impl IntoResponse {
    let status = parse_status_filter(params.status.as_deref(), ReviewStatus::parse)?;
    let project = require_access(&state, &project_id, &auth.user)?;

    let requests = state
        .services
        .governance
        .list(&project.id, status)
        .api_err("Failed to list change requests")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(requests)))
}

pub async fn propose(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<ProposeChangeRequest>,
) -> impl IntoResponse {
    let request = state
        .services
        .governance
        .propose(
            &project_id,
            &req.file_id,
            &req.old_content,
            &req.new_content,
            &auth.user.id,
            &req.message,
        )
        .api_err("Failed to submit change request")?
        .or_not_found("Project or file not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(request))))
}

/// The request with its diff against the proposer's base.
pub async fn get_change_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let review = state
        .services
        .governance
        .review(&id)
        .api_err("Failed to get change request")?
        .or_not_found("Change request not found")?;
    require_access(&state, &review.request.project_id, &auth.user)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(review)))
}

/// Approving writes the new content and pushes it to the project room.
pub async fn approve(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let approval = state
        .services
        .governance
        .approve(&id, &auth.user.id)
        .api_err("Failed to approve change request")?
        .or_not_found("Change request not found")?;

    if let Some(file) = &approval.file {
        state.relay.publish(
            &file.project_id,
            RelayEvent::CodeChange(CodeChange {
                file_id: file.id.clone(),
                content: file.content.clone(),
            }),
        );
    }

    Ok::<_, ApiError>(Json(ApiResponse::success(approval)))
}

pub async fn reject(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let request = state
        .services
        .governance
        .reject(&id, &auth.user.id)
        .api_err("Failed to reject change request")?
        .or_not_found("Change request not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(request)))
}
