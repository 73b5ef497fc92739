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
use crate::server::dto::{
    CommitDetail, CreateBranchRequest, CreateCommitRequest, OpenPullRequestRequest,
    StatusFilterParams,
};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::{parse_status_filter, validate_branch_name};
use crate::service::VersionControl;
use crate::types::PullRequestStatus;

pub async fn list_branches(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let project = require_access(&state, &project_id, &auth.user)?;

    let branches = state
        .services
        .versioning
        .list_branches(&project.id)
        .api_err("Failed to list branches")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(branches)))
}

pub async fn create_branch(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateBranchRequest>,
) -> impl IntoResponse {
    validate_branch_name(&req.name)?;

    let branch = state
        .services
        .versioning
        .create_branch(&project_id, &req.name, &auth.user.id, req.is_main)
        .api_err("Failed to create branch")?
        .or_not_found("Project not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(branch))))
}

/// Commits reachable from the branch head, newest first.
pub async fn history(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(branch_id): Path<String>,
) -> impl IntoResponse {
    let versioning = &state.services.versioning;
    let branch = versioning
        .get_branch(&branch_id)
        .api_err("Failed to get branch")?
        .or_not_found("Branch not found")?;
    require_access(&state, &branch.project_id, &auth.user)?;

    let commits = versioning
        .history(&branch.id)
        .api_err("Failed to load history")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(commits)))
}

pub async fn commit(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(branch_id): Path<String>,
    Json(req): Json<CreateCommitRequest>,
) -> impl IntoResponse {
    let versioning = &state.services.versioning;
    let branch = versioning
        .get_branch(&branch_id)
        .api_err("Failed to get branch")?
        .or_not_found("Branch not found")?;

    let commit = versioning
        .commit(
            &branch.project_id,
            &branch.id,
            &auth.user.id,
            &req.message,
            req.files,
        )
        .api_err("Failed to create commit")?
        .or_not_found("Branch not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(commit))))
}

pub async fn get_commit(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let commit = state
        .services
        .versioning
        .get_commit(&id)
        .api_err("Failed to get commit")?
        .or_not_found("Commit not found")?;
    require_access(&state, &commit.project_id, &auth.user)?;

    let diffs = VersionControl::commit_diffs(&commit);
    Ok::<_, ApiError>(Json(ApiResponse::success(CommitDetail { commit, diffs })))
}

pub async fn list_pull_requests(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Query(params): Query<StatusFilterParams>,
) -> impl IntoResponse {
    let status = parse_status_filter(params.status.as_deref(), PullRequestStatus::parse)?;
    let project = require_access(&state, &project_id, &auth.user)?;

    let pull_requests = state
        .services
        .versioning
        .list_pull_requests(&project.id, status)
        .api_err("Failed to list pull requests")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(pull_requests)))
}

pub async fn open_pull_request(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<OpenPullRequestRequest>,
) -> impl IntoResponse {
    let pr = state
        .services
        .versioning
        .open_pull_request(
            &project_id,
            &req.source_branch_id,
            &req.target_branch_id,
            &req.title,
            &req.description,
            &auth.user.id,
        )
        .api_err("Failed to open pull request")?
        .or_not_found("Project or branch not found")?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(pr))))
}

pub async fn merge(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let pr = state
        .services
        .versioning
        .merge(&id, &auth.user.id)
        .api_err("Failed to merge pull request")?
        .or_not_found("Pull request not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(pr)))
}

pub async fn close(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let pr = state
        .services
        .versioning
        .close(&id, &auth.user.id)
        .api_err("Failed to close pull request")?
        .or_not_found("Pull request not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(pr)))
}
