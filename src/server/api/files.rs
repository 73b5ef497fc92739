use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::require_access;
use crate::auth::RequireUser;
use crate::relay::{CodeChange, RelayEvent};
use crate::server::AppState;
use crate::server::dto::{CreateFileRequest, RenameFileRequest, WriteFileRequest};
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};
use crate::server::validation::validate_file_name;

pub async fn list_files(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let project = require_access(&state, &project_id, &auth.user)?;

    let files = state
        .services
        .projects
        .list_files(&project.id)
        .api_err("Failed to list files")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(files)))
}

pub async fn create_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<CreateFileRequest>,
) -> impl IntoResponse {
    validate_file_name(&req.file_name)?;

    let file = state
        .services
        .governance
        .create_file(&project_id, &req.file_name, &req.content, &auth.user.id)
        .api_err("Failed to create file")?
        .or_not_found("Project not found")?;

    state
        .relay
        .publish(&file.project_id, RelayEvent::FileCreated(file.clone()));

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(file))))
}

pub async fn get_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let file = state
        .services
        .projects
        .get_file(&id)
        .api_err("Failed to get file")?
        .or_not_found("File not found")?;
    require_access(&state, &file.project_id, &auth.user)?;

    Ok::<_, ApiError>(Json(ApiResponse::success(file)))
}

/// Renames in place. Room members get the updated record as `file-created`,
/// which replaces the cached file with the same id.
pub async fn rename_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RenameFileRequest>,
) -> impl IntoResponse {
    validate_file_name(&req.file_name)?;

    let file = state
        .services
        .governance
        .rename_file(&id, &req.file_name, &auth.user.id)
        .api_err("Failed to rename file")?
        .or_not_found("File not found")?;

    state
        .relay
        .publish(&file.project_id, RelayEvent::FileCreated(file.clone()));

    Ok::<_, ApiError>(Json(ApiResponse::success(file)))
}

pub async fn delete_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let file = state
        .services
        .governance
        .delete_file(&id, &auth.user.id)
        .api_err("Failed to delete file")?
        .or_not_found("File not found")?;

    state
        .relay
        .publish(&file.project_id, RelayEvent::FileDeleted(file.id.clone()));

    Ok::<_, ApiError>(StatusCode::NO_CONTENT)
}

/// Direct admin write. Members propose changes instead.
pub async fn write_file(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<WriteFileRequest>,
) -> impl IntoResponse {
    let file = state
        .services
        .governance
        .write_file(&id, &req.content, &auth.user.id)
        .api_err("Failed to write file")?
        .or_not_found("File not found")?;

    state.relay.publish(
        &file.project_id,
        RelayEvent::CodeChange(CodeChange {
            file_id: file.id.clone(),
            content: file.content.clone(),
        }),
    );

    Ok::<_, ApiError>(Json(ApiResponse::success(file)))
}
