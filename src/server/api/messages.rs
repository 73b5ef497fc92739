use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::require_access;
use crate::auth::RequireUser;
use crate::relay::RelayEvent;
use crate::server::AppState;
use crate::server::dto::PostMessageRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

pub async fn list_messages(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> impl IntoResponse {
    let project = require_access(&state, &project_id, &auth.user)?;

    let messages = state
        .services
        .projects
        .list_messages(&project.id)
        .api_err("Failed to list messages")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(messages)))
}

pub async fn post_message(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    Json(req): Json<PostMessageRequest>,
) -> impl IntoResponse {
    let message = state
        .services
        .projects
        .post_message(&project_id, &auth.user.id, &req.content)
        .api_err("Failed to post message")?
        .or_not_found("Project not found")?;

    state
        .relay
        .publish(&message.project_id, RelayEvent::NewMessage(message.clone()));

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(message))))
}
