use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::auth::RequireUser;
use crate::error::Error;
use crate::server::AppState;
use crate::server::dto::CreateUserRequest;
use crate::server::response::{ApiError, ApiResponse, StoreOptionExt, StoreResultExt};

/// Unauthenticated: this is how a caller gets an id to send back.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let user = state
        .services
        .projects
        .create_user(&req.name, &req.email)
        .map_err(|e| match e {
            Error::AlreadyExists => {
                ApiError::conflict("A user with this email already exists")
            }
            other => ApiError::from(other),
        })?;

    Ok::<_, ApiError>((StatusCode::CREATED, Json(ApiResponse::success(user))))
}

pub async fn get_user(
    _auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let user = state
        .services
        .projects
        .get_user(&id)
        .api_err("Failed to get user")?
        .or_not_found("User not found")?;

    Ok::<_, ApiError>(Json(ApiResponse::success(user)))
}
