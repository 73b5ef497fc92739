use std::sync::Arc;

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::server::AppState;
use crate::types::User;

/// Header set by the upstream session layer to identify the caller.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Extractor that resolves the calling user from [`USER_ID_HEADER`].
pub struct RequireUser {
    pub user: User,
}

#[derive(Debug)]
pub enum AuthError {
    MissingUser,
    UnknownUser,
    InternalError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingUser => (StatusCode::UNAUTHORIZED, "Authentication required"),
            AuthError::UnknownUser => (StatusCode::UNAUTHORIZED, "Unknown user"),
            AuthError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = json!({ "data": null, "error": message });
        (status, Json(body)).into_response()
    }
}

impl FromRequestParts<Arc<AppState>> for RequireUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(AuthError::MissingUser)?;

        let user = state
            .services
            .projects
            .get_user(user_id)
            .map_err(|e| {
                tracing::error!("Failed to resolve user {user_id}: {e}");
                AuthError::InternalError
            })?
            .ok_or(AuthError::UnknownUser)?;

        Ok(RequireUser { user })
    }
}
