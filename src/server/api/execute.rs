use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};

use crate::auth::RequireUser;
use crate::exec::{ExecutionRequest, Language};
use crate::server::AppState;
use crate::server::dto::ExecuteRequest;
use crate::server::response::{ApiError, ApiResponse};

pub async fn execute(
    auth: RequireUser,
    State(state): State<Arc<AppState>>,
    Json(req): Json<ExecuteRequest>,
) -> impl IntoResponse {
    if req.code.trim().is_empty() || req.language.is_empty() {
        return Err(ApiError::bad_request("Code and language are required"));
    }
    let language = Language::parse(&req.language)
        .ok_or_else(|| ApiError::bad_request("Unsupported language"))?;
    let runner = state
        .runner
        .clone()
        .ok_or_else(|| ApiError::unavailable("Code execution is not configured"))?;

    tracing::info!("User {} running {} snippet", auth.user.id, language);

    let response = runner
        .run(
            ExecutionRequest {
                code: req.code,
                language,
            },
            state.limits,
        )
        .await?;

    Ok::<_, ApiError>(Json(ApiResponse::success(response)))
}

pub async fn list_languages(_auth: RequireUser) -> impl IntoResponse {
    Json(ApiResponse::success(Language::ALL))
}
