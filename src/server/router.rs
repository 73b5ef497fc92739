use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing::get};

use super::api::api_router;
use super::dto::HealthResponse;
use crate::config::RelayConfig;
use crate::exec::{CodeRunner, ExecutionLimits};
use crate::relay::{Relay, relay_socket};
use crate::service::Services;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub services: Services,
    pub relay: Relay,
    /// Code runner for `/api/v1/execute`. Execution is unavailable without one.
    pub runner: Option<Arc<dyn CodeRunner>>,
    pub limits: ExecutionLimits,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, relay: RelayConfig) -> Self {
        Self {
            services: Services::new(store.clone()),
            store,
            relay: Relay::new(relay),
            runner: None,
            limits: ExecutionLimits::default(),
        }
    }

    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.runner = Some(runner);
        self
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn health_detail(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "OK",
        relay: state.relay.stats(),
    })
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/detail", get(health_detail))
        .route("/ws", get(relay_socket))
        .nest("/api/v1", api_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
