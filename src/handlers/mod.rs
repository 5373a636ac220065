pub mod admin;
pub mod api;
pub mod auth;
pub mod extract;
pub mod health;
pub mod metrics;
pub mod middleware;
pub mod orders;
pub mod quizzes;

pub use admin::{create_admin_router, AdminState};
pub use api::{create_api_router, ApiState};
pub use health::health_check;
pub use metrics::metrics_handler;
pub use middleware::{
    cors_middleware, error_body_middleware, request_validation_middleware,
    security_headers_middleware, DEFAULT_MAX_REQUEST_SIZE,
};

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::Json,
    routing::get,
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;

use crate::observability::{observability_middleware, Metrics};

/// Per-request limits applied by the outer middleware stack
#[derive(Debug, Clone, Copy)]
pub struct RequestLimits {
    pub max_request_size: usize,
    pub timeout: Duration,
}

impl Default for RequestLimits {
    fn default() -> Self {
        Self {
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Assemble the full application: health, metrics, API and admin routes
/// behind the shared middleware stack.
pub fn create_app(
    metrics: Arc<Metrics>,
    api_state: ApiState,
    admin_state: AdminState,
    limits: RequestLimits,
) -> Router {
    let metrics_for_middleware = metrics.clone();

    Router::new()
        .route("/health/status", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(metrics)
        .merge(create_api_router(api_state))
        .merge(create_admin_router(admin_state))
        .fallback(route_not_found)
        // Layers wrap what was added before them: the first is innermost
        .layer(DefaultBodyLimit::max(limits.max_request_size))
        .layer(TimeoutLayer::new(limits.timeout))
        .layer(axum_middleware::from_fn(error_body_middleware))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(axum_middleware::from_fn(cors_middleware))
        .layer(axum_middleware::from_fn(move |req, next| {
            request_validation_middleware(limits.max_request_size, req, next)
        }))
        .layer(axum_middleware::from_fn(move |req, next| {
            observability_middleware(metrics_for_middleware.clone(), req, next)
        }))
}

async fn route_not_found() -> (StatusCode, Json<Value>) {
    extract::error_response(StatusCode::NOT_FOUND, "Route not found")
}
