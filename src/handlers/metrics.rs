use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{error, instrument};

use super::extract::error_response;
use crate::observability::Metrics;

const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus scrape endpoint: HTTP, DynamoDB, booking, notification and
/// quiz feedback counters from the shared registry
#[instrument(name = "metrics_handler", skip(metrics))]
pub async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.encode() {
        Ok(text) => (StatusCode::OK, [(header::CONTENT_TYPE, PROMETHEUS_TEXT)], text).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics")
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    async fn scrape(metrics: Arc<Metrics>) -> (StatusCode, String) {
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(metrics);
        let request = Request::builder()
            .uri("/metrics")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROMETHEUS_TEXT);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_booking_notifications_are_exported() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_order_operation("create", true);
        metrics.record_notifications("email", 2, 1);
        metrics.record_notifications("eventbridge", 1, 0);

        let (status, text) = scrape(metrics).await;
        assert_eq!(status, StatusCode::OK);

        assert!(text.contains(r#"order_operations_total{operation="create",status="success"} 1"#));
        assert!(text.contains(r#"notifications_sent_total{channel="email",status="success"} 2"#));
        assert!(text.contains(r#"notifications_sent_total{channel="email",status="error"} 1"#));
        assert!(text.contains(r#"notifications_sent_total{channel="eventbridge",status="success"} 1"#));
        assert!(!text.contains(r#"channel="eventbridge",status="error""#));
    }

    #[tokio::test]
    async fn test_quiz_feedback_outcomes_are_exported() {
        let metrics = Arc::new(Metrics::new().unwrap());
        metrics.record_quiz_feedback_request(true);
        metrics.record_quiz_feedback_request(false);
        metrics.record_quiz_feedback_request(false);

        let (_, text) = scrape(metrics).await;

        assert!(text.contains(r#"quiz_feedback_requests_total{status="success"} 1"#));
        assert!(text.contains(r#"quiz_feedback_requests_total{status="error"} 2"#));
    }
}
