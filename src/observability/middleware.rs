use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use opentelemetry::trace::TraceContextExt;
use std::{sync::Arc, time::Instant};
use tracing::{error, info, instrument, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::Metrics;

/// Middleware for automatic request tracing and metrics collection
pub async fn observability_middleware(
    metrics: Arc<Metrics>,
    request: Request,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();
    let uri = request.uri().to_string();

    let user_agent = request
        .headers()
        .get("user-agent")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    // First hop of X-Forwarded-For, then X-Real-IP
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .or_else(|| {
            request
                .headers()
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
        })
        .unwrap_or("unknown")
        .trim()
        .to_string();

    // Route template keeps metric label cardinality bounded
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched_path| matched_path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let span_name = format!("{} {}", method, endpoint);

    let span = tracing::info_span!(
        target: "cutmate::http",
        "{}", span_name,
        otel.name = %span_name,
        otel.kind = "server",
        http.method = %method,
        http.route = %endpoint,
        http.url = %uri,
        http.user_agent = %user_agent,
        client.address = %client_ip,
        http.status_code = tracing::field::Empty,
        http.response_time_ms = tracing::field::Empty,
    );

    async {
        metrics.increment_in_flight(&method, &endpoint);

        let trace_id = tracing::Span::current()
            .context()
            .span()
            .span_context()
            .trace_id()
            .to_string();

        info!(trace_id = %trace_id, method = %method, path = %endpoint, client_ip = %client_ip, "Processing request");

        let response = next.run(request).await;

        let duration = start_time.elapsed();
        let duration_ms = duration.as_millis();
        let status_code = response.status().as_u16();

        tracing::Span::current().record("http.status_code", status_code);
        tracing::Span::current().record("http.response_time_ms", duration_ms);

        let current_span = tracing::Span::current();
        let span_context = current_span.context();
        let otel_span = span_context.span();
        if status_code >= 500 {
            otel_span.set_status(opentelemetry::trace::Status::error("HTTP server error"));
        } else {
            otel_span.set_status(opentelemetry::trace::Status::Ok);
        }

        metrics.record_http_request(&method, &endpoint, status_code, duration.as_secs_f64());
        metrics.decrement_in_flight(&method, &endpoint);

        if status_code >= 500 {
            error!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request completed with error"
            );
        } else {
            info!(
                trace_id = %trace_id,
                method = %method,
                path = %endpoint,
                status_code = status_code,
                duration_ms = duration_ms,
                "Request completed"
            );
        }

        response
    }
    .instrument(span)
    .await
}

/// Times a database operation and records it in the database metrics
pub struct DatabaseTracingMiddleware {
    metrics: Arc<Metrics>,
}

impl DatabaseTracingMiddleware {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    #[instrument(skip_all, fields(operation = %operation, table = %table))]
    pub async fn trace_operation<F, T, E>(
        &self,
        operation: &str,
        table: &str,
        future: F,
    ) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();
        let result = future.await;
        let duration_seconds = start_time.elapsed().as_secs_f64();

        self.metrics
            .record_database_operation(operation, table, result.is_ok(), duration_seconds);

        match &result {
            Ok(_) => info!(
                duration_ms = start_time.elapsed().as_millis(),
                "Database operation completed successfully"
            ),
            Err(error) => error!(
                error = %error,
                duration_ms = start_time.elapsed().as_millis(),
                "Database operation failed"
            ),
        }

        result
    }
}

/// Records booking and quiz outcomes in the business metrics
pub struct BusinessTracingMiddleware {
    metrics: Arc<Metrics>,
}

impl BusinessTracingMiddleware {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    #[instrument(skip_all, fields(operation = %operation))]
    pub async fn trace_order_operation<F, T, E>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let start_time = Instant::now();
        let result = future.await;
        self.metrics.record_order_operation(operation, result.is_ok());

        match &result {
            Ok(_) => info!(
                duration_ms = start_time.elapsed().as_millis(),
                "Order operation completed successfully"
            ),
            Err(error) => error!(
                error = %error,
                duration_ms = start_time.elapsed().as_millis(),
                "Order operation failed"
            ),
        }

        result
    }

    #[instrument(skip_all)]
    pub async fn trace_feedback_request<F, T, E>(&self, future: F) -> Result<T, E>
    where
        F: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let result = future.await;
        self.metrics.record_quiz_feedback_request(result.is_ok());

        if let Err(error) = &result {
            error!(error = %error, "Quiz feedback request failed");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Method, Request, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    async fn test_handler() -> &'static str {
        "test response"
    }

    async fn error_handler() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    fn app(metrics: Arc<Metrics>) -> Router {
        Router::new()
            .route("/stores/:store_id", get(test_handler))
            .route("/error", get(error_handler))
            .layer(middleware::from_fn(move |req, next| {
                observability_middleware(metrics.clone(), req, next)
            }))
    }

    #[tokio::test]
    async fn test_observability_middleware_uses_route_template() {
        let metrics = Arc::new(Metrics::new().unwrap());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/stores/Sabc12345")
            .header("user-agent", "test-client/1.0")
            .body(Body::empty())
            .unwrap();

        let response = app(metrics.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("endpoint=\"/stores/:store_id\""));
        assert!(!encoded.contains("Sabc12345"));
    }

    #[tokio::test]
    async fn test_observability_middleware_error() {
        let metrics = Arc::new(Metrics::new().unwrap());

        let request = Request::builder()
            .method(Method::GET)
            .uri("/error")
            .body(Body::empty())
            .unwrap();

        let response = app(metrics.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("status_code=\"500\""));
    }

    #[tokio::test]
    async fn test_database_tracing_middleware() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let middleware = DatabaseTracingMiddleware::new(metrics.clone());

        let result = middleware
            .trace_operation("create_tables", "all", async { Ok::<_, String>("success") })
            .await;
        assert!(result.is_ok());

        let result = middleware
            .trace_operation("seed_questions", "questions", async {
                Err::<String, _>("error")
            })
            .await;
        assert!(result.is_err());

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("database_operations_total"));
    }

    #[tokio::test]
    async fn test_business_tracing_middleware() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let middleware = BusinessTracingMiddleware::new(metrics.clone());

        let result = middleware
            .trace_order_operation("create", async { Ok::<_, String>("success") })
            .await;
        assert!(result.is_ok());

        let result = middleware
            .trace_feedback_request(async { Err::<String, _>("upstream down") })
            .await;
        assert!(result.is_err());

        let encoded = metrics.encode().unwrap();
        assert!(encoded.contains("order_operations_total{operation=\"create\",status=\"success\"} 1"));
        assert!(encoded.contains("quiz_feedback_requests_total{status=\"error\"} 1"));
    }
}
