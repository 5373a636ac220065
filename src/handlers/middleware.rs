use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use tracing::{error, warn};

use super::extract::error_response;

/// Default body limit when none is configured
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 1024 * 1024;

/// Rejects bodies that are not JSON or exceed `max_request_size`
pub async fn request_validation_middleware(
    max_request_size: usize,
    request: Request<Body>,
    next: Next,
) -> Result<Response, (StatusCode, Json<Value>)> {
    let request = enforce_body_limit(request, max_request_size).await?;
    validate_content_type(&request)?;

    Ok(next.run(request).await)
}

/// Error statuses produced outside the handlers (timeouts, unmatched routes,
/// wrong methods) carry no body; give them the API error body.
pub async fn error_body_middleware(request: Request<Body>, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error())
        || response.headers().contains_key(header::CONTENT_TYPE)
    {
        return response;
    }

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);

    let message = status.canonical_reason().unwrap_or("Request failed");
    let mut rewritten = error_response(status, message).into_response();
    rewritten.headers_mut().extend(parts.headers);
    rewritten
}

fn error_body(status: StatusCode, error: &str, message: String) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({
            "error": error,
            "message": message,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

fn declared_length(request: &Request<Body>) -> Option<u64> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
}

/// Bodies on POST/PUT/PATCH must be JSON; empty bodies need no content type
fn validate_content_type(request: &Request<Body>) -> Result<(), (StatusCode, Json<Value>)> {
    let method = request.method();
    if !(method == Method::POST || method == Method::PUT || method == Method::PATCH) {
        return Ok(());
    }

    match request.headers().get(header::CONTENT_TYPE) {
        Some(content_type) => {
            let content_type = content_type.to_str().unwrap_or("");
            if !content_type.starts_with("application/json") {
                warn!("Invalid content type: {}", content_type);
                return Err(error_body(
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "Unsupported media type",
                    "Content-Type must be application/json".to_string(),
                ));
            }
        }
        None if declared_length(request).unwrap_or(0) > 0 => {
            warn!("Missing content type header");
            return Err(error_body(
                StatusCode::BAD_REQUEST,
                "Missing content type",
                "Content-Type header is required for requests with body".to_string(),
            ));
        }
        None => {}
    }

    Ok(())
}

fn too_large(max_request_size: usize, detail: String) -> (StatusCode, Json<Value>) {
    error!("Request too large: {}", detail);
    error_body(
        StatusCode::PAYLOAD_TOO_LARGE,
        "Request too large",
        format!("Request body exceeds maximum of {} bytes", max_request_size),
    )
}

/// A declared Content-Length is checked up front. Bodies without one
/// (chunked uploads) are buffered up to the limit and re-attached with
/// their real length, so later checks see the same header either way.
async fn enforce_body_limit(
    request: Request<Body>,
    max_request_size: usize,
) -> Result<Request<Body>, (StatusCode, Json<Value>)> {
    if let Some(length) = declared_length(&request) {
        if length > max_request_size as u64 {
            return Err(too_large(
                max_request_size,
                format!("declared {} bytes", length),
            ));
        }
        return Ok(request);
    }

    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, max_request_size)
        .await
        .map_err(|err| too_large(max_request_size, format!("unsized body: {}", err)))?;

    parts.headers.remove(header::TRANSFER_ENCODING);
    parts
        .headers
        .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));

    Ok(Request::from_parts(parts, Body::from(bytes)))
}

/// CORS headers on every response; preflight requests are answered directly
pub async fn cors_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, PUT, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );

    response
}

/// Security headers middleware
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store"),
    );

    response
}
