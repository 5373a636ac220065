use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, State},
    http::{header, request::Parts, StatusCode},
    response::Json,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::models::{
    AuthToken, AuthenticatedUser, LoginRequest, RegisterRequest, UserResponse,
};
use crate::services::AuthService;

use super::api::{service_error_to_response, ApiState};
use super::extract::{error_response, ApiJson};

/// Resolves `Authorization: Bearer <jwt>` into the caller's identity
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "Missing or malformed Authorization header",
            )
        })?;

        let auth = Arc::<AuthService>::from_ref(state);
        auth.authenticate(token).await.map_err(|err| {
            warn!(error = %err, "Rejected access token");
            service_error_to_response(err)
        })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Create an account; new accounts are customers unless another role is requested
#[instrument(name = "register", skip(state, request), fields(email = %request.email))]
pub async fn register(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), (StatusCode, Json<Value>)> {
    match state.auth.register(request).await {
        Ok(user) => {
            info!(user_id = %user.id, role = %user.role, "User registered");
            Ok((StatusCode::CREATED, Json(user.into())))
        }
        Err(err) => {
            warn!("Registration failed: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

#[instrument(name = "login", skip(state, request), fields(email = %request.email))]
pub async fn login(
    State(state): State<ApiState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthToken>, (StatusCode, Json<Value>)> {
    state
        .auth
        .login(request)
        .await
        .map(Json)
        .map_err(|err| {
            warn!("Login failed: {}", err);
            service_error_to_response(err)
        })
}

/// Profile of the token holder
#[instrument(name = "current_user", skip(state, user), fields(user_id = %user.user_id))]
pub async fn current_user(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, (StatusCode, Json<Value>)> {
    state
        .auth
        .get_user(&user.user_id)
        .await
        .map(|user| Json(user.into()))
        .map_err(service_error_to_response)
}
