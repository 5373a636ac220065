use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post, put},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::models::{
    AuthenticatedUser, CreateStoreRequest, CreateStoreServiceRequest, RepositoryError, Role,
    ServiceError, Store, StoreListQuery, StoreListResponse, StoreService, UpdateStoreRequest,
};
use crate::observability::BusinessTracingMiddleware;
use crate::services::{AuthService, OrderService, QuizService, StoreDirectory};

use super::extract::{error_response, ApiJson, ApiPath, ApiQuery};
use super::{auth, orders, quizzes};

/// Shared application state containing all services
#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub stores: Arc<StoreDirectory>,
    pub orders: Arc<OrderService>,
    pub quizzes: Arc<QuizService>,
    pub business: Arc<BusinessTracingMiddleware>,
}

impl FromRef<ApiState> for Arc<AuthService> {
    fn from_ref(state: &ApiState) -> Self {
        state.auth.clone()
    }
}

/// Create API router with all public and authenticated endpoints
pub fn create_api_router(state: ApiState) -> Router {
    Router::new()
        // Accounts
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/me", get(auth::current_user))
        // Store directory
        .route("/api/stores", get(list_stores).post(create_store))
        .route("/api/stores/mine", get(my_stores))
        .route(
            "/api/stores/:store_id",
            get(get_store).put(update_store).delete(delete_store),
        )
        .route("/api/stores/:store_id/services", post(add_store_service))
        .route(
            "/api/stores/:store_id/services/:service_id",
            delete(remove_store_service),
        )
        // Bookings
        .route(
            "/api/orders",
            get(orders::list_orders).post(orders::create_order),
        )
        .route("/api/orders/notifications", get(orders::notifications))
        .route("/api/orders/:order_id", get(orders::get_order))
        .route("/api/orders/:order_id/status", put(orders::update_status))
        // Quizzes
        .route("/api/quiz/questions", get(quizzes::sample_questions))
        .route(
            "/api/quizzes",
            get(quizzes::list_quizzes).post(quizzes::submit_quiz),
        )
        .route("/api/quizzes/:quiz_id", get(quizzes::get_quiz))
        .route(
            "/api/quizzes/:quiz_id/feedback",
            post(quizzes::generate_feedback),
        )
        .with_state(state)
}

// =============================================================================
// STORE ENDPOINTS
// =============================================================================

/// Active stores, optionally filtered by a search term
#[instrument(name = "list_stores", skip(state), fields(search = query.search.as_deref()))]
pub async fn list_stores(
    State(state): State<ApiState>,
    ApiQuery(query): ApiQuery<StoreListQuery>,
) -> Result<Json<StoreListResponse>, (StatusCode, Json<Value>)> {
    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty());

    match state.stores.list_stores(search).await {
        Ok(response) => {
            info!("Successfully listed {} stores", response.total_count);
            Ok(Json(response))
        }
        Err(err) => {
            error!("Failed to list stores: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

/// Public store page; a deactivated store is shown only to its owner or an admin
#[instrument(name = "get_store", skip(state, viewer), fields(store_id = %store_id))]
pub async fn get_store(
    State(state): State<ApiState>,
    viewer: Option<AuthenticatedUser>,
    ApiPath(store_id): ApiPath<String>,
) -> Result<Json<Store>, (StatusCode, Json<Value>)> {
    state
        .stores
        .get_store(&store_id, viewer.as_ref())
        .await
        .map(Json)
        .map_err(|err| {
            warn!("Failed to get store {}: {}", store_id, err);
            service_error_to_response(err)
        })
}

/// Stores owned by the caller, including deactivated ones
#[instrument(name = "my_stores", skip(state, user), fields(user_id = %user.user_id))]
pub async fn my_stores(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
) -> Result<Json<StoreListResponse>, (StatusCode, Json<Value>)> {
    if !matches!(user.role, Role::Supplier | Role::Admin) {
        return Err(service_error_to_response(ServiceError::forbidden(
            "Only suppliers own stores",
        )));
    }

    let stores = state
        .stores
        .stores_for_owner(&user.user_id)
        .await
        .map_err(service_error_to_response)?;

    Ok(Json(StoreListResponse {
        total_count: stores.len(),
        stores,
    }))
}

#[instrument(name = "create_store", skip(state, user, request), fields(
    user_id = %user.user_id,
    name = %request.name,
))]
pub async fn create_store(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<CreateStoreRequest>,
) -> Result<(StatusCode, Json<Store>), (StatusCode, Json<Value>)> {
    match state.stores.create_store(&user, request).await {
        Ok(store) => {
            crate::info_with_trace!(store_id = %store.id, "Store created");
            Ok((StatusCode::CREATED, Json(store)))
        }
        Err(err) => {
            error!("Failed to create store: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

#[instrument(name = "update_store", skip(state, user, request), fields(
    user_id = %user.user_id,
    store_id = %store_id,
))]
pub async fn update_store(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(store_id): ApiPath<String>,
    ApiJson(request): ApiJson<UpdateStoreRequest>,
) -> Result<Json<Store>, (StatusCode, Json<Value>)> {
    state
        .stores
        .update_store(&user, &store_id, request)
        .await
        .map(Json)
        .map_err(|err| {
            error!("Failed to update store {}: {}", store_id, err);
            service_error_to_response(err)
        })
}

/// Deactivate a store; existing orders keep referring to it
#[instrument(name = "delete_store", skip(state, user), fields(
    user_id = %user.user_id,
    store_id = %store_id,
))]
pub async fn delete_store(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(store_id): ApiPath<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state
        .stores
        .delete_store(&user, &store_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|err| {
            error!("Failed to delete store {}: {}", store_id, err);
            service_error_to_response(err)
        })
}

#[instrument(name = "add_store_service", skip(state, user, request), fields(
    user_id = %user.user_id,
    store_id = %store_id,
))]
pub async fn add_store_service(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(store_id): ApiPath<String>,
    ApiJson(request): ApiJson<CreateStoreServiceRequest>,
) -> Result<(StatusCode, Json<StoreService>), (StatusCode, Json<Value>)> {
    state
        .stores
        .add_service(&user, &store_id, request)
        .await
        .map(|service| (StatusCode::CREATED, Json(service)))
        .map_err(|err| {
            error!("Failed to add service to store {}: {}", store_id, err);
            service_error_to_response(err)
        })
}

#[instrument(name = "remove_store_service", skip(state, user), fields(
    user_id = %user.user_id,
    store_id = %store_id,
    service_id = %service_id,
))]
pub async fn remove_store_service(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath((store_id, service_id)): ApiPath<(String, String)>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    state
        .stores
        .remove_service(&user, &store_id, &service_id)
        .await
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|err| {
            error!("Failed to remove service {}: {}", service_id, err);
            service_error_to_response(err)
        })
}

/// Convert ServiceError to HTTP response
pub(crate) fn service_error_to_response(err: ServiceError) -> (StatusCode, Json<Value>) {
    let (status, message) = match &err {
        ServiceError::UserNotFound { .. }
        | ServiceError::StoreNotFound { .. }
        | ServiceError::OrderNotFound { .. }
        | ServiceError::QuizNotFound { .. }
        | ServiceError::ServiceOfferingNotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        ServiceError::ValidationError { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        ServiceError::InvalidCredentials | ServiceError::Unauthorized { .. } => {
            (StatusCode::UNAUTHORIZED, err.to_string())
        }
        ServiceError::Forbidden { .. } => (StatusCode::FORBIDDEN, err.to_string()),
        ServiceError::EmailAlreadyRegistered { .. }
        | ServiceError::InvalidStatusTransition { .. }
        | ServiceError::StoreInactive { .. } => (StatusCode::CONFLICT, err.to_string()),
        ServiceError::Repository { source } => match source {
            RepositoryError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            RepositoryError::ConditionalCheckFailed { .. } => (
                StatusCode::CONFLICT,
                "Resource was modified concurrently".to_string(),
            ),
            RepositoryError::ConnectionFailed => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Database connection failed".to_string(),
            ),
            RepositoryError::Timeout => {
                (StatusCode::REQUEST_TIMEOUT, "Request timeout".to_string())
            }
            RepositoryError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        },
        ServiceError::Configuration { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Configuration error".to_string(),
        ),
        ServiceError::ExternalService { .. } => (StatusCode::BAD_GATEWAY, err.to_string()),
    };

    error_response(status, message)
}
