use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::models::{AuthenticatedUser, ServiceError, UpdateRoleRequest, UserResponse};
use crate::observability::DatabaseTracingMiddleware;
use crate::repositories::{TableManager, TableNames};
use crate::services::auth_service::require_admin;
use crate::services::{AuthService, QuizService};

use super::api::service_error_to_response;
use super::extract::{ApiJson, ApiPath};

/// Admin state containing services
#[derive(Clone)]
pub struct AdminState {
    pub auth: Arc<AuthService>,
    pub quizzes: Arc<QuizService>,
    pub table_manager: Arc<TableManager>,
    pub tables: TableNames,
    pub database: Arc<DatabaseTracingMiddleware>,
}

impl FromRef<AdminState> for Arc<AuthService> {
    fn from_ref(state: &AdminState) -> Self {
        state.auth.clone()
    }
}

/// Response for seeding operations
#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub message: String,
    pub questions_created: usize,
    pub timestamp: String,
}

/// Response for table setup operations
#[derive(Debug, Serialize)]
pub struct SetupTablesResponse {
    pub message: String,
    pub tables_created: Vec<String>,
    pub timestamp: String,
}

/// Create admin router with database and account management endpoints
pub fn create_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/admin/setup-tables", post(setup_tables))
        .route("/api/admin/seed", post(seed_database))
        .route("/api/admin/users", get(list_users))
        .route("/api/admin/users/:user_id/role", put(update_user_role))
        .with_state(state)
}

// =============================================================================
// DATABASE SETUP AND SEEDING ENDPOINTS
// =============================================================================

/// Create any missing DynamoDB tables
#[instrument(name = "setup_tables", skip(state, user), fields(user_id = %user.user_id))]
pub async fn setup_tables(
    State(state): State<AdminState>,
    user: AuthenticatedUser,
) -> Result<Json<SetupTablesResponse>, (StatusCode, Json<Value>)> {
    require_admin(&user).map_err(service_error_to_response)?;

    info!("Setting up DynamoDB tables");

    let result = state
        .database
        .trace_operation(
            "create_tables",
            "all",
            state.table_manager.create_all_tables(&state.tables),
        )
        .await;

    match result {
        Ok(tables_created) => {
            info!("Created tables: {:?}", tables_created);
            Ok(Json(SetupTablesResponse {
                message: format!("Successfully created {} tables", tables_created.len()),
                tables_created,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }))
        }
        Err(err) => {
            error!("Failed to create tables: {}", err);
            Err(service_error_to_response(ServiceError::from(err)))
        }
    }
}

/// Load the built-in skin and hair question bank
#[instrument(name = "seed_database", skip(state, user), fields(user_id = %user.user_id))]
pub async fn seed_database(
    State(state): State<AdminState>,
    user: AuthenticatedUser,
) -> Result<Json<SeedResponse>, (StatusCode, Json<Value>)> {
    require_admin(&user).map_err(service_error_to_response)?;

    match state.quizzes.seed_default_questions().await {
        Ok(questions_created) => {
            info!("Seeded {} quiz questions", questions_created);
            Ok(Json(SeedResponse {
                message: "Question bank seeded successfully".to_string(),
                questions_created,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }))
        }
        Err(err) => {
            error!("Failed to seed question bank: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

// =============================================================================
// ACCOUNT MANAGEMENT ENDPOINTS
// =============================================================================

#[instrument(name = "list_users", skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_users(
    State(state): State<AdminState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<UserResponse>>, (StatusCode, Json<Value>)> {
    state
        .auth
        .list_users(&user)
        .await
        .map(|users| Json(users.into_iter().map(UserResponse::from).collect()))
        .map_err(service_error_to_response)
}

#[instrument(name = "update_user_role", skip(state, user, request), fields(
    user_id = %user.user_id,
    target = %target_id,
    role = %request.role,
))]
pub async fn update_user_role(
    State(state): State<AdminState>,
    user: AuthenticatedUser,
    ApiPath(target_id): ApiPath<String>,
    ApiJson(request): ApiJson<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, (StatusCode, Json<Value>)> {
    match state.auth.update_role(&user, &target_id, request.role).await {
        Ok(updated) => Ok(Json(updated.into())),
        Err(err) => {
            error!("Failed to update role for {}: {}", target_id, err);
            Err(service_error_to_response(err))
        }
    }
}
