use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
};
use serde_json::Value;
use tracing::{error, info, instrument};

use crate::models::{
    AuthenticatedUser, CreateOrderRequest, OrderListQuery, OrderListResponse, ServiceOrder,
    UpdateOrderStatusRequest,
};

use super::api::{service_error_to_response, ApiState};
use super::extract::{ApiJson, ApiPath, ApiQuery};

/// Book one or more services at a store
#[instrument(name = "create_order", skip(state, user, request), fields(
    user_id = %user.user_id,
    store_id = %request.store_id,
    services = request.service_ids.len(),
))]
pub async fn create_order(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ServiceOrder>), (StatusCode, Json<Value>)> {
    let result = state
        .business
        .trace_order_operation("create", state.orders.create_order(&user, request))
        .await;

    match result {
        Ok(order) => {
            crate::info_with_trace!(
                order_id = %order.id,
                total_price = %order.total_price,
                "Order created"
            );
            Ok((StatusCode::CREATED, Json(order)))
        }
        Err(err) => {
            crate::error_with_trace!("Failed to create order: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

/// Orders visible to the caller's role, optionally filtered by status
#[instrument(name = "list_orders", skip(state, user), fields(user_id = %user.user_id, status = ?query.status))]
pub async fn list_orders(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiQuery(query): ApiQuery<OrderListQuery>,
) -> Result<Json<OrderListResponse>, (StatusCode, Json<Value>)> {
    match state.orders.list_orders(&user, query.status).await {
        Ok(response) => {
            info!("Successfully listed {} orders", response.total_count);
            Ok(Json(response))
        }
        Err(err) => {
            error!("Failed to list orders: {}", err);
            Err(service_error_to_response(err))
        }
    }
}

/// Orders awaiting the caller's attention
#[instrument(name = "order_notifications", skip(state, user), fields(user_id = %user.user_id))]
pub async fn notifications(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
) -> Result<Json<OrderListResponse>, (StatusCode, Json<Value>)> {
    let orders = state
        .orders
        .notifications(&user)
        .await
        .map_err(|err| {
            error!("Failed to load notifications: {}", err);
            service_error_to_response(err)
        })?;

    Ok(Json(OrderListResponse {
        total_count: orders.len(),
        orders,
    }))
}

#[instrument(name = "get_order", skip(state, user), fields(user_id = %user.user_id, order_id = %order_id))]
pub async fn get_order(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(order_id): ApiPath<String>,
) -> Result<Json<ServiceOrder>, (StatusCode, Json<Value>)> {
    state
        .orders
        .get_order(&user, &order_id)
        .await
        .map(Json)
        .map_err(service_error_to_response)
}

/// Complete or cancel a pending order
#[instrument(name = "update_order_status", skip(state, user, request), fields(
    user_id = %user.user_id,
    order_id = %order_id,
    status = %request.status,
))]
pub async fn update_status(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    ApiPath(order_id): ApiPath<String>,
    ApiJson(request): ApiJson<UpdateOrderStatusRequest>,
) -> Result<Json<ServiceOrder>, (StatusCode, Json<Value>)> {
    let operation = request.status.to_string();
    let result = state
        .business
        .trace_order_operation(&operation, state.orders.update_status(&user, &order_id, request))
        .await;

    match result {
        Ok(order) => {
            crate::info_with_trace!(order_id = %order.id, status = %order.status, "Order status updated");
            Ok(Json(order))
        }
        Err(err) => {
            crate::warn_with_trace!("Failed to update order {}: {}", order_id, err);
            Err(service_error_to_response(err))
        }
    }
}
