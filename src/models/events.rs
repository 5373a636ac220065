use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderStatus, ServiceOrder};

/// Event types emitted by the booking service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BookingEventType {
    OrderCreated,
    OrderStatusChanged,
}

impl std::fmt::Display for BookingEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingEventType::OrderCreated => write!(f, "OrderCreated"),
            BookingEventType::OrderStatusChanged => write!(f, "OrderStatusChanged"),
        }
    }
}

/// OpenTelemetry span context data for distributed tracing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanContextData {
    pub trace_id: String,
    pub span_id: String,
    pub trace_flags: String,
}

impl Default for SpanContextData {
    fn default() -> Self {
        Self {
            trace_id: "00000000000000000000000000000000".to_string(),
            span_id: "0000000000000000".to_string(),
            trace_flags: "00".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingEvent {
    pub event_type: BookingEventType,
    pub order_id: String,
    pub customer_id: String,
    pub store_id: String,
    pub store_owner_id: String,
    pub status: OrderStatus,
    pub previous_status: Option<OrderStatus>,
    pub total_price: Decimal,
    pub scheduled_at: DateTime<Utc>,
    pub span_context: SpanContextData,
    pub timestamp: DateTime<Utc>,
}

impl BookingEvent {
    pub fn order_created(order: &ServiceOrder, span_context: SpanContextData) -> Self {
        Self::from_order(BookingEventType::OrderCreated, order, None, span_context)
    }

    pub fn order_status_changed(
        order: &ServiceOrder,
        previous_status: OrderStatus,
        span_context: SpanContextData,
    ) -> Self {
        Self::from_order(
            BookingEventType::OrderStatusChanged,
            order,
            Some(previous_status),
            span_context,
        )
    }

    fn from_order(
        event_type: BookingEventType,
        order: &ServiceOrder,
        previous_status: Option<OrderStatus>,
        span_context: SpanContextData,
    ) -> Self {
        Self {
            event_type,
            order_id: order.id.clone(),
            customer_id: order.customer_id.clone(),
            store_id: order.store_id.clone(),
            store_owner_id: order.store_owner_id.clone(),
            status: order.status,
            previous_status,
            total_price: order.total_price,
            scheduled_at: order.scheduled_at,
            span_context,
            timestamp: Utc::now(),
        }
    }
}

/// EventBridge event payload structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub source: String,
    #[serde(rename = "detail-type")]
    pub detail_type: String,
    pub detail: EventDetail,
    pub resources: Vec<String>,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDetail {
    pub event_type: String,
    pub order_id: String,
    pub customer_id: String,
    pub store_id: String,
    pub store_owner_id: String,
    pub status: OrderStatus,
    pub previous_status: Option<OrderStatus>,
    pub total_price: Decimal,
    pub scheduled_at: DateTime<Utc>,
    pub span_context: SpanContextData,
}

impl EventPayload {
    pub fn from_event(event: BookingEvent, source: &str) -> Self {
        let detail_type = event.event_type.to_string();
        let resources = vec![format!("order/{}", event.order_id)];
        let time = event.timestamp;
        let detail = EventDetail {
            event_type: detail_type.clone(),
            order_id: event.order_id,
            customer_id: event.customer_id,
            store_id: event.store_id,
            store_owner_id: event.store_owner_id,
            status: event.status,
            previous_status: event.previous_status,
            total_price: event.total_price,
            scheduled_at: event.scheduled_at,
            span_context: event.span_context,
        };

        Self {
            source: source.to_string(),
            detail_type,
            detail,
            resources,
            time,
        }
    }
}

/// Configuration for EventBridge settings
#[derive(Debug, Clone)]
pub struct EventConfig {
    pub event_bus_name: String,
    pub source_name: String,
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
    pub enabled: bool,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            event_bus_name: "default".to_string(),
            source_name: "cutmate.bookings".to_string(),
            retry_attempts: 3,
            timeout_seconds: 30,
            enabled: true,
        }
    }
}
