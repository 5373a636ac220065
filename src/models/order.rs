use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{generate_id, OrderStatus, Store, StoreService};

/// A booking of one or more store offerings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceOrder {
    pub id: String,
    pub customer_id: String,
    pub store_id: String,
    pub store_owner_id: String,
    pub store_name: String,
    pub services: Vec<OrderedService>,
    pub scheduled_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub total_duration_minutes: u32,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Offering snapshot taken when the order was placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedService {
    pub service_id: String,
    pub name: String,
    pub price: Decimal,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub store_id: String,
    pub service_ids: Vec<String>,
    pub scheduled_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderListQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<ServiceOrder>,
    pub total_count: usize,
}

impl ServiceOrder {
    /// Build a pending order from store offerings. Totals are filled in here
    /// and again by `refresh_derived_fields` before every write.
    pub fn new(
        customer_id: String,
        store: &Store,
        services: Vec<OrderedService>,
        scheduled_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let mut order = Self {
            id: generate_id('O'),
            customer_id,
            store_id: store.id.clone(),
            store_owner_id: store.owner_id.clone(),
            store_name: store.name.clone(),
            services,
            scheduled_at,
            status: OrderStatus::Pending,
            total_price: Decimal::ZERO,
            total_duration_minutes: 0,
            notes: notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        };
        order.refresh_derived_fields();
        order
    }

    /// Pre-save hook: recompute the totals from the service snapshots
    pub fn refresh_derived_fields(&mut self) {
        self.total_price = self.services.iter().map(|s| s.price).sum();
        self.total_duration_minutes = self.services.iter().map(|s| s.duration_minutes).sum();
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.customer_id == user_id || self.store_owner_id == user_id
    }

    pub fn apply_status(&mut self, status: OrderStatus, reason: Option<String>) {
        self.status = status;
        if status == OrderStatus::Cancelled {
            self.cancellation_reason = reason;
        }
        self.updated_at = Utc::now();
    }
}

impl From<&StoreService> for OrderedService {
    fn from(service: &StoreService) -> Self {
        Self {
            service_id: service.id.clone(),
            name: service.name.clone(),
            price: service.price,
            duration_minutes: service.duration_minutes,
        }
    }
}
