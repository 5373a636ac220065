use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};

use super::dynamodb::{
    dynamodb_span, insert_optional_s, list_of_maps, map_dynamodb_error, optional_datetime,
    optional_s, query_index, record_outcome, required_datetime, required_parsed, required_s,
    scan_all, Item,
};
use crate::models::{
    OrderStatus, OrderedService, RepositoryError, RepositoryResult, ServiceOrder,
};

/// Data access for service orders
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order. Derived totals are recomputed before the write.
    async fn create(&self, order: ServiceOrder) -> RepositoryResult<ServiceOrder>;

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<ServiceOrder>>;

    /// Orders placed by a customer (CustomerIndex GSI)
    async fn find_by_customer(&self, customer_id: &str) -> RepositoryResult<Vec<ServiceOrder>>;

    /// Orders for any store owned by a supplier (StoreOwnerIndex GSI)
    async fn find_by_store_owner(&self, owner_id: &str) -> RepositoryResult<Vec<ServiceOrder>>;

    async fn find_all(&self) -> RepositoryResult<Vec<ServiceOrder>>;

    /// Move an order from `expected` to `new_status`. Fails with
    /// `ConditionalCheckFailed` if the stored status is no longer `expected`.
    async fn update_status(
        &self,
        id: &str,
        expected: OrderStatus,
        new_status: OrderStatus,
        reason: Option<String>,
    ) -> RepositoryResult<ServiceOrder>;
}

/// DynamoDB implementation of the OrderRepository trait
pub struct DynamoDbOrderRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    customer_index: String,
    store_owner_index: String,
    region: String,
}

impl DynamoDbOrderRepository {
    pub fn new(client: Arc<DynamoDbClient>, table_name: String, region: String) -> Self {
        Self {
            client,
            table_name,
            customer_index: "CustomerIndex".to_string(),
            store_owner_index: "StoreOwnerIndex".to_string(),
            region,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn order_to_item(&self, order: &ServiceOrder) -> Item {
        let mut item = Item::new();

        item.insert("id".to_string(), AttributeValue::S(order.id.clone()));
        item.insert(
            "customer_id".to_string(),
            AttributeValue::S(order.customer_id.clone()),
        );
        item.insert(
            "store_id".to_string(),
            AttributeValue::S(order.store_id.clone()),
        );
        item.insert(
            "store_owner_id".to_string(),
            AttributeValue::S(order.store_owner_id.clone()),
        );
        item.insert(
            "store_name".to_string(),
            AttributeValue::S(order.store_name.clone()),
        );

        let services: Vec<AttributeValue> = order
            .services
            .iter()
            .map(|service| {
                let mut map = Item::new();
                map.insert(
                    "service_id".to_string(),
                    AttributeValue::S(service.service_id.clone()),
                );
                map.insert("name".to_string(), AttributeValue::S(service.name.clone()));
                map.insert(
                    "price".to_string(),
                    AttributeValue::N(service.price.to_string()),
                );
                map.insert(
                    "duration_minutes".to_string(),
                    AttributeValue::N(service.duration_minutes.to_string()),
                );
                AttributeValue::M(map)
            })
            .collect();
        item.insert("services".to_string(), AttributeValue::L(services));

        item.insert(
            "scheduled_at".to_string(),
            AttributeValue::S(order.scheduled_at.to_rfc3339()),
        );
        item.insert(
            "status".to_string(),
            AttributeValue::S(order.status.to_string()),
        );
        item.insert(
            "total_price".to_string(),
            AttributeValue::N(order.total_price.to_string()),
        );
        item.insert(
            "total_duration_minutes".to_string(),
            AttributeValue::N(order.total_duration_minutes.to_string()),
        );
        insert_optional_s(&mut item, "notes", &order.notes);
        insert_optional_s(&mut item, "cancellation_reason", &order.cancellation_reason);
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(order.created_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(order.updated_at.to_rfc3339()),
        );

        item
    }

    pub fn item_to_order(&self, item: &Item) -> RepositoryResult<ServiceOrder> {
        let services = list_of_maps(item, "services")
            .iter()
            .map(|map| {
                Ok(OrderedService {
                    service_id: required_s(map, "service_id")?,
                    name: required_s(map, "name")?,
                    price: required_parsed(map, "price")?,
                    duration_minutes: required_parsed(map, "duration_minutes")?,
                })
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        let created_at = required_datetime(item, "created_at")?;

        Ok(ServiceOrder {
            id: required_s(item, "id")?,
            customer_id: required_s(item, "customer_id")?,
            store_id: required_s(item, "store_id")?,
            store_owner_id: required_s(item, "store_owner_id")?,
            store_name: required_s(item, "store_name")?,
            services,
            scheduled_at: required_datetime(item, "scheduled_at")?,
            status: required_parsed(item, "status")?,
            total_price: required_parsed(item, "total_price")?,
            total_duration_minutes: required_parsed(item, "total_duration_minutes")?,
            notes: optional_s(item, "notes"),
            cancellation_reason: optional_s(item, "cancellation_reason"),
            created_at,
            updated_at: optional_datetime(item, "updated_at").unwrap_or(created_at),
        })
    }

    fn parse_items(&self, items: Vec<Item>) -> Vec<ServiceOrder> {
        items
            .iter()
            .filter_map(|item| match self.item_to_order(item) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!("Failed to parse order item: {}", e);
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl OrderRepository for DynamoDbOrderRepository {
    #[instrument(skip(self, order), fields(table = %self.table_name, id = %order.id))]
    async fn create(&self, mut order: ServiceOrder) -> RepositoryResult<ServiceOrder> {
        info!("Creating new order");

        order.refresh_derived_fields();
        let item = self.order_to_item(&order);

        async {
            let result = self
                .client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression("attribute_not_exists(id)")
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.table_name))
        }
        .instrument(dynamodb_span("PutItem", &self.table_name, &self.region))
        .await?;

        info!(total_price = %order.total_price, "Order created successfully");
        Ok(order)
    }

    #[instrument(skip(self), fields(table = %self.table_name, id = %id))]
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<ServiceOrder>> {
        info!("Finding order by ID");

        let response = async {
            let result = self
                .client
                .get_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.to_string()))
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.table_name))
        }
        .instrument(dynamodb_span("GetItem", &self.table_name, &self.region))
        .await?;

        response
            .item
            .map(|item| self.item_to_order(&item))
            .transpose()
    }

    #[instrument(skip(self), fields(table = %self.table_name, customer_id = %customer_id))]
    async fn find_by_customer(&self, customer_id: &str) -> RepositoryResult<Vec<ServiceOrder>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            &self.region,
            &self.customer_index,
            "customer_id",
            customer_id,
        )
        .await?;

        let orders = self.parse_items(items);
        info!("Found {} orders for customer", orders.len());
        Ok(orders)
    }

    #[instrument(skip(self), fields(table = %self.table_name, owner_id = %owner_id))]
    async fn find_by_store_owner(&self, owner_id: &str) -> RepositoryResult<Vec<ServiceOrder>> {
        let items = query_index(
            &self.client,
            &self.table_name,
            &self.region,
            &self.store_owner_index,
            "store_owner_id",
            owner_id,
        )
        .await?;

        let orders = self.parse_items(items);
        info!("Found {} orders for store owner", orders.len());
        Ok(orders)
    }

    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn find_all(&self) -> RepositoryResult<Vec<ServiceOrder>> {
        let items = scan_all(&self.client, &self.table_name, &self.region).await?;
        let orders = self.parse_items(items);
        info!("Found {} orders", orders.len());
        Ok(orders)
    }

    #[instrument(
        skip(self, reason),
        fields(table = %self.table_name, id = %id, from = %expected, to = %new_status)
    )]
    async fn update_status(
        &self,
        id: &str,
        expected: OrderStatus,
        new_status: OrderStatus,
        reason: Option<String>,
    ) -> RepositoryResult<ServiceOrder> {
        info!("Updating order status");

        let mut update_expression = "SET #status = :new_status, updated_at = :now".to_string();
        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::S(id.to_string()))
            .condition_expression("attribute_exists(id) AND #status = :expected")
            .expression_attribute_names("#status", "status")
            .expression_attribute_values(":expected", AttributeValue::S(expected.to_string()))
            .expression_attribute_values(":new_status", AttributeValue::S(new_status.to_string()))
            .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
            .return_values(ReturnValue::AllNew);

        if new_status == OrderStatus::Cancelled {
            if let Some(reason) = reason {
                update_expression.push_str(", cancellation_reason = :reason");
                builder = builder.expression_attribute_values(":reason", AttributeValue::S(reason));
            }
        }

        let response = async {
            let result = builder.update_expression(update_expression).send().await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.table_name))
        }
        .instrument(dynamodb_span("UpdateItem", &self.table_name, &self.region))
        .await?;

        let attributes = response.attributes.ok_or_else(|| RepositoryError::AwsSdk {
            message: "UpdateItem returned no attributes".to_string(),
        })?;

        info!("Order status updated successfully");
        self.item_to_order(&attributes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateStoreRequest, Store};
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn test_repository() -> DynamoDbOrderRepository {
        let config = aws_sdk_dynamodb::Config::builder()
            .region(aws_sdk_dynamodb::config::Region::new("us-east-1"))
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .build();
        let client = Arc::new(aws_sdk_dynamodb::Client::from_conf(config));
        DynamoDbOrderRepository::new(client, "test-orders".to_string(), "us-east-1".to_string())
    }

    fn test_order() -> ServiceOrder {
        let store = Store::new(
            "Uowner001".to_string(),
            CreateStoreRequest {
                name: "Shear Joy".to_string(),
                address: "12 Market Street".to_string(),
                description: None,
                phone: None,
                services: vec![],
            },
        );
        ServiceOrder::new(
            "Ucust0001".to_string(),
            &store,
            vec![
                OrderedService {
                    service_id: "Vsvc00001".to_string(),
                    name: "Haircut".to_string(),
                    price: dec!(25.00),
                    duration_minutes: 30,
                },
                OrderedService {
                    service_id: "Vsvc00002".to_string(),
                    name: "Wash".to_string(),
                    price: dec!(7.50),
                    duration_minutes: 15,
                },
            ],
            Utc::now() + Duration::days(1),
            Some("Short fringe please".to_string()),
        )
    }

    #[test]
    fn test_order_item_conversion() {
        let repo = test_repository();
        let order = test_order();

        let item = repo.order_to_item(&order);
        assert_eq!(
            item.get("status"),
            Some(&AttributeValue::S("pending".to_string()))
        );
        assert_eq!(
            item.get("total_price"),
            Some(&AttributeValue::N("32.50".to_string()))
        );
        assert!(item.contains_key("store_owner_id"));
        assert!(!item.contains_key("cancellation_reason"));

        let converted = repo.item_to_order(&item).unwrap();
        assert_eq!(converted, order);
    }

    #[test]
    fn test_item_with_invalid_status_is_rejected() {
        let repo = test_repository();
        let mut item = repo.order_to_item(&test_order());
        item.insert("status".to_string(), AttributeValue::S("archived".to_string()));

        assert!(repo.item_to_order(&item).is_err());
    }

    #[test]
    fn test_repository_indexes() {
        let repo = test_repository();
        assert_eq!(repo.table_name(), "test-orders");
        assert_eq!(repo.customer_index, "CustomerIndex");
        assert_eq!(repo.store_owner_index, "StoreOwnerIndex");
    }
}
