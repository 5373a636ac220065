use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};

use super::dynamodb::{
    dynamodb_span, insert_optional_s, list_of_maps, map_dynamodb_error, optional_bool,
    optional_datetime, optional_s, query_index, record_outcome, required_datetime,
    required_parsed, required_s, scan_all, Item,
};
use crate::models::{RepositoryResult, Store, StoreService};

/// Data access for stores and their offerings
#[async_trait]
pub trait StoreRepository: Send + Sync {
    async fn find_all(&self, active_only: bool) -> RepositoryResult<Vec<Store>>;

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Store>>;

    /// Stores owned by a supplier, using the OwnerIndex GSI
    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Store>>;

    async fn create(&self, store: Store) -> RepositoryResult<Store>;

    async fn update(&self, store: Store) -> RepositoryResult<Store>;

    /// Mark the store inactive; it stays readable by id
    async fn soft_delete(&self, id: &str) -> RepositoryResult<()>;
}

/// DynamoDB implementation of the StoreRepository trait
pub struct DynamoDbStoreRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    owner_index: String,
    region: String,
}

impl DynamoDbStoreRepository {
    pub fn new(client: Arc<DynamoDbClient>, table_name: String, region: String) -> Self {
        Self {
            client,
            table_name,
            owner_index: "OwnerIndex".to_string(),
            region,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn store_to_item(&self, store: &Store) -> Item {
        let mut item = Item::new();

        item.insert("id".to_string(), AttributeValue::S(store.id.clone()));
        item.insert("name".to_string(), AttributeValue::S(store.name.clone()));
        item.insert(
            "address".to_string(),
            AttributeValue::S(store.address.clone()),
        );
        item.insert(
            "owner_id".to_string(),
            AttributeValue::S(store.owner_id.clone()),
        );
        insert_optional_s(&mut item, "description", &store.description);
        insert_optional_s(&mut item, "phone", &store.phone);

        let services: Vec<AttributeValue> = store
            .services
            .iter()
            .map(|service| {
                let mut map = Item::new();
                map.insert("id".to_string(), AttributeValue::S(service.id.clone()));
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
            "is_active".to_string(),
            AttributeValue::Bool(store.is_active),
        );
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(store.created_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(store.updated_at.to_rfc3339()),
        );

        item
    }

    pub fn item_to_store(&self, item: &Item) -> RepositoryResult<Store> {
        let services = list_of_maps(item, "services")
            .iter()
            .map(|map| {
                Ok(StoreService {
                    id: required_s(map, "id")?,
                    name: required_s(map, "name")?,
                    price: required_parsed(map, "price")?,
                    duration_minutes: required_parsed(map, "duration_minutes")?,
                })
            })
            .collect::<RepositoryResult<Vec<_>>>()?;

        let created_at = required_datetime(item, "created_at")?;

        Ok(Store {
            id: required_s(item, "id")?,
            name: required_s(item, "name")?,
            address: required_s(item, "address")?,
            owner_id: required_s(item, "owner_id")?,
            description: optional_s(item, "description"),
            phone: optional_s(item, "phone"),
            services,
            is_active: optional_bool(item, "is_active").unwrap_or(true),
            created_at,
            updated_at: optional_datetime(item, "updated_at").unwrap_or(created_at),
        })
    }

    fn parse_items(&self, items: Vec<Item>) -> Vec<Store> {
        items
            .iter()
            .filter_map(|item| match self.item_to_store(item) {
                Ok(store) => Some(store),
                Err(e) => {
                    warn!("Failed to parse store item: {}", e);
                    None
                }
            })
            .collect()
    }

    async fn put(&self, store: &Store, condition: &str) -> RepositoryResult<()> {
        let item = self.store_to_item(store);

        async {
            let result = self
                .client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(item))
                .condition_expression(condition)
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.table_name))
        }
        .instrument(dynamodb_span("PutItem", &self.table_name, &self.region))
        .await?;

        Ok(())
    }
}

#[async_trait]
impl StoreRepository for DynamoDbStoreRepository {
    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn find_all(&self, active_only: bool) -> RepositoryResult<Vec<Store>> {
        info!("Finding all stores");

        let items = scan_all(&self.client, &self.table_name, &self.region).await?;
        let stores: Vec<Store> = self
            .parse_items(items)
            .into_iter()
            .filter(|store| !active_only || store.is_active)
            .collect();

        info!("Found {} stores", stores.len());
        Ok(stores)
    }

    #[instrument(skip(self), fields(table = %self.table_name, id = %id))]
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Store>> {
        info!("Finding store by ID");

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
            .map(|item| self.item_to_store(&item))
            .transpose()
    }

    #[instrument(skip(self), fields(table = %self.table_name, owner_id = %owner_id))]
    async fn find_by_owner(&self, owner_id: &str) -> RepositoryResult<Vec<Store>> {
        info!("Finding stores by owner using GSI");

        let items = query_index(
            &self.client,
            &self.table_name,
            &self.region,
            &self.owner_index,
            "owner_id",
            owner_id,
        )
        .await?;

        Ok(self.parse_items(items))
    }

    #[instrument(skip(self, store), fields(table = %self.table_name, id = %store.id))]
    async fn create(&self, store: Store) -> RepositoryResult<Store> {
        info!("Creating new store");
        self.put(&store, "attribute_not_exists(id)").await?;
        info!("Store created successfully");
        Ok(store)
    }

    #[instrument(skip(self, store), fields(table = %self.table_name, id = %store.id))]
    async fn update(&self, store: Store) -> RepositoryResult<Store> {
        info!("Updating store");
        self.put(&store, "attribute_exists(id)").await?;
        Ok(store)
    }

    #[instrument(skip(self), fields(table = %self.table_name, id = %id))]
    async fn soft_delete(&self, id: &str) -> RepositoryResult<()> {
        info!("Soft deleting store");

        async {
            let result = self
                .client
                .update_item()
                .table_name(&self.table_name)
                .key("id", AttributeValue::S(id.to_string()))
                .update_expression("SET is_active = :inactive, updated_at = :now")
                .expression_attribute_values(":inactive", AttributeValue::Bool(false))
                .expression_attribute_values(":now", AttributeValue::S(Utc::now().to_rfc3339()))
                .condition_expression("attribute_exists(id)")
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), &self.table_name))
        }
        .instrument(dynamodb_span("UpdateItem", &self.table_name, &self.region))
        .await?;

        Ok(())
    }
}
