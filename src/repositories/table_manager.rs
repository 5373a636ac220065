use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, GlobalSecondaryIndex, KeySchemaElement, KeyType,
    Projection, ProjectionType, ScalarAttributeType, TableStatus,
};
use aws_sdk_dynamodb::{Client as DynamoDbClient, Error as DynamoDbError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::dynamodb::map_dynamodb_error;
use crate::models::{RepositoryError, RepositoryResult};

/// Physical table names for every entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub users: String,
    pub stores: String,
    pub orders: String,
    pub quizzes: String,
    pub questions: String,
}

/// A hash-key-only table layout with string-keyed GSIs
struct TableLayout<'a> {
    name: &'a str,
    indexes: &'a [(&'a str, &'a str)],
}

/// Manages DynamoDB table creation and configuration
pub struct TableManager {
    client: Arc<DynamoDbClient>,
    poll_interval: Duration,
    max_poll_attempts: u32,
}

impl TableManager {
    pub fn new(client: Arc<DynamoDbClient>) -> Self {
        Self {
            client,
            poll_interval: Duration::from_secs(10),
            max_poll_attempts: 30,
        }
    }

    /// Create all tables with their GSIs. Existing tables are left alone.
    #[instrument(skip(self, tables))]
    pub async fn create_all_tables(&self, tables: &TableNames) -> RepositoryResult<Vec<String>> {
        info!("Creating all tables");

        let layouts = [
            TableLayout {
                name: &tables.users,
                indexes: &[("EmailIndex", "email")],
            },
            TableLayout {
                name: &tables.stores,
                indexes: &[("OwnerIndex", "owner_id")],
            },
            TableLayout {
                name: &tables.orders,
                indexes: &[
                    ("CustomerIndex", "customer_id"),
                    ("StoreOwnerIndex", "store_owner_id"),
                ],
            },
            TableLayout {
                name: &tables.quizzes,
                indexes: &[("UserIndex", "user_id")],
            },
            TableLayout {
                name: &tables.questions,
                indexes: &[("CategoryIndex", "category")],
            },
        ];

        let mut created = Vec::new();
        for layout in &layouts {
            if self.create_table(layout).await? {
                created.push(layout.name.to_string());
            }
        }

        info!("Table setup complete, {} created", created.len());
        Ok(created)
    }

    /// Returns true if a new table was created
    #[instrument(skip(self, layout), fields(table_name = %layout.name))]
    async fn create_table(&self, layout: &TableLayout<'_>) -> RepositoryResult<bool> {
        if self.table_exists(layout.name).await? {
            info!("Table {} already exists", layout.name);
            return Ok(false);
        }

        let mut attribute_definitions = vec![string_attribute("id")?];
        let mut indexes = Vec::new();
        for (index_name, attribute) in layout.indexes {
            attribute_definitions.push(string_attribute(attribute)?);
            indexes.push(
                GlobalSecondaryIndex::builder()
                    .index_name(*index_name)
                    .key_schema(hash_key(attribute)?)
                    .projection(
                        Projection::builder()
                            .projection_type(ProjectionType::All)
                            .build(),
                    )
                    .build()
                    .map_err(|e| RepositoryError::AwsSdk {
                        message: format!("Failed to build GSI: {}", e),
                    })?,
            );
        }

        self.client
            .create_table()
            .table_name(layout.name)
            .set_attribute_definitions(Some(attribute_definitions))
            .key_schema(hash_key("id")?)
            .set_global_secondary_indexes(if indexes.is_empty() {
                None
            } else {
                Some(indexes)
            })
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| self.map_error(e.into(), layout.name))?;

        info!("Table creation initiated, waiting for table to become active");
        self.wait_for_table_active(layout.name).await?;
        Ok(true)
    }

    #[instrument(skip(self), fields(table_name = %table_name))]
    pub async fn table_exists(&self, table_name: &str) -> RepositoryResult<bool> {
        match self.client.describe_table().table_name(table_name).send().await {
            Ok(_) => Ok(true),
            Err(e) => match DynamoDbError::from(e) {
                DynamoDbError::ResourceNotFoundException(_) => {
                    info!("Table {} does not exist", table_name);
                    Ok(false)
                }
                other => {
                    error!("Error checking table existence: {}", other);
                    Err(RepositoryError::ConnectionFailed)
                }
            },
        }
    }

    #[instrument(skip(self), fields(table_name = %table_name))]
    async fn wait_for_table_active(&self, table_name: &str) -> RepositoryResult<()> {
        let mut attempts = 0;

        loop {
            let response = self
                .client
                .describe_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(|e| self.map_error(e.into(), table_name))?;

            match response.table.and_then(|t| t.table_status) {
                Some(TableStatus::Active) => {
                    info!("Table {} is now active", table_name);
                    return Ok(());
                }
                Some(status) => info!("Table {} status: {:?}, waiting...", table_name, status),
                None => warn!("Table {} status unknown, waiting...", table_name),
            }

            attempts += 1;
            if attempts >= self.max_poll_attempts {
                error!("Timeout waiting for table {} to become active", table_name);
                return Err(RepositoryError::Timeout);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn map_error(&self, error: DynamoDbError, table_name: &str) -> RepositoryError {
        map_dynamodb_error(error, table_name)
    }
}

fn string_attribute(name: &str) -> RepositoryResult<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(ScalarAttributeType::S)
        .build()
        .map_err(|e| RepositoryError::AwsSdk {
            message: format!("Failed to build attribute definition: {}", e),
        })
}

fn hash_key(name: &str) -> RepositoryResult<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(KeyType::Hash)
        .build()
        .map_err(|e| RepositoryError::AwsSdk {
            message: format!("Failed to build key schema: {}", e),
        })
}
