use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, Put, TransactWriteItem};
use aws_sdk_dynamodb::{Client as DynamoDbClient, Error as DynamoDbError};
use std::sync::Arc;
use tracing::{info, instrument, warn, Instrument};

use super::dynamodb::{
    dynamodb_span, insert_optional_s, map_dynamodb_error, optional_datetime, optional_s,
    query_index, record_outcome, required_datetime, required_parsed, required_s, scan_all, Item,
};
use crate::models::{RepositoryError, RepositoryResult, Role, User};

/// Key prefix of the items that reserve an email address in the users table
const EMAIL_CLAIM_PREFIX: &str = "EMAIL#";

/// Positions of the two puts in the registration transaction
const USER_ITEM: usize = 0;
const EMAIL_CLAIM_ITEM: usize = 1;

/// Data access for registered accounts
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<User>>;

    /// Look up by normalized email using the EmailIndex GSI
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>>;

    /// Insert a new user. The email is claimed in the same write:
    /// `ConstraintViolation` if it is already registered,
    /// `ConditionalCheckFailed` if the id is taken.
    async fn create(&self, user: User) -> RepositoryResult<User>;

    async fn update(&self, user: User) -> RepositoryResult<User>;

    async fn find_all(&self) -> RepositoryResult<Vec<User>>;
}

/// DynamoDB implementation of the UserRepository trait
pub struct DynamoDbUserRepository {
    client: Arc<DynamoDbClient>,
    table_name: String,
    email_index: String,
    region: String,
}

impl DynamoDbUserRepository {
    pub fn new(client: Arc<DynamoDbClient>, table_name: String, region: String) -> Self {
        Self {
            client,
            table_name,
            email_index: "EmailIndex".to_string(),
            region,
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn user_to_item(&self, user: &User) -> Item {
        let mut item = Item::new();

        item.insert("id".to_string(), AttributeValue::S(user.id.clone()));
        item.insert("name".to_string(), AttributeValue::S(user.name.clone()));
        item.insert("email".to_string(), AttributeValue::S(user.email.clone()));
        item.insert(
            "password_hash".to_string(),
            AttributeValue::S(user.password_hash.clone()),
        );
        item.insert(
            "role".to_string(),
            AttributeValue::N(user.role.as_tag().to_string()),
        );
        insert_optional_s(&mut item, "phone", &user.phone);
        item.insert(
            "created_at".to_string(),
            AttributeValue::S(user.created_at.to_rfc3339()),
        );
        item.insert(
            "updated_at".to_string(),
            AttributeValue::S(user.updated_at.to_rfc3339()),
        );

        item
    }

    pub fn item_to_user(&self, item: &Item) -> RepositoryResult<User> {
        let role_tag: u8 = required_parsed(item, "role")?;
        let role = Role::try_from(role_tag).map_err(|message| {
            crate::models::RepositoryError::InvalidQuery { message }
        })?;
        let created_at = required_datetime(item, "created_at")?;

        Ok(User {
            id: required_s(item, "id")?,
            name: required_s(item, "name")?,
            email: required_s(item, "email")?,
            password_hash: required_s(item, "password_hash")?,
            role,
            phone: optional_s(item, "phone"),
            created_at,
            updated_at: optional_datetime(item, "updated_at").unwrap_or(created_at),
        })
    }

    /// The item reserving `user.email`; it carries no `email` attribute so
    /// it stays out of the EmailIndex.
    pub fn email_claim_item(&self, user: &User) -> Item {
        let mut item = Item::new();
        item.insert(
            "id".to_string(),
            AttributeValue::S(format!("{}{}", EMAIL_CLAIM_PREFIX, user.email)),
        );
        item.insert("user_id".to_string(), AttributeValue::S(user.id.clone()));
        item
    }

    fn conditional_put(&self, item: Item) -> RepositoryResult<TransactWriteItem> {
        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(id)")
            .build()
            .map_err(|e| RepositoryError::AwsSdk {
                message: format!("Failed to build put request: {}", e),
            })?;
        Ok(TransactWriteItem::builder().put(put).build())
    }

    fn parse_items(&self, items: Vec<Item>) -> Vec<User> {
        items
            .iter()
            .filter(|item| !is_email_claim(item))
            .filter_map(|item| match self.item_to_user(item) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Failed to parse user item: {}", e);
                    None
                }
            })
            .collect()
    }

    async fn put(&self, user: &User, condition: &str) -> RepositoryResult<()> {
        let item = self.user_to_item(user);

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
impl UserRepository for DynamoDbUserRepository {
    #[instrument(skip(self), fields(table = %self.table_name, id = %id))]
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<User>> {
        info!("Finding user by ID");

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
            .map(|item| self.item_to_user(&item))
            .transpose()
    }

    #[instrument(skip(self, email), fields(table = %self.table_name))]
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<User>> {
        info!("Finding user by email using GSI");

        let items = query_index(
            &self.client,
            &self.table_name,
            &self.region,
            &self.email_index,
            "email",
            email,
        )
        .await?;

        Ok(self.parse_items(items).into_iter().next())
    }

    #[instrument(skip(self, user), fields(table = %self.table_name, id = %user.id))]
    async fn create(&self, user: User) -> RepositoryResult<User> {
        info!("Creating new user");

        let user_put = self.conditional_put(self.user_to_item(&user))?;
        let claim_put = self.conditional_put(self.email_claim_item(&user))?;

        async {
            let result = self
                .client
                .transact_write_items()
                .transact_items(user_put)
                .transact_items(claim_put)
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| match DynamoDbError::from(e) {
                DynamoDbError::TransactionCanceledException(cancelled) => {
                    let codes: Vec<Option<&str>> = cancelled
                        .cancellation_reasons()
                        .iter()
                        .map(|reason| reason.code())
                        .collect();
                    registration_cancelled(&codes, &user.email)
                }
                other => map_dynamodb_error(other, &self.table_name),
            })
        }
        .instrument(dynamodb_span(
            "TransactWriteItems",
            &self.table_name,
            &self.region,
        ))
        .await?;

        info!("User created successfully");
        Ok(user)
    }

    #[instrument(skip(self, user), fields(table = %self.table_name, id = %user.id))]
    async fn update(&self, user: User) -> RepositoryResult<User> {
        info!("Updating user");
        self.put(&user, "attribute_exists(id)").await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(table = %self.table_name))]
    async fn find_all(&self) -> RepositoryResult<Vec<User>> {
        let items = scan_all(&self.client, &self.table_name, &self.region).await?;
        let users = self.parse_items(items);
        info!("Found {} users", users.len());
        Ok(users)
    }
}

fn is_email_claim(item: &Item) -> bool {
    item.get("id")
        .and_then(|v| v.as_s().ok())
        .is_some_and(|id| id.starts_with(EMAIL_CLAIM_PREFIX))
}

/// Map the per-item cancellation codes of the registration transaction
fn registration_cancelled(codes: &[Option<&str>], email: &str) -> RepositoryError {
    let failed = |index: usize| codes.get(index).copied().flatten() == Some("ConditionalCheckFailed");

    if failed(EMAIL_CLAIM_ITEM) {
        RepositoryError::ConstraintViolation {
            message: format!("email {} is already registered", email),
        }
    } else if failed(USER_ITEM) {
        RepositoryError::ConditionalCheckFailed {
            message: "user id already exists".to_string(),
        }
    } else {
        RepositoryError::AwsSdk {
            message: format!("Registration transaction cancelled: {:?}", codes),
        }
    }
}
