use aws_sdk_dynamodb::operation::RequestId;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::{Client as DynamoDbClient, Error as DynamoDbError};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{error, Instrument};

use crate::models::{RepositoryError, RepositoryResult};

pub(crate) type Item = HashMap<String, AttributeValue>;

/// Create a DynamoDB subsegment span with X-Ray attributes
pub(crate) fn dynamodb_span(operation: &str, table_name: &str, region: &str) -> tracing::Span {
    tracing::info_span!(
        "DynamoDB",
        // AWS X-Ray specific attributes
        "aws.service" = "DynamoDB",
        "aws.operation" = operation,
        "aws.region" = %region,
        "aws.dynamodb.table_name" = %table_name,
        "aws.request_id" = tracing::field::Empty,
        "aws.agent" = "rust-aws-sdk",

        // Resource identification for X-Ray
        "aws.remote.service" = "AWS::DynamoDB",
        "aws.remote.operation" = operation,
        "aws.remote.resource.type" = "AWS::DynamoDB::Table",
        "aws.remote.resource.identifier" = %table_name,

        // OpenTelemetry semantic conventions
        "otel.kind" = "client",
        "otel.name" = format!("DynamoDB.{}", operation),

        "rpc.system" = "aws-api",
        "rpc.service" = "AmazonDynamoDBv2",
        "rpc.method" = operation,

        "http.method" = "POST",
        "http.url" = format!("https://dynamodb.{}.amazonaws.com", region),
        "http.status_code" = tracing::field::Empty,

        "db.system" = "dynamodb",
        "db.name" = %table_name,
        "db.operation" = operation,

        "component" = "aws-sdk-dynamodb",
    )
}

/// Record the outcome of an SDK call on the current DynamoDB span
pub(crate) fn record_outcome<T: RequestId, E: std::fmt::Display>(result: &Result<T, E>) {
    match result {
        Ok(output) => {
            tracing::Span::current().record("http.status_code", 200);
            if let Some(request_id) = output.request_id() {
                tracing::Span::current().record("aws.request_id", request_id);
            }
        }
        Err(e) => {
            tracing::Span::current().record("http.status_code", 400);
            error!("DynamoDB request failed: {}", e);
        }
    }
}

/// Convert DynamoDB error to RepositoryError
pub(crate) fn map_dynamodb_error(error: DynamoDbError, table_name: &str) -> RepositoryError {
    match error {
        DynamoDbError::ResourceNotFoundException(_) => RepositoryError::TableNotFound {
            table_name: table_name.to_string(),
        },
        DynamoDbError::ConditionalCheckFailedException(e) => {
            RepositoryError::ConditionalCheckFailed {
                message: e.to_string(),
            }
        }
        DynamoDbError::ProvisionedThroughputExceededException(_)
        | DynamoDbError::RequestLimitExceeded(_) => RepositoryError::RateLimitExceeded,
        other => {
            error!("DynamoDB error: {:?}", other);
            RepositoryError::AwsSdk {
                message: other.to_string(),
            }
        }
    }
}

/// Scan a whole table, following pagination
pub(crate) async fn scan_all(
    client: &DynamoDbClient,
    table_name: &str,
    region: &str,
) -> RepositoryResult<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let response = async {
            let result = client
                .scan()
                .table_name(table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), table_name))
        }
        .instrument(dynamodb_span("Scan", table_name, region))
        .await?;

        items.extend(response.items.unwrap_or_default());

        match response.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(items)
}

/// Query a GSI by its string hash key, following pagination
pub(crate) async fn query_index(
    client: &DynamoDbClient,
    table_name: &str,
    region: &str,
    index_name: &str,
    key_attribute: &str,
    key_value: &str,
) -> RepositoryResult<Vec<Item>> {
    let mut items = Vec::new();
    let mut start_key: Option<Item> = None;

    loop {
        let response = async {
            let result = client
                .query()
                .table_name(table_name)
                .index_name(index_name)
                .key_condition_expression("#k = :v")
                .expression_attribute_names("#k", key_attribute)
                .expression_attribute_values(":v", AttributeValue::S(key_value.to_string()))
                .set_exclusive_start_key(start_key.take())
                .send()
                .await;
            record_outcome(&result);
            result.map_err(|e| map_dynamodb_error(e.into(), table_name))
        }
        .instrument(dynamodb_span("Query", table_name, region))
        .await?;

        items.extend(response.items.unwrap_or_default());

        match response.last_evaluated_key {
            Some(key) if !key.is_empty() => start_key = Some(key),
            _ => break,
        }
    }

    Ok(items)
}

pub(crate) fn required_s(item: &Item, key: &str) -> RepositoryResult<String> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| RepositoryError::InvalidQuery {
            message: format!("Missing {}", key),
        })
}

pub(crate) fn optional_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

pub(crate) fn required_parsed<T: FromStr>(item: &Item, key: &str) -> RepositoryResult<T> {
    item.get(key)
        .and_then(|v| v.as_n().ok().or_else(|| v.as_s().ok()))
        .and_then(|s| s.parse::<T>().ok())
        .ok_or_else(|| RepositoryError::InvalidQuery {
            message: format!("Invalid {}", key),
        })
}

pub(crate) fn required_datetime(item: &Item, key: &str) -> RepositoryResult<DateTime<Utc>> {
    optional_datetime(item, key).ok_or_else(|| RepositoryError::InvalidQuery {
        message: format!("Invalid {}", key),
    })
}

pub(crate) fn optional_datetime(item: &Item, key: &str) -> Option<DateTime<Utc>> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn optional_bool(item: &Item, key: &str) -> Option<bool> {
    item.get(key).and_then(|v| v.as_bool().ok()).copied()
}

pub(crate) fn list_of_maps(item: &Item, key: &str) -> Vec<Item> {
    item.get(key)
        .and_then(|v| v.as_l().ok())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_m().ok().cloned())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn insert_optional_s(item: &mut Item, key: &str, value: &Option<String>) {
    if let Some(value) = value {
        item.insert(key.to_string(), AttributeValue::S(value.clone()));
    }
}
