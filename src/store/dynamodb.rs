//! DynamoDB storage backend for task persistence.
//!
//! [`DynamoDbBackend`] implements [`TaskBackend`] on a single DynamoDB table,
//! one item per task:
//!
//! | Attribute     | Type   | Description                          |
//! |---------------|--------|--------------------------------------|
//! | `ownerId`     | String | Partition key: the caller's `sub`    |
//! | `taskId`      | String | Sort key: `UUIDv4`                   |
//! | `title`       | String |                                      |
//! | `description` | String |                                      |
//! | `status`      | String | `todo`, `in-progress` or `done`      |
//! | `createdAt`   | String | ISO 8601, immutable                  |
//! | `updatedAt`   | String | ISO 8601                             |
//!
//! The trait methods map to `PutItem`, `Query` (paginated), `UpdateItem`
//! (conditional on `attribute_exists(taskId)`, returning `ALL_NEW`) and
//! `DeleteItem`. No secondary index is needed: every read is
//! partition-scoped.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pkce_tasks::store::dynamodb::DynamoDbBackend;
//! use pkce_tasks::store::generic::GenericTaskStore;
//!
//! # async fn example() {
//! let backend = DynamoDbBackend::from_env_with_table("Tasks").await;
//! let store = GenericTaskStore::new(backend);
//! # }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;

use crate::store::backend::{StorageError, TaskBackend};
use crate::store::expression::UpdateExpression;
use crate::types::task::Task;

/// Default table name when none is configured.
pub const DEFAULT_TABLE: &str = "Tasks";

/// DynamoDB storage backend for task persistence.
#[derive(Debug, Clone)]
pub struct DynamoDbBackend {
    client: Client,
    table_name: String,
}

impl DynamoDbBackend {
    /// Creates a backend with a pre-built DynamoDB client.
    ///
    /// The table must already exist with `ownerId` (String) as partition key
    /// and `taskId` (String) as sort key.
    pub fn new(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    /// Creates a backend using the standard AWS SDK config chain and
    /// [`DEFAULT_TABLE`].
    pub async fn from_env() -> Self {
        Self::from_env_with_table(DEFAULT_TABLE).await
    }

    /// Creates a backend from the standard AWS SDK config chain with a
    /// custom table name.
    pub async fn from_env_with_table(table_name: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);
        Self::new(client, table_name)
    }

    /// Name of the backing table.
    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

// ---------------------------------------------------------------------------
// Item mapping
// ---------------------------------------------------------------------------

fn to_item(task: &Task) -> HashMap<String, AttributeValue> {
    [
        ("ownerId", task.owner_id.as_str()),
        ("taskId", task.task_id.as_str()),
        ("title", task.title.as_str()),
        ("description", task.description.as_str()),
        ("status", task.status.as_str()),
        ("createdAt", task.created_at.as_str()),
        ("updatedAt", task.updated_at.as_str()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), AttributeValue::S(v.to_string())))
    .collect()
}

fn from_item(item: &HashMap<String, AttributeValue>) -> Result<Task, StorageError> {
    let field = |name: &str| -> Result<String, StorageError> {
        item.get(name)
            .and_then(|v| v.as_s().ok())
            .cloned()
            .ok_or_else(|| StorageError::MalformedItem {
                message: format!("missing or non-string attribute {name}"),
            })
    };
    let status = field("status")?;

    Ok(Task {
        owner_id: field("ownerId")?,
        task_id: field("taskId")?,
        title: field("title")?,
        description: field("description").unwrap_or_default(),
        status: status.parse().map_err(|_| StorageError::MalformedItem {
            message: format!("unrecognized status {status:?}"),
        })?,
        created_at: field("createdAt")?,
        updated_at: field("updatedAt")?,
    })
}

/// Maps an AWS SDK error to a [`StorageError::Backend`].
fn map_sdk_error(err: impl std::error::Error + Send + Sync + 'static, key: &str) -> StorageError {
    StorageError::Backend {
        message: format!("DynamoDB error for {key}: {err}"),
        source: Some(Box::new(err)),
    }
}

// ---------------------------------------------------------------------------
// TaskBackend implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl TaskBackend for DynamoDbBackend {
    async fn put(&self, task: &Task) -> Result<(), StorageError> {
        let key = format!("{}/{}", task.owner_id, task.task_id);
        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_item(task)))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &key))?;
        Ok(())
    }

    async fn query(&self, owner_id: &str) -> Result<Vec<Task>, StorageError> {
        let mut results = Vec::new();
        let mut exclusive_start_key = None;

        loop {
            let mut query = self
                .client
                .query()
                .table_name(&self.table_name)
                .key_condition_expression("ownerId = :owner")
                .expression_attribute_values(":owner", AttributeValue::S(owner_id.to_string()));

            if let Some(start_key) = exclusive_start_key.take() {
                query = query.set_exclusive_start_key(Some(start_key));
            }

            let output = query.send().await.map_err(|e| map_sdk_error(e, owner_id))?;

            for item in output.items() {
                results.push(from_item(item)?);
            }

            match output.last_evaluated_key() {
                Some(last_key) if !last_key.is_empty() => {
                    exclusive_start_key = Some(last_key.clone());
                },
                _ => break,
            }
        }

        Ok(results)
    }

    async fn update(
        &self,
        owner_id: &str,
        task_id: &str,
        update: &UpdateExpression,
    ) -> Result<Task, StorageError> {
        let key = format!("{owner_id}/{task_id}");
        let values: HashMap<String, AttributeValue> = update
            .attribute_values()
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
            .collect();

        let mut builder = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .key("ownerId", AttributeValue::S(owner_id.to_string()))
            .key("taskId", AttributeValue::S(task_id.to_string()))
            .update_expression(update.expression())
            .condition_expression("attribute_exists(taskId)")
            .set_expression_attribute_values(Some(values))
            .return_values(ReturnValue::AllNew);

        // An empty names map is rejected by the service.
        if !update.attribute_names().is_empty() {
            let names: HashMap<String, String> = update
                .attribute_names()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            builder = builder.set_expression_attribute_names(Some(names));
        }

        match builder.send().await {
            Ok(output) => {
                let attributes = output.attributes().ok_or_else(|| StorageError::MalformedItem {
                    message: format!("update of {key} returned no attributes"),
                })?;
                from_item(attributes)
            },
            Err(sdk_err) => {
                if let Some(service_err) = sdk_err.as_service_error() {
                    if service_err.is_conditional_check_failed_exception() {
                        return Err(StorageError::NotFound {
                            owner_id: owner_id.to_string(),
                            task_id: task_id.to_string(),
                        });
                    }
                }
                Err(map_sdk_error(sdk_err, &key))
            },
        }
    }

    async fn delete(&self, owner_id: &str, task_id: &str) -> Result<(), StorageError> {
        let key = format!("{owner_id}/{task_id}");
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key("ownerId", AttributeValue::S(owner_id.to_string()))
            .key("taskId", AttributeValue::S(task_id.to_string()))
            .send()
            .await
            .map_err(|e| map_sdk_error(e, &key))?;
        Ok(())
    }
}
