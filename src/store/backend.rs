//! Storage backend trait and supporting types.
//!
//! The [`TaskBackend`] trait is the contract every storage engine implements.
//! It exposes 4 operations that map one-to-one onto single-item or
//! single-partition calls of a managed key-value store:
//! [`put`](TaskBackend::put), [`query`](TaskBackend::query),
//! [`update`](TaskBackend::update) and [`delete`](TaskBackend::delete).
//!
//! Domain logic (field defaults, status validation, the empty-update rule,
//! timestamps) does **not** belong here. Backends store what they are given;
//! domain logic lives in [`GenericTaskStore`](crate::store::generic::GenericTaskStore).
//!
//! # Key Structure
//!
//! Every item is addressed by the pair (`owner_id` partition, `task_id`
//! sort). Owner isolation is structural: `query` reads one partition, and
//! `update`/`delete` take both halves of the key, so no call can reach an item
//! in another owner's partition.
//!
//! # Atomicity
//!
//! `put`, `update` and `delete` are each a single atomic item write. There
//! is no cross-item transaction and no optimistic locking: two concurrent
//! updates to one item race with last-write-wins on overlapping attributes.

use async_trait::async_trait;

use crate::store::expression::UpdateExpression;
use crate::types::task::Task;

/// Errors that can occur during raw storage operations.
///
/// These are low-level errors from the storage backend.
/// [`TaskError`](crate::error::TaskError) maps `NotFound` to a 404 and every
/// other variant to a 500.
///
/// # Examples
///
/// ```
/// use pkce_tasks::StorageError;
///
/// let err = StorageError::NotFound {
///     owner_id: "u1".to_string(),
///     task_id: "t1".to_string(),
/// };
/// assert_eq!(err.to_string(), "item not found: u1/t1");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A conditional update addressed a key with no item.
    #[error("item not found: {owner_id}/{task_id}")]
    NotFound {
        /// Partition key of the missing item.
        owner_id: String,
        /// Sort key of the missing item.
        task_id: String,
    },

    /// A stored item could not be read back as a [`Task`].
    #[error("malformed item: {message}")]
    MalformedItem {
        /// What was wrong with the item.
        message: String,
    },

    /// An I/O or backend-specific error occurred (network failure, throttling,
    /// missing table).
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Key-value storage backend for task persistence.
///
/// Implementations must be `Send + Sync` so one backend can serve concurrent
/// requests. Backends never interpret task fields beyond what the update
/// expression tells them to set.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    /// Stores an item unconditionally (create or overwrite).
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn put(&self, task: &Task) -> Result<(), StorageError>;

    /// Returns every item in the `owner_id` partition, in no particular order.
    ///
    /// # Errors
    ///
    /// - [`StorageError::MalformedItem`] if a stored item cannot be decoded.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn query(&self, owner_id: &str) -> Result<Vec<Task>, StorageError>;

    /// Applies `update` to an existing item in one atomic write and returns
    /// the item as it is after the write.
    ///
    /// The write is conditional on the item existing; backends must not
    /// create a partial item for an unknown key.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no item exists for the key.
    /// - [`StorageError::MalformedItem`] if the result cannot be decoded.
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn update(
        &self,
        owner_id: &str,
        task_id: &str,
        update: &UpdateExpression,
    ) -> Result<Task, StorageError>;

    /// Deletes an item. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Backend`] on I/O or backend-specific failures.
    async fn delete(&self, owner_id: &str, task_id: &str) -> Result<(), StorageError>;
}
