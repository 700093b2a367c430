//! Task record storage.
//!
//! Storage is split in two layers, the same way for every engine:
//!
//! - [`backend::TaskBackend`]: a dumb partition/sort-key store
//!   ([`memory::InMemoryBackend`], and `dynamodb::DynamoDbBackend` behind
//!   the `dynamodb` feature).
//! - [`generic::GenericTaskStore`]: the record operations (defaults,
//!   validation, timestamps) over any backend.
//!
//! [`TaskStore`] is the object-safe face of the second layer, so the HTTP
//! router can hold an `Arc<dyn TaskStore>` without knowing the backend.

pub mod backend;
#[cfg(feature = "dynamodb")]
pub mod dynamodb;
pub mod expression;
pub mod generic;
pub mod memory;

use async_trait::async_trait;

use crate::error::TaskError;
use crate::types::task::{NewTask, Task, TaskPatch};

pub use backend::{StorageError, TaskBackend};
pub use expression::{UpdateExpression, UpdateExpressionBuilder};
pub use generic::GenericTaskStore;
pub use memory::{InMemoryBackend, InMemoryTaskStore};

/// Owner-scoped task record operations.
///
/// Every method takes the owner id established by authentication. No
/// method can read or write outside that owner's partition.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Creates a task, applying field defaults.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    async fn create(&self, owner_id: &str, input: NewTask) -> Result<Task, TaskError>;

    /// Lists every task owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    async fn list(&self, owner_id: &str) -> Result<Vec<Task>, TaskError>;

    /// Applies a sparse patch to one task.
    ///
    /// # Errors
    ///
    /// - [`TaskError::InvalidStatus`], [`TaskError::InvalidTitle`] or
    ///   [`TaskError::NoUpdatableFields`] on a rejected patch. Nothing is
    ///   written.
    /// - [`TaskError::TaskNotFound`] if the owner has no such task.
    /// - [`TaskError::Store`] on backend failures.
    async fn update(
        &self,
        owner_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Task, TaskError>;

    /// Deletes one task. Deleting a missing task succeeds.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    async fn delete(&self, owner_id: &str, task_id: &str) -> Result<(), TaskError>;
}

// ---- Blanket impl for GenericTaskStore<B> ----

#[async_trait]
impl<B: TaskBackend + 'static> TaskStore for GenericTaskStore<B> {
    async fn create(&self, owner_id: &str, input: NewTask) -> Result<Task, TaskError> {
        self.create(owner_id, input).await
    }

    async fn list(&self, owner_id: &str) -> Result<Vec<Task>, TaskError> {
        self.list(owner_id).await
    }

    async fn update(
        &self,
        owner_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Task, TaskError> {
        self.update(owner_id, task_id, patch).await
    }

    async fn delete(&self, owner_id: &str, task_id: &str) -> Result<(), TaskError> {
        self.delete(owner_id, task_id).await
    }
}
