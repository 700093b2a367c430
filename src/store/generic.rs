//! Generic task store with all domain logic delegating to a [`TaskBackend`].
//!
//! [`GenericTaskStore`] implements every record operation (field defaults on
//! create, status validation, the empty-update rule, timestamping) on top of
//! any [`TaskBackend`] implementation. Backends remain dumb key-value stores.
//!
//! # Construction
//!
//! ```
//! use pkce_tasks::store::generic::GenericTaskStore;
//! use pkce_tasks::store::memory::InMemoryBackend;
//!
//! let store = GenericTaskStore::new(InMemoryBackend::new())
//!     .with_default_title("New task");
//! assert_eq!(store.default_title(), "New task");
//! ```
//!
//! # Owner Isolation
//!
//! Every operation takes the owner id from the caller's identity, never from
//! a request body, and passes it to the backend as the partition key.

use crate::error::TaskError;
use crate::store::backend::TaskBackend;
use crate::store::expression::UpdateExpression;
use crate::types::task::{timestamp_now, NewTask, Task, TaskPatch, TaskStatus, DEFAULT_TITLE};

/// Record store parameterized over its storage backend.
#[derive(Debug)]
pub struct GenericTaskStore<B: TaskBackend> {
    backend: B,
    default_title: String,
}

impl<B: TaskBackend> GenericTaskStore<B> {
    /// Creates a store backed by `backend`, using [`DEFAULT_TITLE`] for
    /// untitled tasks.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_title: DEFAULT_TITLE.to_string(),
        }
    }

    /// Overrides the title given to tasks created without one.
    pub fn with_default_title(mut self, title: impl Into<String>) -> Self {
        self.default_title = title.into();
        self
    }

    /// Title given to tasks created without one.
    pub fn default_title(&self) -> &str {
        &self.default_title
    }

    /// Returns a reference to the underlying backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Creates a task in the caller's partition.
    ///
    /// Defaults are lenient: a missing or blank title becomes the default
    /// title, a missing description becomes `""`, and a missing or
    /// unrecognized status becomes [`TaskStatus::Todo`]. Create never fails
    /// validation.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    pub async fn create(&self, owner_id: &str, input: NewTask) -> Result<Task, TaskError> {
        let title = match input.title {
            Some(t) if !t.trim().is_empty() => t,
            _ => self.default_title.clone(),
        };
        let status = input
            .status
            .as_deref()
            .and_then(|s| s.parse::<TaskStatus>().ok())
            .unwrap_or_default();

        let task = Task::new(
            owner_id,
            title,
            input.description.unwrap_or_default(),
            status,
        );
        self.backend.put(&task).await?;

        tracing::debug!(owner_id, task_id = %task.task_id, "task created");
        Ok(task)
    }

    /// Returns every task in the caller's partition, newest first.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    pub async fn list(&self, owner_id: &str) -> Result<Vec<Task>, TaskError> {
        let mut tasks = self.backend.query(owner_id).await?;
        tasks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        Ok(tasks)
    }

    /// Applies the fields present in `patch` to an existing task.
    ///
    /// `updatedAt` is refreshed on every successful update; `createdAt`,
    /// `ownerId` and `taskId` are never touched.
    ///
    /// # Errors
    ///
    /// - [`TaskError::InvalidStatus`] if `status` is present and invalid.
    /// - [`TaskError::InvalidTitle`] if `title` is present and blank.
    /// - [`TaskError::NoUpdatableFields`] if the patch sets nothing.
    /// - [`TaskError::TaskNotFound`] if the caller has no task `task_id`.
    /// - [`TaskError::Store`] on backend failures.
    pub async fn update(
        &self,
        owner_id: &str,
        task_id: &str,
        patch: TaskPatch,
    ) -> Result<Task, TaskError> {
        let update = UpdateExpression::from_patch(&patch, &timestamp_now())?;
        if !update.has_semantic_fields() {
            return Err(TaskError::NoUpdatableFields);
        }

        let task = self.backend.update(owner_id, task_id, &update).await?;

        tracing::debug!(
            owner_id,
            task_id,
            expression = %update.expression(),
            "task updated"
        );
        Ok(task)
    }

    /// Removes a task from the caller's partition. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Store`] on backend failures.
    pub async fn delete(&self, owner_id: &str, task_id: &str) -> Result<(), TaskError> {
        self.backend.delete(owner_id, task_id).await?;
        tracing::debug!(owner_id, task_id, "task deleted");
        Ok(())
    }
}
