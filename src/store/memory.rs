//! In-memory storage backend and task store.
//!
//! [`InMemoryBackend`] provides a thread-safe [`TaskBackend`] implementation
//! using `DashMap<String, HashMap<String, Task>>`: one shard entry per owner
//! partition, holding that owner's tasks by id. It is a dumb store with no
//! domain logic.
//!
//! [`InMemoryTaskStore`] is [`GenericTaskStore<InMemoryBackend>`], the store
//! `serve` uses when no external table is configured and the one every test
//! in this crate runs against.
//!
//! # Concurrency
//!
//! Each update holds the partition's shard lock for the whole
//! read-modify-write, so a single update is atomic. Concurrent updates to
//! the same task are last-write-wins per attribute.
//!
//! # Examples
//!
//! ```
//! use pkce_tasks::store::memory::InMemoryTaskStore;
//! use pkce_tasks::types::NewTask;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = InMemoryTaskStore::default();
//! let task = store.create("u1", NewTask::default()).await.unwrap();
//! assert_eq!(store.list("u1").await.unwrap(), vec![task]);
//! assert!(store.list("u2").await.unwrap().is_empty());
//! # }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::store::backend::{StorageError, TaskBackend};
use crate::store::expression::{UpdateExpression, UPDATED_AT};
use crate::store::generic::GenericTaskStore;
use crate::types::task::Task;

/// Record store over [`InMemoryBackend`].
pub type InMemoryTaskStore = GenericTaskStore<InMemoryBackend>;

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        GenericTaskStore::new(InMemoryBackend::new())
    }
}

/// Thread-safe in-memory storage backend using [`DashMap`].
///
/// # Examples
///
/// ```
/// use pkce_tasks::store::memory::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// assert!(backend.is_empty());
/// assert_eq!(backend.len(), 0);
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    partitions: DashMap<String, HashMap<String, Task>>,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
        }
    }

    /// Returns the number of tasks stored across all owners.
    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    /// Returns `true` if the backend holds no tasks.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(task: &mut Task, attribute: &str, value: &str) -> Result<(), StorageError> {
    match attribute {
        "title" => task.title = value.to_string(),
        "description" => task.description = value.to_string(),
        "status" => {
            task.status = value.parse().map_err(|_| StorageError::MalformedItem {
                message: format!("unrecognized status {value:?}"),
            })?;
        },
        UPDATED_AT => task.updated_at = value.to_string(),
        other => {
            return Err(StorageError::Backend {
                message: format!("attribute {other:?} is not updatable"),
                source: None,
            })
        },
    }
    Ok(())
}

#[async_trait]
impl TaskBackend for InMemoryBackend {
    async fn put(&self, task: &Task) -> Result<(), StorageError> {
        self.partitions
            .entry(task.owner_id.clone())
            .or_default()
            .insert(task.task_id.clone(), task.clone());
        Ok(())
    }

    async fn query(&self, owner_id: &str) -> Result<Vec<Task>, StorageError> {
        Ok(self
            .partitions
            .get(owner_id)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update(
        &self,
        owner_id: &str,
        task_id: &str,
        update: &UpdateExpression,
    ) -> Result<Task, StorageError> {
        let not_found = || StorageError::NotFound {
            owner_id: owner_id.to_string(),
            task_id: task_id.to_string(),
        };
        let mut partition = self.partitions.get_mut(owner_id).ok_or_else(not_found)?;
        let stored = partition.get_mut(task_id).ok_or_else(not_found)?;

        // Apply to a copy so a rejected assignment leaves the item untouched.
        let mut next = stored.clone();
        for (attribute, value) in update.assignments() {
            apply(&mut next, attribute, value)?;
        }
        *stored = next.clone();
        Ok(next)
    }

    async fn delete(&self, owner_id: &str, task_id: &str) -> Result<(), StorageError> {
        if let Some(mut partition) = self.partitions.get_mut(owner_id) {
            partition.remove(task_id);
        }
        self.partitions.remove_if(owner_id, |_, p| p.is_empty());
        Ok(())
    }
}
