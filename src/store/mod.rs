//! Task identity store and its storage backends.
//!
//! # Architecture
//!
//! 1. **[`TaskIdentityStore`]** - "which task is this page tracking",
//!    persisted under one page-scoped key. This is the single source of
//!    truth for whether there is a task to resume after a reload.
//!
//! 2. **[`StorageBackend`]** - dumb KV trait the persistence engines
//!    implement.
//!
//! # Backends
//!
//! - [`FileBackend`](file::FileBackend) - durable JSON file.
//! - [`InMemoryBackend`](memory::InMemoryBackend) - `DashMap`, not durable.
//!
//! The store enforces no expiry. A stale id is resolved by the tracker
//! asking the server for the task's status on resume.

pub mod backend;
pub mod file;
pub mod memory;

use std::fmt;
use std::sync::Arc;

pub use backend::StorageBackend;

use crate::error::StorageError;

/// Durable "current task id" for one page.
///
/// Cheap to clone; clones share the backend.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use tasksync::store::memory::InMemoryBackend;
/// use tasksync::store::TaskIdentityStore;
///
/// # tokio_test_block(async {
/// let store = TaskIdentityStore::new("tasksync.screening.task_id", Arc::new(InMemoryBackend::new()));
///
/// store.save("T1").await.unwrap();
/// assert_eq!(store.load().await.unwrap().as_deref(), Some("T1"));
/// assert!(store.holds("T1").await.unwrap());
///
/// store.clear().await.unwrap();
/// assert_eq!(store.load().await.unwrap(), None);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct TaskIdentityStore {
    key: String,
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for TaskIdentityStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskIdentityStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl TaskIdentityStore {
    /// Creates a store persisting under `key`.
    pub fn new(key: impl Into<String>, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            key: key.into(),
            backend,
        }
    }

    /// Returns the page-scoped key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Persists `task_id`, overwriting any prior value.
    ///
    /// # Errors
    ///
    /// [`StorageError`] if the backend write fails.
    pub async fn save(&self, task_id: &str) -> Result<(), StorageError> {
        self.backend.put(&self.key, task_id).await?;
        tracing::debug!(key = %self.key, task_id, "saved task identity");
        Ok(())
    }

    /// Returns the persisted task id, if any.
    ///
    /// An empty stored value reads as `None`.
    ///
    /// # Errors
    ///
    /// [`StorageError`] if the backend read fails.
    pub async fn load(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .backend
            .get(&self.key)
            .await?
            .filter(|id| !id.is_empty()))
    }

    /// Removes the persisted id. Returns `true` if one was present.
    ///
    /// # Errors
    ///
    /// [`StorageError`] if the backend delete fails.
    pub async fn clear(&self) -> Result<bool, StorageError> {
        let removed = self.backend.delete(&self.key).await?;
        if removed {
            tracing::debug!(key = %self.key, "cleared task identity");
        }
        Ok(removed)
    }

    /// Returns `true` if the store currently references `task_id`.
    ///
    /// # Errors
    ///
    /// [`StorageError`] if the backend read fails.
    pub async fn holds(&self, task_id: &str) -> Result<bool, StorageError> {
        Ok(self.load().await?.as_deref() == Some(task_id))
    }
}
