//! Key-value storage backend trait.
//!
//! The [`StorageBackend`] trait is the contract every persistence engine
//! implements: [`get`](StorageBackend::get), [`put`](StorageBackend::put)
//! and [`delete`](StorageBackend::delete) over string keys and values.
//!
//! Backends are dumb KV stores. Key scoping and the "which task is this
//! page tracking" semantics live in
//! [`TaskIdentityStore`](crate::store::TaskIdentityStore).
//!
//! # Durability
//!
//! The identity store must survive a page reload. Only durable backends
//! such as [`FileBackend`](crate::store::file::FileBackend) meet that
//! contract; [`InMemoryBackend`](crate::store::memory::InMemoryBackend)
//! is for tests and single-session use.

use async_trait::async_trait;

use crate::error::StorageError;

/// Key-value storage backend for persisted client state.
///
/// Implementations must be `Send + Sync`; one backend may be shared by
/// several page trackers, each using its own key.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// [`StorageError`] on I/O or backend-specific failures.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, overwriting any prior value.
    ///
    /// # Errors
    ///
    /// [`StorageError`] on I/O or backend-specific failures.
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`.
    ///
    /// Returns `true` if the key existed, `false` otherwise (idempotent delete).
    ///
    /// # Errors
    ///
    /// [`StorageError`] on I/O or backend-specific failures.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;
}
