//! Progress synchronization for long-running server-side tasks.
//!
//! A page starts a background job (bulk resume screening, RAG analysis),
//! keeps tracking it across reloads, and receives live progress either
//! over a shared push connection or a fallback poll loop. Both delivery
//! paths converge on one idempotent UI update with a single terminal
//! cleanup path and immediate local cancellation.
//!
//! # Module Organization
//!
//! - [`tracker`] - per-page lifecycle controller ([`TaskTracker`])
//! - [`selector`] - push-or-poll routing and failover
//! - [`push`] - shared push connection with bounded reconnect
//! - [`poll`] - single-flight periodic status requests
//! - [`applier`] - pure snapshot to UI state mapping
//! - [`store`] - durable per-page task identity
//! - [`api`] - REST task client
//! - [`config`], [`error`], [`constants`], [`types`]
//!
//! # Example
//!
//! ```
//! use tasksync::applier::{apply, UiState};
//! use tasksync::{Task, TaskStatus};
//!
//! let ui = UiState::tracking("T1");
//! let step = apply(&ui, &Task::new("T1", TaskStatus::Completed), Some("T1"));
//! assert!(step.is_terminal());
//! ```

pub mod api;
pub mod applier;
pub mod config;
pub mod constants;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod poll;
pub mod push;
pub mod selector;
pub mod store;
pub mod tracker;
pub mod types;
pub mod view;

// Re-exports for ergonomic access
pub use api::{HttpTaskApi, TaskApi};
pub use applier::{Notification, NotificationLevel, UiState};
pub use config::{ApiConfig, PageKind, PushConfig, TrackerConfig};
pub use error::{ConfigError, StorageError, TrackerError, TransportError};
pub use push::{ChannelState, ConnectionState, PushChannel};
pub use store::TaskIdentityStore;
pub use tracker::{ResumeOutcome, TaskTracker, TrackerState};
pub use types::*;
pub use view::ProgressView;
