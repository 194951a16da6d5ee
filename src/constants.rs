//! Wire constants and repository default values.
//!
//! The timing defaults are the values the dashboard pages shipped with.
//! [`TrackerConfig`](crate::config::TrackerConfig) exposes all of them.

/// `type` tag of an inbound push frame carrying a task snapshot.
pub const TASK_UPDATE_MESSAGE_TYPE: &str = "task_update";

/// `type` tag of the outbound subscribe frame.
pub const SUBSCRIBE_MESSAGE_TYPE: &str = "subscribe";

/// Consecutive failed connection attempts before the push channel
/// downgrades to polling for the rest of the page session.
pub const DEFAULT_MAX_RETRY: u32 = 3;

/// Fixed delay between push reconnect attempts (milliseconds).
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

/// Interval between status polls (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Per-request timeout for REST calls (milliseconds).
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Consecutive poll failures after which the poll channel reports a stall.
pub const DEFAULT_POLL_STALL_THRESHOLD: u32 = 5;

/// Identity store key of the bulk resume screening page.
pub const SCREENING_PAGE_KEY: &str = "tasksync.screening.task_id";

/// Identity store key of the RAG analysis page.
pub const RAG_ANALYSIS_PAGE_KEY: &str = "tasksync.rag.task_id";
