//! Error types for task tracking.
//!
//! Errors are split by who is allowed to see them:
//!
//! - [`TransportError`] - poll request and push connection failures. The
//!   channels retry or downgrade on these and only log them.
//! - [`StorageError`] - raw identity store backend failures.
//! - [`TrackerError`] - errors returned by controller operations
//!   (create, cancel) that the page reports to the user.
//! - [`ConfigError`] - configuration parsing and validation failures.

use crate::tracker::TrackerState;

/// Network-level failure of a REST request or the push connection.
///
/// Cloneable so one failure can be both logged and recorded.
///
/// # Examples
///
/// ```
/// use tasksync::TransportError;
///
/// let err = TransportError::Http { status: 404, body: "no such task".to_string() };
/// assert_eq!(err.category(), "http");
/// assert!(err.is_not_found());
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body or reason text.
        body: String,
    },

    /// The request exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TCP connect, TLS handshake).
    #[error("connection error: {message}")]
    Connection {
        /// Underlying error text.
        message: String,
    },

    /// The response body could not be decoded.
    #[error("decode error: {message}")]
    Decode {
        /// Underlying error text.
        message: String,
    },

    /// WebSocket protocol failure.
    #[error("websocket error: {message}")]
    WebSocket {
        /// Underlying error text.
        message: String,
    },

    /// The push connection was closed.
    #[error("connection closed")]
    Closed,
}

impl TransportError {
    /// Returns the error category as a static string for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::Decode { .. } => "decode",
            Self::WebSocket { .. } => "websocket",
            Self::Closed => "closed",
        }
    }

    /// Returns `true` for an HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }

    /// Classifies a [`reqwest::Error`] into the matching variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::Closed,
            WsError::Io(io) => Self::Connection {
                message: io.to_string(),
            },
            WsError::Http(response) => Self::Http {
                status: response.status().as_u16(),
                body: "websocket upgrade rejected".to_string(),
            },
            other => Self::WebSocket {
                message: other.to_string(),
            },
        }
    }
}

/// Errors from an identity store backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// File system failure of a durable backend.
    #[error("storage I/O error on '{path}': {source}")]
    Io {
        /// File the backend was accessing.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Persisted data could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Any other backend-specific failure.
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description.
        message: String,
    },
}

/// Errors surfaced by [`TaskTracker`](crate::tracker::TaskTracker) operations.
///
/// These are the control errors the page shows as notifications.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The create request failed; the tracker stays idle.
    #[error("failed to create task: {0}")]
    Create(#[source] TransportError),

    /// The cancel request failed; local tracking was already stopped.
    #[error("failed to cancel task {task_id}: {source}")]
    Cancel {
        /// Task the cancel request was for.
        task_id: String,
        /// Underlying transport failure.
        #[source]
        source: TransportError,
    },

    /// The server answered the cancel request with `success: false`.
    #[error("server refused to cancel task {task_id}")]
    CancelRejected {
        /// Task the cancel request was for.
        task_id: String,
    },

    /// The operation is not valid in the tracker's current state.
    #[error("operation requires {expected} state, tracker is {actual}")]
    InvalidState {
        /// State the operation needs.
        expected: TrackerState,
        /// State the tracker was in.
        actual: TrackerState,
    },

    /// Identity store failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The HTTP client could not be built.
    #[error("failed to set up tracker: {0}")]
    Setup(#[source] TransportError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors from loading or validating a [`TrackerConfig`](crate::config::TrackerConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML is malformed or does not match the schema.
    #[error("failed to parse config TOML: {source}")]
    Parse {
        /// Underlying parse error.
        #[from]
        source: toml::de::Error,
    },

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config parsed but contains invalid values.
    #[error("config validation error: {message}")]
    Validation {
        /// What is wrong.
        message: String,
    },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Convenience alias for tracker results.
pub type Result<T, E = TrackerError> = std::result::Result<T, E>;
