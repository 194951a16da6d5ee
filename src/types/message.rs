//! Push channel message envelopes.
//!
//! The push endpoint multiplexes updates for many tasks over one
//! connection. Inbound frames are tagged by `type`; the only inbound
//! type the tracker acts on is `task_update`. Anything else decodes to
//! [`ServerMessage::Other`] and is dropped by the channel.

use serde::{Deserialize, Serialize};

use crate::types::task::Task;

/// Inbound push frame.
///
/// # Examples
///
/// ```
/// use tasksync::types::message::ServerMessage;
///
/// let msg = ServerMessage::decode(
///     r#"{"type":"task_update","task_id":"T1","data":{"status":"running"}}"#,
/// )
/// .unwrap();
/// let (task_id, task) = msg.into_task_update().unwrap();
/// assert_eq!(task_id, "T1");
/// assert_eq!(task.id, "T1");
///
/// let other = ServerMessage::decode(r#"{"type":"pong"}"#).unwrap();
/// assert!(other.into_task_update().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A progress or status change for one task.
    TaskUpdate {
        /// Task the update refers to.
        task_id: String,
        /// Snapshot of the task.
        data: Task,
    },
    /// Any other frame type (acks, heartbeats).
    #[serde(other)]
    Other,
}

impl ServerMessage {
    /// Decodes a text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Returns the `(task_id, snapshot)` pair of a `task_update` frame.
    ///
    /// The envelope id is authoritative: it fills in a missing snapshot
    /// id, and a mismatching snapshot id is overwritten.
    pub fn into_task_update(self) -> Option<(String, Task)> {
        match self {
            Self::TaskUpdate { task_id, mut data } => {
                data.id.clone_from(&task_id);
                Some((task_id, data))
            }
            Self::Other => None,
        }
    }
}

/// Outbound push frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Asks the server to route updates for `task_id` to this connection.
    Subscribe {
        /// Task to subscribe to.
        task_id: String,
    },
}

impl ClientMessage {
    /// Builds a subscribe frame.
    pub fn subscribe(task_id: impl Into<String>) -> Self {
        Self::Subscribe {
            task_id: task_id.into(),
        }
    }

    /// Encodes the frame as JSON text.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
