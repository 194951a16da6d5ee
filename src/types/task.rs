//! Task snapshot wire types.
//!
//! This module defines the types the tracker receives from the task server:
//! [`Task`], [`TaskStatus`], [`TaskProgress`], [`CreateTaskResponse`] and
//! [`CancelTaskResponse`].
//!
//! # Serialization
//!
//! Fields use `snake_case` to match the server's JSON. The task server
//! is not consistent about which fields it sends on every path (push
//! `data` payloads may omit the id, early snapshots may omit `progress`),
//! so every field except `status` has a serde default. An explicit `null`
//! is read the same as a missing field, and timestamps are kept as text
//! whether the server sends them as strings or numbers.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle status of a background task.
///
/// ```text
/// Pending -> Running -> Completed | Failed | Cancelled
/// Pending -> Completed | Failed | Cancelled
/// ```
///
/// Terminal states (`Completed`, `Failed`, `Cancelled`) end tracking.
///
/// # Examples
///
/// ```
/// use tasksync::TaskStatus;
///
/// assert!(!TaskStatus::Running.is_terminal());
/// assert!(TaskStatus::Failed.is_terminal());
/// assert_eq!(TaskStatus::Cancelled.to_string(), "cancelled");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted by the server, not started yet.
    Pending,
    /// Actively being processed.
    Running,
    /// Finished successfully (terminal).
    Completed,
    /// Finished with an error (terminal).
    Failed,
    /// Cancelled by the user (terminal).
    Cancelled,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl TaskStatus {
    /// Returns `true` if this status is terminal.
    ///
    /// Terminal states are `Completed`, `Failed`, and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` while progress fields are meaningful.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Progress counters reported by a running task.
///
/// Only meaningful while the task is `Pending` or `Running`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskProgress {
    /// Items processed so far.
    #[serde(deserialize_with = "null_as_default")]
    pub current: u64,
    /// Total items to process (0 when unknown).
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    /// Completion percentage in `[0, 100]`.
    #[serde(deserialize_with = "null_as_default")]
    pub percentage: f64,
    /// Human-readable progress message.
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
}

impl TaskProgress {
    /// Returns the percentage clamped into `[0, 100]`.
    ///
    /// Non-finite values are treated as `0`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tasksync::TaskProgress;
    ///
    /// let progress = TaskProgress { percentage: 140.0, ..Default::default() };
    /// assert_eq!(progress.clamped_percentage(), 100.0);
    ///
    /// let progress = TaskProgress { percentage: f64::NAN, ..Default::default() };
    /// assert_eq!(progress.clamped_percentage(), 0.0);
    /// ```
    pub fn clamped_percentage(&self) -> f64 {
        if self.percentage.is_finite() {
            self.percentage.clamp(0.0, 100.0)
        } else {
            0.0
        }
    }
}

/// Point-in-time snapshot of a server-side task.
///
/// Delivered identically by the poll and push channels.
///
/// # Examples
///
/// ```
/// use tasksync::{Task, TaskStatus};
///
/// let task: Task = serde_json::from_value(serde_json::json!({
///     "id": "T1",
///     "status": "running",
///     "progress": { "current": 4, "total": 10, "percentage": 40.0, "message": "parsing" }
/// }))
/// .unwrap();
///
/// assert_eq!(task.id, "T1");
/// assert_eq!(task.status, TaskStatus::Running);
/// assert_eq!(task.progress.current, 4);
/// assert!(task.result.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque task identifier. Accepts `task_id` as an alias.
    #[serde(default, alias = "task_id")]
    pub id: String,

    /// Current lifecycle status.
    pub status: TaskStatus,

    /// Progress counters. Terminal snapshots often send `null`.
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: TaskProgress,

    /// Result payload, present when `status = completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error text, present when `status = failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Creation timestamp as sent by the server, as text.
    #[serde(
        default,
        deserialize_with = "timestamp_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<String>,

    /// Last update timestamp as sent by the server, as text.
    #[serde(
        default,
        deserialize_with = "timestamp_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts a string or a number (epoch seconds); anything else reads as absent.
fn timestamp_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    })
}

impl Task {
    /// Creates a bare snapshot with default progress and no payload.
    pub fn new(id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            id: id.into(),
            status,
            progress: TaskProgress::default(),
            result: None,
            error: None,
            created_at: None,
            updated_at: None,
        }
    }

    /// Sets the progress percentage and message.
    pub fn with_progress(mut self, percentage: f64, message: impl Into<String>) -> Self {
        self.progress.percentage = percentage;
        self.progress.message = message.into();
        self
    }

    /// Sets the result payload.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Sets the error text.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Returns `true` if the snapshot's status is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Response of the create-task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    /// Identifier assigned to the new task.
    pub task_id: String,
}

/// Response of the cancel-task request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelTaskResponse {
    /// Whether the server accepted the cancellation.
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_status_display_matches_serde() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ] {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, status.to_string());
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn task_accepts_task_id_alias() {
        let task: Task = serde_json::from_value(json!({
            "task_id": "abc",
            "status": "pending"
        }))
        .unwrap();
        assert_eq!(task.id, "abc");
        assert_eq!(task.progress, TaskProgress::default());
    }

    #[test]
    fn task_decodes_without_id_or_progress() {
        let task: Task = serde_json::from_value(json!({
            "status": "failed",
            "error": "parse error"
        }))
        .unwrap();
        assert!(task.id.is_empty());
        assert_eq!(task.error.as_deref(), Some("parse error"));
    }

    #[test]
    fn partial_progress_uses_defaults() {
        let task: Task = serde_json::from_value(json!({
            "id": "t",
            "status": "running",
            "progress": { "percentage": 12.5 }
        }))
        .unwrap();
        assert_eq!(task.progress.percentage, 12.5);
        assert_eq!(task.progress.total, 0);
        assert_eq!(task.progress.message, "");
    }

    #[test]
    fn null_progress_on_completed_task_uses_defaults() {
        let task: Task = serde_json::from_value(json!({
            "id": "T1",
            "status": "completed",
            "progress": null,
            "result": {"ok": 1}
        }))
        .unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.progress, TaskProgress::default());
        assert_eq!(task.result, Some(json!({"ok": 1})));
    }

    #[test]
    fn null_progress_fields_use_defaults() {
        let task: Task = serde_json::from_value(json!({
            "id": "T1",
            "status": "running",
            "progress": {"percentage": 10.0, "message": null, "total": null}
        }))
        .unwrap();
        assert_eq!(task.progress.percentage, 10.0);
        assert_eq!(task.progress.message, "");
        assert_eq!(task.progress.total, 0);
    }

    #[test]
    fn numeric_timestamps_are_kept_as_text() {
        let task: Task = serde_json::from_value(json!({
            "id": "T1",
            "status": "running",
            "created_at": 1767225600.5,
            "updated_at": null
        }))
        .unwrap();
        assert_eq!(task.created_at.as_deref(), Some("1767225600.5"));
        assert_eq!(task.updated_at, None);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let result: Result<Task, _> = serde_json::from_value(json!({
            "id": "t",
            "status": "exploded"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn optional_fields_omitted_when_none() {
        let json = serde_json::to_value(Task::new("t", TaskStatus::Running)).unwrap();
        assert!(json.get("result").is_none());
        assert!(json.get("error").is_none());
        assert_eq!(json["status"], "running");
    }
}
