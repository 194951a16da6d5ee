//! Progress applier: maps a task snapshot onto UI state.
//!
//! [`apply`] is pure. It returns the next [`UiState`] plus the list of
//! [`Effect`]s the tracker must execute, and is used identically for push
//! and poll deliveries.
//!
//! Two rules make it safe against racing channels:
//!
//! - **Monotonic percentage.** For the same task the displayed percentage
//!   only moves forward. A lower percentage arriving out of order is
//!   ignored, while its message text is still shown.
//! - **Idempotent terminal handling.** A snapshot is acted on only while
//!   the identity store still references its task. The first terminal
//!   snapshot clears the store, so any repeat (or a snapshot arriving
//!   after a user cancel) produces no effects.

use std::fmt;

use serde_json::Value;

use crate::types::task::{Task, TaskStatus};

/// What the page's progress area shows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiState {
    /// Task the progress display belongs to.
    pub task_id: Option<String>,
    /// Last applied status.
    pub status: Option<TaskStatus>,
    /// Whether the progress display is shown.
    pub visible: bool,
    /// Displayed percentage, in `[0, 100]`.
    pub percentage: f64,
    /// Items processed.
    pub current: u64,
    /// Total items.
    pub total: u64,
    /// Progress message.
    pub message: String,
}

impl UiState {
    /// Fresh visible state for a newly tracked task.
    pub fn tracking(task_id: impl Into<String>) -> Self {
        Self {
            task_id: Some(task_id.into()),
            visible: true,
            ..Self::default()
        }
    }

    /// Text for a progress bar label, e.g. `"40% (4/10)"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use tasksync::applier::UiState;
    ///
    /// let mut ui = UiState::tracking("T1");
    /// ui.percentage = 40.0;
    /// ui.current = 4;
    /// ui.total = 10;
    /// assert_eq!(ui.progress_text(), "40% (4/10)");
    ///
    /// ui.total = 0;
    /// assert_eq!(ui.progress_text(), "40%");
    /// ```
    pub fn progress_text(&self) -> String {
        if self.total > 0 {
            format!("{:.0}% ({}/{})", self.percentage, self.current, self.total)
        } else {
            format!("{:.0}%", self.percentage)
        }
    }
}

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationLevel {
    /// Task completed.
    Success,
    /// Informational (cancellation).
    Info,
    /// Degraded operation.
    Warning,
    /// Task or control failure.
    Error,
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A toast-style message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Severity.
    pub level: NotificationLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Notification {
    /// Success notification.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    /// Informational notification.
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    /// Warning notification.
    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Warning,
            message: message.into(),
        }
    }

    /// Error notification.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}

/// Side effect requested by [`apply`], executed by the tracker in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Redraw the progress display from the new state.
    UpdateProgress,
    /// Clear the identity store.
    ClearIdentity,
    /// Stop the poll channel and drop the subscription.
    StopChannels,
    /// Hide the progress display.
    HideProgress,
    /// Render a completed task's result.
    RenderResult(Value),
    /// Show a notification.
    Notify(Notification),
}

/// Output of [`apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// UI state after the snapshot.
    pub state: UiState,
    /// Effects to execute, in order.
    pub effects: Vec<Effect>,
}

impl Applied {
    /// Returns `true` if the snapshot was ignored.
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }

    /// Returns `true` if the snapshot ended tracking.
    pub fn is_terminal(&self) -> bool {
        self.effects.contains(&Effect::ClearIdentity)
    }
}

/// Applies `snapshot` to `previous`.
///
/// `tracked` is the task id the identity store currently holds. Snapshots
/// for any other task (or when nothing is tracked) are ignored.
///
/// # Examples
///
/// ```
/// use tasksync::applier::{apply, Effect, UiState};
/// use tasksync::{Task, TaskStatus};
///
/// let ui = UiState::tracking("T1");
/// let running = Task::new("T1", TaskStatus::Running).with_progress(40.0, "scoring");
/// let step = apply(&ui, &running, Some("T1"));
/// assert_eq!(step.state.percentage, 40.0);
/// assert_eq!(step.effects, vec![Effect::UpdateProgress]);
///
/// // An older snapshot arriving late does not move the bar backwards.
/// let late = Task::new("T1", TaskStatus::Running).with_progress(25.0, "parsing");
/// let step = apply(&step.state, &late, Some("T1"));
/// assert_eq!(step.state.percentage, 40.0);
/// assert_eq!(step.state.message, "parsing");
///
/// // Once the store no longer references T1, snapshots are ignored.
/// assert!(apply(&step.state, &late, None).is_noop());
/// ```
pub fn apply(previous: &UiState, snapshot: &Task, tracked: Option<&str>) -> Applied {
    if tracked != Some(snapshot.id.as_str()) {
        return Applied {
            state: previous.clone(),
            effects: Vec::new(),
        };
    }

    let mut state = advance_progress(previous, snapshot);
    state.status = Some(snapshot.status);

    let effects = match snapshot.status {
        TaskStatus::Pending | TaskStatus::Running => {
            state.visible = true;
            vec![Effect::UpdateProgress]
        },
        TaskStatus::Completed => {
            state.visible = false;
            state.percentage = 100.0;
            vec![
                Effect::ClearIdentity,
                Effect::StopChannels,
                Effect::HideProgress,
                Effect::RenderResult(snapshot.result.clone().unwrap_or(Value::Null)),
                Effect::Notify(Notification::success("Task completed")),
            ]
        },
        TaskStatus::Failed => {
            state.visible = false;
            let reason = snapshot
                .error
                .as_deref()
                .filter(|e| !e.is_empty())
                .unwrap_or("unknown error");
            vec![
                Effect::ClearIdentity,
                Effect::StopChannels,
                Effect::HideProgress,
                Effect::Notify(Notification::error(format!("Task failed: {reason}"))),
            ]
        },
        TaskStatus::Cancelled => {
            state.visible = false;
            vec![
                Effect::ClearIdentity,
                Effect::StopChannels,
                Effect::HideProgress,
                Effect::Notify(Notification::info("Task cancelled")),
            ]
        },
    };

    Applied { state, effects }
}

/// Merges progress fields, never regressing the percentage or item count
/// of the same task.
fn advance_progress(previous: &UiState, snapshot: &Task) -> UiState {
    let incoming = snapshot.progress.clamped_percentage();
    let same_task = previous.task_id.as_deref() == Some(snapshot.id.as_str());

    let mut state = if same_task {
        previous.clone()
    } else {
        UiState::tracking(snapshot.id.clone())
    };

    if !same_task || incoming >= state.percentage {
        state.percentage = incoming;
    }
    state.current = state.current.max(snapshot.progress.current);
    if snapshot.progress.total > 0 {
        state.total = snapshot.progress.total;
    }
    if !snapshot.progress.message.is_empty() {
        state.message.clone_from(&snapshot.progress.message);
    }
    state
}
