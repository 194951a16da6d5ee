//! UI binding a page supplies to its tracker.
//!
//! Everything page-specific (which DOM nodes, how results are rendered,
//! how toasts look) lives behind [`ProgressView`]. The tracker calls these
//! hooks from its own tasks, so implementations must be `Send + Sync`
//! and should not block.

use serde_json::Value;

use crate::applier::{Notification, UiState};

/// Page hooks driven by the tracker.
pub trait ProgressView: Send + Sync {
    /// Tracking of `task_id` began; show the progress display.
    fn show_progress(&self, task_id: &str);

    /// Redraw the progress display.
    fn update_progress(&self, state: &UiState);

    /// Hide the progress display.
    fn hide_progress(&self);

    /// Render the result of a completed task.
    fn render_result(&self, task_id: &str, result: &Value);

    /// Show a notification.
    fn notify(&self, notification: &Notification);
}
