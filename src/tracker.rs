//! Task lifecycle controller.
//!
//! A [`TaskTracker`] is constructed when a page is entered and dropped when
//! it is left. It owns everything that used to be page-global: the poll
//! and push channels, the selector between them, the UI state and the
//! identity store handle.
//!
//! # Lifecycle
//!
//! ```text
//! idle -> creating -> tracking -> done -> idle
//!   |                    ^
//!   +---- resume --------+
//! ```
//!
//! - [`start`](TaskTracker::start) creates a task, persists its id and
//!   subscribes.
//! - [`enter`](TaskTracker::enter) resumes a task persisted by an earlier
//!   page instance.
//! - Every snapshot, from either channel, goes through
//!   [`apply`](crate::applier::apply). A terminal snapshot clears the
//!   identity, stops the channels and passes through `done` back to `idle`.
//! - [`cancel`](TaskTracker::cancel) clears local state at once and only
//!   then tells the server; the server's own terminal snapshot is ignored
//!   because the identity is already gone.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{HttpTaskApi, TaskApi};
use crate::applier::{apply, Applied, Effect, Notification, UiState};
use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::poll::PollChannel;
use crate::push::{ChannelState, PushChannel, PushConnector, WsConnector};
use crate::selector::ChannelSelector;
use crate::store::{StorageBackend, TaskIdentityStore};
use crate::types::delivery::{Delivery, DeliveryReceiver};
use crate::types::task::{Task, TaskStatus};
use crate::view::ProgressView;

/// Lifecycle state of a [`TaskTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackerState {
    /// No task is tracked.
    Idle,
    /// A create request is in flight.
    Creating,
    /// A task is tracked and a channel delivers its updates.
    Tracking,
    /// A terminal snapshot was just applied. Immediately followed by `Idle`.
    Done,
}

impl fmt::Display for TrackerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Creating => write!(f, "creating"),
            Self::Tracking => write!(f, "tracking"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Result of resuming a persisted task on page enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No task id was persisted.
    Nothing,
    /// The persisted id could not be fetched; it was cleared.
    Stale {
        /// The cleared id.
        task_id: String,
    },
    /// The task had already finished; its final state was shown once and
    /// the id cleared.
    Finished {
        /// The finished task.
        task_id: String,
        /// Its terminal status.
        status: TaskStatus,
    },
    /// The task is still running and is tracked again.
    Resumed {
        /// The resumed task.
        task_id: String,
    },
}

/// Builder for [`TaskTracker`].
///
/// The API client defaults to [`HttpTaskApi`] and the push connector to a
/// [`WsConnector`] for the configured push URL.
pub struct TaskTrackerBuilder {
    config: TrackerConfig,
    backend: Arc<dyn StorageBackend>,
    view: Arc<dyn ProgressView>,
    api: Option<Arc<dyn TaskApi>>,
    connector: Option<Arc<dyn PushConnector>>,
}

impl TaskTrackerBuilder {
    /// Replaces the REST client.
    pub fn with_api(mut self, api: Arc<dyn TaskApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Replaces the push connector. Ignored when the config has no push
    /// endpoint.
    pub fn with_push_connector(mut self, connector: Arc<dyn PushConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Validates the config and assembles the tracker. Nothing is spawned
    /// until [`TaskTracker::enter`] or [`TaskTracker::start`].
    ///
    /// # Errors
    ///
    /// [`TrackerError::Config`] for an invalid config,
    /// [`TrackerError::Setup`] if the default HTTP client cannot be built.
    pub fn build(self) -> Result<TaskTracker> {
        self.config.validate()?;

        let api: Arc<dyn TaskApi> = match self.api {
            Some(api) => api,
            None => Arc::new(HttpTaskApi::new(&self.config.api).map_err(TrackerError::Setup)?),
        };

        let cancel = CancellationToken::new();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let push = self.config.push.clone().map(|push_config| {
            let connector = self.connector.unwrap_or_else(|| {
                Arc::new(WsConnector::new(push_config.url.clone())) as Arc<dyn PushConnector>
            });
            PushChannel::new(push_config, connector, tx.clone(), &cancel)
        });
        let poll = PollChannel::new(
            Arc::clone(&api),
            self.config.poll_interval(),
            self.config.poll_stall_threshold,
            tx,
            cancel.child_token(),
        );

        let store = TaskIdentityStore::new(self.config.page_key.clone(), self.backend);
        let (state, _) = watch::channel(TrackerState::Idle);

        Ok(TaskTracker {
            inner: Arc::new(TrackerInner {
                api,
                store,
                view: self.view,
                selector: ChannelSelector::new(push, poll),
                state,
                current: Mutex::new(None),
                ui: Mutex::new(UiState::default()),
                apply_lock: tokio::sync::Mutex::new(()),
                stall_notified: AtomicBool::new(false),
            }),
            cancel,
            deliveries: Mutex::new(Some(rx)),
            background: Mutex::new(Vec::new()),
        })
    }
}

struct TrackerInner {
    api: Arc<dyn TaskApi>,
    store: TaskIdentityStore,
    view: Arc<dyn ProgressView>,
    selector: ChannelSelector,
    state: watch::Sender<TrackerState>,
    current: Mutex<Option<String>>,
    ui: Mutex<UiState>,
    /// Serializes snapshot application with cancel.
    apply_lock: tokio::sync::Mutex<()>,
    stall_notified: AtomicBool,
}

/// Per-page task lifecycle controller.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use serde_json::json;
/// use tasksync::config::{ApiConfig, PageKind, PushConfig, TrackerConfig};
/// use tasksync::store::file::FileBackend;
/// use tasksync::tracker::TaskTracker;
/// # use tasksync::applier::{Notification, UiState};
/// # use tasksync::view::ProgressView;
/// # struct Page;
/// # impl ProgressView for Page {
/// #     fn show_progress(&self, _: &str) {}
/// #     fn update_progress(&self, _: &UiState) {}
/// #     fn hide_progress(&self) {}
/// #     fn render_result(&self, _: &str, _: &serde_json::Value) {}
/// #     fn notify(&self, _: &Notification) {}
/// # }
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = TrackerConfig::for_page(
///     PageKind::Screening,
///     ApiConfig::new("http://localhost:8000/api".parse()?),
/// )
/// .with_push(PushConfig::new("ws://localhost:8000/ws".parse()?));
///
/// let tracker = TaskTracker::builder(
///     config,
///     Arc::new(FileBackend::new("/var/lib/dashboard/tasks.json")),
///     Arc::new(Page),
/// )
/// .build()?;
///
/// tracker.enter().await?;
/// let task_id = tracker.start(&json!({"job_id": 7})).await?;
/// println!("tracking {task_id}");
/// # Ok(())
/// # }
/// ```
pub struct TaskTracker {
    inner: Arc<TrackerInner>,
    cancel: CancellationToken,
    deliveries: Mutex<Option<DeliveryReceiver>>,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskTracker {
    /// Starts building a tracker for one page.
    pub fn builder(
        config: TrackerConfig,
        backend: Arc<dyn StorageBackend>,
        view: Arc<dyn ProgressView>,
    ) -> TaskTrackerBuilder {
        TaskTrackerBuilder {
            config,
            backend,
            view,
            api: None,
            connector: None,
        }
    }

    /// Page enter: starts the background tasks, opens the push connection
    /// and resumes any persisted task.
    ///
    /// Background tasks are started once. Calling it again repeats the
    /// resume step, which requires the tracker to be idle.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Storage`] if the identity store cannot be read,
    /// [`TrackerError::InvalidState`] if a task is already being tracked.
    pub async fn enter(&self) -> Result<ResumeOutcome> {
        self.spawn_background();
        if let Some(push) = self.inner.selector.push() {
            push.connect();
        }
        self.resume().await
    }

    fn spawn_background(&self) {
        let Some(rx) = self.deliveries.lock().take() else {
            return;
        };
        let mut background = self.background.lock();
        background.push(tokio::spawn(run_deliveries(
            Arc::clone(&self.inner),
            rx,
            self.cancel.clone(),
        )));
        if let Some(failover) = self.inner.selector.spawn_failover(self.cancel.clone()) {
            background.push(failover);
        }
    }

    /// Resumes the task persisted under this page's key, if any.
    ///
    /// The task's status is fetched once. A fetch failure clears the id
    /// and is not retried.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Storage`] if the identity store cannot be accessed,
    /// [`TrackerError::InvalidState`] unless the tracker is idle.
    pub async fn resume(&self) -> Result<ResumeOutcome> {
        self.inner.expect_state(TrackerState::Idle)?;
        let Some(task_id) = self.inner.store.load().await? else {
            return Ok(ResumeOutcome::Nothing);
        };

        let snapshot = match self.inner.api.get_task_status(&task_id).await {
            Ok(mut snapshot) => {
                snapshot.id.clone_from(&task_id);
                snapshot
            },
            Err(err) => {
                tracing::info!(
                    %task_id,
                    category = err.category(),
                    error = %err,
                    "persisted task could not be fetched, clearing"
                );
                self.inner.store.clear().await?;
                return Ok(ResumeOutcome::Stale { task_id });
            },
        };

        if snapshot.is_terminal() {
            tracing::info!(%task_id, status = %snapshot.status, "persisted task already finished");
            *self.inner.current.lock() = Some(task_id.clone());
            self.inner.handle_snapshot(&snapshot).await?;
            return Ok(ResumeOutcome::Finished {
                task_id,
                status: snapshot.status,
            });
        }

        tracing::info!(%task_id, status = %snapshot.status, "resuming persisted task");
        self.inner.begin_tracking(&task_id);
        self.inner.handle_snapshot(&snapshot).await?;
        Ok(ResumeOutcome::Resumed { task_id })
    }

    /// Creates a task with `params` and starts tracking it.
    ///
    /// On failure the tracker returns to idle and the user is notified.
    ///
    /// # Errors
    ///
    /// [`TrackerError::InvalidState`] unless idle, [`TrackerError::Create`]
    /// if the create request fails, [`TrackerError::Storage`] if the id
    /// cannot be persisted.
    pub async fn start(&self, params: &Value) -> Result<String> {
        self.inner.transition(TrackerState::Idle, TrackerState::Creating)?;
        self.spawn_background();

        let response = match self.inner.api.create_task(params).await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(category = err.category(), error = %err, "task creation failed");
                self.inner.state.send_replace(TrackerState::Idle);
                self.inner
                    .view
                    .notify(&Notification::error(format!("Failed to start task: {err}")));
                return Err(TrackerError::Create(err));
            },
        };

        let task_id = response.task_id;
        if let Err(err) = self.inner.store.save(&task_id).await {
            tracing::warn!(%task_id, error = %err, "task id could not be persisted, cancelling task");
            self.inner.state.send_replace(TrackerState::Idle);
            self.inner
                .view
                .notify(&Notification::error(format!("Failed to start task: {err}")));
            match self.inner.api.cancel_task(&task_id).await {
                Ok(response) if response.success => {},
                Ok(_) => tracing::warn!(%task_id, "server refused to cancel untracked task"),
                Err(cancel_err) => {
                    tracing::warn!(%task_id, error = %cancel_err, "untracked task could not be cancelled");
                },
            }
            return Err(err.into());
        }
        tracing::info!(%task_id, "task created");
        self.inner.begin_tracking(&task_id);
        Ok(task_id)
    }

    /// Cancels the tracked task.
    ///
    /// Local state (progress display, channels, identity) is cleared
    /// before the cancel request is sent. The request is sent even if the
    /// identity cannot be removed from storage. Every failure is reported
    /// to the user; local state stays cleared.
    ///
    /// # Errors
    ///
    /// [`TrackerError::InvalidState`] unless tracking,
    /// [`TrackerError::Cancel`] / [`TrackerError::CancelRejected`] from
    /// the server, otherwise [`TrackerError::Storage`] if the identity
    /// could not be cleared.
    pub async fn cancel(&self) -> Result<()> {
        let (task_id, cleared) = {
            let _guard = self.inner.apply_lock.lock().await;
            self.inner.expect_state(TrackerState::Tracking)?;
            let current = self.inner.current.lock().take();
            let Some(task_id) = current else {
                return Err(TrackerError::InvalidState {
                    expected: TrackerState::Tracking,
                    actual: TrackerState::Idle,
                });
            };
            self.inner.selector.unsubscribe();
            self.inner.view.hide_progress();
            *self.inner.ui.lock() = UiState::default();
            self.inner.state.send_replace(TrackerState::Idle);
            (task_id, self.inner.store.clear().await)
        };

        tracing::info!(%task_id, "cancelling task");
        let outcome = self.request_cancel(task_id.clone()).await;
        if let Err(err) = cleared {
            tracing::warn!(%task_id, error = %err, "cancelled task id could not be cleared");
            self.inner.view.notify(&Notification::error(format!(
                "Failed to forget cancelled task: {err}"
            )));
            return outcome.and(Err(err.into()));
        }
        outcome
    }

    async fn request_cancel(&self, task_id: String) -> Result<()> {
        match self.inner.api.cancel_task(&task_id).await {
            Ok(response) if response.success => {
                self.inner.view.notify(&Notification::info("Task cancelled"));
                Ok(())
            },
            Ok(_) => {
                tracing::warn!(%task_id, "server refused cancellation");
                self.inner
                    .view
                    .notify(&Notification::error("Server refused to cancel the task"));
                Err(TrackerError::CancelRejected { task_id })
            },
            Err(err) => {
                tracing::warn!(%task_id, category = err.category(), error = %err, "cancel request failed");
                self.inner
                    .view
                    .notify(&Notification::error(format!("Failed to cancel task: {err}")));
                Err(TrackerError::Cancel {
                    task_id,
                    source: err,
                })
            },
        }
    }

    /// Applies one snapshot as if a channel had delivered it.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Storage`] if the identity store cannot be read.
    pub async fn apply_snapshot(&self, snapshot: &Task) -> Result<Applied> {
        self.inner.handle_snapshot(snapshot).await
    }

    /// Page leave: stops every background task and closes the push
    /// connection. The persisted identity is kept so the next page enter
    /// resumes.
    pub fn leave(&self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!(task_id = ?self.current_task(), "leaving page");
        }
        self.cancel.cancel();
        self.inner.selector.poll().stop();
        for handle in self.background.lock().drain(..) {
            handle.abort();
        }
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> TrackerState {
        *self.inner.state.borrow()
    }

    /// Returns a receiver notified on lifecycle changes.
    ///
    /// `Done` is published just before `Idle`; a slow receiver may only
    /// observe `Idle`.
    pub fn watch_state(&self) -> watch::Receiver<TrackerState> {
        self.inner.state.subscribe()
    }

    /// Returns the tracked task id.
    pub fn current_task(&self) -> Option<String> {
        self.inner.current.lock().clone()
    }

    /// Returns a copy of the UI state.
    pub fn ui_state(&self) -> UiState {
        self.inner.ui.lock().clone()
    }

    /// Returns the push channel state, if push is configured.
    pub fn push_state(&self) -> Option<ChannelState> {
        self.inner.selector.push().map(PushChannel::state)
    }

    /// Returns the channel selector.
    pub fn selector(&self) -> &ChannelSelector {
        &self.inner.selector
    }

    /// Returns the identity store.
    pub fn store(&self) -> &TaskIdentityStore {
        &self.inner.store
    }
}

impl Drop for TaskTracker {
    fn drop(&mut self) {
        self.leave();
    }
}

impl TrackerInner {
    fn expect_state(&self, expected: TrackerState) -> Result<()> {
        let actual = *self.state.borrow();
        if actual == expected {
            Ok(())
        } else {
            Err(TrackerError::InvalidState { expected, actual })
        }
    }

    fn transition(&self, from: TrackerState, to: TrackerState) -> Result<()> {
        let mut actual = from;
        let moved = self.state.send_if_modified(|state| {
            actual = *state;
            if *state == from {
                *state = to;
                true
            } else {
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(TrackerError::InvalidState {
                expected: from,
                actual,
            })
        }
    }

    /// Enters `tracking` for `task_id`: resets the UI, shows progress and
    /// subscribes. The id must already be persisted.
    fn begin_tracking(&self, task_id: &str) {
        *self.current.lock() = Some(task_id.to_string());
        *self.ui.lock() = UiState::tracking(task_id);
        self.stall_notified.store(false, Ordering::Relaxed);
        self.state.send_replace(TrackerState::Tracking);
        self.view.show_progress(task_id);

        let kind = self.selector.subscribe(task_id);
        tracing::info!(task_id, channel = ?kind, "tracking task");
    }

    async fn handle_snapshot(&self, snapshot: &Task) -> Result<Applied> {
        let _guard = self.apply_lock.lock().await;
        let tracked = self.store.load().await?;
        let previous = self.ui.lock().clone();
        let applied = apply(&previous, snapshot, tracked.as_deref());
        if applied.is_noop() {
            tracing::trace!(task_id = %snapshot.id, status = %snapshot.status, "snapshot ignored");
            return Ok(applied);
        }

        *self.ui.lock() = applied.state.clone();
        for effect in &applied.effects {
            match effect {
                Effect::UpdateProgress => self.view.update_progress(&applied.state),
                Effect::ClearIdentity => {
                    if let Err(err) = self.store.clear().await {
                        tracing::warn!(task_id = %snapshot.id, error = %err, "failed to clear task identity");
                    }
                },
                Effect::StopChannels => self.selector.unsubscribe(),
                Effect::HideProgress => self.view.hide_progress(),
                Effect::RenderResult(result) => self.view.render_result(&snapshot.id, result),
                Effect::Notify(notification) => self.view.notify(notification),
            }
        }

        if applied.is_terminal() {
            *self.current.lock() = None;
            self.state.send_replace(TrackerState::Done);
            tracing::info!(task_id = %snapshot.id, status = %snapshot.status, "task finished");
            self.state.send_replace(TrackerState::Idle);
        }
        Ok(applied)
    }

    fn handle_stall(&self, task_id: &str, consecutive_failures: u32) {
        if self.current.lock().as_deref() != Some(task_id) {
            return;
        }
        if self
            .selector
            .push()
            .is_some_and(PushChannel::is_open)
        {
            return;
        }
        if self.stall_notified.swap(true, Ordering::Relaxed) {
            return;
        }
        tracing::warn!(task_id, consecutive_failures, "live updates stalled");
        self.view.notify(&Notification::warning(
            "Live progress updates are delayed; still retrying",
        ));
    }
}

async fn run_deliveries(
    inner: Arc<TrackerInner>,
    mut rx: DeliveryReceiver,
    cancel: CancellationToken,
) {
    loop {
        let delivery = tokio::select! {
            biased;

            () = cancel.cancelled() => break,
            delivery = rx.recv() => match delivery {
                Some(delivery) => delivery,
                None => break,
            },
        };

        match delivery {
            Delivery::Snapshot { source, task } => {
                tracing::trace!(task_id = %task.id, %source, status = %task.status, "snapshot delivered");
                if let Err(err) = inner.handle_snapshot(&task).await {
                    tracing::warn!(task_id = %task.id, %source, error = %err, "failed to apply snapshot");
                }
            },
            Delivery::PollStalled {
                task_id,
                consecutive_failures,
            } => inner.handle_stall(&task_id, consecutive_failures),
        }
    }
}
