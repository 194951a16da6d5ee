//! In-process doubles for the tracker's seams: a scripted task server, a
//! recording page view, and push connectors built from channels.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use tasksync::applier::{Notification, NotificationLevel, UiState};
use tasksync::error::{StorageError, TransportError};
use tasksync::push::{PushConnection, PushConnector};
use tasksync::store::memory::InMemoryBackend;
use tasksync::store::StorageBackend;
use tasksync::types::{CancelTaskResponse, CreateTaskResponse, Task, TaskStatus};
use tasksync::view::ProgressView;
use tasksync::TaskApi;

// ─── Task server ─────────────────────────────────────────────────────────

/// Scripted [`TaskApi`].
///
/// Status requests return the current `status` value after `delay`.
/// Cancel requests block until [`MockApi::release_cancel`] when the gate
/// is enabled.
pub struct MockApi {
    create: Mutex<Result<CreateTaskResponse, TransportError>>,
    status: Mutex<Result<Task, TransportError>>,
    cancel: Mutex<Result<CancelTaskResponse, TransportError>>,
    delay: Mutex<Duration>,
    cancel_gate: Mutex<Option<Arc<Notify>>>,
    create_calls: AtomicUsize,
    status_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockApi {
    pub fn new(task_id: &str) -> Self {
        Self {
            create: Mutex::new(Ok(CreateTaskResponse {
                task_id: task_id.to_string(),
            })),
            status: Mutex::new(Ok(Task::new(task_id, TaskStatus::Pending))),
            cancel: Mutex::new(Ok(CancelTaskResponse { success: true })),
            delay: Mutex::new(Duration::ZERO),
            cancel_gate: Mutex::new(None),
            create_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn set_status(&self, task: Task) {
        *self.status.lock() = Ok(task);
    }

    pub fn fail_status(&self, err: TransportError) {
        *self.status.lock() = Err(err);
    }

    pub fn fail_create(&self, err: TransportError) {
        *self.create.lock() = Err(err);
    }

    pub fn set_cancel(&self, result: Result<CancelTaskResponse, TransportError>) {
        *self.cancel.lock() = result;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn gate_cancel(&self) {
        *self.cancel_gate.lock() = Some(Arc::new(Notify::new()));
    }

    pub fn release_cancel(&self) {
        if let Some(gate) = self.cancel_gate.lock().as_ref() {
            gate.notify_one();
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskApi for MockApi {
    async fn create_task(&self, _params: &Value) -> Result<CreateTaskResponse, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.create.lock().clone()
    }

    async fn get_task_status(&self, _task_id: &str) -> Result<Task, TransportError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let result = self.status.lock().clone();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn cancel_task(&self, _task_id: &str) -> Result<CancelTaskResponse, TransportError> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.cancel_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.cancel.lock().clone()
    }
}

// ─── Storage ─────────────────────────────────────────────────────────────

/// In-memory backend whose writes or deletes can be made to fail.
#[derive(Default)]
pub struct FailingBackend {
    inner: InMemoryBackend,
    fail_put: AtomicBool,
    fail_delete: AtomicBool,
}

impl FailingBackend {
    pub fn fail_put(&self) {
        self.fail_put.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }
}

fn disk_full() -> StorageError {
    StorageError::Backend {
        message: "disk full".to_string(),
    }
}

#[async_trait]
impl StorageBackend for FailingBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.put(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(disk_full());
        }
        self.inner.delete(key).await
    }
}

// ─── Page view ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Show(String),
    Update(UiState),
    Hide,
    Render(String, Value),
    Notify(Notification),
}

/// [`ProgressView`] that records every call.
#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Notify(n) => Some(n.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn notifications_at(&self, level: NotificationLevel) -> Vec<Notification> {
        self.notifications()
            .into_iter()
            .filter(|n| n.level == level)
            .collect()
    }

    pub fn renders(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Render(id, v) => Some((id.clone(), v.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn percentages(&self) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Update(ui) => Some(ui.percentage),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: impl Fn(&ViewEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| wanted(e)).count()
    }
}

impl ProgressView for RecordingView {
    fn show_progress(&self, task_id: &str) {
        self.events.lock().push(ViewEvent::Show(task_id.to_string()));
    }

    fn update_progress(&self, state: &UiState) {
        self.events.lock().push(ViewEvent::Update(state.clone()));
    }

    fn hide_progress(&self) {
        self.events.lock().push(ViewEvent::Hide);
    }

    fn render_result(&self, task_id: &str, result: &Value) {
        self.events
            .lock()
            .push(ViewEvent::Render(task_id.to_string(), result.clone()));
    }

    fn notify(&self, notification: &Notification) {
        self.events.lock().push(ViewEvent::Notify(notification.clone()));
    }
}

// ─── Push connector ──────────────────────────────────────────────────────

/// Server end of an in-process push connection.
pub struct ServerEnd {
    to_client: fmpsc::UnboundedSender<Result<String, TransportError>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Sends one text frame to the client.
    pub async fn send(&mut self, frame: impl Into<String>) {
        let _ = self.to_client.send(Ok(frame.into())).await;
    }

    /// Sends a `task_update` envelope for `task`.
    pub async fn send_update(&mut self, task: &Task) {
        let frame = serde_json::json!({
            "type": "task_update",
            "task_id": task.id,
            "data": task,
        });
        self.send(frame.to_string()).await;
    }

    /// Waits for the next frame sent by the client.
    pub async fn recv(&mut self) -> Option<String> {
        futures::StreamExt::next(&mut self.from_client).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Accept,
    Fail,
}

/// [`PushConnector`] whose attempts follow a script. Attempts past the
/// end of the script fail. Accepted connections are handed to the test
/// through [`ScriptedConnector::next_server`].
pub struct ScriptedConnector {
    script: Mutex<VecDeque<Attempt>>,
    attempts: AtomicUsize,
    servers_tx: mpsc::UnboundedSender<ServerEnd>,
    servers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEnd>>,
}

impl ScriptedConnector {
    pub fn new(script: impl IntoIterator<Item = Attempt>) -> Self {
        let (servers_tx, servers_rx) = mpsc::unbounded_channel();
        Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: AtomicUsize::new(0),
            servers_tx,
            servers_rx: tokio::sync::Mutex::new(servers_rx),
        }
    }

    pub fn failing() -> Self {
        Self::new([])
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Waits for the next accepted connection.
    pub async fn next_server(&self) -> ServerEnd {
        self.servers_rx
            .lock()
            .await
            .recv()
            .await
            .expect("connector dropped")
    }
}

#[async_trait]
impl PushConnector for ScriptedConnector {
    async fn connect(&self) -> Result<PushConnection, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let attempt = self.script.lock().pop_front().unwrap_or(Attempt::Fail);
        match attempt {
            Attempt::Fail => Err(TransportError::Connection {
                message: "connection refused".to_string(),
            }),
            Attempt::Accept => {
                let (to_client, client_rx) = fmpsc::unbounded();
                let (client_tx, from_client) = fmpsc::unbounded();
                let _ = self.servers_tx.send(ServerEnd {
                    to_client,
                    from_client,
                });
                Ok(PushConnection::from_parts(
                    client_tx.sink_map_err(|_| TransportError::Closed),
                    client_rx,
                ))
            },
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────

/// Yields to the runtime until `cond` holds, advancing paused time in
/// small steps. Panics after `limit` of simulated time.
pub async fn eventually(limit: Duration, mut cond: impl FnMut() -> bool) {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while !cond() {
        assert!(waited < limit, "condition not met within {limit:?}");
        tokio::time::sleep(step).await;
        waited += step;
    }
}
