//! Push channel: shared duplex connection with bounded reconnect.
//!
//! One [`PushChannel`] per page owns one connection to the push endpoint.
//! The server multiplexes updates for many tasks over it; the channel
//! forwards only `task_update` frames for the page's active task.
//!
//! # Reconnect policy
//!
//! ```text
//! closed -> connecting -> open
//!   ^           |          |
//!   +-----------+----------+   failure or close: retry_count += 1
//! ```
//!
//! - After a failed attempt or a close, the channel waits a fixed delay
//!   and reconnects, as long as `retry_count < max_retry` and a
//!   subscription is active. Without one the cycle ends; the next
//!   subscribe starts a new cycle and the retry count carries over.
//! - When `retry_count` reaches `max_retry` the channel sets
//!   `downgraded`, which is never cleared. No further connection attempts
//!   are made and every later subscription uses polling.
//! - A successful open resets `retry_count` to 0 and re-sends the
//!   subscribe frame for the active task.

pub mod transport;

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use transport::{PushConnection, PushConnector, WsConnector};

use crate::config::PushConfig;
use crate::error::TransportError;
use crate::types::delivery::{Delivery, DeliverySender, DeliverySource};
use crate::types::message::{ClientMessage, ServerMessage};

/// Connection phase of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection and no attempt in progress.
    Closed,
    /// A connection attempt is in progress.
    Connecting,
    /// Connected; subscribe frames can be sent.
    Open,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Observable state of a [`PushChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    /// Current connection phase.
    pub connection: ConnectionState,
    /// Consecutive failed attempts or closes since the last open.
    pub retry_count: u32,
    /// Set once retries are exhausted; never cleared.
    pub downgraded: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            connection: ConnectionState::Closed,
            retry_count: 0,
            downgraded: false,
        }
    }
}

struct PushShared {
    config: PushConfig,
    connector: Arc<dyn PushConnector>,
    sink: DeliverySender,
    cancel: CancellationToken,
    state: watch::Sender<ChannelState>,
    active_task: Mutex<Option<String>>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

/// Per-page push connection with bounded reconnect and permanent downgrade.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct PushChannel {
    shared: Arc<PushShared>,
}

impl PushChannel {
    /// Creates a closed channel. Call [`connect`](Self::connect) to open it.
    pub fn new(
        config: PushConfig,
        connector: Arc<dyn PushConnector>,
        sink: DeliverySender,
        parent: &CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::default());
        Self {
            shared: Arc::new(PushShared {
                config,
                connector,
                sink,
                cancel: parent.child_token(),
                state,
                active_task: Mutex::new(None),
                outbound: Mutex::new(None),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Starts a connect cycle.
    ///
    /// Returns `false` without doing anything if the channel is downgraded,
    /// shut down, or a cycle (including a pending reconnect) is already
    /// running. The retry count carries over between cycles.
    pub fn connect(&self) -> bool {
        if self.is_downgraded() || self.shared.cancel.is_cancelled() {
            return false;
        }
        let mut supervisor = self.shared.supervisor.lock();
        if supervisor.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        *supervisor = Some(tokio::spawn(supervise(Arc::clone(&self.shared))));
        true
    }

    /// Records `task_id` as the active subscription and sends a subscribe
    /// frame if the connection is open.
    ///
    /// Returns `true` if the frame was sent. `false` tells the caller to
    /// poll instead; the subscription is still recorded so a later open
    /// re-subscribes.
    pub fn subscribe(&self, task_id: &str) -> bool {
        *self.shared.active_task.lock() = Some(task_id.to_string());
        if self.state().connection != ConnectionState::Open {
            return false;
        }
        self.shared.send_subscribe(task_id)
    }

    /// Forgets the active subscription. No frame is sent; the server drops
    /// the subscription when the task ends.
    pub fn unsubscribe(&self) {
        *self.shared.active_task.lock() = None;
    }

    /// Returns the active subscription.
    pub fn active_task(&self) -> Option<String> {
        self.shared.active_task.lock().clone()
    }

    /// Returns the current state.
    pub fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }

    /// Returns a receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Returns `true` while connected.
    pub fn is_open(&self) -> bool {
        self.state().connection == ConnectionState::Open
    }

    /// Returns `true` once retries are exhausted.
    pub fn is_downgraded(&self) -> bool {
        self.state().downgraded
    }

    /// Closes the connection and stops reconnecting for good.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
    }
}

impl PushShared {
    fn update(&self, f: impl FnOnce(&mut ChannelState)) {
        self.state.send_modify(f);
    }

    fn send_subscribe(&self, task_id: &str) -> bool {
        let frame = match ClientMessage::subscribe(task_id).encode() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(task_id, error = %err, "failed to encode subscribe frame");
                return false;
            },
        };
        let sent = self
            .outbound
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok());
        if sent {
            tracing::debug!(task_id, "push subscribe sent");
        }
        sent
    }

    /// Decodes one inbound frame and forwards it if it concerns the active task.
    fn dispatch(&self, text: &str) {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(error = %err, "ignoring undecodable push frame");
                return;
            },
        };
        let Some((task_id, task)) = message.into_task_update() else {
            return;
        };
        let active = self.active_task.lock().clone();
        if active.as_deref() != Some(task_id.as_str()) {
            tracing::trace!(%task_id, "push update for inactive task filtered");
            return;
        }
        let _ = self.sink.send(Delivery::Snapshot {
            source: DeliverySource::Push,
            task,
        });
    }
}

/// Connect/reconnect loop. Returns when the channel downgrades, shuts
/// down, or fails with no active subscription.
async fn supervise(shared: Arc<PushShared>) {
    loop {
        shared.update(|s| s.connection = ConnectionState::Connecting);
        tracing::debug!(url = %shared.config.url, "push connecting");

        let attempt = tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                shared.update(|s| s.connection = ConnectionState::Closed);
                return;
            }
            attempt = shared.connector.connect() => attempt,
        };

        match attempt {
            Ok(connection) => {
                let (tx, rx) = mpsc::unbounded_channel();
                *shared.outbound.lock() = Some(tx);
                shared.update(|s| {
                    s.connection = ConnectionState::Open;
                    s.retry_count = 0;
                });
                tracing::info!(url = %shared.config.url, "push connection open");

                let active = shared.active_task.lock().clone();
                if let Some(task_id) = active {
                    shared.send_subscribe(&task_id);
                }

                let reason = run_connection(&shared, connection, rx).await;
                *shared.outbound.lock() = None;
                if shared.cancel.is_cancelled() {
                    shared.update(|s| s.connection = ConnectionState::Closed);
                    return;
                }
                tracing::info!(reason = %reason, "push connection closed");
            },
            Err(err) => {
                tracing::warn!(
                    url = %shared.config.url,
                    category = err.category(),
                    error = %err,
                    "push connection attempt failed"
                );
            },
        }

        let mut retry_count = 0;
        let mut downgraded = false;
        let max_retry = shared.config.max_retry;
        shared.update(|s| {
            s.connection = ConnectionState::Closed;
            s.retry_count += 1;
            if s.retry_count >= max_retry {
                s.downgraded = true;
            }
            retry_count = s.retry_count;
            downgraded = s.downgraded;
        });

        if downgraded {
            tracing::warn!(retry_count, "push retries exhausted, downgrading to polling");
            return;
        }
        if shared.active_task.lock().is_none() {
            tracing::debug!(retry_count, "no active subscription, not reconnecting");
            return;
        }
        tracing::debug!(
            retry_count,
            delay_ms = shared.config.reconnect_delay_ms,
            "push reconnect scheduled"
        );
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => return,
            () = tokio::time::sleep(shared.config.reconnect_delay()) => {}
        }
    }
}

/// Pumps one open connection until it closes or the channel shuts down.
async fn run_connection(
    shared: &PushShared,
    connection: PushConnection,
    mut outbound: mpsc::UnboundedReceiver<String>,
) -> TransportError {
    let PushConnection {
        mut sink,
        mut stream,
    } = connection;

    loop {
        tokio::select! {
            biased;

            () = shared.cancel.cancelled() => {
                let _ = sink.close().await;
                return TransportError::Closed;
            }
            Some(frame) = outbound.recv() => {
                if let Err(err) = sink.send(frame).await {
                    return err;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(text)) => shared.dispatch(&text),
                Some(Err(err)) => return err,
                None => return TransportError::Closed,
            },
        }
    }
}
