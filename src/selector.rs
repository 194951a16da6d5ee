//! Channel selector: push when open, poll otherwise.
//!
//! [`ChannelSelector::subscribe`] sends a push subscribe frame if the
//! push connection is open and starts the poll channel if it is not. It
//! also re-evaluates whenever the push channel changes state:
//!
//! - push closes (or downgrades) while a subscription is active and
//!   polling is not running: polling starts, so progress keeps flowing
//!   during reconnects;
//! - push re-opens: the push channel re-subscribes on its own. Polling is
//!   left running; the progress applier makes duplicate deliveries
//!   harmless.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::poll::PollChannel;
use crate::push::{ConnectionState, PushChannel};

/// Delivery path chosen for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Push subscribe frame sent.
    Push,
    /// Poll channel started.
    Poll,
}

/// Routes subscriptions to the push or poll channel.
pub struct ChannelSelector {
    push: Option<PushChannel>,
    poll: Arc<PollChannel>,
    active: Arc<Mutex<Option<String>>>,
}

impl ChannelSelector {
    /// Creates a selector. `push` is `None` when the page has no push endpoint.
    pub fn new(push: Option<PushChannel>, poll: PollChannel) -> Self {
        Self {
            push,
            poll: Arc::new(poll),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribes to updates for `task_id`.
    ///
    /// If push is not open and not downgraded, a connect cycle is kicked
    /// off so a later open can take over from polling.
    pub fn subscribe(&self, task_id: &str) -> ChannelKind {
        *self.active.lock() = Some(task_id.to_string());

        if let Some(push) = &self.push {
            if push.subscribe(task_id) {
                tracing::debug!(task_id, "subscribed via push");
                return ChannelKind::Push;
            }
            if !push.is_downgraded() && push.connect() {
                tracing::debug!(task_id, "push closed, reconnect started");
            }
        }

        self.poll.start(task_id);
        tracing::debug!(task_id, "subscribed via poll");
        ChannelKind::Poll
    }

    /// Ends the active subscription and stops polling.
    pub fn unsubscribe(&self) {
        *self.active.lock() = None;
        if let Some(push) = &self.push {
            push.unsubscribe();
        }
        self.poll.stop();
    }

    /// Returns the active subscription.
    pub fn active_task(&self) -> Option<String> {
        self.active.lock().clone()
    }

    /// Returns the push channel, if configured.
    pub fn push(&self) -> Option<&PushChannel> {
        self.push.as_ref()
    }

    /// Returns the poll channel.
    pub fn poll(&self) -> &PollChannel {
        &self.poll
    }

    /// Spawns the task that re-evaluates subscriptions on push state changes.
    ///
    /// Returns `None` when there is no push channel.
    pub fn spawn_failover(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let push = self.push.clone()?;
        let poll = Arc::clone(&self.poll);
        let active = Arc::clone(&self.active);
        let mut states = push.watch_state();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => break,
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let state = *states.borrow_and_update();
                // Held across `poll.start` so a concurrent `unsubscribe`
                // either runs first or stops the poll it started.
                let active = active.lock();
                let Some(task_id) = active.as_deref() else {
                    continue;
                };
                match state.connection {
                    ConnectionState::Closed if !poll.is_running() => {
                        tracing::info!(
                            %task_id,
                            downgraded = state.downgraded,
                            "push unavailable, falling back to polling"
                        );
                        poll.start(task_id);
                    },
                    ConnectionState::Open => {
                        tracing::debug!(%task_id, "push open again, resubscribed");
                    },
                    _ => {},
                }
            }
        }))
    }
}
