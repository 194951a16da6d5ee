//! Poll channel: periodic single-flight status requests.
//!
//! [`PollChannel::start`] spawns a loop that asks the server for one
//! task's status every interval and forwards each decoded snapshot to the
//! tracker. If the previous request is still in flight when the next tick
//! fires, that tick is skipped rather than queued, so at most one request
//! is outstanding and responses cannot resolve out of order.
//!
//! Request failures are logged and tolerated; the loop keeps ticking.
//! After a configurable number of consecutive failures the channel sends
//! one [`Delivery::PollStalled`] so the tracker can tell the user that
//! live updates are degraded.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::TaskApi;
use crate::types::delivery::{Delivery, DeliverySender, DeliverySource};

/// Counters describing one poll loop, for logging and tests.
#[derive(Debug, Default)]
pub struct PollStats {
    requests: AtomicU64,
    skipped_ticks: AtomicU64,
    failures: AtomicU64,
}

impl PollStats {
    /// Status requests issued.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Ticks skipped because a request was still in flight.
    pub fn skipped_ticks(&self) -> u64 {
        self.skipped_ticks.load(Ordering::Relaxed)
    }

    /// Failed requests.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

struct ActivePoll {
    task_id: String,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    stats: Arc<PollStats>,
}

/// Single-flight periodic status requester.
///
/// Owned by the [`ChannelSelector`](crate::selector::ChannelSelector).
/// Polls at most one task at a time; starting a new task stops the old
/// loop.
pub struct PollChannel {
    api: Arc<dyn TaskApi>,
    interval: Duration,
    stall_threshold: u32,
    sink: DeliverySender,
    parent: CancellationToken,
    active: Mutex<Option<ActivePoll>>,
}

impl PollChannel {
    /// Creates an idle poll channel.
    ///
    /// Loops are cancelled when `parent` is cancelled.
    pub fn new(
        api: Arc<dyn TaskApi>,
        interval: Duration,
        stall_threshold: u32,
        sink: DeliverySender,
        parent: CancellationToken,
    ) -> Self {
        Self {
            api,
            interval,
            stall_threshold,
            sink,
            parent,
            active: Mutex::new(None),
        }
    }

    /// Starts polling `task_id`.
    ///
    /// Returns `false` without doing anything if `task_id` is already
    /// being polled. Any loop for a different task is stopped first.
    /// The first request is issued one interval after the call.
    pub fn start(&self, task_id: &str) -> bool {
        let mut active = self.active.lock();
        if let Some(current) = active.as_ref() {
            if current.task_id == task_id
                && !current.handle.is_finished()
                && !current.cancel.is_cancelled()
            {
                return false;
            }
        }
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
        }

        let cancel = self.parent.child_token();
        let stats = Arc::new(PollStats::default());
        let poll_loop = PollLoop {
            api: Arc::clone(&self.api),
            task_id: task_id.to_string(),
            interval: self.interval,
            stall_threshold: self.stall_threshold,
            sink: self.sink.clone(),
            cancel: cancel.clone(),
            stats: Arc::clone(&stats),
        };
        tracing::debug!(task_id, interval_ms = self.interval.as_millis() as u64, "poll started");
        let handle = tokio::spawn(poll_loop.run());
        *active = Some(ActivePoll {
            task_id: task_id.to_string(),
            cancel,
            handle,
            stats,
        });
        true
    }

    /// Stops the running loop, if any. An in-flight request is abandoned
    /// and its result is never delivered.
    pub fn stop(&self) {
        if let Some(previous) = self.active.lock().take() {
            previous.cancel.cancel();
            tracing::debug!(task_id = %previous.task_id, "poll stopped");
        }
    }

    /// Returns `true` while a loop is running.
    pub fn is_running(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished() && !a.cancel.is_cancelled())
    }

    /// Returns the task currently being polled.
    pub fn current_task(&self) -> Option<String> {
        self.active
            .lock()
            .as_ref()
            .filter(|a| !a.handle.is_finished() && !a.cancel.is_cancelled())
            .map(|a| a.task_id.clone())
    }

    /// Returns the counters of the current (or most recent) loop.
    pub fn stats(&self) -> Option<Arc<PollStats>> {
        self.active.lock().as_ref().map(|a| Arc::clone(&a.stats))
    }
}

impl Drop for PollChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollLoop {
    api: Arc<dyn TaskApi>,
    task_id: String,
    interval: Duration,
    stall_threshold: u32,
    sink: DeliverySender,
    cancel: CancellationToken,
    stats: Arc<PollStats>,
}

impl PollLoop {
    async fn run(self) {
        let shared = Arc::new(self);
        let in_flight = Arc::new(AtomicBool::new(false));
        let consecutive_failures = Arc::new(AtomicU32::new(0));
        let mut tick = tokio::time::interval_at(Instant::now() + shared.interval, shared.interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                () = shared.cancel.cancelled() => break,
                _ = tick.tick() => {}
            }

            // The check and the set must happen at tick time, before any await.
            if in_flight.swap(true, Ordering::AcqRel) {
                shared.stats.skipped_ticks.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(task_id = %shared.task_id, "poll tick skipped, request in flight");
                continue;
            }

            let request = Arc::clone(&shared);
            let in_flight = Arc::clone(&in_flight);
            let consecutive_failures = Arc::clone(&consecutive_failures);
            tokio::spawn(async move {
                request.poll_once(&consecutive_failures).await;
                in_flight.store(false, Ordering::Release);
            });
        }
    }

    async fn poll_once(&self, consecutive_failures: &AtomicU32) {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let result = tokio::select! {
            biased;

            () = self.cancel.cancelled() => return,
            result = self.api.get_task_status(&self.task_id) => result,
        };
        if self.cancel.is_cancelled() {
            return;
        }

        match result {
            Ok(mut task) => {
                consecutive_failures.store(0, Ordering::Relaxed);
                if task.id.is_empty() {
                    task.id.clone_from(&self.task_id);
                }
                let terminal = task.is_terminal();
                tracing::trace!(task_id = %self.task_id, status = %task.status, "poll snapshot");
                let delivered = self
                    .sink
                    .send(Delivery::Snapshot {
                        source: DeliverySource::Poll,
                        task,
                    })
                    .is_ok();
                if terminal || !delivered {
                    self.cancel.cancel();
                }
            },
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                let failures = consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    task_id = %self.task_id,
                    category = err.category(),
                    failures,
                    error = %err,
                    "poll request failed"
                );
                if failures == self.stall_threshold {
                    let _ = self.sink.send(Delivery::PollStalled {
                        task_id: self.task_id.clone(),
                        consecutive_failures: failures,
                    });
                }
            },
        }
    }
}
