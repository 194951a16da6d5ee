//! Channel-to-tracker delivery events.
//!
//! Both channels push [`Delivery`] values into one unbounded queue that a
//! single tracker task drains, so snapshot application is serialized no
//! matter which channel produced the snapshot.

use std::fmt;

use tokio::sync::mpsc;

use crate::types::task::Task;

/// Which channel produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeliverySource {
    /// The periodic status request loop.
    Poll,
    /// The shared push connection.
    Push,
}

impl fmt::Display for DeliverySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Poll => write!(f, "poll"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// Event handed from a channel to the tracker.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// A decoded task snapshot.
    Snapshot {
        /// Channel that delivered it.
        source: DeliverySource,
        /// The snapshot.
        task: Task,
    },
    /// The poll channel has failed `consecutive_failures` times in a row
    /// for `task_id`. Polling continues.
    PollStalled {
        /// Task being polled.
        task_id: String,
        /// Number of consecutive failed requests.
        consecutive_failures: u32,
    },
}

/// Sending half of the delivery queue.
pub type DeliverySender = mpsc::UnboundedSender<Delivery>;

/// Receiving half of the delivery queue.
pub type DeliveryReceiver = mpsc::UnboundedReceiver<Delivery>;
