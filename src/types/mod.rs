//! Wire and channel types.
//!
//! - [`task`] - task snapshots and REST responses.
//! - [`message`] - push channel envelopes.
//! - [`delivery`] - what the channels hand to the tracker.

pub mod delivery;
pub mod message;
pub mod task;

pub use delivery::{Delivery, DeliverySource};
pub use message::{ClientMessage, ServerMessage};
pub use task::*;
