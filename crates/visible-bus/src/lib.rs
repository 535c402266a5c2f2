// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Real-time fan-out between the session engine and live connections.
//!
//! The engine publishes [`Envelope`]s to a [`Topic`]; every live connection
//! subscribes to its user topic and to the session topics it has joined,
//! then keeps only envelopes addressed to its role. [`InMemoryBus`] serves
//! a single process; a distributed implementation only has to provide the
//! same [`EventBus`] contract.

pub mod events;
pub mod memory;

pub use events::{Audience, BusEvent, Envelope, Topic};
pub use memory::InMemoryBus;

use tokio::sync::broadcast;

/// A per-connection stream of envelopes from one topic.
pub type Subscription = broadcast::Receiver<Envelope>;

/// Publish/subscribe contract used by the engine and the gateway.
pub trait EventBus: Send + Sync + 'static {
    /// Fan an envelope out to current subscribers of `topic`.
    ///
    /// Never blocks and never fails: with no subscriber the envelope is
    /// dropped. Returns the number of subscribers reached.
    fn publish(&self, topic: &Topic, envelope: Envelope) -> usize;

    /// Start receiving envelopes published to `topic` from now on.
    fn subscribe(&self, topic: &Topic) -> Subscription;

    /// Drop topics nobody listens to any more.
    fn cleanup(&self);
}
