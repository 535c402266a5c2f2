// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-process bus over topic-keyed broadcast channels.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::{Envelope, EventBus, Subscription, Topic};

/// Default number of envelopes buffered per topic for a slow subscriber.
const DEFAULT_CAPACITY: usize = 256;

/// In-process [`EventBus`].
pub struct InMemoryBus {
    /// One broadcast sender per live topic.
    channels: DashMap<Topic, broadcast::Sender<Envelope>>,
    /// Per-topic buffer size.
    capacity: usize,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of live topics.
    pub fn topic_count(&self) -> usize {
        self.channels.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, topic: &Topic, envelope: Envelope) -> usize {
        let kind = envelope.event.kind();
        let reached = self
            .channels
            .get(topic)
            .and_then(|tx| tx.send(envelope).ok())
            .unwrap_or(0);
        trace!(%topic, kind, reached, "published");
        reached
    }

    fn subscribe(&self, topic: &Topic) -> Subscription {
        self.channels
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    fn cleanup(&self) {
        self.channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}
