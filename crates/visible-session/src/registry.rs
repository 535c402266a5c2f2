// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-session mutual exclusion and lifecycle handles.
//!
//! The durable record lives in storage. The registry holds what must not
//! be shared between two concurrent mutations of one session: the session
//! mutex, the distance throttle state guarded by it, and the handle of the
//! session's recheck ticker.

use std::sync::{Arc, Mutex as StdMutex};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use visible_core::SessionId;

use crate::ticker::TickerHandle;
use crate::tracker::DistanceThrottle;

/// State only reachable while holding a session's lock.
#[derive(Debug, Default)]
pub struct SlotState {
    pub throttle: DistanceThrottle,
}

/// Registry entry for one session.
#[derive(Default)]
pub struct SessionSlot {
    state: Arc<Mutex<SlotState>>,
    ticker: StdMutex<Option<TickerHandle>>,
}

/// Exclusive access to one session for the lifetime of the guard.
pub type SessionGuard = OwnedMutexGuard<SlotState>;

/// Map from session id to its slot.
#[derive(Default)]
pub struct SessionRegistry {
    slots: DashMap<SessionId, Arc<SessionSlot>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, id: &SessionId) -> Arc<SessionSlot> {
        self.slots.entry(id.clone()).or_default().clone()
    }

    /// Wait for exclusive access to a session.
    ///
    /// The DashMap shard lock is released before awaiting the session mutex.
    pub async fn lock(&self, id: &SessionId) -> SessionGuard {
        let state = self.slot(id).state.clone();
        state.lock_owned().await
    }

    /// Install the recheck ticker for a session, stopping any previous one.
    pub fn attach_ticker(&self, id: &SessionId, handle: TickerHandle) {
        let slot = self.slot(id);
        let previous = match slot.ticker.lock() {
            Ok(mut ticker) => ticker.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Stop the session's ticker. Returns true only for the call that
    /// actually stopped it.
    pub fn stop_ticker(&self, id: &SessionId) -> bool {
        let Some(slot) = self.slots.get(id).map(|s| s.clone()) else {
            return false;
        };
        let handle = match slot.ticker.lock() {
            Ok(mut ticker) => ticker.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match handle {
            Some(handle) => {
                handle.stop();
                debug!(session_id = %id, "recheck ticker stopped");
                true
            }
            None => false,
        }
    }

    /// Forget a terminated session.
    ///
    /// Callers still holding a guard keep their slot alive. A later call
    /// creates a fresh slot, sees the terminal record in storage and
    /// discards it again.
    pub fn forget(&self, id: &SessionId) {
        self.stop_ticker(id);
        self.slots.remove(id);
    }

    /// Drop the slot of a session that is unknown or already over.
    ///
    /// A slot with a running ticker belongs to a live session and is kept.
    pub fn discard_idle(&self, id: &SessionId) {
        self.slots.remove_if(id, |_, slot| match slot.ticker.lock() {
            Ok(ticker) => ticker.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        });
    }

    /// Number of sessions currently holding a slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether a ticker is currently attached to the session.
    pub fn has_ticker(&self, id: &SessionId) -> bool {
        self.slots.get(id).is_some_and(|slot| match slot.ticker.lock() {
            Ok(ticker) => ticker.is_some(),
            Err(poisoned) => poisoned.into_inner().is_some(),
        })
    }

    /// Number of sessions with a running ticker.
    pub fn running_tickers(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| match slot.ticker.lock() {
                Ok(ticker) => ticker.is_some(),
                Err(poisoned) => poisoned.into_inner().is_some(),
            })
            .count()
    }

    /// Stop every ticker. Used at shutdown.
    pub fn stop_all(&self) {
        let ids: Vec<SessionId> = self.slots.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop_ticker(&id);
        }
    }
}
