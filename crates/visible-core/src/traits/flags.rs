// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Availability and searching flags owned by the profile store.

use async_trait::async_trait;

use crate::error::VisibleError;
use crate::types::UserId;

/// Narrow capability over the per-user marketplace flags.
///
/// Only the session state machine flips these, and only on session creation
/// and cancellation.
#[async_trait]
pub trait AvailabilityFlags: Send + Sync + 'static {
    /// Set whether a provider is offered new work.
    async fn set_provider_available(
        &self,
        provider_id: UserId,
        available: bool,
    ) -> Result<(), VisibleError>;

    /// Set whether a seeker is still searching for a provider.
    async fn set_seeker_searching(&self, seeker_id: UserId, searching: bool)
    -> Result<(), VisibleError>;
}
