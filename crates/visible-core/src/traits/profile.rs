// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Read-only profile lookup.

use async_trait::async_trait;

use crate::error::VisibleError;
use crate::types::{ProfileSummary, UserId};

/// Resolves display-safe identity fragments.
///
/// Used for assignment-level notifications only. Results never reach chat
/// payloads.
#[async_trait]
pub trait ProfileLookup: Send + Sync + 'static {
    async fn profile(&self, user_id: UserId) -> Result<Option<ProfileSummary>, VisibleError>;
}
