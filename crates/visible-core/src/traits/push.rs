// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push-notification collaborator trait.

use async_trait::async_trait;

use crate::error::VisibleError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PushNotification, PushOutcome, UserId};

/// Best-effort delivery to a user's offline devices.
///
/// No delivery receipt flows back into the engine. A transport error is
/// returned as `Err(Delivery)`; a rejection by the provider as
/// `Ok(PushOutcome::Failed)`.
#[async_trait]
pub trait PushNotifier: PluginAdapter {
    async fn deliver(
        &self,
        user_id: UserId,
        notification: &PushNotification,
    ) -> Result<PushOutcome, VisibleError>;
}
