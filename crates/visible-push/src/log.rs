// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use tracing::info;
use visible_core::types::{AdapterType, HealthStatus, PushNotification, PushOutcome};
use visible_core::{PluginAdapter, PushNotifier, UserId, VisibleError};

/// Notifier that writes each notification to the log and reports it sent.
#[derive(Debug, Default)]
pub struct LogPushNotifier;

impl LogPushNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PluginAdapter for LogPushNotifier {
    fn name(&self) -> &str {
        "log-push"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Push
    }

    async fn health_check(&self) -> Result<HealthStatus, VisibleError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VisibleError> {
        Ok(())
    }
}

#[async_trait]
impl PushNotifier for LogPushNotifier {
    async fn deliver(
        &self,
        user_id: UserId,
        notification: &PushNotification,
    ) -> Result<PushOutcome, VisibleError> {
        info!(
            user_id,
            title = %notification.title,
            kind = notification.metadata.get("type").map(String::as_str).unwrap_or("-"),
            "push (log only)"
        );
        Ok(PushOutcome::Sent { message_id: None })
    }
}
