// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push-notification collaborators.
//!
//! [`WebhookPushNotifier`] forwards notifications to an HTTP push gateway.
//! [`LogPushNotifier`] only logs them and is used when push is disabled.

pub mod log;
pub mod webhook;

use std::sync::Arc;

use visible_config::model::PushConfig;
use visible_core::{PushNotifier, VisibleError};

pub use log::LogPushNotifier;
pub use webhook::WebhookPushNotifier;

/// Pick the notifier described by the `[push]` section.
pub fn build_notifier(config: &PushConfig) -> Result<Arc<dyn PushNotifier>, VisibleError> {
    if !config.enabled {
        return Ok(Arc::new(LogPushNotifier::new()));
    }
    let endpoint = config
        .endpoint
        .clone()
        .ok_or_else(|| VisibleError::Config("push.endpoint is required when push is enabled".into()))?;
    Ok(Arc::new(WebhookPushNotifier::new(
        endpoint,
        config.api_key.clone(),
        config.timeout_secs,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_push_logs_only() {
        let notifier = build_notifier(&PushConfig::default()).unwrap();
        assert_eq!(notifier.name(), "log-push");
    }

    #[test]
    fn enabled_push_needs_endpoint() {
        let config = PushConfig {
            enabled: true,
            ..PushConfig::default()
        };
        assert!(matches!(
            build_notifier(&config),
            Err(VisibleError::Config(_))
        ));
    }

    #[test]
    fn enabled_push_uses_webhook() {
        let config = PushConfig {
            enabled: true,
            endpoint: Some("https://push.example.com/send".into()),
            ..PushConfig::default()
        };
        assert_eq!(build_notifier(&config).unwrap().name(), "webhook-push");
    }
}
