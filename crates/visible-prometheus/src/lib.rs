// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter.
//!
//! Engine crates record through the `metrics` facade (see [`recording`]);
//! this adapter installs the Prometheus recorder and renders the text
//! exposition served at `GET /metrics`.

pub mod recording;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use visible_core::types::{AdapterType, HealthStatus};
use visible_core::{PluginAdapter, VisibleError};

pub use recording::{
    record_chat_message, record_distance_broadcast, record_expired_messages,
    record_push_delivery, record_session_transition, set_active_sessions,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and keeps the handle used to render the
/// text exposition.
pub struct PrometheusAdapter {
    /// Handle onto the globally installed recorder.
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn new() -> Result<Self, VisibleError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            VisibleError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, VisibleError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VisibleError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The recorder is process-global, so everything that needs it lives in
    // this one test.
    #[tokio::test]
    async fn renders_recorded_metrics() {
        let adapter = PrometheusAdapter::new().unwrap();
        assert!(PrometheusAdapter::new().is_err());

        record_session_transition("waiting");
        record_chat_message();
        record_push_delivery(false);
        set_active_sessions(3.0);

        let text = adapter.render();
        assert!(text.contains("visible_sessions_total"));
        assert!(text.contains("state=\"waiting\""));
        assert!(text.contains("visible_chat_messages_total"));
        assert!(text.contains("outcome=\"failed\""));
        assert!(text.contains("visible_active_sessions"));
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
