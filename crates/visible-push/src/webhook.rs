// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP webhook push notifier.
//!
//! Each notification is POSTed as JSON to the configured push gateway.
//! Transient failures (429, 500, 502, 503) are retried once after a short
//! delay; any other non-success status is reported as a failed delivery.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use visible_core::types::{AdapterType, HealthStatus, PushNotification, PushOutcome};
use visible_core::{PluginAdapter, PushNotifier, UserId, VisibleError};

const RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    user_id: UserId,
    title: &'a str,
    body: &'a str,
    data: &'a BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    message_id: Option<String>,
}

/// Delivers notifications to an HTTP push gateway.
#[derive(Debug, Clone)]
pub struct WebhookPushNotifier {
    client: reqwest::Client,
    endpoint: String,
    max_retries: u32,
}

impl WebhookPushNotifier {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, VisibleError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key {
            let mut value = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| VisibleError::Config(format!("invalid push api key: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| VisibleError::Delivery {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint,
            max_retries: 1,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn is_transient(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

#[async_trait]
impl PluginAdapter for WebhookPushNotifier {
    fn name(&self) -> &str {
        "webhook-push"
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
impl PushNotifier for WebhookPushNotifier {
    async fn deliver(
        &self,
        user_id: UserId,
        notification: &PushNotification,
    ) -> Result<PushOutcome, VisibleError> {
        let request = PushRequest {
            user_id,
            title: &notification.title,
            body: &notification.body,
            data: &notification.metadata,
        };

        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .map_err(|e| VisibleError::Delivery {
                    message: format!("push request failed: {e}"),
                    source: Some(Box::new(e)),
                })?;

            let status = response.status();
            debug!(status = %status, attempt, user_id, "push gateway responded");

            if status.is_success() {
                let message_id = response
                    .json::<PushResponse>()
                    .await
                    .ok()
                    .and_then(|r| r.message_id);
                return Ok(PushOutcome::Sent { message_id });
            }

            let body = response.text().await.unwrap_or_default();
            if is_transient(status) && attempt < self.max_retries {
                warn!(status = %status, user_id, "transient push failure, will retry");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
                continue;
            }

            return Ok(PushOutcome::Failed {
                reason: format!("push gateway returned {status}: {body}"),
            });
        }
    }
}
