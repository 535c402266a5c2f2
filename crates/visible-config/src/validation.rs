// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::VisibleConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &VisibleConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let host = config.server.host.trim();
    if host.is_empty() {
        fail("server.host must not be empty".to_string());
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "server.host `{host}` is not a valid IP address or hostname"
            ));
        }
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.auth.token_ttl_secs == 0 {
        fail("auth.token_ttl_secs must be positive".to_string());
    }

    let session = &config.session;
    if !(session.distance_threshold_meters.is_finite() && session.distance_threshold_meters > 0.0)
    {
        fail(format!(
            "session.distance_threshold_meters must be positive, got {}",
            session.distance_threshold_meters
        ));
    }
    for (name, value) in [
        ("recheck_interval_secs", session.recheck_interval_secs),
        ("typing_stale_secs", session.typing_stale_secs),
        ("sweep_interval_secs", session.sweep_interval_secs),
    ] {
        if value == 0 {
            fail(format!("session.{name} must be positive"));
        }
    }
    if session.chat_retention_hours < 1 {
        fail("session.chat_retention_hours must be at least 1".to_string());
    }
    if session.max_message_length == 0 {
        fail("session.max_message_length must be positive".to_string());
    }
    if session.outbound_buffer == 0 {
        fail("session.outbound_buffer must be positive".to_string());
    }

    if config.push.enabled {
        match config.push.endpoint.as_deref().map(str::trim) {
            None | Some("") => {
                fail("push.endpoint is required when push.enabled = true".to_string())
            }
            Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                fail(format!("push.endpoint `{url}` must be an http(s) URL"))
            }
            Some(_) => {}
        }
    }
    if config.push.timeout_secs == 0 {
        fail("push.timeout_secs must be positive".to_string());
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        fail(format!(
            "logging.level `{}` must be one of {}",
            config.logging.level,
            LOG_LEVELS.join(", ")
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
