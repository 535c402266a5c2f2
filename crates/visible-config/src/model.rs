// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use serde::{Deserialize, Serialize};

/// Top-level Visible configuration.
///
/// Every section is optional and defaults to values suitable for local use.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VisibleConfig {
    /// HTTP and WebSocket listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// SQLite storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Bearer token signing.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Work-session engine tuning.
    #[serde(default)]
    pub session: SessionConfig,

    /// Push-notification webhook.
    #[serde(default)]
    pub push: PushConfig,

    /// Log filter.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics exporter.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// HTTP and WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("visible").join("visible.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("visible.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Bearer token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HMAC secret used to sign and verify tokens. Required to serve.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Lifetime of minted tokens.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

fn default_token_ttl_secs() -> u64 {
    7 * 24 * 3600
}

/// Work-session engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Displacement that forces a distance broadcast.
    #[serde(default = "default_distance_threshold_meters")]
    pub distance_threshold_meters: f64,

    /// Minimum time between periodic distance broadcasts.
    #[serde(default = "default_recheck_interval_secs")]
    pub recheck_interval_secs: u64,

    /// How long chat survives after a session ends.
    #[serde(default = "default_chat_retention_hours")]
    pub chat_retention_hours: u64,

    /// Typing indicators older than this are forced back to false.
    #[serde(default = "default_typing_stale_secs")]
    pub typing_stale_secs: u64,

    /// Period of the maintenance sweeper.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Maximum chat message length in characters.
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Capacity of each connection's outbound frame queue.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            distance_threshold_meters: default_distance_threshold_meters(),
            recheck_interval_secs: default_recheck_interval_secs(),
            chat_retention_hours: default_chat_retention_hours(),
            typing_stale_secs: default_typing_stale_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_message_length: default_max_message_length(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

fn default_distance_threshold_meters() -> f64 {
    50.0
}

fn default_recheck_interval_secs() -> u64 {
    30
}

fn default_chat_retention_hours() -> u64 {
    24
}

fn default_typing_stale_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_message_length() -> usize {
    2000
}

fn default_outbound_buffer() -> usize {
    64
}

/// Push-notification webhook configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    /// Send pushes through the webhook. When false, pushes are only logged.
    #[serde(default)]
    pub enabled: bool,

    /// Webhook URL receiving push requests.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer key sent to the webhook.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout for the webhook.
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            timeout_secs: default_push_timeout_secs(),
        }
    }
}

fn default_push_timeout_secs() -> u64 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Serve `GET /metrics`.
    #[serde(default = "default_prometheus_enabled")]
    pub enabled: bool,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: default_prometheus_enabled(),
        }
    }
}

fn default_prometheus_enabled() -> bool {
    true
}
