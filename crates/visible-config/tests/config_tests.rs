// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Visible configuration system.

use visible_config::diagnostic::ConfigError;
use visible_config::model::VisibleConfig;
use visible_config::{load_and_validate_str, load_config_from_path, load_config_from_str};

#[test]
fn full_toml_deserializes() {
    let toml = r#"
[server]
host = "0.0.0.0"
port = 9000

[storage]
database_path = "/tmp/visible.db"
wal_mode = false

[auth]
token_secret = "s3cret"
token_ttl_secs = 600

[session]
distance_threshold_meters = 75.5
recheck_interval_secs = 15
chat_retention_hours = 48
typing_stale_secs = 30
sweep_interval_secs = 120
max_message_length = 500
outbound_buffer = 16

[push]
enabled = true
endpoint = "https://push.example.com/v1/send"
api_key = "pk-123"
timeout_secs = 3

[logging]
level = "debug"

[prometheus]
enabled = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);
    assert!(!config.storage.wal_mode);
    assert_eq!(config.auth.token_secret.as_deref(), Some("s3cret"));
    assert_eq!(config.session.distance_threshold_meters, 75.5);
    assert_eq!(config.session.recheck_interval_secs, 15);
    assert_eq!(config.session.chat_retention_hours, 48);
    assert_eq!(config.session.outbound_buffer, 16);
    assert!(config.push.enabled);
    assert_eq!(config.push.api_key.as_deref(), Some("pk-123"));
    assert_eq!(config.logging.level, "debug");
    assert!(!config.prometheus.enabled);
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.session.distance_threshold_meters, 50.0);
    assert_eq!(config.session.recheck_interval_secs, 30);
    assert_eq!(config.session.chat_retention_hours, 24);
    assert_eq!(config.session.typing_stale_secs, 60);
    assert!(config.auth.token_secret.is_none());
    assert!(!config.push.enabled);
    assert!(config.prometheus.enabled);
}

#[test]
fn unknown_field_in_section_is_rejected() {
    let toml = r#"
[session]
recheck_intervl_secs = 10
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    let found = errors.iter().any(|e| {
        matches!(e, ConfigError::UnknownKey { key, suggestion, .. }
            if key == "recheck_intervl_secs"
                && suggestion.as_deref() == Some("recheck_interval_secs"))
    });
    assert!(found, "expected unknown key with suggestion, got {errors:?}");
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let result = toml::from_str::<VisibleConfig>("[wallet]\nenabled = true\n");
    assert!(result.is_err());
}

#[test]
fn invalid_type_is_reported() {
    let errors = load_and_validate_str("[server]\nport = \"eighty\"\n").unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key == "server.port")));
}

#[test]
fn validation_runs_after_extraction() {
    let toml = r#"
[push]
enabled = true
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(errors
        .iter()
        .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("push.endpoint"))));
}

#[test]
fn dotted_override_merges_over_toml() {
    use figment::{
        providers::{Format, Serialized, Toml},
        Figment,
    };

    let config: VisibleConfig = Figment::new()
        .merge(Serialized::defaults(VisibleConfig::default()))
        .merge(Toml::string("[session]\nrecheck_interval_secs = 10\n"))
        .merge(("session.recheck_interval_secs", 5))
        .extract()
        .expect("override should merge");
    assert_eq!(config.session.recheck_interval_secs, 5);
}

#[test]
#[serial_test::serial]
fn env_var_overrides_file_value() {
    let dir = std::env::temp_dir().join(format!("visible-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("visible.toml");
    std::fs::write(&path, "[session]\nrecheck_interval_secs = 10\n").unwrap();

    // SAFETY: serialized with other env-mutating tests.
    unsafe { std::env::set_var("VISIBLE_SESSION_RECHECK_INTERVAL_SECS", "7") };
    let config = load_config_from_path(&path);
    unsafe { std::env::remove_var("VISIBLE_SESSION_RECHECK_INTERVAL_SECS") };

    assert_eq!(config.unwrap().session.recheck_interval_secs, 7);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_config_file_is_skipped() {
    let config = load_config_from_path(std::path::Path::new("/nonexistent/visible.toml"))
        .expect("missing file should be skipped");
    assert_eq!(config.server.host, "127.0.0.1");
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let err = ConfigError::Validation {
        message: "session.sweep_interval_secs must be positive".to_string(),
    };
    let mut buf = String::new();
    let diagnostic: &dyn Diagnostic = &err;
    GraphicalReportHandler::new()
        .render_report(&mut buf, diagnostic)
        .unwrap();
    assert!(buf.contains("sweep_interval_secs"));
}
