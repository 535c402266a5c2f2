// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `./visible.toml` > `~/.config/visible/visible.toml` >
//! `/etc/visible/visible.toml`, with `VISIBLE_` environment overrides on top.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::VisibleConfig;

/// Sections recognised in `VISIBLE_<SECTION>_<KEY>` variables.
const ENV_SECTIONS: &[&str] = &[
    "server",
    "storage",
    "auth",
    "session",
    "push",
    "logging",
    "prometheus",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/visible/visible.toml`
/// 3. `~/.config/visible/visible.toml`
/// 4. `./visible.toml`
/// 5. `VISIBLE_*` environment variables
pub fn load_config() -> Result<VisibleConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<VisibleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VisibleConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<VisibleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(VisibleConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used for standard loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(VisibleConfig::default()))
        .merge(Toml::file("/etc/visible/visible.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("visible/visible.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("visible.toml"))
        .merge(env_provider())
}

/// Environment provider with explicit section mapping.
///
/// `Env::split("_")` would turn `VISIBLE_SESSION_RECHECK_INTERVAL_SECS` into
/// `session.recheck.interval.secs`; only the first segment is a section.
fn env_provider() -> Env {
    Env::prefixed("VISIBLE_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env key to its dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|r| r.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
