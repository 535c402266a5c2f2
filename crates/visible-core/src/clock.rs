// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Injectable time source and the timestamp text format used in storage.

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

use crate::error::VisibleError;

/// Millisecond-precision UTC timestamp format used for persisted values.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Source of "now". The engine takes one so tests can control time.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time, truncated to the millisecond so values survive a
/// storage round trip unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp previously written by [`format_timestamp`].
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, VisibleError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| VisibleError::storage(format!("invalid timestamp '{text}': {e}")))
}
