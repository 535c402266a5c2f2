// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Column codecs between SQLite rows and core domain types.
//!
//! Enums are stored as their lowercase names, timestamps as millisecond
//! UTC text and medium maps as JSON objects.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use visible_core::clock::{format_timestamp, parse_timestamp};
use visible_core::types::MediumMap;

/// Read a required timestamp column.
pub(crate) fn get_ts(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable timestamp column.
pub(crate) fn get_opt_ts(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        parse_timestamp(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a text column holding a strum-parsable enum.
pub(crate) fn get_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Read a nullable enum column.
pub(crate) fn get_opt_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        t.parse::<T>()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Read a nullable JSON medium map column.
pub(crate) fn get_opt_mediums(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<MediumMap>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| decode_mediums(&t, idx)).transpose()
}

pub(crate) fn decode_mediums(text: &str, idx: usize) -> rusqlite::Result<MediumMap> {
    serde_json::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn encode_mediums(mediums: &MediumMap) -> rusqlite::Result<String> {
    serde_json::to_string(mediums).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

pub(crate) fn ts(at: DateTime<Utc>) -> String {
    format_timestamp(at)
}

pub(crate) fn opt_ts(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(format_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use visible_core::types::Medium;

    #[test]
    fn mediums_round_trip_through_json_text() {
        let mut map = MediumMap::new();
        map.insert(Medium::Telegram, "@alice".to_string());
        map.insert(Medium::Call, "+15550100".to_string());
        let text = encode_mediums(&map).unwrap();
        assert_eq!(decode_mediums(&text, 0).unwrap(), map);
    }

    #[test]
    fn unknown_medium_in_stored_json_is_a_conversion_error() {
        let err = decode_mediums(r#"{"pigeon":"coop 4"}"#, 3).unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(3, _, _)));
    }
}
