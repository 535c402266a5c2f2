// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile rows and the marketplace flags kept alongside them.
//!
//! The profile table is shared with the profile service; the engine only
//! reads display fragments and flips the two flags.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use visible_core::types::{ProfileSummary, UserId};
use visible_core::VisibleError;

use crate::database::{map_tr_err, Database};
use crate::models::{decode_mediums, encode_mediums, get_enum, ts};

/// Current values of a user's marketplace flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagState {
    pub available: bool,
    pub searching: bool,
}

/// Insert or replace a profile. Flags of an existing row are preserved.
pub async fn upsert_profile(
    db: &Database,
    profile: &ProfileSummary,
    now: DateTime<Utc>,
) -> Result<(), VisibleError> {
    let p = profile.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO user_profiles (user_id, role, display_name, available_mediums, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     role = excluded.role,
                     display_name = excluded.display_name,
                     available_mediums = excluded.available_mediums,
                     updated_at = excluded.updated_at",
                params![
                    p.user_id,
                    p.role.to_string(),
                    p.display_name,
                    encode_mediums(&p.available_mediums)?,
                    ts(now),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_profile(
    db: &Database,
    user_id: UserId,
) -> Result<Option<ProfileSummary>, VisibleError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_id, role, display_name, available_mediums
                 FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let mediums: String = row.get(3)?;
                    Ok(ProfileSummary {
                        user_id: row.get(0)?,
                        role: get_enum(row, 1)?,
                        display_name: row.get(2)?,
                        available_mediums: decode_mediums(&mediums, 3)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Which flag column to write.
#[derive(Debug, Clone, Copy)]
pub enum Flag {
    Available,
    Searching,
}

/// Set a flag. Returns false when no profile row exists for the user.
pub async fn set_flag(
    db: &Database,
    user_id: UserId,
    flag: Flag,
    value: bool,
    now: DateTime<Utc>,
) -> Result<bool, VisibleError> {
    let column = match flag {
        Flag::Available => "is_available",
        Flag::Searching => "is_searching",
    };
    let now = ts(now);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!("UPDATE user_profiles SET {column} = ?2, updated_at = ?3 WHERE user_id = ?1"),
                params![user_id, value, now],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_flags(db: &Database, user_id: UserId) -> Result<Option<FlagState>, VisibleError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT is_available, is_searching FROM user_profiles WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(FlagState {
                        available: row.get(0)?,
                        searching: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
