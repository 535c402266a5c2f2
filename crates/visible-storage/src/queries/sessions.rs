// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work session persistence.

use rusqlite::{params, OptionalExtension};
use visible_core::types::{
    GeoPoint, PartyLocation, Rating, Role, SessionId, Termination, UserId, WorkSession,
};
use visible_core::VisibleError;

use crate::database::{map_tr_err, Database};
use crate::models::{
    encode_mediums, get_enum, get_opt_enum, get_opt_mediums, get_opt_ts, get_ts, opt_ts, ts,
};

const COLUMNS: &str = "id, work_id, seeker_id, provider_id, connection_state,
     seeker_latitude, seeker_longitude, seeker_location_at,
     provider_latitude, provider_longitude, provider_location_at,
     current_distance_meters, last_distance_update,
     provider_mediums, seeker_mediums, mediums_shared_at,
     chat_room_id, chat_started_at,
     cancelled_by, cancelled_at, completed_by, completed_at,
     rating_stars, rating_description, rated_at,
     created_at, updated_at";

fn get_location(
    row: &rusqlite::Row<'_>,
    lat_idx: usize,
) -> rusqlite::Result<Option<PartyLocation>> {
    let lat: Option<f64> = row.get(lat_idx)?;
    let lng: Option<f64> = row.get(lat_idx + 1)?;
    let at = get_opt_ts(row, lat_idx + 2)?;
    Ok(match (lat, lng, at) {
        (Some(latitude), Some(longitude), Some(updated_at)) => Some(PartyLocation {
            point: GeoPoint {
                latitude,
                longitude,
            },
            updated_at,
        }),
        _ => None,
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkSession> {
    let cancelled_by: Option<Role> = get_opt_enum(row, 18)?;
    let cancelled_at = get_opt_ts(row, 19)?;
    let completed_by: Option<Role> = get_opt_enum(row, 20)?;
    let completed_at = get_opt_ts(row, 21)?;
    let termination = match (cancelled_by, cancelled_at, completed_by, completed_at) {
        (Some(by), Some(at), _, _) => Some(Termination::Cancelled { by, at }),
        (_, _, Some(by), Some(at)) => Some(Termination::Completed { by, at }),
        _ => None,
    };

    let stars: Option<u8> = row.get(22)?;
    let rating = match (stars, get_opt_ts(row, 24)?) {
        (Some(stars), Some(rated_at)) => Some(Rating {
            stars,
            description: row.get::<_, Option<String>>(23)?.unwrap_or_default(),
            rated_at,
        }),
        _ => None,
    };

    Ok(WorkSession {
        id: SessionId(row.get(0)?),
        work_id: row.get(1)?,
        seeker_id: row.get(2)?,
        provider_id: row.get(3)?,
        state: get_enum(row, 4)?,
        seeker_location: get_location(row, 5)?,
        provider_location: get_location(row, 8)?,
        current_distance_meters: row.get(11)?,
        last_distance_update: get_opt_ts(row, 12)?,
        provider_mediums: get_opt_mediums(row, 13)?,
        seeker_mediums: get_opt_mediums(row, 14)?,
        mediums_shared_at: get_opt_ts(row, 15)?,
        chat_room_id: row.get(16)?,
        chat_started_at: get_opt_ts(row, 17)?,
        termination,
        rating,
        created_at: get_ts(row, 25)?,
        updated_at: get_ts(row, 26)?,
    })
}

/// Bound parameter values for every column in [`COLUMNS`] order.
fn session_values(s: &WorkSession) -> rusqlite::Result<Vec<rusqlite::types::Value>> {
    use rusqlite::types::Value;

    fn opt_text(v: Option<String>) -> Value {
        v.map(Value::Text).unwrap_or(Value::Null)
    }
    fn opt_real(v: Option<f64>) -> Value {
        v.map(Value::Real).unwrap_or(Value::Null)
    }
    let loc = |l: Option<&PartyLocation>| {
        [
            opt_real(l.map(|l| l.point.latitude)),
            opt_real(l.map(|l| l.point.longitude)),
            opt_text(l.map(|l| ts(l.updated_at))),
        ]
    };
    let (cancelled_by, cancelled_at, completed_by, completed_at) = match s.termination {
        Some(Termination::Cancelled { by, at }) => (Some(by), Some(at), None, None),
        Some(Termination::Completed { by, at }) => (None, None, Some(by), Some(at)),
        None => (None, None, None, None),
    };

    let mut values = vec![
        Value::Text(s.id.0.clone()),
        Value::Integer(s.work_id),
        Value::Integer(s.seeker_id),
        Value::Integer(s.provider_id),
        Value::Text(s.state.to_string()),
    ];
    values.extend(loc(s.seeker_location.as_ref()));
    values.extend(loc(s.provider_location.as_ref()));
    values.extend([
        opt_real(s.current_distance_meters),
        opt_text(opt_ts(s.last_distance_update)),
        opt_text(s.provider_mediums.as_ref().map(encode_mediums).transpose()?),
        opt_text(s.seeker_mediums.as_ref().map(encode_mediums).transpose()?),
        opt_text(opt_ts(s.mediums_shared_at)),
        Value::Text(s.chat_room_id.clone()),
        opt_text(opt_ts(s.chat_started_at)),
        opt_text(cancelled_by.map(|r| r.to_string())),
        opt_text(opt_ts(cancelled_at)),
        opt_text(completed_by.map(|r| r.to_string())),
        opt_text(opt_ts(completed_at)),
        s.rating
            .as_ref()
            .map(|r| Value::Integer(i64::from(r.stars)))
            .unwrap_or(Value::Null),
        opt_text(s.rating.as_ref().map(|r| r.description.clone())),
        opt_text(s.rating.as_ref().map(|r| ts(r.rated_at))),
        Value::Text(ts(s.created_at)),
        Value::Text(ts(s.updated_at)),
    ]);
    Ok(values)
}

pub async fn insert_session(db: &Database, session: &WorkSession) -> Result<(), VisibleError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            let values = session_values(&session)?;
            let placeholders = (1..=values.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            conn.execute(
                &format!("INSERT INTO work_sessions ({COLUMNS}) VALUES ({placeholders})"),
                rusqlite::params_from_iter(values),
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Overwrite every mutable column of an existing session.
///
/// Identity columns (id, work_id, parties, created_at) are left untouched.
pub async fn update_session(db: &Database, session: &WorkSession) -> Result<(), VisibleError> {
    let session_id = session.id.0.clone();
    let session = session.clone();
    let changed = db
        .connection()
        .call(move |conn| {
            let values = session_values(&session)?;
            let assignments = COLUMNS
                .split(',')
                .map(str::trim)
                .enumerate()
                .skip(4)
                .filter(|(_, col)| *col != "created_at")
                .map(|(i, col)| format!("{col} = ?{}", i + 1))
                .collect::<Vec<_>>()
                .join(", ");
            conn.execute(
                &format!("UPDATE work_sessions SET {assignments} WHERE id = ?1"),
                rusqlite::params_from_iter(values),
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(VisibleError::SessionNotFound { session_id });
    }
    Ok(())
}

pub async fn get_session(
    db: &Database,
    id: &SessionId,
) -> Result<Option<WorkSession>, VisibleError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM work_sessions WHERE id = ?1"),
                params![id],
                row_to_session,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Sessions still in `waiting` or `active`, oldest first.
pub async fn list_open_sessions(db: &Database) -> Result<Vec<WorkSession>, VisibleError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM work_sessions
                 WHERE connection_state IN ('waiting', 'active')
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map([], row_to_session)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Open sessions the user is a party to, newest first.
pub async fn list_open_sessions_for_user(
    db: &Database,
    user_id: UserId,
) -> Result<Vec<WorkSession>, VisibleError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM work_sessions
                 WHERE connection_state IN ('waiting', 'active')
                   AND (seeker_id = ?1 OR provider_id = ?1)
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map(params![user_id], row_to_session)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
