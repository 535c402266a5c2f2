// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification delivery log.

use rusqlite::params;
use visible_core::types::{NotificationRecord, SessionId, UserId};
use visible_core::VisibleError;

use crate::database::{map_tr_err, Database};
use crate::models::{get_enum, get_ts, ts};

pub async fn record_notification(
    db: &Database,
    record: &NotificationRecord,
) -> Result<(), VisibleError> {
    let r = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO notification_log
                   (work_id, session_id, recipient_id, kind, method, outcome, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    r.work_id,
                    r.session_id.map(|s| s.0),
                    r.recipient_id,
                    r.kind.to_string(),
                    r.method.to_string(),
                    if r.delivered { "sent" } else { "failed" },
                    r.error,
                    ts(r.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_for_recipient(
    db: &Database,
    recipient_id: UserId,
) -> Result<Vec<NotificationRecord>, VisibleError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT work_id, session_id, recipient_id, kind, method, outcome, error, created_at
                 FROM notification_log WHERE recipient_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![recipient_id], |row| {
                let outcome: String = row.get(5)?;
                Ok(NotificationRecord {
                    work_id: row.get(0)?,
                    session_id: row.get::<_, Option<String>>(1)?.map(SessionId),
                    recipient_id: row.get(2)?,
                    kind: get_enum(row, 3)?,
                    method: get_enum(row, 4)?,
                    delivered: outcome == "sent",
                    error: row.get(6)?,
                    created_at: get_ts(row, 7)?,
                })
            })?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
