// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat message persistence, delivery-status advancement and expiry.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use visible_core::types::{ChatMessage, DeliveryStatus, MessageId, SessionId};
use visible_core::VisibleError;

use crate::database::{map_tr_err, Database};
use crate::models::{get_enum, get_opt_ts, get_ts, opt_ts, ts};

const COLUMNS: &str = "id, session_id, sender_role, text, sent_at,
     delivery_status, delivered_at, read_at, expires_at";

/// SQL expression ranking the stored status so it can be compared.
const STATUS_RANK: &str =
    "CASE delivery_status WHEN 'sent' THEN 0 WHEN 'delivered' THEN 1 ELSE 2 END";

fn rank(status: DeliveryStatus) -> i64 {
    match status {
        DeliveryStatus::Sent => 0,
        DeliveryStatus::Delivered => 1,
        DeliveryStatus::Read => 2,
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: MessageId(row.get(0)?),
        session_id: SessionId(row.get(1)?),
        sender_role: get_enum(row, 2)?,
        text: row.get(3)?,
        sent_at: get_ts(row, 4)?,
        delivery_status: get_enum(row, 5)?,
        delivered_at: get_opt_ts(row, 6)?,
        read_at: get_opt_ts(row, 7)?,
        expires_at: get_opt_ts(row, 8)?,
    })
}

pub async fn insert_message(db: &Database, message: &ChatMessage) -> Result<(), VisibleError> {
    let m = message.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO chat_messages ({COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    m.id.0,
                    m.session_id.0,
                    m.sender_role.to_string(),
                    m.text,
                    ts(m.sent_at),
                    m.delivery_status.to_string(),
                    opt_ts(m.delivered_at),
                    opt_ts(m.read_at),
                    opt_ts(m.expires_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_message(db: &Database, id: &MessageId) -> Result<Option<ChatMessage>, VisibleError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM chat_messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Move a message forward to `to` if it is currently behind it.
///
/// The guarded UPDATE and the re-read share one closure, so concurrent
/// acknowledgements of the same message are applied one after another and
/// only the first one to advance the status observes a change. Reaching
/// `read` directly from `sent` also stamps `delivered_at`. Messages of a
/// cancelled or completed session never move.
pub async fn advance_message_status(
    db: &Database,
    id: &MessageId,
    to: DeliveryStatus,
    at: DateTime<Utc>,
) -> Result<Option<ChatMessage>, VisibleError> {
    let id = id.0.clone();
    let at = ts(at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE chat_messages
                     SET delivery_status = ?2,
                         delivered_at = COALESCE(delivered_at, ?4),
                         read_at = CASE WHEN ?3 = 2 THEN COALESCE(read_at, ?4) ELSE read_at END
                     WHERE id = ?1 AND {STATUS_RANK} < ?3
                       AND EXISTS (
                           SELECT 1 FROM work_sessions s
                           WHERE s.id = chat_messages.session_id
                             AND s.connection_state IN ('waiting', 'active')
                       )"
                ),
                params![id, to.to_string(), rank(to), at],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM chat_messages WHERE id = ?1"),
                params![id],
                row_to_message,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a session in send order.
pub async fn list_messages(
    db: &Database,
    session_id: &SessionId,
) -> Result<Vec<ChatMessage>, VisibleError> {
    let session_id = session_id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM chat_messages
                 WHERE session_id = ?1
                 ORDER BY sent_at ASC, rowid ASC"
            ))?;
            let rows = stmt.query_map(params![session_id], row_to_message)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Stamp `expires_at` on every message of the session that has none.
pub async fn set_message_expiry(
    db: &Database,
    session_id: &SessionId,
    expires_at: DateTime<Utc>,
) -> Result<usize, VisibleError> {
    let session_id = session_id.0.clone();
    let expires_at = ts(expires_at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE chat_messages SET expires_at = ?2
                 WHERE session_id = ?1 AND expires_at IS NULL",
                params![session_id, expires_at],
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Delete messages whose expiry is at or before `now`. The only deletion path.
pub async fn delete_expired_messages(
    db: &Database,
    now: DateTime<Utc>,
) -> Result<usize, VisibleError> {
    let now = ts(now);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM chat_messages WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use visible_core::types::{ConnectionState, NewAssignment, Role, Termination, WorkSession};

    use crate::queries::{assignments, sessions};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 12, 0, 0).unwrap()
    }

    async fn session(db: &Database) -> SessionId {
        let a = assignments::create_assignment(
            db,
            &NewAssignment {
                seeker_id: 1,
                provider_id: 2,
                service_type: "tutoring".to_string(),
                message: String::new(),
                seeker_location: None,
            },
            t0(),
        )
        .await
        .unwrap();
        let s = WorkSession::new(a.id, 1, 2, t0());
        sessions::insert_session(db, &s).await.unwrap();
        s.id
    }

    fn message(session_id: &SessionId, offset_ms: i64) -> ChatMessage {
        ChatMessage {
            id: MessageId::generate(),
            session_id: session_id.clone(),
            sender_role: Role::Seeker,
            text: "on my way".to_string(),
            sent_at: t0() + Duration::milliseconds(offset_ms),
            delivery_status: DeliveryStatus::Sent,
            delivered_at: None,
            read_at: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn status_only_moves_forward() {
        let db = Database::open_in_memory().await.unwrap();
        let sid = session(&db).await;
        let m = message(&sid, 0);
        insert_message(&db, &m).await.unwrap();

        let at = t0() + Duration::seconds(5);
        let delivered = advance_message_status(&db, &m.id, DeliveryStatus::Delivered, at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered.delivery_status, DeliveryStatus::Delivered);
        assert_eq!(delivered.delivered_at, Some(at));

        // Same stage again is a no-op.
        assert!(advance_message_status(&db, &m.id, DeliveryStatus::Delivered, at)
            .await
            .unwrap()
            .is_none());

        let read = advance_message_status(&db, &m.id, DeliveryStatus::Read, at + Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.delivery_status, DeliveryStatus::Read);
        assert_eq!(read.delivered_at, Some(at));

        // Backwards is a no-op at this layer.
        assert!(advance_message_status(&db, &m.id, DeliveryStatus::Delivered, at)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn read_from_sent_stamps_both_timestamps() {
        let db = Database::open_in_memory().await.unwrap();
        let sid = session(&db).await;
        let m = message(&sid, 0);
        insert_message(&db, &m).await.unwrap();

        let read = advance_message_status(&db, &m.id, DeliveryStatus::Read, t0())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read.delivered_at, Some(t0()));
        assert_eq!(read.read_at, Some(t0()));
    }

    #[tokio::test]
    async fn messages_list_in_send_order() {
        let db = Database::open_in_memory().await.unwrap();
        let sid = session(&db).await;
        let late = message(&sid, 50);
        let early = message(&sid, 10);
        insert_message(&db, &late).await.unwrap();
        insert_message(&db, &early).await.unwrap();

        let listed = list_messages(&db, &sid).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, early.id);
        assert_eq!(listed[1].id, late.id);
    }

    #[tokio::test]
    async fn terminated_session_freezes_status() {
        let db = Database::open_in_memory().await.unwrap();
        let sid = session(&db).await;
        let m = message(&sid, 0);
        insert_message(&db, &m).await.unwrap();

        let mut s = sessions::get_session(&db, &sid).await.unwrap().unwrap();
        s.state = ConnectionState::Cancelled;
        s.termination = Some(Termination::Cancelled {
            by: Role::Provider,
            at: t0() + Duration::seconds(1),
        });
        sessions::update_session(&db, &s).await.unwrap();

        let at = t0() + Duration::seconds(2);
        assert!(advance_message_status(&db, &m.id, DeliveryStatus::Read, at)
            .await
            .unwrap()
            .is_none());
        let listed = list_messages(&db, &sid).await.unwrap();
        assert_eq!(listed[0].delivery_status, DeliveryStatus::Sent);
    }

    #[tokio::test]
    async fn expiry_sweep_respects_boundary() {
        let db = Database::open_in_memory().await.unwrap();
        let sid = session(&db).await;
        insert_message(&db, &message(&sid, 0)).await.unwrap();
        insert_message(&db, &message(&sid, 1)).await.unwrap();

        let expires = t0() + Duration::hours(24);
        assert_eq!(set_message_expiry(&db, &sid, expires).await.unwrap(), 2);
        // Already stamped messages keep their expiry.
        assert_eq!(set_message_expiry(&db, &sid, expires + Duration::hours(1)).await.unwrap(), 0);

        assert_eq!(delete_expired_messages(&db, t0() + Duration::hours(23)).await.unwrap(), 0);
        assert_eq!(
            delete_expired_messages(&db, expires + Duration::milliseconds(1)).await.unwrap(),
            2
        );
        assert!(list_messages(&db, &sid).await.unwrap().is_empty());
    }
}
