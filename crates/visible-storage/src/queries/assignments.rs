// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work assignment operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use visible_core::types::{AssignmentStatus, GeoPoint, NewAssignment, WorkAssignment, WorkId};
use visible_core::VisibleError;

use crate::database::{map_call_err, map_tr_err, Database};
use crate::models::{get_enum, get_opt_ts, get_ts, ts};

const COLUMNS: &str = "id, seeker_id, provider_id, service_type, message, status,
     seeker_latitude, seeker_longitude, created_at, responded_at, completed_at";

fn row_to_assignment(row: &rusqlite::Row<'_>) -> rusqlite::Result<WorkAssignment> {
    let lat: Option<f64> = row.get(6)?;
    let lng: Option<f64> = row.get(7)?;
    Ok(WorkAssignment {
        id: row.get(0)?,
        seeker_id: row.get(1)?,
        provider_id: row.get(2)?,
        service_type: row.get(3)?,
        message: row.get(4)?,
        status: get_enum(row, 5)?,
        seeker_location: lat.zip(lng).map(|(latitude, longitude)| GeoPoint {
            latitude,
            longitude,
        }),
        created_at: get_ts(row, 8)?,
        responded_at: get_opt_ts(row, 9)?,
        completed_at: get_opt_ts(row, 10)?,
    })
}

/// Insert a pending assignment unless the pair already has one pending.
///
/// The check and the insert run in one closure on the writer thread.
pub async fn create_assignment(
    db: &Database,
    new: &NewAssignment,
    now: DateTime<Utc>,
) -> Result<WorkAssignment, VisibleError> {
    let new = new.clone();
    db.connection()
        .call(move |conn| -> Result<WorkAssignment, VisibleError> {
            let tx = conn.transaction().map_err(VisibleError::storage)?;
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM work_assignments
                     WHERE seeker_id = ?1 AND provider_id = ?2 AND status = 'pending'",
                    params![new.seeker_id, new.provider_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(VisibleError::storage)?;
            if let Some(id) = existing {
                return Err(VisibleError::Validation(format!(
                    "a pending work assignment (#{id}) already exists for this provider"
                )));
            }

            tx.execute(
                "INSERT INTO work_assignments
                   (seeker_id, provider_id, service_type, message, status,
                    seeker_latitude, seeker_longitude, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?6, ?7)",
                params![
                    new.seeker_id,
                    new.provider_id,
                    new.service_type,
                    new.message,
                    new.seeker_location.map(|p| p.latitude),
                    new.seeker_location.map(|p| p.longitude),
                    ts(now),
                ],
            )
            .map_err(VisibleError::storage)?;
            let id = tx.last_insert_rowid();
            tx.commit().map_err(VisibleError::storage)?;

            Ok(WorkAssignment {
                id,
                seeker_id: new.seeker_id,
                provider_id: new.provider_id,
                service_type: new.service_type,
                message: new.message,
                status: AssignmentStatus::Pending,
                seeker_location: new.seeker_location,
                created_at: now,
                responded_at: None,
                completed_at: None,
            })
        })
        .await
        .map_err(map_call_err)
}

pub async fn get_assignment(
    db: &Database,
    work_id: WorkId,
) -> Result<Option<WorkAssignment>, VisibleError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM work_assignments WHERE id = ?1"),
                params![work_id],
                row_to_assignment,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set on the assignment status.
///
/// Leaving `pending` stamps `responded_at`; entering `completed` stamps
/// `completed_at`.
pub async fn transition_assignment(
    db: &Database,
    work_id: WorkId,
    from: AssignmentStatus,
    to: AssignmentStatus,
    at: DateTime<Utc>,
) -> Result<bool, VisibleError> {
    let at = ts(at);
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE work_assignments
                 SET status = ?3,
                     responded_at = CASE WHEN ?2 = 'pending' THEN ?4 ELSE responded_at END,
                     completed_at = CASE WHEN ?3 = 'completed' THEN ?4 ELSE completed_at END
                 WHERE id = ?1 AND status = ?2",
                params![work_id, from.to_string(), to.to_string(), at],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(seeker: i64, provider: i64) -> NewAssignment {
        NewAssignment {
            seeker_id: seeker,
            provider_id: provider,
            service_type: "plumbing".to_string(),
            message: "leaking tap".to_string(),
            seeker_location: Some(GeoPoint::new(12.97, 77.59).unwrap()),
        }
    }

    #[tokio::test]
    async fn create_and_fetch() {
        let db = Database::open_in_memory().await.unwrap();
        let created = create_assignment(&db, &request(1, 2), Utc::now()).await.unwrap();
        assert_eq!(created.status, AssignmentStatus::Pending);

        let fetched = get_assignment(&db, created.id).await.unwrap().unwrap();
        assert_eq!(fetched.service_type, "plumbing");
        assert_eq!(fetched.seeker_location, created.seeker_location);
        assert!(get_assignment(&db, created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_pending_for_same_pair_is_rejected() {
        let db = Database::open_in_memory().await.unwrap();
        create_assignment(&db, &request(1, 2), Utc::now()).await.unwrap();
        let err = create_assignment(&db, &request(1, 2), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, VisibleError::Validation(_)));

        // A different provider is fine.
        create_assignment(&db, &request(1, 3), Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let db = Database::open_in_memory().await.unwrap();
        let a = create_assignment(&db, &request(1, 2), Utc::now()).await.unwrap();
        let now = Utc::now();

        assert!(transition_assignment(&db, a.id, AssignmentStatus::Pending, AssignmentStatus::Accepted, now).await.unwrap());
        assert!(!transition_assignment(&db, a.id, AssignmentStatus::Pending, AssignmentStatus::Rejected, now).await.unwrap());

        let stored = get_assignment(&db, a.id).await.unwrap().unwrap();
        assert_eq!(stored.status, AssignmentStatus::Accepted);
        assert!(stored.responded_at.is_some());
        assert!(stored.completed_at.is_none());

        // After leaving pending, the pair may be dispatched again.
        create_assignment(&db, &request(1, 2), Utc::now()).await.unwrap();
    }
}
