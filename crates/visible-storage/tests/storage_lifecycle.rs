// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durability of sessions and chat across a process restart.

use chrono::{Duration, TimeZone, Utc};
use visible_config::model::StorageConfig;
use visible_core::types::{
    AssignmentStatus, ChatMessage, ConnectionState, DeliveryStatus, MessageId, NewAssignment,
    Role, Termination, WorkSession,
};
use visible_core::StorageAdapter;
use visible_storage::SqliteStorage;

fn config(path: &std::path::Path) -> StorageConfig {
    StorageConfig {
        database_path: path.to_str().unwrap().to_string(),
        wal_mode: true,
    }
}

#[tokio::test]
async fn session_and_chat_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visible.db");
    let t0 = Utc.with_ymd_and_hms(2026, 4, 1, 8, 0, 0).unwrap();

    let session_id;
    let message_id = MessageId::generate();
    {
        let storage = SqliteStorage::new(config(&path));
        storage.initialize().await.unwrap();

        let assignment = storage
            .create_assignment(
                &NewAssignment {
                    seeker_id: 10,
                    provider_id: 20,
                    service_type: "electrician".to_string(),
                    message: "fuse box".to_string(),
                    seeker_location: None,
                },
                t0,
            )
            .await
            .unwrap();
        assert!(storage
            .transition_assignment(assignment.id, AssignmentStatus::Pending, AssignmentStatus::Accepted, t0)
            .await
            .unwrap());

        let session = WorkSession::new(assignment.id, 10, 20, t0);
        session_id = session.id.clone();
        storage.insert_session(&session).await.unwrap();
        storage
            .insert_message(&ChatMessage {
                id: message_id.clone(),
                session_id: session.id.clone(),
                sender_role: Role::Provider,
                text: "reaching in 10".to_string(),
                sent_at: t0,
                delivery_status: DeliveryStatus::Sent,
                delivered_at: None,
                read_at: None,
                expires_at: None,
            })
            .await
            .unwrap();
        storage.close().await.unwrap();
    }

    let storage = SqliteStorage::new(config(&path));
    storage.initialize().await.unwrap();

    let open = storage.list_open_sessions().await.unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].id, session_id);
    assert_eq!(open[0].state, ConnectionState::Waiting);

    let messages = storage.list_messages(&session_id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, message_id);
    assert_eq!(messages[0].sender_role, Role::Provider);

    // Terminate and expire.
    let mut session = open.into_iter().next().unwrap();
    let ended = t0 + Duration::minutes(30);
    session.state = ConnectionState::Cancelled;
    session.termination = Some(Termination::Cancelled {
        by: Role::Provider,
        at: ended,
    });
    storage.update_session(&session).await.unwrap();
    storage
        .set_message_expiry(&session_id, ended + Duration::hours(24))
        .await
        .unwrap();

    assert!(storage.list_open_sessions().await.unwrap().is_empty());
    assert_eq!(
        storage
            .delete_expired_messages(ended + Duration::hours(24) + Duration::seconds(1))
            .await
            .unwrap(),
        1
    );
}
