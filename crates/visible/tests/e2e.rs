// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine wired the way `visible serve` wires it: SQLite for sessions,
//! flags and profiles. Covers restart recovery and the delivery log.

use std::path::Path;
use std::sync::Arc;

use visible_bus::InMemoryBus;
use visible_config::model::{SessionConfig, StorageConfig};
use visible_core::types::{
    ConnectionState, DeliveryMethod, Identity, MediumMap, NotificationKind, ProfileSummary,
};
use visible_core::{Role, StorageAdapter};
use visible_session::{AssignWork, AssignmentResponse, EngineDeps, SessionEngine};
use visible_storage::SqliteStorage;
use visible_test_utils::{ManualClock, PROVIDER_ID, RecordingPush, SEEKER_ID};

struct Node {
    engine: SessionEngine,
    storage: Arc<SqliteStorage>,
    push: Arc<RecordingPush>,
}

async fn node(db_path: &Path, clock: Arc<ManualClock>) -> Node {
    let storage = Arc::new(SqliteStorage::new(StorageConfig {
        database_path: db_path.to_string_lossy().to_string(),
        wal_mode: true,
    }));
    storage.initialize().await.unwrap();
    let push = Arc::new(RecordingPush::new());
    let engine = SessionEngine::new(
        EngineDeps {
            storage: storage.clone(),
            flags: storage.clone(),
            profiles: storage.clone(),
            push: push.clone(),
            bus: Arc::new(InMemoryBus::new()),
            clock,
        },
        SessionConfig::default(),
    );
    Node {
        engine,
        storage,
        push,
    }
}

async fn register(storage: &SqliteStorage) {
    for (user_id, role, name) in [
        (SEEKER_ID, Role::Seeker, "Ravi"),
        (PROVIDER_ID, Role::Provider, "Asha"),
    ] {
        storage
            .upsert_profile(&ProfileSummary {
                user_id,
                role,
                display_name: name.into(),
                available_mediums: MediumMap::new(),
            })
            .await
            .unwrap();
    }
}

fn seeker() -> Identity {
    Identity {
        user_id: SEEKER_ID,
        role: Role::Seeker,
    }
}

fn provider() -> Identity {
    Identity {
        user_id: PROVIDER_ID,
        role: Role::Provider,
    }
}

async fn dispatch_and_accept(engine: &SessionEngine) -> visible_core::types::WorkSession {
    let assignment = engine
        .assign_work(
            &seeker(),
            AssignWork {
                provider_id: PROVIDER_ID,
                service_type: "electrician".into(),
                message: "fuse keeps tripping".into(),
                location: None,
            },
        )
        .await
        .unwrap();
    match engine
        .respond_to_assignment(&provider(), assignment.id, true)
        .await
        .unwrap()
    {
        AssignmentResponse::Accepted(session) => session,
        AssignmentResponse::Rejected(_) => panic!("expected acceptance"),
    }
}

#[tokio::test]
async fn open_sessions_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("visible.db");
    let clock = Arc::new(ManualClock::fixed());

    let first = node(&db_path, clock.clone()).await;
    register(&first.storage).await;
    let session = dispatch_and_accept(&first.engine).await;
    assert!(first.engine.has_ticker(&session.id));
    first
        .engine
        .send_chat_message(&seeker(), &session.id, "gate code is 4412")
        .await
        .unwrap();
    first.engine.shutdown().await;
    first.storage.close().await.unwrap();
    drop(first);

    let second = node(&db_path, clock.clone()).await;
    assert_eq!(second.engine.restore().await.unwrap(), 1);
    assert!(second.engine.has_ticker(&session.id));

    let resumed = second.engine.resume(&provider()).await.unwrap().unwrap();
    assert_eq!(resumed.session.id, session.id);
    assert_eq!(resumed.session.state, ConnectionState::Waiting);
    assert_eq!(resumed.messages.len(), 1);
    assert_eq!(resumed.messages[0].text, "gate code is 4412");

    let selection = second
        .engine
        .select_seeker_mediums(&seeker(), &session.id, MediumMap::new())
        .await
        .unwrap();
    assert!(selection.activated);
    assert_eq!(selection.session.state, ConnectionState::Active);
    second.engine.shutdown().await;
}

#[tokio::test]
async fn marketplace_flags_follow_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let node = node(&dir.path().join("visible.db"), Arc::new(ManualClock::fixed())).await;
    register(&node.storage).await;

    let before = node.storage.flags(PROVIDER_ID).await.unwrap().unwrap();
    assert!(before.available);

    let session = dispatch_and_accept(&node.engine).await;
    let provider_flags = node.storage.flags(PROVIDER_ID).await.unwrap().unwrap();
    assert!(!provider_flags.available);
    let seeker_flags = node.storage.flags(SEEKER_ID).await.unwrap().unwrap();
    assert!(!seeker_flags.searching);

    let cancelled = node.engine.cancel(&provider(), &session.id).await.unwrap();
    assert_eq!(cancelled.state, ConnectionState::Cancelled);
    assert!(!node.engine.has_ticker(&session.id));

    let provider_flags = node.storage.flags(PROVIDER_ID).await.unwrap().unwrap();
    assert!(provider_flags.available);
    let seeker_flags = node.storage.flags(SEEKER_ID).await.unwrap().unwrap();
    assert!(seeker_flags.searching);
    node.engine.shutdown().await;
}

#[tokio::test]
async fn deliveries_are_logged_per_recipient() {
    let dir = tempfile::tempdir().unwrap();
    let node = node(&dir.path().join("visible.db"), Arc::new(ManualClock::fixed())).await;
    register(&node.storage).await;

    dispatch_and_accept(&node.engine).await;
    node.engine.flush().await;

    let log = node
        .storage
        .list_notifications_for_user(PROVIDER_ID)
        .await
        .unwrap();
    let assigned: Vec<_> = log
        .iter()
        .filter(|r| r.kind == NotificationKind::WorkAssigned)
        .collect();
    // Nobody is connected: the live attempt misses, the push lands.
    let live = assigned
        .iter()
        .find(|r| r.method == DeliveryMethod::Live)
        .unwrap();
    assert!(!live.delivered);
    assert_eq!(live.error.as_deref(), Some("recipient offline"));
    let push = assigned
        .iter()
        .find(|r| r.method == DeliveryMethod::Push)
        .unwrap();
    assert!(push.delivered);
    assert_eq!(node.push.deliveries_of(PROVIDER_ID, "work_assigned").len(), 1);

    let seeker_log = node
        .storage
        .list_notifications_for_user(SEEKER_ID)
        .await
        .unwrap();
    assert!(
        seeker_log
            .iter()
            .any(|r| r.kind == NotificationKind::WorkAccepted)
    );
    node.engine.shutdown().await;
}

#[tokio::test]
async fn expired_chat_is_swept() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::fixed());
    let node = node(&dir.path().join("visible.db"), clock.clone()).await;
    register(&node.storage).await;

    let session = dispatch_and_accept(&node.engine).await;
    node.engine
        .send_chat_message(&provider(), &session.id, "running late")
        .await
        .unwrap();

    assert_eq!(node.engine.sweep().await.unwrap().expired_messages, 0);
    clock.advance(chrono::Duration::hours(25));
    assert_eq!(node.engine.sweep().await.unwrap().expired_messages, 1);
    assert!(
        node.engine
            .chat_history(&seeker(), &session.id)
            .await
            .unwrap()
            .is_empty()
    );
    node.engine.shutdown().await;
}
