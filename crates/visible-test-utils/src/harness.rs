// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end engine testing.
//!
//! `TestHarness` assembles a complete engine with fake collaborators, a
//! temp SQLite database and an in-memory bus. Two users are pre-registered:
//! seeker [`SEEKER_ID`] and provider [`PROVIDER_ID`].

use std::sync::Arc;

use visible_bus::{BusEvent, EventBus, InMemoryBus, Subscription, Topic};
use visible_config::model::{SessionConfig, StorageConfig};
use visible_core::types::{Identity, Medium, MediumMap, WorkSession};
use visible_core::{Role, SessionId, StorageAdapter, VisibleError};
use visible_session::{AssignWork, AssignmentResponse, EngineDeps, SessionEngine};
use visible_storage::SqliteStorage;

use crate::clock::ManualClock;
use crate::fakes::{MemoryFlags, RecordingPush, StaticProfiles};

pub const SEEKER_ID: i64 = 10;
pub const PROVIDER_ID: i64 = 20;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    session: SessionConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            session: SessionConfig::default(),
        }
    }

    /// Adjust the engine's session settings.
    pub fn with_session_config(mut self, f: impl FnOnce(&mut SessionConfig)) -> Self {
        f(&mut self.session);
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, VisibleError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| VisibleError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = Arc::new(SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        }));
        storage.initialize().await?;

        let profiles = Arc::new(StaticProfiles::new());
        let mut seeker_mediums = MediumMap::new();
        seeker_mediums.insert(Medium::Whatsapp, "9000000010".into());
        profiles.insert(SEEKER_ID, Role::Seeker, "Ravi", seeker_mediums);
        let mut provider_mediums = MediumMap::new();
        provider_mediums.insert(Medium::Whatsapp, "9000000020".into());
        provider_mediums.insert(Medium::Call, "9000000020".into());
        profiles.insert(PROVIDER_ID, Role::Provider, "Asha", provider_mediums);

        let flags = Arc::new(MemoryFlags::new());
        flags.seed(SEEKER_ID, false, true);
        flags.seed(PROVIDER_ID, true, false);

        let push = Arc::new(RecordingPush::new());
        let bus = Arc::new(InMemoryBus::new());
        let clock = Arc::new(ManualClock::fixed());

        let engine = SessionEngine::new(
            EngineDeps {
                storage: storage.clone(),
                flags: flags.clone(),
                profiles: profiles.clone(),
                push: push.clone(),
                bus: bus.clone(),
                clock: clock.clone(),
            },
            self.session,
        );

        Ok(TestHarness {
            engine,
            storage,
            flags,
            profiles,
            push,
            bus,
            clock,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete engine with fake collaborators and temp storage.
pub struct TestHarness {
    pub engine: SessionEngine,
    /// SQLite storage (temp DB, cleaned up on drop).
    pub storage: Arc<SqliteStorage>,
    pub flags: Arc<MemoryFlags>,
    pub profiles: Arc<StaticProfiles>,
    pub push: Arc<RecordingPush>,
    pub bus: Arc<InMemoryBus>,
    pub clock: Arc<ManualClock>,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub fn seeker(&self) -> Identity {
        Identity {
            user_id: SEEKER_ID,
            role: Role::Seeker,
        }
    }

    pub fn provider(&self) -> Identity {
        Identity {
            user_id: PROVIDER_ID,
            role: Role::Provider,
        }
    }

    /// Dispatch work from the seeker and have the provider accept it.
    pub async fn accepted_session(&self) -> Result<WorkSession, VisibleError> {
        let assignment = self
            .engine
            .assign_work(
                &self.seeker(),
                AssignWork {
                    provider_id: PROVIDER_ID,
                    service_type: "plumbing".into(),
                    message: "kitchen sink".into(),
                    location: None,
                },
            )
            .await?;
        match self
            .engine
            .respond_to_assignment(&self.provider(), assignment.id, true)
            .await?
        {
            AssignmentResponse::Accepted(session) => Ok(session),
            AssignmentResponse::Rejected(_) => {
                Err(VisibleError::Internal("assignment was rejected".into()))
            }
        }
    }

    pub fn subscribe_session(&self, id: &SessionId) -> Subscription {
        self.bus.subscribe(&Topic::Session(id.clone()))
    }

    pub fn subscribe_user(&self, user_id: i64) -> Subscription {
        self.bus.subscribe(&Topic::User(user_id))
    }
}

/// Everything currently queued on `rx` that `role` would act on.
pub fn drain(rx: &mut Subscription, role: Role) -> Vec<BusEvent> {
    let mut events = Vec::new();
    while let Ok(envelope) = rx.try_recv() {
        if envelope.audience.includes(role) {
            events.push(envelope.event);
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use visible_core::types::ConnectionState;

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::builder().build().await.unwrap();
        assert!(harness.storage.list_open_sessions().await.unwrap().is_empty());
        assert_eq!(harness.flags.available(PROVIDER_ID), Some(true));
    }

    #[tokio::test]
    async fn accepted_session_is_waiting() {
        let harness = TestHarness::builder().build().await.unwrap();
        let session = harness.accepted_session().await.unwrap();
        assert_eq!(session.state, ConnectionState::Waiting);
        harness.engine.shutdown().await;
    }

    #[tokio::test]
    async fn temp_db_is_unique_per_harness() {
        let h1 = TestHarness::builder().build().await.unwrap();
        let h2 = TestHarness::builder().build().await.unwrap();
        h1.accepted_session().await.unwrap();
        assert_eq!(h1.storage.list_open_sessions().await.unwrap().len(), 1);
        assert!(h2.storage.list_open_sessions().await.unwrap().is_empty());
        h1.engine.shutdown().await;
    }
}
