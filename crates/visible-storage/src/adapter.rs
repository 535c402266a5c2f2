// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage, flag and profile collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use visible_config::model::StorageConfig;
use visible_core::types::{
    AssignmentStatus, ChatMessage, DeliveryStatus, MessageId, NewAssignment, NotificationRecord,
    ProfileSummary, SessionId, UserId, WorkAssignment, WorkId, WorkSession,
};
use visible_core::{
    AdapterType, AvailabilityFlags, Clock, HealthStatus, PluginAdapter, ProfileLookup,
    StorageAdapter, SystemClock, VisibleError,
};

use crate::database::{map_tr_err, Database};
use crate::queries;
use crate::queries::profiles::{Flag, FlagState};

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates every operation to the query
/// modules. The database is opened on [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage. Nothing is opened until `initialize`.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database (in-memory test databases).
    pub fn from_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::new_with(Some(db)),
        }
    }

    fn db(&self) -> Result<&Database, VisibleError> {
        self.db.get().ok_or_else(|| VisibleError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Insert or refresh a profile row.
    pub async fn upsert_profile(&self, profile: &ProfileSummary) -> Result<(), VisibleError> {
        queries::profiles::upsert_profile(self.db()?, profile, SystemClock.now()).await
    }

    /// Current marketplace flags of a user, if a profile exists.
    pub async fn flags(&self, user_id: UserId) -> Result<Option<FlagState>, VisibleError> {
        queries::profiles::get_flags(self.db()?, user_id).await
    }

    async fn write_flag(&self, user_id: UserId, flag: Flag, value: bool) -> Result<(), VisibleError> {
        let found =
            queries::profiles::set_flag(self.db()?, user_id, flag, value, SystemClock.now())
                .await?;
        if !found {
            warn!(user_id, ?flag, value, "no profile row for flag update");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, VisibleError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("SELECT 1", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VisibleError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), VisibleError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| VisibleError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), VisibleError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Assignment store ---

    async fn create_assignment(
        &self,
        assignment: &NewAssignment,
        now: DateTime<Utc>,
    ) -> Result<WorkAssignment, VisibleError> {
        queries::assignments::create_assignment(self.db()?, assignment, now).await
    }

    async fn get_assignment(
        &self,
        work_id: WorkId,
    ) -> Result<Option<WorkAssignment>, VisibleError> {
        queries::assignments::get_assignment(self.db()?, work_id).await
    }

    async fn transition_assignment(
        &self,
        work_id: WorkId,
        from: AssignmentStatus,
        to: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, VisibleError> {
        queries::assignments::transition_assignment(self.db()?, work_id, from, to, at).await
    }

    // --- Sessions ---

    async fn insert_session(&self, session: &WorkSession) -> Result<(), VisibleError> {
        queries::sessions::insert_session(self.db()?, session).await
    }

    async fn update_session(&self, session: &WorkSession) -> Result<(), VisibleError> {
        queries::sessions::update_session(self.db()?, session).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<WorkSession>, VisibleError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn list_open_sessions(&self) -> Result<Vec<WorkSession>, VisibleError> {
        queries::sessions::list_open_sessions(self.db()?).await
    }

    async fn list_open_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<WorkSession>, VisibleError> {
        queries::sessions::list_open_sessions_for_user(self.db()?, user_id).await
    }

    // --- Chat messages ---

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), VisibleError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn get_message(&self, id: &MessageId) -> Result<Option<ChatMessage>, VisibleError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn advance_message_status(
        &self,
        id: &MessageId,
        to: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, VisibleError> {
        queries::messages::advance_message_status(self.db()?, id, to, at).await
    }

    async fn list_messages(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ChatMessage>, VisibleError> {
        queries::messages::list_messages(self.db()?, session_id).await
    }

    async fn set_message_expiry(
        &self,
        session_id: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<usize, VisibleError> {
        queries::messages::set_message_expiry(self.db()?, session_id, expires_at).await
    }

    async fn delete_expired_messages(&self, now: DateTime<Utc>) -> Result<usize, VisibleError> {
        queries::messages::delete_expired_messages(self.db()?, now).await
    }

    // --- Notification log ---

    async fn record_notification(&self, record: &NotificationRecord) -> Result<(), VisibleError> {
        queries::notifications::record_notification(self.db()?, record).await
    }

    async fn list_notifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<NotificationRecord>, VisibleError> {
        queries::notifications::list_for_recipient(self.db()?, user_id).await
    }
}

#[async_trait]
impl AvailabilityFlags for SqliteStorage {
    async fn set_provider_available(
        &self,
        provider_id: UserId,
        available: bool,
    ) -> Result<(), VisibleError> {
        self.write_flag(provider_id, Flag::Available, available).await
    }

    async fn set_seeker_searching(
        &self,
        seeker_id: UserId,
        searching: bool,
    ) -> Result<(), VisibleError> {
        self.write_flag(seeker_id, Flag::Searching, searching).await
    }
}

#[async_trait]
impl ProfileLookup for SqliteStorage {
    async fn profile(&self, user_id: UserId) -> Result<Option<ProfileSummary>, VisibleError> {
        queries::profiles::get_profile(self.db()?, user_id).await
    }
}
