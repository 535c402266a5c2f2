// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for the durable session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::VisibleError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AssignmentStatus, ChatMessage, DeliveryStatus, MessageId, NewAssignment, NotificationRecord,
    SessionId, UserId, WorkAssignment, WorkId, WorkSession,
};

/// Adapter for the persistence backend holding assignments, sessions and
/// chat messages.
///
/// Every method is a single atomic unit against the backing store. Callers
/// that need read-modify-write across several calls hold the session lock.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection setup).
    async fn initialize(&self) -> Result<(), VisibleError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), VisibleError>;

    // --- Assignment store ---

    /// Insert a pending assignment. Fails with `Validation` if the same
    /// (seeker, provider) pair already has a pending one.
    async fn create_assignment(
        &self,
        assignment: &NewAssignment,
        now: DateTime<Utc>,
    ) -> Result<WorkAssignment, VisibleError>;

    async fn get_assignment(&self, work_id: WorkId)
    -> Result<Option<WorkAssignment>, VisibleError>;

    /// Move an assignment from `from` to `to`. Returns false when the stored
    /// status was not `from` and nothing changed.
    async fn transition_assignment(
        &self,
        work_id: WorkId,
        from: AssignmentStatus,
        to: AssignmentStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, VisibleError>;

    // --- Sessions ---

    async fn insert_session(&self, session: &WorkSession) -> Result<(), VisibleError>;

    /// Overwrite the mutable columns of an existing session.
    async fn update_session(&self, session: &WorkSession) -> Result<(), VisibleError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<WorkSession>, VisibleError>;

    /// All sessions still in `waiting` or `active`.
    async fn list_open_sessions(&self) -> Result<Vec<WorkSession>, VisibleError>;

    /// Non-terminal sessions the user is a party to, newest first.
    async fn list_open_sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<WorkSession>, VisibleError>;

    // --- Chat messages ---

    async fn insert_message(&self, message: &ChatMessage) -> Result<(), VisibleError>;

    async fn get_message(&self, id: &MessageId) -> Result<Option<ChatMessage>, VisibleError>;

    /// Advance a message's delivery status if, and only if, `to` is ahead of
    /// the stored status. Returns the updated message, or `None` when the
    /// stored status was already at or past `to`.
    async fn advance_message_status(
        &self,
        id: &MessageId,
        to: DeliveryStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<ChatMessage>, VisibleError>;

    /// Messages of a session in send order.
    async fn list_messages(&self, session_id: &SessionId)
    -> Result<Vec<ChatMessage>, VisibleError>;

    /// Stamp `expires_at` on every message of the session that has none yet.
    async fn set_message_expiry(
        &self,
        session_id: &SessionId,
        expires_at: DateTime<Utc>,
    ) -> Result<usize, VisibleError>;

    /// Delete messages whose expiry is at or before `now`.
    async fn delete_expired_messages(&self, now: DateTime<Utc>) -> Result<usize, VisibleError>;

    // --- Notification log ---

    async fn record_notification(&self, record: &NotificationRecord) -> Result<(), VisibleError>;

    async fn list_notifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<NotificationRecord>, VisibleError>;
}
