// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the engine, storage, bus and gateway crates.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::VisibleError;

/// Numeric user identifier issued by the identity collaborator.
pub type UserId = i64;

/// Numeric identifier of a work assignment.
pub type WorkId = i64;

/// Globally unique identifier of a work session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Unique identifier of a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh random message id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The two parties of a work session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The party requesting a service.
    Seeker,
    /// The party fulfilling a service.
    Provider,
}

impl Role {
    /// The other party of a session.
    pub fn counterpart(self) -> Role {
        match self {
            Role::Seeker => Role::Provider,
            Role::Provider => Role::Seeker,
        }
    }
}

/// Named out-of-app contact channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Medium {
    /// Telegram handle or phone number.
    Telegram,
    /// WhatsApp number.
    Whatsapp,
    /// Plain phone number for a voice call.
    Call,
}

impl Medium {
    /// Every medium, in a stable order.
    pub const ALL: [Medium; 3] = [Medium::Telegram, Medium::Whatsapp, Medium::Call];
}

/// Medium name to contact value.
pub type MediumMap = BTreeMap<Medium, String>;

/// Convert a loosely-typed medium map received from a client.
///
/// All-or-nothing: a single unknown key rejects the whole map.
pub fn parse_medium_map(raw: &BTreeMap<String, String>) -> Result<MediumMap, VisibleError> {
    let unknown: Vec<&str> = raw
        .keys()
        .filter(|k| k.parse::<Medium>().is_err())
        .map(String::as_str)
        .collect();
    if !unknown.is_empty() {
        return Err(VisibleError::Validation(format!(
            "invalid medium types: {}. Allowed: telegram, whatsapp, call",
            unknown.join(", ")
        )));
    }

    let mut mediums = MediumMap::new();
    for (key, value) in raw {
        // Keys were checked above.
        if let Ok(medium) = key.parse::<Medium>() {
            mediums.insert(medium, value.trim().to_string());
        }
    }
    Ok(mediums)
}

/// Position of a work session in its lifecycle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Provider accepted; seeker has not selected mediums yet.
    Waiting,
    /// Seeker recorded a medium selection.
    Active,
    /// Either party cancelled.
    Cancelled,
    /// Either party finished the service.
    Completed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Cancelled | ConnectionState::Completed)
    }
}

/// Progress of a chat message. Ordered: `Sent < Delivered < Read`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Stored, not yet seen by the recipient's client.
    Sent,
    /// Recipient's client received it.
    Delivered,
    /// Recipient opened it.
    Read,
}

/// Lifecycle status of a work assignment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    /// Awaiting the provider's answer.
    Pending,
    /// Provider accepted; a session exists.
    Accepted,
    /// Provider declined.
    Rejected,
    /// The session that grew out of it completed.
    Completed,
    /// The session that grew out of it was cancelled.
    Cancelled,
}

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Degrees, in `[-90, 90]`.
    pub latitude: f64,
    /// Degrees, in `[-180, 180]`.
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, VisibleError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(VisibleError::Validation(format!(
                "latitude must be between -90 and 90, got {latitude}"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(VisibleError::Validation(format!(
                "longitude must be between -180 and 180, got {longitude}"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Last reported position of one party.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PartyLocation {
    /// Where the party was.
    pub point: GeoPoint,
    /// When the party reported it.
    pub updated_at: DateTime<Utc>,
}

/// How a session ended. Holding one enum value makes "cancelled and
/// completed at once" unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Termination {
    /// Ended by a cancellation from `by`.
    Cancelled { by: Role, at: DateTime<Utc> },
    /// Ended by `by` finishing the service.
    Completed { by: Role, at: DateTime<Utc> },
}

impl Termination {
    pub fn state(&self) -> ConnectionState {
        match self {
            Termination::Cancelled { .. } => ConnectionState::Cancelled,
            Termination::Completed { .. } => ConnectionState::Completed,
        }
    }

    pub fn by(&self) -> Role {
        match self {
            Termination::Cancelled { by, .. } | Termination::Completed { by, .. } => *by,
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            Termination::Cancelled { at, .. } | Termination::Completed { at, .. } => *at,
        }
    }
}

/// Seeker-supplied rating, recorded at completion time only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    /// 1 to 5.
    pub stars: u8,
    /// Free-form comment, possibly empty.
    pub description: String,
    /// Completion time.
    pub rated_at: DateTime<Utc>,
}

/// The live, stateful context for one accepted assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkSession {
    /// Session identifier, also the chat room and bus topic key.
    pub id: SessionId,
    /// The assignment this session was accepted from.
    pub work_id: WorkId,
    pub seeker_id: UserId,
    pub provider_id: UserId,
    /// Lifecycle position. Always agrees with `termination`.
    pub state: ConnectionState,
    /// Last seeker position, if ever reported.
    pub seeker_location: Option<PartyLocation>,
    /// Last provider position, if ever reported.
    pub provider_location: Option<PartyLocation>,
    /// Haversine distance at the last broadcast.
    pub current_distance_meters: Option<f64>,
    /// When the distance was last broadcast.
    pub last_distance_update: Option<DateTime<Utc>>,
    /// Contact values the provider shared.
    pub provider_mediums: Option<MediumMap>,
    /// Contact values the seeker selected. Setting them activates the session.
    pub seeker_mediums: Option<MediumMap>,
    /// When the provider shared mediums.
    pub mediums_shared_at: Option<DateTime<Utc>>,
    pub chat_room_id: String,
    /// First chat activity. Set once.
    pub chat_started_at: Option<DateTime<Utc>>,
    /// Who ended the session and how. `None` while open.
    pub termination: Option<Termination>,
    /// Seeker's rating, only on completion.
    pub rating: Option<Rating>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    /// A freshly accepted session in the `waiting` state.
    pub fn new(
        work_id: WorkId,
        seeker_id: UserId,
        provider_id: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        let id = SessionId::generate();
        let chat_room_id = id.0.clone();
        Self {
            id,
            work_id,
            seeker_id,
            provider_id,
            state: ConnectionState::Waiting,
            seeker_location: None,
            provider_location: None,
            current_distance_meters: None,
            last_distance_update: None,
            provider_mediums: None,
            seeker_mediums: None,
            mediums_shared_at: None,
            chat_room_id,
            chat_started_at: None,
            termination: None,
            rating: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The role `user_id` plays in this session, if any.
    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        if user_id == self.seeker_id {
            Some(Role::Seeker)
        } else if user_id == self.provider_id {
            Some(Role::Provider)
        } else {
            None
        }
    }

    pub fn user_for(&self, role: Role) -> UserId {
        match role {
            Role::Seeker => self.seeker_id,
            Role::Provider => self.provider_id,
        }
    }

    pub fn location_of(&self, role: Role) -> Option<&PartyLocation> {
        match role {
            Role::Seeker => self.seeker_location.as_ref(),
            Role::Provider => self.provider_location.as_ref(),
        }
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        match self.termination {
            Some(Termination::Cancelled { at, .. }) => Some(at),
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.termination {
            Some(Termination::Completed { at, .. }) => Some(at),
            _ => None,
        }
    }

    /// Fails with `SessionTerminal` once the session has ended.
    pub fn ensure_open(&self) -> Result<(), VisibleError> {
        if self.is_terminal() {
            return Err(VisibleError::SessionTerminal {
                session_id: self.id.0.clone(),
                state: self.state,
            });
        }
        Ok(())
    }
}

/// A message in a session's anonymous chat.
///
/// Only the sender's role is stored, never the sender's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub session_id: SessionId,
    /// Role of the sender. Never the sender's id.
    pub sender_role: Role,
    /// Trimmed message body.
    pub text: String,
    pub sent_at: DateTime<Utc>,
    /// Only ever moves forward.
    pub delivery_status: DeliveryStatus,
    /// Set when status reaches `delivered` or skips straight to `read`.
    pub delivered_at: Option<DateTime<Utc>>,
    /// Set when status reaches `read`.
    pub read_at: Option<DateTime<Utc>>,
    /// After this the message is swept.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Ephemeral "is typing" state of one party in one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingIndicator {
    pub session_id: SessionId,
    pub role: Role,
    /// Whether the party is typing right now.
    pub is_typing: bool,
    /// Last change or refresh.
    pub last_typing_at: DateTime<Utc>,
}

/// A dispatch request from a seeker to a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkAssignment {
    pub id: WorkId,
    pub seeker_id: UserId,
    pub provider_id: UserId,
    /// Requested trade, for example `electrician`.
    pub service_type: String,
    /// Seeker's note to the provider.
    pub message: String,
    pub status: AssignmentStatus,
    /// Where the seeker wants the work done, if given.
    pub seeker_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
    /// When the provider accepted or rejected.
    pub responded_at: Option<DateTime<Utc>>,
    /// When the resulting session ended.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Input for creating a work assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAssignment {
    pub seeker_id: UserId,
    pub provider_id: UserId,
    pub service_type: String,
    pub message: String,
    pub seeker_location: Option<GeoPoint>,
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Authenticated user.
    pub user_id: UserId,
    /// Role the caller acts in.
    pub role: Role,
}

/// Display-safe identity fragments. Never injected into chat payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub user_id: UserId,
    pub role: Role,
    pub display_name: String,
    /// Profile-level contact channels the user has enabled.
    pub available_mediums: MediumMap,
}

/// A best-effort push notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushNotification {
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
    /// String-only data payload.
    pub metadata: BTreeMap<String, String>,
}

/// Outcome reported by the push collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Accepted by the push service.
    Sent { message_id: Option<String> },
    /// Rejected or unreachable.
    Failed { reason: String },
}

/// What a logged notification was about.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    WorkAssigned,
    WorkAccepted,
    WorkRejected,
    MediumsShared,
    SessionActivated,
    ChatMessage,
    SessionCancelled,
    SessionCompleted,
}

/// Channel a notification went through.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMethod {
    Push,
    Live,
}

/// Row of the notification delivery log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub work_id: Option<WorkId>,
    pub session_id: Option<SessionId>,
    /// User the notification was addressed to.
    pub recipient_id: UserId,
    pub kind: NotificationKind,
    pub method: DeliveryMethod,
    /// Whether this attempt reached the recipient.
    pub delivered: bool,
    /// Failure reason when `delivered` is false.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Push,
    Identity,
    Gateway,
    Observability,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_counterpart_is_involution() {
        assert_eq!(Role::Seeker.counterpart(), Role::Provider);
        assert_eq!(Role::Provider.counterpart().counterpart(), Role::Provider);
    }

    #[test]
    fn role_parses_lowercase() {
        assert_eq!("seeker".parse::<Role>().unwrap(), Role::Seeker);
        assert_eq!(Role::Provider.to_string(), "provider");
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn medium_map_accepts_known_keys() {
        let mut raw = BTreeMap::new();
        raw.insert("whatsapp".to_string(), " 9876543210 ".to_string());
        raw.insert("call".to_string(), "555".to_string());
        let parsed = parse_medium_map(&raw).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[&Medium::Whatsapp], "9876543210");
    }

    #[test]
    fn medium_map_rejects_unknown_key_entirely() {
        let mut raw = BTreeMap::new();
        raw.insert("whatsapp".to_string(), "1".to_string());
        raw.insert("instagram".to_string(), "@x".to_string());
        let err = parse_medium_map(&raw).unwrap_err();
        assert!(matches!(err, VisibleError::Validation(ref m) if m.contains("instagram")));
    }

    #[test]
    fn empty_medium_map_is_valid() {
        assert!(parse_medium_map(&BTreeMap::new()).unwrap().is_empty());
    }

    #[test]
    fn medium_map_serializes_with_string_keys() {
        let mut map = MediumMap::new();
        map.insert(Medium::Whatsapp, "9876543210".to_string());
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"whatsapp":"9876543210"}"#);
    }

    #[test]
    fn delivery_status_is_ordered() {
        assert!(DeliveryStatus::Sent < DeliveryStatus::Delivered);
        assert!(DeliveryStatus::Delivered < DeliveryStatus::Read);
    }

    #[test]
    fn terminal_states() {
        assert!(!ConnectionState::Waiting.is_terminal());
        assert!(!ConnectionState::Active.is_terminal());
        assert!(ConnectionState::Cancelled.is_terminal());
        assert!(ConnectionState::Completed.is_terminal());
    }

    #[test]
    fn geo_point_rejects_out_of_range() {
        assert!(GeoPoint::new(91.0, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -181.0).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(12.97, 77.59).is_ok());
    }

    #[test]
    fn new_session_uses_id_as_chat_room() {
        let session = WorkSession::new(234, 1, 2, Utc::now());
        assert_eq!(session.state, ConnectionState::Waiting);
        assert_eq!(session.chat_room_id, session.id.0);
        assert_eq!(session.role_of(1), Some(Role::Seeker));
        assert_eq!(session.role_of(2), Some(Role::Provider));
        assert_eq!(session.role_of(3), None);
    }

    #[test]
    fn termination_accessors_are_exclusive() {
        let mut session = WorkSession::new(1, 1, 2, Utc::now());
        let at = Utc::now();
        session.termination = Some(Termination::Cancelled {
            by: Role::Provider,
            at,
        });
        session.state = ConnectionState::Cancelled;
        assert_eq!(session.cancelled_at(), Some(at));
        assert_eq!(session.completed_at(), None);
        assert!(session.ensure_open().is_err());
    }
}
