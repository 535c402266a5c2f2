// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Topics, audiences and the typed events carried on the bus.
//!
//! `BusEvent` serializes to the exact JSON frame pushed to clients.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use visible_core::types::{
    ConnectionState, DeliveryStatus, GeoPoint, MediumMap, MessageId, Role, SessionId, UserId,
    WorkId,
};

/// Where an envelope is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Both parties of one session.
    Session(SessionId),
    /// Every live connection of one user.
    User(UserId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Session(id) => write!(f, "session:{id}"),
            Topic::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Which subscribers of a topic should act on an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Both parties.
    Everyone,
    /// Only connections acting in this role.
    Only(Role),
}

impl Audience {
    pub fn includes(self, role: Role) -> bool {
        match self {
            Audience::Everyone => true,
            Audience::Only(target) => target == role,
        }
    }
}

/// A published event plus its audience.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Who should act on it.
    pub audience: Audience,
    /// The payload forwarded to clients.
    pub event: BusEvent,
}

impl Envelope {
    pub fn to(role: Role, event: BusEvent) -> Self {
        Self {
            audience: Audience::Only(role),
            event,
        }
    }

    pub fn everyone(event: BusEvent) -> Self {
        Self {
            audience: Audience::Everyone,
            event,
        }
    }
}

/// Events delivered to live connections.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusEvent {
    /// A seeker dispatched work to this provider.
    WorkAssigned {
        work_id: WorkId,
        seeker_id: UserId,
        seeker_name: String,
        service_type: String,
        message: String,
        seeker_location: Option<GeoPoint>,
        timestamp: DateTime<Utc>,
    },
    /// The provider accepted; a session now exists in `waiting`.
    WorkAccepted {
        work_id: WorkId,
        session_id: SessionId,
        provider_name: String,
        provider_available_mediums: MediumMap,
        seeker_available_mediums: MediumMap,
        timestamp: DateTime<Utc>,
    },
    /// The provider declined the assignment.
    WorkRejected {
        work_id: WorkId,
        timestamp: DateTime<Utc>,
    },
    /// Lifecycle transition of a session.
    SessionState {
        session_id: SessionId,
        state: ConnectionState,
        actor: Option<Role>,
        timestamp: DateTime<Utc>,
    },
    /// The provider shared contact values with the seeker.
    ProviderMediumsShared {
        session_id: SessionId,
        mediums: MediumMap,
        timestamp: DateTime<Utc>,
    },
    /// The seeker picked contact values. Sent to the provider.
    SeekerMediumsSelected {
        session_id: SessionId,
        mediums: MediumMap,
        timestamp: DateTime<Utc>,
    },
    /// A throttled distance reading, sent to both parties.
    DistanceUpdate {
        session_id: SessionId,
        distance_meters: f64,
        distance_formatted: String,
        timestamp: DateTime<Utc>,
    },
    /// First chat activity on the session.
    ChatReady {
        session_id: SessionId,
        chat_room_id: String,
        started_by: Role,
    },
    /// A chat message for the recipient. Carries the sender's role only.
    ChatMessage {
        session_id: SessionId,
        message_id: MessageId,
        sender_role: Role,
        message: String,
        delivery_status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },
    /// A delivery acknowledgement, routed back to the original sender.
    MessageStatusUpdate {
        session_id: SessionId,
        message_id: MessageId,
        status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },
    /// Typing state of the other party.
    TypingIndicator {
        session_id: SessionId,
        sender_role: Role,
        is_typing: bool,
    },
    /// Either party cancelled. Ends the session.
    ConnectionCancelled {
        session_id: SessionId,
        cancelled_by: Role,
        timestamp: DateTime<Utc>,
    },
    /// Completion notice. Never carries the rating.
    ServiceFinished {
        session_id: SessionId,
        completed_by: Role,
        timestamp: DateTime<Utc>,
    },
}

impl BusEvent {
    /// Session this event belongs to, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            BusEvent::WorkAssigned { .. } | BusEvent::WorkRejected { .. } => None,
            BusEvent::WorkAccepted { session_id, .. }
            | BusEvent::SessionState { session_id, .. }
            | BusEvent::ProviderMediumsShared { session_id, .. }
            | BusEvent::SeekerMediumsSelected { session_id, .. }
            | BusEvent::DistanceUpdate { session_id, .. }
            | BusEvent::ChatReady { session_id, .. }
            | BusEvent::ChatMessage { session_id, .. }
            | BusEvent::MessageStatusUpdate { session_id, .. }
            | BusEvent::TypingIndicator { session_id, .. }
            | BusEvent::ConnectionCancelled { session_id, .. }
            | BusEvent::ServiceFinished { session_id, .. } => Some(session_id),
        }
    }

    /// Whether the session ends with this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BusEvent::ConnectionCancelled { .. } | BusEvent::ServiceFinished { .. }
        )
    }

    /// Short name for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BusEvent::WorkAssigned { .. } => "work_assigned",
            BusEvent::WorkAccepted { .. } => "work_accepted",
            BusEvent::WorkRejected { .. } => "work_rejected",
            BusEvent::SessionState { .. } => "session_state",
            BusEvent::ProviderMediumsShared { .. } => "provider_mediums_shared",
            BusEvent::SeekerMediumsSelected { .. } => "seeker_mediums_selected",
            BusEvent::DistanceUpdate { .. } => "distance_update",
            BusEvent::ChatReady { .. } => "chat_ready",
            BusEvent::ChatMessage { .. } => "chat_message",
            BusEvent::MessageStatusUpdate { .. } => "message_status_update",
            BusEvent::TypingIndicator { .. } => "typing_indicator",
            BusEvent::ConnectionCancelled { .. } => "connection_cancelled",
            BusEvent::ServiceFinished { .. } => "service_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use visible_core::types::Medium;

    #[test]
    fn topics_render_with_scope_prefix() {
        assert_eq!(Topic::User(7).to_string(), "user:7");
        assert_eq!(Topic::Session(SessionId::from("abc")).to_string(), "session:abc");
    }

    #[test]
    fn audience_filters_by_role() {
        assert!(Audience::Everyone.includes(Role::Seeker));
        assert!(Audience::Only(Role::Provider).includes(Role::Provider));
        assert!(!Audience::Only(Role::Provider).includes(Role::Seeker));
    }

    #[test]
    fn events_serialize_as_tagged_frames() {
        let mut mediums = MediumMap::new();
        mediums.insert(Medium::Whatsapp, "9876543210".to_string());
        let event = BusEvent::SeekerMediumsSelected {
            session_id: SessionId::from("s1"),
            mediums,
            timestamp: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "seeker_mediums_selected");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["mediums"]["whatsapp"], "9876543210");
        assert_eq!(event.kind(), "seeker_mediums_selected");
    }

    #[test]
    fn terminal_events() {
        let finished = BusEvent::ServiceFinished {
            session_id: SessionId::from("s"),
            completed_by: Role::Seeker,
            timestamp: Utc::now(),
        };
        assert!(finished.is_terminal());
        assert_eq!(finished.session_id(), Some(&SessionId::from("s")));
        let rejected = BusEvent::WorkRejected {
            work_id: 1,
            timestamp: Utc::now(),
        };
        assert!(!rejected.is_terminal());
        assert!(rejected.session_id().is_none());
    }
}
