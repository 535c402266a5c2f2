// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON text frames exchanged over the work WebSocket.
//!
//! Client -> server frames are parsed into [`ClientFrame`]. Server -> client
//! traffic is either a [`BusEvent`] forwarded from the bus or one of the
//! direct replies in [`ServerFrame`]; both carry a `type` tag.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use visible_bus::BusEvent;
use visible_core::types::{ChatMessage, ConnectionState, MediumMap, UserId};
use visible_core::{DeliveryStatus, MessageId, Role, SessionId, VisibleError, WorkId};

/// A frame sent by a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Keepalive. Answered with `pong`.
    Ping,
    /// Provider accepts or rejects a pending assignment.
    WorkResponse {
        work_id: WorkId,
        accepted: bool,
    },
    /// Position ping from either party.
    LocationUpdate {
        session_id: SessionId,
        latitude: f64,
        longitude: f64,
    },
    /// Provider shares contact values. Keys must name known mediums.
    MediumShare {
        session_id: SessionId,
        mediums: BTreeMap<String, String>,
    },
    /// Seeker picks contact values. An empty map still activates.
    MediumSelection {
        session_id: SessionId,
        #[serde(default)]
        mediums: BTreeMap<String, String>,
    },
    /// Open the chat and mark it started.
    StartChat {
        session_id: SessionId,
    },
    /// Send a chat message to the other party.
    ChatMessage {
        session_id: SessionId,
        message: String,
    },
    /// Recipient acknowledges delivery.
    MessageDelivered {
        message_id: MessageId,
    },
    /// Recipient acknowledges reading.
    MessageRead {
        message_id: MessageId,
    },
    /// Typing started or stopped.
    TypingIndicator {
        session_id: SessionId,
        is_typing: bool,
    },
    /// End the session as cancelled.
    CancelConnection {
        session_id: SessionId,
    },
    /// End the session as completed, optionally with a seeker rating.
    FinishService {
        session_id: SessionId,
        /// Clients send either a number or a numeric string.
        #[serde(default)]
        rating_stars: Option<serde_json::Value>,
        #[serde(default)]
        rating_description: Option<String>,
    },
}

impl ClientFrame {
    /// Parse a text frame, reporting malformed input as a validation error.
    pub fn parse(text: &str) -> Result<Self, VisibleError> {
        serde_json::from_str(text)
            .map_err(|e| VisibleError::Validation(format!("invalid frame: {e}")))
    }

    /// The session this frame acts on, when it names one.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            ClientFrame::LocationUpdate { session_id, .. }
            | ClientFrame::MediumShare { session_id, .. }
            | ClientFrame::MediumSelection { session_id, .. }
            | ClientFrame::StartChat { session_id }
            | ClientFrame::ChatMessage { session_id, .. }
            | ClientFrame::TypingIndicator { session_id, .. }
            | ClientFrame::CancelConnection { session_id }
            | ClientFrame::FinishService { session_id, .. } => Some(session_id),
            ClientFrame::Ping
            | ClientFrame::WorkResponse { .. }
            | ClientFrame::MessageDelivered { .. }
            | ClientFrame::MessageRead { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::Ping => "ping",
            ClientFrame::WorkResponse { .. } => "work_response",
            ClientFrame::LocationUpdate { .. } => "location_update",
            ClientFrame::MediumShare { .. } => "medium_share",
            ClientFrame::MediumSelection { .. } => "medium_selection",
            ClientFrame::StartChat { .. } => "start_chat",
            ClientFrame::ChatMessage { .. } => "chat_message",
            ClientFrame::MessageDelivered { .. } => "message_delivered",
            ClientFrame::MessageRead { .. } => "message_read",
            ClientFrame::TypingIndicator { .. } => "typing_indicator",
            ClientFrame::CancelConnection { .. } => "cancel_connection",
            ClientFrame::FinishService { .. } => "finish_service",
        }
    }
}

/// Interpret a loosely-typed star rating.
///
/// `null` and the empty string mean "no rating". Anything else must be an
/// integer, possibly quoted; range checks happen in the engine.
pub fn parse_stars(raw: Option<&serde_json::Value>) -> Result<Option<i64>, VisibleError> {
    let invalid = || VisibleError::Validation("rating_stars must be an integer".into());
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Number(n)) => n.as_i64().map(Some).ok_or_else(invalid),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(serde_json::Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// One message in a `chat_history_loaded` frame.
///
/// `is_mine` replaces any sender identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub message_id: MessageId,
    pub sender_role: Role,
    /// Whether the viewer sent it.
    pub is_mine: bool,
    pub message: String,
    pub delivery_status: DeliveryStatus,
    /// When it was sent.
    pub timestamp: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

impl HistoryEntry {
    pub fn for_viewer(message: ChatMessage, viewer: Role) -> Self {
        Self {
            is_mine: message.sender_role == viewer,
            message_id: message.id,
            sender_role: message.sender_role,
            message: message.text,
            delivery_status: message.delivery_status,
            timestamp: message.sent_at,
            delivered_at: message.delivered_at,
            read_at: message.read_at,
        }
    }
}

/// Direct replies to the connection that sent a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection.
    ConnectionEstablished {
        user_id: UserId,
        role: Role,
        timestamp: DateTime<Utc>,
    },
    Pong {
        timestamp: DateTime<Utc>,
    },
    /// A frame was rejected. `code` is stable, `error` is for humans.
    Error {
        code: &'static str,
        error: String,
    },
    /// Result of a `work_response`. Carries the session on acceptance.
    WorkResponse {
        work_id: WorkId,
        accepted: bool,
        session_id: Option<SessionId>,
    },
    MediumsShared {
        session_id: SessionId,
        mediums: MediumMap,
    },
    MediumsSelected {
        session_id: SessionId,
        mediums: MediumMap,
        state: ConnectionState,
    },
    /// The sender's copy of a stored chat message.
    MessageSent {
        session_id: SessionId,
        message_id: MessageId,
        delivery_status: DeliveryStatus,
        timestamp: DateTime<Utc>,
    },
    /// Open session restored on connect, with its chat history.
    ChatHistoryLoaded {
        session_id: SessionId,
        state: ConnectionState,
        messages: Vec<HistoryEntry>,
    },
}

impl ServerFrame {
    /// Error acknowledgement for a rejected action.
    ///
    /// Server-side failures are reported without their detail.
    pub fn error(err: &VisibleError) -> Self {
        let error = if err.is_client_error() {
            err.to_string()
        } else {
            "internal server error".to_string()
        };
        ServerFrame::Error {
            code: err.code(),
            error,
        }
    }
}

/// Anything the writer task can put on the socket.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A direct reply.
    Frame(ServerFrame),
    /// A bus event forwarded from a followed topic.
    Event(BusEvent),
}

impl Outbound {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        match self {
            Outbound::Frame(frame) => serde_json::to_string(frame),
            Outbound::Event(event) => serde_json::to_string(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_finish_with_quoted_stars() {
        let frame = ClientFrame::parse(
            r#"{"type":"finish_service","session_id":"s1","rating_stars":"5","rating_description":"Great"}"#,
        )
        .unwrap();
        let ClientFrame::FinishService {
            session_id,
            rating_stars,
            rating_description,
        } = frame
        else {
            panic!("wrong frame");
        };
        assert_eq!(session_id, SessionId::from("s1"));
        assert_eq!(parse_stars(rating_stars.as_ref()).unwrap(), Some(5));
        assert_eq!(rating_description.as_deref(), Some("Great"));
    }

    #[test]
    fn stars_accept_null_and_reject_garbage() {
        assert_eq!(parse_stars(None).unwrap(), None);
        assert_eq!(parse_stars(Some(&json!(null))).unwrap(), None);
        assert_eq!(parse_stars(Some(&json!(""))).unwrap(), None);
        assert_eq!(parse_stars(Some(&json!(4))).unwrap(), Some(4));
        assert!(parse_stars(Some(&json!("five"))).is_err());
        assert!(parse_stars(Some(&json!(4.5))).is_err());
        assert!(parse_stars(Some(&json!([5]))).is_err());
    }

    #[test]
    fn selection_mediums_default_to_empty() {
        let frame =
            ClientFrame::parse(r#"{"type":"medium_selection","session_id":"s1"}"#).unwrap();
        assert_eq!(
            frame,
            ClientFrame::MediumSelection {
                session_id: SessionId::from("s1"),
                mediums: BTreeMap::new(),
            }
        );
        assert_eq!(frame.session_id(), Some(&SessionId::from("s1")));
    }

    #[test]
    fn unknown_frame_is_a_validation_error() {
        let err = ClientFrame::parse(r#"{"type":"teleport"}"#).unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(ClientFrame::parse("not json").is_err());
    }

    #[test]
    fn error_frame_hides_server_detail() {
        let frame = ServerFrame::error(&VisibleError::Internal("db path /secret".into()));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "internal_error");
        assert_eq!(json["error"], "internal server error");

        let frame = ServerFrame::error(&VisibleError::Validation("bad medium".into()));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["code"], "validation_error");
        assert_eq!(json["error"], "validation error: bad medium");
    }

    #[test]
    fn pong_is_tagged() {
        let json = Outbound::Frame(ServerFrame::Pong {
            timestamp: Utc::now(),
        })
        .to_json()
        .unwrap();
        assert!(json.contains(r#""type":"pong""#));
    }
}
