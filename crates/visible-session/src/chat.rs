// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anonymous chat: message admission, acknowledgement rules and typing state.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use visible_core::types::{ChatMessage, DeliveryStatus, TypingIndicator};
use visible_core::{MessageId, Role, SessionId, VisibleError};

/// Trim and bound a chat message body.
pub fn admit_text(text: &str, max_len: usize) -> Result<String, VisibleError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(VisibleError::Validation("message cannot be empty".into()));
    }
    let len = text.chars().count();
    if len > max_len {
        return Err(VisibleError::Validation(format!(
            "message is {len} characters, limit is {max_len}"
        )));
    }
    Ok(text.to_string())
}

/// A freshly submitted message. Only the sender's role is kept.
pub fn new_message(
    session_id: &SessionId,
    sender_role: Role,
    text: String,
    at: DateTime<Utc>,
) -> ChatMessage {
    ChatMessage {
        id: MessageId::generate(),
        session_id: session_id.clone(),
        sender_role,
        text,
        sent_at: at,
        delivery_status: DeliveryStatus::Sent,
        delivered_at: None,
        read_at: None,
        expires_at: None,
    }
}

/// What an acknowledgement should do to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckDecision {
    /// The message moves forward to the target.
    Advance,
    /// Already at or past the target.
    NoOp,
}

/// Check an acknowledgement by `acker` moving `message` to `target`.
pub fn check_ack(
    message: &ChatMessage,
    acker: Role,
    target: DeliveryStatus,
) -> Result<AckDecision, VisibleError> {
    if target == DeliveryStatus::Sent {
        return Err(VisibleError::Validation(
            "messages cannot be acknowledged as sent".into(),
        ));
    }
    if acker == message.sender_role {
        return Err(VisibleError::PermissionDenied(
            "only the recipient can acknowledge a message".into(),
        ));
    }
    if message.delivery_status >= target {
        return Ok(AckDecision::NoOp);
    }
    Ok(AckDecision::Advance)
}

/// Last-known typing state per (session, role). Never persisted.
#[derive(Debug, Default)]
pub struct TypingBoard {
    states: DashMap<(SessionId, Role), TypingIndicator>,
}

impl TypingBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a typing signal. Returns true when the value flipped.
    ///
    /// A first signal counts as a flip only when it says "typing", since an
    /// unknown indicator reads as not typing.
    pub fn set(
        &self,
        session_id: &SessionId,
        role: Role,
        is_typing: bool,
        at: DateTime<Utc>,
    ) -> bool {
        let mut flipped = is_typing;
        self.states
            .entry((session_id.clone(), role))
            .and_modify(|state| {
                flipped = state.is_typing != is_typing;
                state.is_typing = is_typing;
                state.last_typing_at = at;
            })
            .or_insert_with(|| TypingIndicator {
                session_id: session_id.clone(),
                role,
                is_typing,
                last_typing_at: at,
            });
        flipped
    }

    pub fn get(&self, session_id: &SessionId, role: Role) -> Option<TypingIndicator> {
        self.states
            .get(&(session_id.clone(), role))
            .map(|s| s.value().clone())
    }

    /// Force indicators idle for longer than `stale` back to false.
    /// Returns the indicators that flipped.
    ///
    /// Indicators that were already false and stayed quiet past `stale` are
    /// dropped, so entries of ended sessions do not accumulate.
    pub fn sweep_stale(&self, now: DateTime<Utc>, stale: Duration) -> Vec<TypingIndicator> {
        let mut flipped = Vec::new();
        self.states.retain(|_, state| {
            if now - state.last_typing_at <= stale {
                return true;
            }
            if !state.is_typing {
                return false;
            }
            state.is_typing = false;
            state.last_typing_at = now;
            flipped.push(state.clone());
            true
        });
        flipped
    }

    /// Drop all typing state of a session.
    pub fn clear(&self, session_id: &SessionId) {
        self.states.retain(|(id, _), _| id != session_id);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap()
    }

    fn message(status: DeliveryStatus) -> ChatMessage {
        let mut m = new_message(&SessionId::from("s"), Role::Seeker, "hi".into(), t0());
        m.delivery_status = status;
        m
    }

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(admit_text("  hello ", 10).unwrap(), "hello");
        assert!(admit_text("   ", 10).is_err());
        assert!(admit_text("abcdef", 5).is_err());
        assert_eq!(admit_text("ééééé", 5).unwrap(), "ééééé");
    }

    #[test]
    fn new_message_starts_sent_without_expiry() {
        let m = new_message(&SessionId::from("s"), Role::Provider, "x".into(), t0());
        assert_eq!(m.delivery_status, DeliveryStatus::Sent);
        assert!(m.expires_at.is_none());
        assert!(m.delivered_at.is_none());
    }

    #[test]
    fn sender_cannot_acknowledge_own_message() {
        let m = message(DeliveryStatus::Sent);
        assert!(matches!(
            check_ack(&m, Role::Seeker, DeliveryStatus::Delivered),
            Err(VisibleError::PermissionDenied(_))
        ));
    }

    #[test]
    fn ack_to_sent_is_invalid() {
        let m = message(DeliveryStatus::Sent);
        assert!(matches!(
            check_ack(&m, Role::Provider, DeliveryStatus::Sent),
            Err(VisibleError::Validation(_))
        ));
    }

    #[test]
    fn repeated_or_backward_ack_is_noop() {
        let m = message(DeliveryStatus::Read);
        assert_eq!(
            check_ack(&m, Role::Provider, DeliveryStatus::Delivered).unwrap(),
            AckDecision::NoOp
        );
        assert_eq!(
            check_ack(&m, Role::Provider, DeliveryStatus::Read).unwrap(),
            AckDecision::NoOp
        );
    }

    proptest! {
        #[test]
        fn acks_never_move_backward(targets in proptest::collection::vec(prop_oneof![
            Just(DeliveryStatus::Delivered),
            Just(DeliveryStatus::Read),
        ], 1..12)) {
            let mut m = message(DeliveryStatus::Sent);
            for target in targets {
                let before = m.delivery_status;
                if check_ack(&m, Role::Provider, target).unwrap() == AckDecision::Advance {
                    m.delivery_status = target;
                }
                prop_assert!(m.delivery_status >= before);
            }
        }
    }

    #[test]
    fn typing_reports_flips_only() {
        let board = TypingBoard::new();
        let s = SessionId::from("s");
        assert!(board.set(&s, Role::Seeker, true, t0()));
        assert!(!board.set(&s, Role::Seeker, true, t0()));
        assert!(board.set(&s, Role::Seeker, false, t0()));
        assert!(!board.set(&s, Role::Seeker, false, t0()));
        assert!(!board.set(&s, Role::Provider, false, t0()));
    }

    #[test]
    fn stale_indicators_are_reset() {
        let board = TypingBoard::new();
        let s = SessionId::from("s");
        board.set(&s, Role::Seeker, true, t0());
        board.set(&s, Role::Provider, true, t0() + Duration::seconds(50));

        let flipped = board.sweep_stale(t0() + Duration::seconds(61), Duration::seconds(60));
        assert_eq!(flipped.len(), 1);
        assert_eq!(flipped[0].role, Role::Seeker);
        assert!(!board.get(&s, Role::Seeker).unwrap().is_typing);
        assert!(board.get(&s, Role::Provider).unwrap().is_typing);
    }

    #[test]
    fn quiet_indicators_are_dropped() {
        let board = TypingBoard::new();
        let s = SessionId::from("s");
        board.set(&s, Role::Seeker, true, t0());
        board.set(&s, Role::Provider, false, t0());

        let first = t0() + Duration::seconds(61);
        assert_eq!(board.sweep_stale(first, Duration::seconds(60)).len(), 1);
        assert_eq!(board.len(), 1);

        let second = first + Duration::seconds(61);
        assert!(board.sweep_stale(second, Duration::seconds(60)).is_empty());
        assert!(board.is_empty());
    }

    #[test]
    fn clear_drops_one_session() {
        let board = TypingBoard::new();
        board.set(&SessionId::from("a"), Role::Seeker, true, t0());
        board.set(&SessionId::from("b"), Role::Seeker, true, t0());
        board.clear(&SessionId::from("a"));
        assert_eq!(board.len(), 1);
    }
}
