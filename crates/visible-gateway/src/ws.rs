// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket handler for the work channel.
//!
//! One connection per authenticated user and role. Each connection follows
//! its user topic from the start and joins a session topic once the user is
//! known to be a party: on resume, on `work_accepted`, or on the first frame
//! acting on the session. Frames are handled in arrival order; events from
//! the bus are forwarded by per-topic tasks that keep only envelopes
//! addressed to this connection's role.
//!
//! When a joined session is cancelled or completed, the connection
//! forwards the final event and then closes. Dropping a connection never
//! touches the session.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use axum::{
    Json,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use visible_bus::{BusEvent, Subscription, Topic};
use visible_core::types::{GeoPoint, Identity, parse_medium_map};
use visible_core::{DeliveryStatus, MessageId, Role, SessionId, VisibleError};
use visible_session::{AssignmentResponse, RatingRequest, SessionEngine};

use crate::auth;
use crate::handlers::ErrorResponse;
use crate::protocol::{ClientFrame, HistoryEntry, Outbound, ServerFrame, parse_stars};
use crate::server::GatewayState;

/// Query parameters accepted on the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    /// Bearer token for clients that cannot set headers.
    #[serde(default)]
    pub token: Option<String>,
}

/// GET /ws/work/provider
pub async fn provider_ws(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    upgrade(Role::Provider, ws, state, &headers, &query)
}

/// GET /ws/work/seeker
pub async fn seeker_ws(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
) -> Response {
    upgrade(Role::Seeker, ws, state, &headers, &query)
}

/// Authenticate before upgrading; the token's role must match the path.
fn upgrade(
    expected: Role,
    ws: WebSocketUpgrade,
    state: GatewayState,
    headers: &HeaderMap,
    query: &WsQuery,
) -> Response {
    let identity = match auth::authenticate(&state, headers, query.token.as_deref()) {
        Ok(identity) => identity,
        Err(e) => return auth::unauthorized(&e),
    };
    if identity.role != expected {
        return (
            StatusCode::FORBIDDEN,
            Json(ErrorResponse {
                code: "permission_denied",
                error: format!(
                    "a {} token cannot open the {expected} channel",
                    identity.role
                ),
            }),
        )
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Per-connection state shared by the reader loop and forwarder tasks.
struct Connection {
    engine: SessionEngine,
    identity: Identity,
    out: mpsc::Sender<Outbound>,
    token: CancellationToken,
    joined: Mutex<HashSet<SessionId>>,
    tasks: TaskTracker,
}

impl Connection {
    async fn send(&self, frame: ServerFrame) -> bool {
        self.out.send(Outbound::Frame(frame)).await.is_ok()
    }

    fn joined_sessions(&self) -> std::sync::MutexGuard<'_, HashSet<SessionId>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_joined(&self, session_id: &SessionId) -> bool {
        self.joined_sessions().contains(session_id)
    }

    /// Subscribe now and forward in the background.
    fn follow(self: &Arc<Self>, topic: Topic) {
        let rx = self.engine.bus().subscribe(&topic);
        let conn = Arc::clone(self);
        self.tasks.spawn(async move { conn.forward(topic, rx).await });
    }

    fn join(self: &Arc<Self>, session_id: &SessionId) {
        if self.joined_sessions().insert(session_id.clone()) {
            debug!(session_id = %session_id, user_id = self.identity.user_id, "joined session topic");
            self.follow(Topic::Session(session_id.clone()));
        }
    }

    fn leave(&self, session_id: &SessionId) {
        self.joined_sessions().remove(session_id);
    }

    /// Join a session the first time this connection acts on it.
    ///
    /// The snapshot doubles as the party check, so a stranger never
    /// subscribes to someone else's session.
    async fn ensure_joined(self: &Arc<Self>, session_id: &SessionId) -> Result<(), VisibleError> {
        if self.is_joined(session_id) {
            return Ok(());
        }
        let session = self.engine.snapshot(&self.identity, session_id).await?;
        if !session.state.is_terminal() {
            self.join(session_id);
        }
        Ok(())
    }

    async fn forward(self: Arc<Self>, topic: Topic, mut rx: Subscription) {
        loop {
            let envelope = tokio::select! {
                _ = self.token.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(envelope) => envelope,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(topic = %topic, skipped, "connection lagging, events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            if !envelope.audience.includes(self.identity.role) {
                continue;
            }

            let event = envelope.event;
            if let BusEvent::WorkAccepted { session_id, .. } = &event {
                self.join(session_id);
            }
            let ends_session = match &topic {
                Topic::Session(id) if event.is_terminal() => Some(id.clone()),
                _ => None,
            };
            if self.out.send(Outbound::Event(event)).await.is_err() {
                break;
            }
            if let Some(session_id) = ends_session {
                self.leave(&session_id);
                debug!(session_id = %session_id, user_id = self.identity.user_id, "session ended, closing work channel");
                self.token.cancel();
                break;
            }
        }
    }

    async fn acknowledge(
        self: &Arc<Self>,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Result<(), VisibleError> {
        if let Some(message) = self
            .engine
            .acknowledge_message(&self.identity, message_id, status)
            .await?
        {
            self.join(&message.session_id);
        }
        Ok(())
    }

    /// Apply one client frame. `Ok(Some(_))` is a direct reply to the sender.
    async fn handle(self: &Arc<Self>, frame: ClientFrame) -> Result<Option<ServerFrame>, VisibleError> {
        if let Some(session_id) = frame.session_id() {
            self.ensure_joined(session_id).await?;
        }
        let me = &self.identity;
        let reply = match frame {
            ClientFrame::Ping => Some(ServerFrame::Pong {
                timestamp: Utc::now(),
            }),
            ClientFrame::WorkResponse { work_id, accepted } => {
                match self
                    .engine
                    .respond_to_assignment(me, work_id, accepted)
                    .await?
                {
                    AssignmentResponse::Accepted(session) => {
                        self.join(&session.id);
                        Some(ServerFrame::WorkResponse {
                            work_id,
                            accepted: true,
                            session_id: Some(session.id),
                        })
                    }
                    AssignmentResponse::Rejected(_) => Some(ServerFrame::WorkResponse {
                        work_id,
                        accepted: false,
                        session_id: None,
                    }),
                }
            }
            ClientFrame::LocationUpdate {
                session_id,
                latitude,
                longitude,
            } => {
                let point = GeoPoint::new(latitude, longitude)?;
                self.engine.update_location(me, &session_id, point).await?;
                None
            }
            ClientFrame::MediumShare {
                session_id,
                mediums,
            } => {
                let mediums = parse_medium_map(&mediums)?;
                let session = self
                    .engine
                    .share_provider_mediums(me, &session_id, mediums)
                    .await?;
                Some(ServerFrame::MediumsShared {
                    session_id,
                    mediums: session.provider_mediums.unwrap_or_default(),
                })
            }
            ClientFrame::MediumSelection {
                session_id,
                mediums,
            } => {
                let mediums = parse_medium_map(&mediums)?;
                let selection = self
                    .engine
                    .select_seeker_mediums(me, &session_id, mediums)
                    .await?;
                Some(ServerFrame::MediumsSelected {
                    session_id,
                    mediums: selection.session.seeker_mediums.unwrap_or_default(),
                    state: selection.session.state,
                })
            }
            ClientFrame::StartChat { session_id } => {
                self.engine.start_chat(me, &session_id).await?;
                None
            }
            ClientFrame::ChatMessage {
                session_id,
                message,
            } => {
                let sent = self
                    .engine
                    .send_chat_message(me, &session_id, &message)
                    .await?;
                Some(ServerFrame::MessageSent {
                    session_id,
                    message_id: sent.id,
                    delivery_status: sent.delivery_status,
                    timestamp: sent.sent_at,
                })
            }
            ClientFrame::MessageDelivered { message_id } => {
                self.acknowledge(&message_id, DeliveryStatus::Delivered)
                    .await?;
                None
            }
            ClientFrame::MessageRead { message_id } => {
                self.acknowledge(&message_id, DeliveryStatus::Read).await?;
                None
            }
            ClientFrame::TypingIndicator {
                session_id,
                is_typing,
            } => {
                self.engine.set_typing(me, &session_id, is_typing).await?;
                None
            }
            ClientFrame::CancelConnection { session_id } => {
                self.engine.cancel(me, &session_id).await?;
                None
            }
            ClientFrame::FinishService {
                session_id,
                rating_stars,
                rating_description,
            } => {
                let rating = RatingRequest {
                    stars: parse_stars(rating_stars.as_ref())?,
                    description: rating_description,
                };
                self.engine.finish(me, &session_id, &rating).await?;
                None
            }
        };
        Ok(reply)
    }

    /// Greet the client and restore an open session, if any.
    async fn open(self: &Arc<Self>) {
        self.follow(Topic::User(self.identity.user_id));
        self.send(ServerFrame::ConnectionEstablished {
            user_id: self.identity.user_id,
            role: self.identity.role,
            timestamp: Utc::now(),
        })
        .await;

        match self.engine.resume(&self.identity).await {
            Ok(Some(resumed)) => {
                let session = resumed.session;
                self.join(&session.id);
                let role = self.identity.role;
                self.send(ServerFrame::ChatHistoryLoaded {
                    session_id: session.id,
                    state: session.state,
                    messages: resumed
                        .messages
                        .into_iter()
                        .map(|m| HistoryEntry::for_viewer(m, role))
                        .collect(),
                })
                .await;
            }
            Ok(None) => {}
            Err(e) => warn!(user_id = self.identity.user_id, error = %e, "resume failed"),
        }
    }
}

async fn handle_socket(socket: WebSocket, state: GatewayState, identity: Identity) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Outbound>(state.engine.config().outbound_buffer.max(1));

    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let text = match outbound.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "dropping unserializable frame");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let conn = Arc::new(Connection {
        engine: state.engine.clone(),
        identity,
        out: tx,
        token: state.engine.shutdown_token().child_token(),
        joined: Mutex::new(HashSet::new()),
        tasks: TaskTracker::new(),
    });
    info!(user_id = identity.user_id, role = %identity.role, "work channel opened");
    conn.open().await;

    loop {
        let msg = tokio::select! {
            _ = conn.token.cancelled() => break,
            msg = ws_receiver.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                let reply = match ClientFrame::parse(text.as_str()) {
                    Ok(frame) => {
                        let kind = frame.kind();
                        match conn.handle(frame).await {
                            Ok(reply) => reply,
                            Err(e) => {
                                if e.is_client_error() {
                                    debug!(frame = kind, code = e.code(), error = %e, "frame rejected");
                                } else {
                                    warn!(frame = kind, error = %e, "frame failed");
                                }
                                Some(ServerFrame::error(&e))
                            }
                        }
                    }
                    Err(e) => Some(ServerFrame::error(&e)),
                };
                if let Some(reply) = reply {
                    if !conn.send(reply).await {
                        break;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            // Binary frames are ignored; pings are answered by the protocol layer.
            Some(Ok(_)) => {}
        }
    }

    conn.token.cancel();
    conn.tasks.close();
    conn.tasks.wait().await;
    drop(conn);
    let _ = writer.await;
    info!(user_id = identity.user_id, role = %identity.role, "work channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_token_is_optional() {
        let query: WsQuery = serde_json::from_str("{}").unwrap();
        assert!(query.token.is_none());
        let query: WsQuery = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert_eq!(query.token.as_deref(), Some("t"));
    }
}
