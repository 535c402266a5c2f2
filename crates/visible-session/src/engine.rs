// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The work-session coordination engine.
//!
//! Every mutation of a session runs under that session's registry lock:
//! load from storage, apply a pure transition, persist, publish. Because the
//! publish happens before the lock is released, both parties observe the
//! events of one session in the order they were committed.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use visible_bus::{BusEvent, Envelope, EventBus, Topic};
use visible_config::model::SessionConfig;
use visible_core::types::{
    AssignmentStatus, ChatMessage, ConnectionState, DeliveryStatus, GeoPoint, Identity, MediumMap,
    NewAssignment, NotificationKind, PartyLocation, PushNotification, WorkAssignment, WorkSession,
};
use visible_core::{
    AvailabilityFlags, Clock, MessageId, ProfileLookup, PushNotifier, Role, SessionId,
    StorageAdapter, UserId, VisibleError, WorkId,
};
use visible_prometheus::recording;

use crate::chat::{self, AckDecision, TypingBoard};
use crate::dispatch::{templates, Dispatcher, NoticeContext};
use crate::machine::{self, RatingRequest};
use crate::registry::{SessionGuard, SessionRegistry};
use crate::ticker::{spawn_ticker, TickControl, TickerHandle};
use crate::tracker::{self, DistanceReading, ThrottlePolicy};

/// Collaborators the engine calls out to.
pub struct EngineDeps {
    /// Sessions, assignments, messages and the delivery log.
    pub storage: Arc<dyn StorageAdapter>,
    /// Marketplace availability and searching flags.
    pub flags: Arc<dyn AvailabilityFlags>,
    /// Display names and profile mediums.
    pub profiles: Arc<dyn ProfileLookup>,
    /// Best-effort push for offline parties.
    pub push: Arc<dyn PushNotifier>,
    /// Live fan-out to connected clients.
    pub bus: Arc<dyn EventBus>,
    /// Source of every timestamp the engine writes.
    pub clock: Arc<dyn Clock>,
}

/// A seeker's dispatch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignWork {
    /// Provider to dispatch to.
    pub provider_id: UserId,
    pub service_type: String,
    #[serde(default)]
    pub message: String,
    /// Where the work is, if the seeker shared it.
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

/// Result of a provider's response to an assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentResponse {
    /// A new session in `waiting`.
    Accepted(WorkSession),
    /// The assignment, now `rejected`.
    Rejected(WorkAssignment),
}

/// Result of a seeker's medium selection.
#[derive(Debug, Clone, PartialEq)]
pub struct MediumSelection {
    pub session: WorkSession,
    /// True when this selection moved the session from waiting to active.
    pub activated: bool,
}

/// An open session found for a reconnecting user.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumedSession {
    pub session: WorkSession,
    /// Stored messages, oldest first. Expired ones go at the next sweep.
    pub messages: Vec<ChatMessage>,
}

/// Outcome of one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Chat messages deleted past their expiry.
    pub expired_messages: usize,
    /// Typing indicators switched off for going quiet.
    pub stale_typing: usize,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Cancel,
    Finish,
}

struct EngineInner {
    storage: Arc<dyn StorageAdapter>,
    flags: Arc<dyn AvailabilityFlags>,
    profiles: Arc<dyn ProfileLookup>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    policy: ThrottlePolicy,
    registry: SessionRegistry,
    typing: TypingBoard,
    dispatcher: Dispatcher,
    shutdown: CancellationToken,
    sweeper: StdMutex<Option<TickerHandle>>,
    active_sessions: AtomicI64,
}

/// Cheaply cloneable handle to the engine.
#[derive(Clone)]
pub struct SessionEngine {
    inner: Arc<EngineInner>,
}

impl SessionEngine {
    pub fn new(deps: EngineDeps, config: SessionConfig) -> Self {
        let dispatcher = Dispatcher::new(
            deps.bus,
            deps.push,
            deps.storage.clone(),
            deps.clock.clone(),
        );
        let policy = ThrottlePolicy::new(
            config.distance_threshold_meters,
            config.recheck_interval_secs,
        );
        Self {
            inner: Arc::new(EngineInner {
                storage: deps.storage,
                flags: deps.flags,
                profiles: deps.profiles,
                clock: deps.clock,
                config,
                policy,
                registry: SessionRegistry::new(),
                typing: TypingBoard::new(),
                dispatcher,
                shutdown: CancellationToken::new(),
                sweeper: StdMutex::new(None),
                active_sessions: AtomicI64::new(0),
            }),
        }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        self.inner.dispatcher.bus()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Token cancelled when the engine shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    async fn load(&self, id: &SessionId) -> Result<WorkSession, VisibleError> {
        self.inner
            .storage
            .get_session(id)
            .await?
            .ok_or_else(|| VisibleError::SessionNotFound {
                session_id: id.to_string(),
            })
    }

    /// Take the session's lock, then load it.
    ///
    /// Unknown ids and terminated sessions leave no slot behind in the
    /// registry once their callers are done.
    async fn lock_session(
        &self,
        id: &SessionId,
    ) -> Result<(SessionGuard, WorkSession), VisibleError> {
        let guard = self.inner.registry.lock(id).await;
        match self.load(id).await {
            Ok(session) => {
                if session.is_terminal() {
                    self.inner.registry.discard_idle(id);
                }
                Ok((guard, session))
            }
            Err(e) => {
                drop(guard);
                if matches!(e, VisibleError::SessionNotFound { .. }) {
                    self.inner.registry.discard_idle(id);
                }
                Err(e)
            }
        }
    }

    async fn display_name(&self, user_id: UserId, fallback: &str) -> String {
        match self.inner.profiles.profile(user_id).await {
            Ok(Some(profile)) if !profile.display_name.trim().is_empty() => profile.display_name,
            Ok(_) => fallback.to_string(),
            Err(e) => {
                warn!(user_id, error = %e, "profile lookup failed");
                fallback.to_string()
            }
        }
    }

    async fn available_mediums(&self, user_id: UserId) -> MediumMap {
        match self.inner.profiles.profile(user_id).await {
            Ok(Some(profile)) => profile.available_mediums,
            Ok(None) => MediumMap::new(),
            Err(e) => {
                warn!(user_id, error = %e, "profile lookup failed");
                MediumMap::new()
            }
        }
    }

    fn publish_session(&self, session: &WorkSession, envelope: Envelope) -> usize {
        self.inner
            .dispatcher
            .publish(Topic::Session(session.id.clone()), envelope)
    }

    fn push_session(
        &self,
        session: &WorkSession,
        recipient: Role,
        kind: NotificationKind,
        build: fn(&SessionId) -> PushNotification,
    ) {
        self.inner.dispatcher.push(
            NoticeContext {
                kind,
                recipient: session.user_for(recipient),
                work_id: Some(session.work_id),
                session_id: Some(session.id.clone()),
            },
            build(&session.id),
        );
    }

    fn adjust_active(&self, delta: i64) {
        let now = self.inner.active_sessions.fetch_add(delta, Ordering::SeqCst) + delta;
        recording::set_active_sessions(now.max(0) as f64);
    }

    // --- Dispatch ---

    /// Create a pending assignment from a seeker to a provider.
    pub async fn assign_work(
        &self,
        actor: &Identity,
        request: AssignWork,
    ) -> Result<WorkAssignment, VisibleError> {
        if actor.role != Role::Seeker {
            return Err(VisibleError::PermissionDenied(
                "only seekers can assign work".into(),
            ));
        }
        let service_type = request.service_type.trim().to_string();
        if service_type.is_empty() {
            return Err(VisibleError::Validation("service_type is required".into()));
        }
        if request.provider_id == actor.user_id {
            return Err(VisibleError::Validation(
                "cannot assign work to yourself".into(),
            ));
        }
        match self.inner.profiles.profile(request.provider_id).await? {
            Some(profile) if profile.role == Role::Provider => {}
            _ => {
                return Err(VisibleError::Validation(format!(
                    "provider {} not found",
                    request.provider_id
                )));
            }
        }

        let now = self.now();
        let assignment = self
            .inner
            .storage
            .create_assignment(
                &NewAssignment {
                    seeker_id: actor.user_id,
                    provider_id: request.provider_id,
                    service_type,
                    message: request.message.trim().to_string(),
                    seeker_location: request.location,
                },
                now,
            )
            .await?;

        let seeker_name = self.display_name(actor.user_id, "A seeker").await;
        let ctx = NoticeContext {
            kind: NotificationKind::WorkAssigned,
            recipient: assignment.provider_id,
            work_id: Some(assignment.id),
            session_id: None,
        };
        self.inner.dispatcher.publish_logged(
            ctx.clone(),
            Envelope::to(
                Role::Provider,
                BusEvent::WorkAssigned {
                    work_id: assignment.id,
                    seeker_id: assignment.seeker_id,
                    seeker_name: seeker_name.clone(),
                    service_type: assignment.service_type.clone(),
                    message: assignment.message.clone(),
                    seeker_location: assignment.seeker_location,
                    timestamp: now,
                },
            ),
        );
        self.inner.dispatcher.push(
            ctx,
            templates::work_assigned(assignment.id, &seeker_name, &assignment.service_type),
        );

        info!(
            work_id = assignment.id,
            seeker_id = assignment.seeker_id,
            provider_id = assignment.provider_id,
            "work assigned"
        );
        Ok(assignment)
    }

    /// Accept or reject a pending assignment.
    ///
    /// Acceptance creates the session in `waiting`, clears both parties'
    /// availability flags and starts the session's recheck ticker.
    pub async fn respond_to_assignment(
        &self,
        actor: &Identity,
        work_id: WorkId,
        accepted: bool,
    ) -> Result<AssignmentResponse, VisibleError> {
        if actor.role != Role::Provider {
            return Err(VisibleError::PermissionDenied(
                "only providers can respond to assignments".into(),
            ));
        }
        let assignment = self
            .inner
            .storage
            .get_assignment(work_id)
            .await?
            .filter(|a| a.provider_id == actor.user_id && a.status == AssignmentStatus::Pending)
            .ok_or(VisibleError::AssignmentNotFound { work_id })?;

        let now = self.now();
        let to = if accepted {
            AssignmentStatus::Accepted
        } else {
            AssignmentStatus::Rejected
        };
        if !self
            .inner
            .storage
            .transition_assignment(work_id, AssignmentStatus::Pending, to, now)
            .await?
        {
            return Err(VisibleError::AssignmentNotFound { work_id });
        }

        let provider_name = self.display_name(actor.user_id, "Your provider").await;
        let push_ctx = NoticeContext {
            kind: if accepted {
                NotificationKind::WorkAccepted
            } else {
                NotificationKind::WorkRejected
            },
            recipient: assignment.seeker_id,
            work_id: Some(work_id),
            session_id: None,
        };

        if !accepted {
            self.inner.dispatcher.publish_logged(
                push_ctx.clone(),
                Envelope::to(
                    Role::Seeker,
                    BusEvent::WorkRejected {
                        work_id,
                        timestamp: now,
                    },
                ),
            );
            self.inner.dispatcher.push(
                push_ctx,
                templates::work_response(work_id, &provider_name, &assignment.service_type, false),
            );
            info!(work_id, provider_id = actor.user_id, "work rejected");
            return Ok(AssignmentResponse::Rejected(WorkAssignment {
                status: AssignmentStatus::Rejected,
                responded_at: Some(now),
                ..assignment
            }));
        }

        let mut session = WorkSession::new(work_id, assignment.seeker_id, assignment.provider_id, now);
        session.seeker_location = assignment.seeker_location.map(|point| PartyLocation {
            point,
            updated_at: assignment.created_at,
        });
        if let Err(e) = self.inner.storage.insert_session(&session).await {
            error!(work_id, error = %e, "failed to create session, reverting assignment");
            if let Err(revert) = self
                .inner
                .storage
                .transition_assignment(work_id, AssignmentStatus::Accepted, AssignmentStatus::Pending, now)
                .await
            {
                error!(work_id, error = %revert, "failed to revert assignment");
            }
            return Err(e);
        }

        let _guard = self.inner.registry.lock(&session.id).await;

        if let Err(e) = self
            .inner
            .flags
            .set_provider_available(session.provider_id, false)
            .await
        {
            warn!(provider_id = session.provider_id, error = %e, "failed to clear provider availability");
        }
        if let Err(e) = self
            .inner
            .flags
            .set_seeker_searching(session.seeker_id, false)
            .await
        {
            warn!(seeker_id = session.seeker_id, error = %e, "failed to clear seeker search flag");
        }

        self.start_ticker(&session.id);

        let (provider_mediums, seeker_mediums) = (
            self.available_mediums(session.provider_id).await,
            self.available_mediums(session.seeker_id).await,
        );
        self.inner.dispatcher.publish_logged(
            push_ctx.clone(),
            Envelope::to(
                Role::Seeker,
                BusEvent::WorkAccepted {
                    work_id,
                    session_id: session.id.clone(),
                    provider_name: provider_name.clone(),
                    provider_available_mediums: provider_mediums,
                    seeker_available_mediums: seeker_mediums,
                    timestamp: now,
                },
            ),
        );
        for role in [Role::Seeker, Role::Provider] {
            self.inner.dispatcher.publish(
                Topic::User(session.user_for(role)),
                Envelope::to(
                    role,
                    BusEvent::SessionState {
                        session_id: session.id.clone(),
                        state: ConnectionState::Waiting,
                        actor: Some(Role::Provider),
                        timestamp: now,
                    },
                ),
            );
        }
        self.inner.dispatcher.push(
            push_ctx,
            templates::work_response(work_id, &provider_name, &assignment.service_type, true),
        );

        recording::record_session_transition("waiting");
        self.adjust_active(1);
        info!(work_id, session_id = %session.id, "work accepted, session waiting");
        Ok(AssignmentResponse::Accepted(session))
    }

    // --- Mediums ---

    /// Store the provider's offered contact channels and forward them to the seeker.
    pub async fn share_provider_mediums(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        mediums: MediumMap,
    ) -> Result<WorkSession, VisibleError> {
        let (_guard, mut session) = self.lock_session(session_id).await?;
        let now = self.now();
        machine::share_provider_mediums(&mut session, actor, mediums.clone(), now)?;
        self.inner.storage.update_session(&session).await?;

        self.publish_session(
            &session,
            Envelope::to(
                Role::Seeker,
                BusEvent::ProviderMediumsShared {
                    session_id: session.id.clone(),
                    mediums,
                    timestamp: now,
                },
            ),
        );
        self.push_session(
            &session,
            Role::Seeker,
            NotificationKind::MediumsShared,
            templates::mediums_shared,
        );
        debug!(session_id = %session.id, count = session.provider_mediums.as_ref().map_or(0, |m| m.len()), "provider mediums shared");
        Ok(session)
    }

    /// Store the seeker's selection; the first one activates the session.
    pub async fn select_seeker_mediums(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        mediums: MediumMap,
    ) -> Result<MediumSelection, VisibleError> {
        let (_guard, mut session) = self.lock_session(session_id).await?;
        let now = self.now();
        let activated = machine::select_seeker_mediums(&mut session, actor, mediums.clone(), now)?;
        self.inner.storage.update_session(&session).await?;

        if activated {
            self.publish_session(
                &session,
                Envelope::everyone(BusEvent::SessionState {
                    session_id: session.id.clone(),
                    state: ConnectionState::Active,
                    actor: Some(Role::Seeker),
                    timestamp: now,
                }),
            );
            self.push_session(
                &session,
                Role::Provider,
                NotificationKind::SessionActivated,
                templates::session_activated,
            );
            recording::record_session_transition("active");
            info!(session_id = %session.id, "session active");
        }
        self.publish_session(
            &session,
            Envelope::to(
                Role::Provider,
                BusEvent::SeekerMediumsSelected {
                    session_id: session.id.clone(),
                    mediums,
                    timestamp: now,
                },
            ),
        );
        Ok(MediumSelection { session, activated })
    }

    // --- Location ---

    /// Store a location ping and broadcast the distance when the throttle allows.
    pub async fn update_location(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        point: GeoPoint,
    ) -> Result<Option<DistanceReading>, VisibleError> {
        let (mut guard, mut session) = self.lock_session(session_id).await?;
        let role = machine::authorize(&session, actor)?;
        session.ensure_open()?;

        let now = self.now();
        tracker::apply_ping(&mut session, role, point, now);
        let reading = guard.throttle.evaluate(&session, &self.inner.policy, now);
        if let Some(reading) = &reading {
            tracker::apply_reading(&mut session, reading);
        }
        self.inner.storage.update_session(&session).await?;

        if let Some(reading) = &reading {
            self.broadcast_distance(&session, reading);
        }
        Ok(reading)
    }

    /// Periodic re-check driven by the session's ticker.
    pub async fn recheck_distance(&self, session_id: &SessionId) -> Result<TickControl, VisibleError> {
        let (mut guard, mut session) = match self.lock_session(session_id).await {
            Ok(locked) => locked,
            Err(VisibleError::SessionNotFound { .. }) => return Ok(TickControl::Stop),
            Err(e) => return Err(e),
        };
        if session.is_terminal() {
            return Ok(TickControl::Stop);
        }
        let now = self.now();
        if let Some(reading) = guard.throttle.evaluate_tick(&session, &self.inner.policy, now) {
            tracker::apply_reading(&mut session, &reading);
            session.updated_at = now;
            self.inner.storage.update_session(&session).await?;
            self.broadcast_distance(&session, &reading);
        }
        Ok(TickControl::Continue)
    }

    fn broadcast_distance(&self, session: &WorkSession, reading: &DistanceReading) {
        self.publish_session(
            session,
            Envelope::everyone(BusEvent::DistanceUpdate {
                session_id: session.id.clone(),
                distance_meters: reading.meters,
                distance_formatted: reading.formatted.clone(),
                timestamp: reading.at,
            }),
        );
        recording::record_distance_broadcast();
        debug!(session_id = %session.id, meters = reading.meters, "distance broadcast");
    }

    fn start_ticker(&self, session_id: &SessionId) {
        let weak = Arc::downgrade(&self.inner);
        let id = session_id.clone();
        let period = StdDuration::from_secs(self.inner.config.recheck_interval_secs);
        let handle = spawn_ticker(&self.inner.shutdown, period, move || {
            let weak = weak.clone();
            let id = id.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return TickControl::Stop;
                };
                let engine = SessionEngine { inner };
                match engine.recheck_distance(&id).await {
                    Ok(control) => control,
                    Err(e) => {
                        warn!(session_id = %id, error = %e, "distance recheck failed");
                        TickControl::Continue
                    }
                }
            }
        });
        self.inner.registry.attach_ticker(session_id, handle);
    }

    /// Whether the session currently has a running recheck ticker.
    pub fn has_ticker(&self, session_id: &SessionId) -> bool {
        self.inner.registry.has_ticker(session_id)
    }

    pub fn running_tickers(&self) -> usize {
        self.inner.registry.running_tickers()
    }

    /// Sessions currently holding a registry slot.
    pub fn tracked_sessions(&self) -> usize {
        self.inner.registry.len()
    }

    // --- Chat ---

    /// Mark the chat as started and tell both parties. Returns the room id.
    pub async fn start_chat(
        &self,
        actor: &Identity,
        session_id: &SessionId,
    ) -> Result<String, VisibleError> {
        let (_guard, mut session) = self.lock_session(session_id).await?;
        let role = machine::authorize(&session, actor)?;
        session.ensure_open()?;

        if session.chat_started_at.is_none() {
            let now = self.now();
            session.chat_started_at = Some(now);
            session.updated_at = now;
            self.inner.storage.update_session(&session).await?;
        }
        self.publish_session(
            &session,
            Envelope::everyone(BusEvent::ChatReady {
                session_id: session.id.clone(),
                chat_room_id: session.chat_room_id.clone(),
                started_by: role,
            }),
        );
        Ok(session.chat_room_id)
    }

    /// Append an anonymous message and deliver it to the other party.
    pub async fn send_chat_message(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        text: &str,
    ) -> Result<ChatMessage, VisibleError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        let role = machine::authorize(&session, actor)?;
        session.ensure_open()?;
        let text = chat::admit_text(text, self.inner.config.max_message_length)?;

        let message = chat::new_message(&session.id, role, text, self.now());
        self.inner.storage.insert_message(&message).await?;

        let recipient = role.counterpart();
        self.publish_session(
            &session,
            Envelope::to(
                recipient,
                BusEvent::ChatMessage {
                    session_id: session.id.clone(),
                    message_id: message.id.clone(),
                    sender_role: role,
                    message: message.text.clone(),
                    delivery_status: message.delivery_status,
                    timestamp: message.sent_at,
                },
            ),
        );
        self.push_session(
            &session,
            recipient,
            NotificationKind::ChatMessage,
            templates::chat_message,
        );
        recording::record_chat_message();
        debug!(session_id = %session.id, message_id = %message.id, sender = %role, len = message.text.len(), "chat message");
        Ok(message)
    }

    /// Apply a recipient's delivery acknowledgement.
    ///
    /// Returns the updated message, or `None` when the message was already
    /// at or past `status`.
    pub async fn acknowledge_message(
        &self,
        actor: &Identity,
        message_id: &MessageId,
        status: DeliveryStatus,
    ) -> Result<Option<ChatMessage>, VisibleError> {
        let message = self
            .inner
            .storage
            .get_message(message_id)
            .await?
            .ok_or_else(|| VisibleError::MessageNotFound {
                message_id: message_id.to_string(),
            })?;
        let (_guard, session) = self.lock_session(&message.session_id).await?;
        let role = machine::authorize(&session, actor)?;
        session.ensure_open()?;
        if chat::check_ack(&message, role, status)? == AckDecision::NoOp {
            return Ok(None);
        }

        let Some(updated) = self
            .inner
            .storage
            .advance_message_status(message_id, status, self.now())
            .await?
        else {
            return Ok(None);
        };

        self.publish_session(
            &session,
            Envelope::to(
                updated.sender_role,
                BusEvent::MessageStatusUpdate {
                    session_id: session.id.clone(),
                    message_id: updated.id.clone(),
                    status: updated.delivery_status,
                    timestamp: updated.read_at.or(updated.delivered_at).unwrap_or(updated.sent_at),
                },
            ),
        );
        Ok(Some(updated))
    }

    /// Record a typing signal. Broadcasts only when the value flips.
    pub async fn set_typing(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        is_typing: bool,
    ) -> Result<bool, VisibleError> {
        let (_guard, session) = self.lock_session(session_id).await?;
        let role = machine::authorize(&session, actor)?;
        session.ensure_open()?;

        let flipped = self.inner.typing.set(session_id, role, is_typing, self.now());
        if flipped {
            self.publish_session(
                &session,
                Envelope::to(
                    role.counterpart(),
                    BusEvent::TypingIndicator {
                        session_id: session.id.clone(),
                        sender_role: role,
                        is_typing,
                    },
                ),
            );
        }
        Ok(flipped)
    }

    // --- Termination ---

    /// Cancel an open session. Re-enables both parties' availability flags.
    pub async fn cancel(
        &self,
        actor: &Identity,
        session_id: &SessionId,
    ) -> Result<WorkSession, VisibleError> {
        self.terminate(actor, session_id, Outcome::Cancel, &RatingRequest::default())
            .await
    }

    /// Complete an open session, with an optional seeker rating.
    pub async fn finish(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        rating: &RatingRequest,
    ) -> Result<WorkSession, VisibleError> {
        self.terminate(actor, session_id, Outcome::Finish, rating).await
    }

    async fn terminate(
        &self,
        actor: &Identity,
        session_id: &SessionId,
        outcome: Outcome,
        rating: &RatingRequest,
    ) -> Result<WorkSession, VisibleError> {
        let (guard, mut session) = self.lock_session(session_id).await?;
        let now = self.now();
        let role = match outcome {
            Outcome::Cancel => machine::cancel(&mut session, actor, now)?,
            Outcome::Finish => machine::finish(&mut session, actor, rating, now)?,
        };
        self.inner.storage.update_session(&session).await?;

        let assignment_status = match outcome {
            Outcome::Cancel => AssignmentStatus::Cancelled,
            Outcome::Finish => AssignmentStatus::Completed,
        };
        match self
            .inner
            .storage
            .transition_assignment(session.work_id, AssignmentStatus::Accepted, assignment_status, now)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(work_id = session.work_id, "assignment was not in accepted state"),
            Err(e) => warn!(work_id = session.work_id, error = %e, "failed to update assignment status"),
        }

        let expires_at = now + Duration::hours(self.inner.config.chat_retention_hours as i64);
        match self
            .inner
            .storage
            .set_message_expiry(&session.id, expires_at)
            .await
        {
            Ok(count) => debug!(session_id = %session.id, count, %expires_at, "chat expiry set"),
            Err(e) => error!(session_id = %session.id, error = %e, "failed to set chat expiry"),
        }

        if matches!(outcome, Outcome::Cancel) {
            if let Err(e) = self
                .inner
                .flags
                .set_provider_available(session.provider_id, true)
                .await
            {
                warn!(provider_id = session.provider_id, error = %e, "failed to restore provider availability");
            }
            if let Err(e) = self
                .inner
                .flags
                .set_seeker_searching(session.seeker_id, true)
                .await
            {
                warn!(seeker_id = session.seeker_id, error = %e, "failed to restore seeker search flag");
            }
        }

        self.inner.registry.stop_ticker(&session.id);
        self.inner.typing.clear(&session.id);

        let (event, kind, template): (
            BusEvent,
            NotificationKind,
            fn(&SessionId) -> PushNotification,
        ) = match outcome {
            Outcome::Cancel => (
                BusEvent::ConnectionCancelled {
                    session_id: session.id.clone(),
                    cancelled_by: role,
                    timestamp: now,
                },
                NotificationKind::SessionCancelled,
                templates::session_cancelled,
            ),
            Outcome::Finish => (
                BusEvent::ServiceFinished {
                    session_id: session.id.clone(),
                    completed_by: role,
                    timestamp: now,
                },
                NotificationKind::SessionCompleted,
                templates::session_completed,
            ),
        };
        self.publish_session(
            &session,
            Envelope::everyone(BusEvent::SessionState {
                session_id: session.id.clone(),
                state: session.state,
                actor: Some(role),
                timestamp: now,
            }),
        );
        self.publish_session(&session, Envelope::everyone(event));
        self.push_session(&session, role.counterpart(), kind, template);

        recording::record_session_transition(&session.state.to_string());
        self.adjust_active(-1);
        info!(session_id = %session.id, state = %session.state, by = %role, "session ended");

        drop(guard);
        self.inner.registry.forget(&session.id);
        Ok(machine::view_for(&session, role))
    }

    // --- Queries ---

    /// The session as the actor's role may see it.
    pub async fn snapshot(
        &self,
        actor: &Identity,
        session_id: &SessionId,
    ) -> Result<WorkSession, VisibleError> {
        let session = self.load(session_id).await?;
        let role = machine::authorize(&session, actor)?;
        Ok(machine::view_for(&session, role))
    }

    /// Chat history of a session the actor is a party to.
    pub async fn chat_history(
        &self,
        actor: &Identity,
        session_id: &SessionId,
    ) -> Result<Vec<ChatMessage>, VisibleError> {
        let session = self.load(session_id).await?;
        machine::authorize(&session, actor)?;
        self.inner.storage.list_messages(session_id).await
    }

    /// The newest open session of a reconnecting user, with its chat.
    pub async fn resume(&self, actor: &Identity) -> Result<Option<ResumedSession>, VisibleError> {
        let sessions = self
            .inner
            .storage
            .list_open_sessions_for_user(actor.user_id)
            .await?;
        let Some(session) = sessions
            .into_iter()
            .find(|s| s.role_of(actor.user_id) == Some(actor.role))
        else {
            return Ok(None);
        };
        let messages = self.inner.storage.list_messages(&session.id).await?;
        Ok(Some(ResumedSession {
            session: machine::view_for(&session, actor.role),
            messages,
        }))
    }

    // --- Maintenance ---

    /// Delete chat messages past their expiry.
    pub async fn sweep_expired_messages(&self) -> Result<usize, VisibleError> {
        let removed = self
            .inner
            .storage
            .delete_expired_messages(self.now())
            .await?;
        if removed > 0 {
            recording::record_expired_messages(removed as u64);
            info!(removed, "expired chat messages deleted");
        }
        Ok(removed)
    }

    /// Reset typing indicators that went quiet and tell the other party.
    pub async fn sweep_stale_typing(&self) -> usize {
        let stale = Duration::seconds(self.inner.config.typing_stale_secs as i64);
        let flipped = self.inner.typing.sweep_stale(self.now(), stale);
        for indicator in &flipped {
            self.inner.dispatcher.publish(
                Topic::Session(indicator.session_id.clone()),
                Envelope::to(
                    indicator.role.counterpart(),
                    BusEvent::TypingIndicator {
                        session_id: indicator.session_id.clone(),
                        sender_role: indicator.role,
                        is_typing: false,
                    },
                ),
            );
        }
        flipped.len()
    }

    /// One maintenance pass.
    pub async fn sweep(&self) -> Result<SweepReport, VisibleError> {
        let expired_messages = self.sweep_expired_messages().await?;
        let stale_typing = self.sweep_stale_typing().await;
        self.bus().cleanup();
        Ok(SweepReport {
            expired_messages,
            stale_typing,
        })
    }

    /// Reload open sessions and restart their tickers. Returns how many.
    pub async fn restore(&self) -> Result<usize, VisibleError> {
        let sessions = self.inner.storage.list_open_sessions().await?;
        for session in &sessions {
            self.start_ticker(&session.id);
        }
        self.inner
            .active_sessions
            .store(sessions.len() as i64, Ordering::SeqCst);
        recording::set_active_sessions(sessions.len() as f64);
        info!(count = sessions.len(), "open sessions restored");
        Ok(sessions.len())
    }

    /// Run [`sweep`](Self::sweep) every `sweep_interval_secs` until shutdown.
    pub fn start_sweeper(&self) {
        let weak = Arc::downgrade(&self.inner);
        let period = StdDuration::from_secs(self.inner.config.sweep_interval_secs);
        let handle = spawn_ticker(&self.inner.shutdown, period, move || {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return TickControl::Stop;
                };
                let engine = SessionEngine { inner };
                if let Err(e) = engine.sweep().await {
                    warn!(error = %e, "maintenance sweep failed");
                }
                TickControl::Continue
            }
        });
        let previous = match self.inner.sweeper.lock() {
            Ok(mut slot) => slot.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.stop();
        }
    }

    /// Wait for background pushes and log writes to finish.
    pub async fn flush(&self) {
        self.inner.dispatcher.flush().await;
    }

    /// Stop every ticker and the sweeper, then drain pending pushes.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.registry.stop_all();
        let sweeper = match self.inner.sweeper.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sweeper) = sweeper {
            sweeper.join().await;
        }
        self.inner.dispatcher.flush().await;
        info!("session engine stopped");
    }
}
