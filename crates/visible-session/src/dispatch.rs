// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge from engine transitions to live connections and push delivery.
//!
//! Live delivery is a synchronous bus publish, made by the engine while it
//! still holds the session lock so that each party observes events in
//! emission order. Push delivery runs on tracked background tasks: it never
//! delays, and never fails, the operation that triggered it.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use visible_bus::{Envelope, EventBus, Topic};
use visible_core::types::{
    DeliveryMethod, NotificationKind, NotificationRecord, PushNotification, PushOutcome,
};
use visible_core::{Clock, PushNotifier, SessionId, StorageAdapter, UserId, WorkId};
use visible_prometheus::recording;

/// What a push or a live notice is about, for the delivery log.
#[derive(Debug, Clone)]
pub struct NoticeContext {
    pub kind: NotificationKind,
    pub recipient: UserId,
    pub work_id: Option<WorkId>,
    pub session_id: Option<SessionId>,
}

pub struct Dispatcher {
    bus: Arc<dyn EventBus>,
    push: Arc<dyn PushNotifier>,
    storage: Arc<dyn StorageAdapter>,
    clock: Arc<dyn Clock>,
    tasks: TaskTracker,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        push: Arc<dyn PushNotifier>,
        storage: Arc<dyn StorageAdapter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            bus,
            push,
            storage,
            clock,
            tasks: TaskTracker::new(),
        }
    }

    pub fn bus(&self) -> &Arc<dyn EventBus> {
        &self.bus
    }

    /// Publish to a topic. Returns how many live subscribers were reached.
    pub fn publish(&self, topic: Topic, envelope: Envelope) -> usize {
        let kind = envelope.event.kind();
        let reached = self.bus.publish(&topic, envelope);
        debug!(topic = %topic, event = kind, reached, "published");
        reached
    }

    /// Publish an assignment-level notice to a user topic and log whether
    /// any live connection received it.
    pub fn publish_logged(&self, ctx: NoticeContext, envelope: Envelope) -> usize {
        let reached = self.publish(Topic::User(ctx.recipient), envelope);
        let error = (reached == 0).then(|| "recipient offline".to_string());
        self.log_delivery(ctx, DeliveryMethod::Live, reached > 0, error);
        reached
    }

    /// Request a best-effort push. Returns immediately.
    pub fn push(&self, ctx: NoticeContext, notification: PushNotification) {
        let push = self.push.clone();
        let storage = self.storage.clone();
        let clock = self.clock.clone();
        self.tasks.spawn(async move {
            let (delivered, error) = match push.deliver(ctx.recipient, &notification).await {
                Ok(PushOutcome::Sent { message_id }) => {
                    debug!(
                        recipient = ctx.recipient,
                        kind = %ctx.kind,
                        message_id = message_id.as_deref().unwrap_or("-"),
                        "push delivered"
                    );
                    (true, None)
                }
                Ok(PushOutcome::Failed { reason }) => {
                    warn!(recipient = ctx.recipient, kind = %ctx.kind, reason = %reason, "push not delivered");
                    (false, Some(reason))
                }
                Err(e) => {
                    warn!(recipient = ctx.recipient, kind = %ctx.kind, error = %e, "push delivery failed");
                    (false, Some(e.to_string()))
                }
            };
            recording::record_push_delivery(delivered);
            write_log(&*storage, &*clock, ctx, DeliveryMethod::Push, delivered, error).await;
        });
    }

    fn log_delivery(
        &self,
        ctx: NoticeContext,
        method: DeliveryMethod,
        delivered: bool,
        error: Option<String>,
    ) {
        let storage = self.storage.clone();
        let clock = self.clock.clone();
        self.tasks.spawn(async move {
            write_log(&*storage, &*clock, ctx, method, delivered, error).await;
        });
    }

    /// Wait for every in-flight push and log write.
    pub async fn flush(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }
}

async fn write_log(
    storage: &dyn StorageAdapter,
    clock: &dyn Clock,
    ctx: NoticeContext,
    method: DeliveryMethod,
    delivered: bool,
    error: Option<String>,
) {
    let record = NotificationRecord {
        work_id: ctx.work_id,
        session_id: ctx.session_id,
        recipient_id: ctx.recipient,
        kind: ctx.kind,
        method,
        delivered,
        error,
        created_at: clock.now(),
    };
    if let Err(e) = storage.record_notification(&record).await {
        warn!(recipient = record.recipient_id, kind = %record.kind, error = %e, "failed to record notification");
    }
}

/// Push payload templates.
pub mod templates {
    use super::*;

    fn notification(
        title: &str,
        body: String,
        metadata: impl IntoIterator<Item = (&'static str, String)>,
    ) -> PushNotification {
        PushNotification {
            title: title.to_string(),
            body,
            metadata: metadata
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    pub fn work_assigned(work_id: WorkId, seeker_name: &str, service_type: &str) -> PushNotification {
        notification(
            "New Work Assignment",
            format!("{seeker_name} needs {service_type}"),
            [
                ("type", "work_assigned".to_string()),
                ("work_id", work_id.to_string()),
                ("service_type", service_type.to_string()),
            ],
        )
    }

    pub fn work_response(
        work_id: WorkId,
        provider_name: &str,
        service_type: &str,
        accepted: bool,
    ) -> PushNotification {
        let (title, verb, kind) = if accepted {
            ("Work Accepted", "accepted", "work_accepted")
        } else {
            ("Work Rejected", "rejected", "work_rejected")
        };
        notification(
            title,
            format!("{provider_name} {verb} your {service_type} request"),
            [
                ("type", kind.to_string()),
                ("work_id", work_id.to_string()),
                ("accepted", accepted.to_string()),
            ],
        )
    }

    pub fn mediums_shared(session_id: &SessionId) -> PushNotification {
        notification(
            "Contact Options Shared",
            "Your provider shared how to reach them".to_string(),
            [
                ("type", "provider_mediums_shared".to_string()),
                ("session_id", session_id.to_string()),
            ],
        )
    }

    pub fn session_activated(session_id: &SessionId) -> PushNotification {
        notification(
            "Connection Active",
            "The seeker picked how to stay in touch".to_string(),
            [
                ("type", "session_active".to_string()),
                ("session_id", session_id.to_string()),
            ],
        )
    }

    /// Chat pushes never carry the message text or the sender's identity.
    pub fn chat_message(session_id: &SessionId) -> PushNotification {
        notification(
            "New Message",
            "You have a new message".to_string(),
            [
                ("type", "chat_message".to_string()),
                ("session_id", session_id.to_string()),
            ],
        )
    }

    pub fn session_cancelled(session_id: &SessionId) -> PushNotification {
        notification(
            "Connection Cancelled",
            "The other party cancelled the connection".to_string(),
            [
                ("type", "connection_cancelled".to_string()),
                ("session_id", session_id.to_string()),
            ],
        )
    }

    pub fn session_completed(session_id: &SessionId) -> PushNotification {
        notification(
            "Service Finished",
            "The service was marked as finished".to_string(),
            [
                ("type", "service_finished".to_string()),
                ("session_id", session_id.to_string()),
            ],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tracing_test::traced_test;
    use visible_bus::{BusEvent, InMemoryBus};
    use visible_core::types::{AdapterType, HealthStatus};
    use visible_core::{PluginAdapter, Role, SystemClock, VisibleError};
    use visible_storage::{Database, SqliteStorage};

    struct RejectingPush;

    #[async_trait]
    impl PluginAdapter for RejectingPush {
        fn name(&self) -> &str {
            "rejecting-push"
        }

        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::Push
        }

        async fn health_check(&self) -> Result<HealthStatus, VisibleError> {
            Ok(HealthStatus::Healthy)
        }

        async fn shutdown(&self) -> Result<(), VisibleError> {
            Ok(())
        }
    }

    #[async_trait]
    impl PushNotifier for RejectingPush {
        async fn deliver(
            &self,
            _user_id: UserId,
            _notification: &PushNotification,
        ) -> Result<PushOutcome, VisibleError> {
            Err(VisibleError::Delivery {
                message: "gateway unreachable".into(),
                source: None,
            })
        }
    }

    async fn dispatcher() -> (Dispatcher, Arc<SqliteStorage>, Arc<InMemoryBus>) {
        let storage = Arc::new(SqliteStorage::from_database(
            Database::open_in_memory().await.unwrap(),
        ));
        let bus = Arc::new(InMemoryBus::new());
        let dispatcher = Dispatcher::new(
            bus.clone(),
            Arc::new(RejectingPush),
            storage.clone(),
            Arc::new(SystemClock),
        );
        (dispatcher, storage, bus)
    }

    fn ctx(kind: NotificationKind) -> NoticeContext {
        NoticeContext {
            kind,
            recipient: 7,
            work_id: Some(1),
            session_id: None,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn failed_push_is_logged_not_raised() {
        let (dispatcher, storage, _bus) = dispatcher().await;
        dispatcher.push(
            ctx(NotificationKind::WorkAssigned),
            templates::work_assigned(1, "Ravi", "plumbing"),
        );
        dispatcher.flush().await;

        assert!(logs_contain("push delivery failed"));
        let log = storage.list_notifications_for_user(7).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].delivered);
        assert_eq!(log[0].method, DeliveryMethod::Push);
        assert!(log[0].error.as_deref().unwrap().contains("gateway unreachable"));
    }

    #[tokio::test]
    async fn live_notice_to_offline_user_is_logged_as_failed() {
        let (dispatcher, storage, bus) = dispatcher().await;
        let event = BusEvent::WorkRejected {
            work_id: 1,
            timestamp: chrono::Utc::now(),
        };
        let reached = dispatcher.publish_logged(
            ctx(NotificationKind::WorkRejected),
            Envelope::to(Role::Seeker, event.clone()),
        );
        assert_eq!(reached, 0);

        let mut rx = bus.subscribe(&Topic::User(7));
        let reached = dispatcher.publish_logged(
            ctx(NotificationKind::WorkRejected),
            Envelope::to(Role::Seeker, event.clone()),
        );
        assert_eq!(reached, 1);
        assert_eq!(rx.recv().await.unwrap().event, event);

        dispatcher.flush().await;
        let log = storage.list_notifications_for_user(7).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.iter().filter(|r| r.delivered).count(), 1);
        assert!(log
            .iter()
            .any(|r| r.error.as_deref() == Some("recipient offline")));
    }

    #[test]
    fn chat_push_hides_content() {
        let n = templates::chat_message(&SessionId::from("s1"));
        assert_eq!(n.metadata["session_id"], "s1");
        assert!(!n.body.contains("s1"));
    }

    #[test]
    fn response_template_follows_decision() {
        let yes = templates::work_response(7, "Asha", "plumbing", true);
        assert_eq!(yes.title, "Work Accepted");
        assert_eq!(yes.body, "Asha accepted your plumbing request");
        let no = templates::work_response(7, "Asha", "plumbing", false);
        assert_eq!(no.metadata["type"], "work_rejected");
        assert_eq!(no.metadata["accepted"], "false");
    }

    #[test]
    fn assignment_template_names_seeker_and_service() {
        let n = templates::work_assigned(234, "Ravi", "electrician");
        assert_eq!(n.body, "Ravi needs electrician");
        assert_eq!(n.metadata["work_id"], "234");
    }
}
