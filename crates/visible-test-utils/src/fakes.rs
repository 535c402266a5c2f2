// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory stand-ins for the engine's external collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use visible_core::types::{
    AdapterType, HealthStatus, MediumMap, ProfileSummary, PushNotification, PushOutcome,
};
use visible_core::{
    AvailabilityFlags, PluginAdapter, ProfileLookup, PushNotifier, Role, UserId, VisibleError,
};

/// Push notifier that records every delivery.
///
/// With [`fail_deliveries`](Self::fail_deliveries) set, every delivery is
/// reported as failed.
#[derive(Debug, Default)]
pub struct RecordingPush {
    delivered: Mutex<Vec<(UserId, PushNotification)>>,
    failing: AtomicBool,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Every notification handed to the notifier, in order.
    pub fn deliveries(&self) -> Vec<(UserId, PushNotification)> {
        self.delivered.lock().unwrap().clone()
    }

    /// Notifications for one user whose metadata `type` equals `kind`.
    pub fn deliveries_of(&self, user_id: UserId, kind: &str) -> Vec<PushNotification> {
        self.deliveries()
            .into_iter()
            .filter(|(to, n)| *to == user_id && n.metadata.get("type").map(String::as_str) == Some(kind))
            .map(|(_, n)| n)
            .collect()
    }

    pub fn clear(&self) {
        self.delivered.lock().unwrap().clear();
    }
}

#[async_trait]
impl PluginAdapter for RecordingPush {
    fn name(&self) -> &str {
        "recording-push"
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
impl PushNotifier for RecordingPush {
    async fn deliver(
        &self,
        user_id: UserId,
        notification: &PushNotification,
    ) -> Result<PushOutcome, VisibleError> {
        self.delivered
            .lock()
            .unwrap()
            .push((user_id, notification.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Ok(PushOutcome::Failed {
                reason: "device token rejected".into(),
            });
        }
        Ok(PushOutcome::Sent {
            message_id: Some(format!("push-{user_id}")),
        })
    }
}

/// Availability flags kept in a map. Unknown users read as unset.
#[derive(Debug, Default)]
pub struct MemoryFlags {
    available: Mutex<HashMap<UserId, bool>>,
    searching: Mutex<HashMap<UserId, bool>>,
    failing: AtomicBool,
}

impl MemoryFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every flag write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn seed(&self, user_id: UserId, available: bool, searching: bool) {
        self.available.lock().unwrap().insert(user_id, available);
        self.searching.lock().unwrap().insert(user_id, searching);
    }

    pub fn available(&self, user_id: UserId) -> Option<bool> {
        self.available.lock().unwrap().get(&user_id).copied()
    }

    pub fn searching(&self, user_id: UserId) -> Option<bool> {
        self.searching.lock().unwrap().get(&user_id).copied()
    }

    fn check(&self) -> Result<(), VisibleError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(VisibleError::Internal("flag store unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityFlags for MemoryFlags {
    async fn set_provider_available(
        &self,
        provider_id: UserId,
        available: bool,
    ) -> Result<(), VisibleError> {
        self.check()?;
        self.available.lock().unwrap().insert(provider_id, available);
        Ok(())
    }

    async fn set_seeker_searching(
        &self,
        seeker_id: UserId,
        searching: bool,
    ) -> Result<(), VisibleError> {
        self.check()?;
        self.searching.lock().unwrap().insert(seeker_id, searching);
        Ok(())
    }
}

/// A fixed directory of profiles.
#[derive(Debug, Default)]
pub struct StaticProfiles {
    profiles: Mutex<HashMap<UserId, ProfileSummary>>,
}

impl StaticProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: UserId, role: Role, display_name: &str, mediums: MediumMap) {
        self.profiles.lock().unwrap().insert(
            user_id,
            ProfileSummary {
                user_id,
                role,
                display_name: display_name.to_string(),
                available_mediums: mediums,
            },
        );
    }
}

#[async_trait]
impl ProfileLookup for StaticProfiles {
    async fn profile(&self, user_id: UserId) -> Result<Option<ProfileSummary>, VisibleError> {
        Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_push_can_fail() {
        let push = RecordingPush::new();
        let n = PushNotification {
            title: "t".into(),
            body: "b".into(),
            metadata: [("type".to_string(), "chat_message".to_string())].into(),
        };
        assert!(matches!(push.deliver(1, &n).await.unwrap(), PushOutcome::Sent { .. }));
        push.fail_deliveries(true);
        assert!(matches!(push.deliver(1, &n).await.unwrap(), PushOutcome::Failed { .. }));
        assert_eq!(push.deliveries_of(1, "chat_message").len(), 2);
    }

    #[tokio::test]
    async fn flags_record_writes() {
        let flags = MemoryFlags::new();
        assert_eq!(flags.available(5), None);
        flags.set_provider_available(5, false).await.unwrap();
        assert_eq!(flags.available(5), Some(false));
        flags.fail_writes(true);
        assert!(flags.set_seeker_searching(6, true).await.is_err());
        assert_eq!(flags.searching(6), None);
    }
}
