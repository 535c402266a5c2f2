// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer-token identity collaborator.
//!
//! A token is `<user_id>.<role>.<expires_unix>.<hex hmac-sha256>` where the
//! MAC covers the first three fields. Tokens are minted by the upstream
//! identity service (or `visible token` for local testing) and only
//! verified here.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use visible_config::model::AuthConfig;
use visible_core::types::{AdapterType, HealthStatus, Identity};
use visible_core::{Clock, IdentityResolver, PluginAdapter, Role, UserId, VisibleError};

type HmacSha256 = Hmac<Sha256>;

/// Shortest secret accepted, in bytes.
pub const MIN_SECRET_LEN: usize = 16;

/// Mints and verifies signed bearer tokens.
pub struct TokenAuthority {
    secret: Vec<u8>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("secret", &"[redacted]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl_secs: u64, clock: Arc<dyn Clock>) -> Result<Self, VisibleError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(VisibleError::Config(format!(
                "auth.token_secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            ttl: Duration::seconds(ttl_secs as i64),
            clock,
        })
    }

    /// Build from the `[auth]` section. A secret is required.
    pub fn from_config(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, VisibleError> {
        let secret = config
            .token_secret
            .as_deref()
            .ok_or_else(|| VisibleError::Config("auth.token_secret is not set".into()))?;
        Self::new(secret, config.token_ttl_secs, clock)
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, VisibleError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| VisibleError::Internal(format!("hmac key rejected: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    /// Issue a token valid for the configured lifetime.
    pub fn mint(&self, user_id: UserId, role: Role) -> Result<String, VisibleError> {
        self.mint_until(user_id, role, self.clock.now() + self.ttl)
    }

    fn mint_until(
        &self,
        user_id: UserId,
        role: Role,
        expires: DateTime<Utc>,
    ) -> Result<String, VisibleError> {
        let payload = format!("{user_id}.{role}.{}", expires.timestamp());
        let signature = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{payload}.{signature}"))
    }

    /// Check a token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Identity, VisibleError> {
        let denied = |why: &str| VisibleError::PermissionDenied(format!("invalid token: {why}"));

        let (payload, signature) = token.trim().rsplit_once('.').ok_or_else(|| denied("malformed"))?;
        let signature = hex::decode(signature).map_err(|_| denied("malformed signature"))?;
        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| denied("bad signature"))?;

        let mut parts = payload.split('.');
        let (Some(user), Some(role), Some(expires), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(denied("malformed"));
        };
        let user_id: UserId = user.parse().map_err(|_| denied("bad user id"))?;
        let role: Role = role.parse().map_err(|_| denied("bad role"))?;
        let expires: i64 = expires.parse().map_err(|_| denied("bad expiry"))?;
        if self.clock.now().timestamp() >= expires {
            return Err(denied("expired"));
        }

        debug!(user_id, role = %role, "token verified");
        Ok(Identity { user_id, role })
    }
}

impl IdentityResolver for TokenAuthority {
    fn resolve(&self, credential: &str) -> Result<Identity, VisibleError> {
        self.verify(credential)
    }
}

#[async_trait]
impl PluginAdapter for TokenAuthority {
    fn name(&self) -> &str {
        "hmac-token-auth"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Identity
    }

    async fn health_check(&self) -> Result<HealthStatus, VisibleError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), VisibleError> {
        Ok(())
    }
}
