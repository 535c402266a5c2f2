// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP/WebSocket gateway for the work-session engine.
//!
//! Clients hold one WebSocket per role (`/ws/work/provider` or
//! `/ws/work/seeker`) carrying JSON frames both ways; seekers dispatch work
//! over REST. The gateway runs the axum server as a background task and
//! owns nothing but connection state: every decision is made by the
//! [`SessionEngine`](visible_session::SessionEngine).

pub mod auth;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod ws;

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use visible_core::types::{AdapterType, HealthStatus};
use visible_core::{PluginAdapter, VisibleError};

pub use server::{GatewayState, HealthState, ServerConfig, build_router};

/// The running gateway server.
pub struct Gateway {
    config: ServerConfig,
    state: GatewayState,
    /// Cancelled on shutdown to stop the server task.
    shutdown: CancellationToken,
    server_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Gateway {
    pub fn new(config: ServerConfig, state: GatewayState) -> Self {
        Self {
            config,
            state,
            shutdown: CancellationToken::new(),
            server_handle: Mutex::new(None),
        }
    }

    /// Bind the listener and start serving in the background.
    ///
    /// Returns the bound address, which differs from the configured one
    /// when port 0 was requested.
    pub async fn start(&self) -> Result<SocketAddr, VisibleError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| VisibleError::Channel {
                message: format!("failed to bind gateway to {addr}: {e}"),
                source: Some(Box::new(e)),
            })?;
        let local = listener.local_addr().map_err(|e| VisibleError::Channel {
            message: format!("gateway listener has no address: {e}"),
            source: Some(Box::new(e)),
        })?;

        let state = self.state.clone();
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = server::serve(listener, state, shutdown).await {
                tracing::error!(error = %e, "gateway server stopped");
            }
        });
        *self.server_handle.lock().await = Some(handle);
        Ok(local)
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.server_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl PluginAdapter for Gateway {
    fn name(&self) -> &str {
        "gateway"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Gateway
    }

    async fn health_check(&self) -> Result<HealthStatus, VisibleError> {
        match self.server_handle.lock().await.as_ref() {
            Some(handle) if !handle.is_finished() => Ok(HealthStatus::Healthy),
            Some(_) => Ok(HealthStatus::Unhealthy("server exited".to_string())),
            None => Ok(HealthStatus::Unhealthy("server not started".to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), VisibleError> {
        self.stop().await;
        Ok(())
    }
}
