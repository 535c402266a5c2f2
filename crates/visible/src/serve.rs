// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `visible serve` command implementation.
//!
//! Wires SQLite storage, the push notifier, token auth and the in-memory
//! bus into a [`SessionEngine`], restores open sessions, and serves the
//! gateway until SIGINT/SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use visible_auth::TokenAuthority;
use visible_bus::InMemoryBus;
use visible_config::VisibleConfig;
use visible_core::types::HealthStatus;
use visible_core::{Clock, PluginAdapter, PushNotifier, StorageAdapter, SystemClock, VisibleError};
use visible_gateway::{Gateway, GatewayState, HealthState, ServerConfig};
use visible_prometheus::PrometheusAdapter;
use visible_session::{EngineDeps, SessionEngine};
use visible_storage::SqliteStorage;

use crate::shutdown;

/// Open and migrate the configured database.
pub async fn open_storage(config: &VisibleConfig) -> Result<Arc<SqliteStorage>, VisibleError> {
    let storage = Arc::new(SqliteStorage::new(config.storage.clone()));
    storage.initialize().await?;
    Ok(storage)
}

/// Build the engine over SQLite-backed flags and profiles.
pub fn build_engine(
    config: &VisibleConfig,
    storage: Arc<SqliteStorage>,
    push: Arc<dyn PushNotifier>,
    clock: Arc<dyn Clock>,
) -> SessionEngine {
    SessionEngine::new(
        EngineDeps {
            storage: storage.clone(),
            flags: storage.clone(),
            profiles: storage,
            push,
            bus: Arc::new(InMemoryBus::new()),
            clock,
        },
        config.session.clone(),
    )
}

/// Runs the `visible serve` command until a shutdown signal arrives.
pub async fn run_serve(config: VisibleConfig) -> Result<(), VisibleError> {
    init_tracing(&config.logging.level);
    let cancel = shutdown::install_signal_handler();
    serve_until(config, cancel, None).await
}

/// Serve until `shutdown` is cancelled. The bound address is reported on
/// `ready` once the listener is up.
pub async fn serve_until(
    config: VisibleConfig,
    shutdown: CancellationToken,
    ready: Option<oneshot::Sender<SocketAddr>>,
) -> Result<(), VisibleError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let identity = Arc::new(TokenAuthority::from_config(&config.auth, clock.clone())?);
    let push = visible_push::build_notifier(&config.push)?;
    let storage = open_storage(&config).await?;

    let prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>> =
        if config.prometheus.enabled {
            let adapter = Arc::new(PrometheusAdapter::new()?);
            Some(Arc::new(move || adapter.render()))
        } else {
            None
        };

    let engine = build_engine(&config, storage.clone(), push.clone(), clock);
    let restored = engine.restore().await?;
    engine.start_sweeper();

    let gateway = Gateway::new(
        ServerConfig {
            host: config.server.host.clone(),
            port: config.server.port,
        },
        GatewayState {
            engine: engine.clone(),
            identity: identity.clone(),
            health: HealthState {
                start_time: std::time::Instant::now(),
                prometheus_render,
            },
        },
    );
    let addr = gateway.start().await?;

    report_health(storage.as_ref()).await;
    report_health(push.as_ref()).await;
    report_health(identity.as_ref()).await;
    report_health(&gateway).await;
    info!(%addr, restored, "visible serving");
    if let Some(ready) = ready {
        let _ = ready.send(addr);
    }

    shutdown.cancelled().await;

    info!("shutting down");
    gateway.stop().await;
    engine.shutdown().await;
    push.shutdown().await?;
    storage.close().await?;
    info!("visible serve shutdown complete");
    Ok(())
}

async fn report_health<A: PluginAdapter + ?Sized>(adapter: &A) {
    match adapter.health_check().await {
        Ok(HealthStatus::Healthy) => {
            info!(adapter = adapter.name(), version = %adapter.version(), "adapter ready");
        }
        Ok(status) => {
            warn!(adapter = adapter.name(), status = ?status, "adapter not fully healthy");
        }
        Err(e) => warn!(adapter = adapter.name(), error = %e, "adapter health check failed"),
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` wins over the config.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    const CRATES: [&str; 9] = [
        "visible",
        "visible_auth",
        "visible_bus",
        "visible_gateway",
        "visible_prometheus",
        "visible_push",
        "visible_session",
        "visible_storage",
        "tower_http",
    ];
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives: Vec<String> =
            CRATES.iter().map(|c| format!("{c}={log_level}")).collect();
        directives.push("warn".to_string());
        EnvFilter::new(directives.join(","))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
