// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `visible sweep` command: one maintenance pass against the database.

use std::sync::Arc;

use visible_config::VisibleConfig;
use visible_core::{StorageAdapter, SystemClock, VisibleError};
use visible_push::LogPushNotifier;
use visible_session::SweepReport;

use crate::serve::{build_engine, init_tracing, open_storage};

pub async fn run_sweep(config: VisibleConfig) -> Result<(), VisibleError> {
    init_tracing(&config.logging.level);
    let report = sweep_once(&config).await?;
    println!(
        "visible sweep: removed {} expired chat message(s)",
        report.expired_messages
    );
    Ok(())
}

async fn sweep_once(config: &VisibleConfig) -> Result<SweepReport, VisibleError> {
    let storage = open_storage(config).await?;
    // No pushes are sent during a sweep.
    let engine = build_engine(
        config,
        storage.clone(),
        Arc::new(LogPushNotifier::new()),
        Arc::new(SystemClock),
    );
    let report = engine.sweep().await?;
    engine.shutdown().await;
    storage.close().await?;
    Ok(report)
}
