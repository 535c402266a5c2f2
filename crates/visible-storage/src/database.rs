// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup and migrations.
//!
//! All reads and writes go through tokio-rusqlite's single background
//! thread, so each `call` closure runs atomically with respect to every
//! other closure. Do NOT open additional connections for writes.

use std::path::Path;

use tracing::debug;
use visible_core::VisibleError;

use crate::migrations;

/// Handle to the single SQLite connection.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &str, wal_mode: bool) -> Result<Self, VisibleError> {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(VisibleError::storage)?;
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(VisibleError::storage)?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        debug!(path, wal_mode, "database opened");
        Ok(db)
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn open_in_memory() -> Result<Self, VisibleError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(VisibleError::storage)?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), VisibleError> {
        self.conn
            .call(move |conn| -> Result<(), VisibleError> {
                if wal_mode {
                    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                        row.get::<_, String>(0)
                    })
                    .map_err(VisibleError::storage)?;
                    conn.pragma_update(None, "synchronous", "NORMAL")
                        .map_err(VisibleError::storage)?;
                }
                conn.pragma_update(None, "foreign_keys", "ON")
                    .map_err(VisibleError::storage)?;
                conn.busy_timeout(std::time::Duration::from_secs(5))
                    .map_err(VisibleError::storage)?;
                migrations::run_migrations(conn)
            })
            .await
            .map_err(map_call_err)
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main file is self-contained.
    pub async fn checkpoint(&self) -> Result<(), VisibleError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
            })
            .await
            .map_err(map_tr_err)
    }
}

/// Convert a tokio-rusqlite error wrapping a rusqlite error.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> VisibleError {
    VisibleError::Storage {
        source: Box::new(e),
    }
}

/// Convert a tokio-rusqlite error from a closure that already speaks `VisibleError`.
pub fn map_call_err(e: tokio_rusqlite::Error<VisibleError>) -> VisibleError {
    match e {
        tokio_rusqlite::Error::Error(inner) => inner,
        other => VisibleError::storage(other.to_string()),
    }
}
