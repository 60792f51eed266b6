//! SQLite database layer for the audit store.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::AuditError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, AuditError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AuditError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| AuditError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("[Database] SQLite audit database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AuditError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| AuditError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AuditError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AuditError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| AuditError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, AuditError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| AuditError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), AuditError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS runs (
                    id              TEXT PRIMARY KEY,
                    processing_id   TEXT NOT NULL,
                    variant         TEXT NOT NULL,
                    variant_version TEXT NOT NULL,
                    status          TEXT NOT NULL,
                    abort_reason    TEXT,
                    confidence      REAL NOT NULL,
                    warnings        TEXT NOT NULL DEFAULT '[]',
                    started_at      INTEGER NOT NULL,
                    finished_at     INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_runs_variant ON runs(variant);
                CREATE INDEX IF NOT EXISTS idx_runs_finished ON runs(finished_at);

                CREATE TABLE IF NOT EXISTS stage_outcomes (
                    run_id          TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
                    seq             INTEGER NOT NULL,
                    stage           TEXT NOT NULL,
                    attempt         INTEGER NOT NULL,
                    status          TEXT NOT NULL,
                    confidence      REAL,
                    payload         TEXT,
                    warnings        TEXT NOT NULL DEFAULT '[]',
                    error           TEXT,
                    duration_ms     INTEGER NOT NULL,
                    recorded_at     INTEGER NOT NULL,
                    PRIMARY KEY (run_id, seq)
                );
                ",
            )
        })
    }
}
