//! libSQL store handle — connection management and schema setup.

use std::path::Path;
use std::sync::Arc;

use libsql::Connection;
use tracing::info;

use crate::error::StoreError;

/// libSQL-backed store.
///
/// Holds a single connection reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
#[derive(Clone)]
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<libsql::Database>,
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Store opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Connection(format!("Failed to create database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Connection(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Create all tables and indexes. Idempotent.
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT NOT NULL,
                    cluster_id TEXT NOT NULL,
                    service TEXT NOT NULL,
                    target_fn TEXT NOT NULL,
                    target_args TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    executing_machine_id TEXT,
                    cache_key TEXT,
                    remaining_attempts INTEGER NOT NULL DEFAULT 1,
                    timeout_seconds INTEGER NOT NULL DEFAULT 30,
                    result TEXT,
                    result_kind TEXT,
                    resulted_at TEXT,
                    last_claimed_at TEXT,
                    execution_time_ms INTEGER,
                    approval_requested INTEGER NOT NULL DEFAULT 0,
                    approved INTEGER,
                    run_id TEXT NOT NULL,
                    auth_context TEXT,
                    run_context TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, id)
                );
                CREATE INDEX IF NOT EXISTS idx_jobs_poll
                    ON jobs(cluster_id, service, status);
                CREATE INDEX IF NOT EXISTS idx_jobs_run ON jobs(cluster_id, run_id);
                CREATE INDEX IF NOT EXISTS idx_jobs_cache
                    ON jobs(cluster_id, service, target_fn, cache_key);

                CREATE TABLE IF NOT EXISTS runs (
                    id TEXT NOT NULL,
                    cluster_id TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    name TEXT,
                    system_prompt TEXT,
                    result_schema TEXT,
                    attached_functions TEXT,
                    model_identifier TEXT,
                    interactive INTEGER NOT NULL DEFAULT 1,
                    enable_summarization INTEGER NOT NULL DEFAULT 0,
                    enable_result_grounding INTEGER NOT NULL DEFAULT 0,
                    test INTEGER NOT NULL DEFAULT 0,
                    test_mocks TEXT,
                    auth_context TEXT,
                    run_context TEXT,
                    failure_reason TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, id)
                );

                CREATE TABLE IF NOT EXISTS run_messages (
                    id TEXT NOT NULL,
                    cluster_id TEXT NOT NULL,
                    run_id TEXT NOT NULL,
                    type TEXT NOT NULL,
                    data TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, id)
                );
                CREATE INDEX IF NOT EXISTS idx_run_messages_run
                    ON run_messages(cluster_id, run_id, id);

                CREATE TABLE IF NOT EXISTS machines (
                    id TEXT NOT NULL,
                    cluster_id TEXT NOT NULL,
                    status TEXT NOT NULL DEFAULT 'active',
                    last_ping_at TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, id)
                );

                CREATE TABLE IF NOT EXISTS services (
                    cluster_id TEXT NOT NULL,
                    service TEXT NOT NULL,
                    definition TEXT NOT NULL,
                    expires_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, service)
                );

                CREATE TABLE IF NOT EXISTS blobs (
                    id TEXT NOT NULL,
                    cluster_id TEXT NOT NULL,
                    job_id TEXT,
                    run_id TEXT,
                    name TEXT NOT NULL,
                    data TEXT NOT NULL,
                    size INTEGER NOT NULL,
                    created_at TEXT NOT NULL,
                    PRIMARY KEY (cluster_id, id)
                );
                CREATE INDEX IF NOT EXISTS idx_blobs_job ON blobs(cluster_id, job_id);

                CREATE TABLE IF NOT EXISTS events (
                    id TEXT PRIMARY KEY,
                    cluster_id TEXT NOT NULL,
                    type TEXT NOT NULL,
                    job_id TEXT,
                    machine_id TEXT,
                    run_id TEXT,
                    target_fn TEXT,
                    result_kind TEXT,
                    status TEXT,
                    meta TEXT,
                    created_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_events_cluster
                    ON events(cluster_id, created_at);
                CREATE INDEX IF NOT EXISTS idx_events_job ON events(cluster_id, job_id);

                CREATE TABLE IF NOT EXISTS locks (
                    name TEXT PRIMARY KEY,
                    holder TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );",
            )
            .await
            .map_err(|e| StoreError::Query(format!("init_schema: {e}")))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_creates_tables() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let mut rows = store
            .conn()
            .query(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='jobs'",
                (),
            )
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let count: i64 = row.get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("foreman.db");
        let store = LibSqlStore::open(&db_path).await.unwrap();
        assert!(db_path.exists());
        drop(store);
    }

    #[tokio::test]
    async fn schema_init_is_idempotent() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.init_schema().await.unwrap();
    }
}
