//! Event rows — the audit trail written in batches by the event writer.

use libsql::params;
use serde_json::Value;
use uuid::Uuid;

use super::LibSqlStore;
use crate::error::StoreError;

/// A single lifecycle event, ready for insertion.
#[derive(Debug, Clone, Default)]
pub struct EventRow {
    pub cluster_id: String,
    pub event_type: String,
    pub job_id: Option<String>,
    pub machine_id: Option<String>,
    pub run_id: Option<String>,
    pub target_fn: Option<String>,
    pub result_kind: Option<String>,
    pub status: Option<String>,
    pub meta: Option<Value>,
    /// Pre-formatted timestamp captured when the event occurred, not when
    /// the batch was flushed.
    pub created_at: String,
}

impl LibSqlStore {
    /// Insert a batch of events.
    pub async fn insert_events(&self, events: &[EventRow]) -> Result<(), StoreError> {
        for event in events {
            self.conn()
                .execute(
                    "INSERT INTO events (id, cluster_id, type, job_id, machine_id, run_id, \
                     target_fn, result_kind, status, meta, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    params![
                        Uuid::now_v7().to_string(),
                        event.cluster_id.as_str(),
                        event.event_type.as_str(),
                        event.job_id.clone(),
                        event.machine_id.clone(),
                        event.run_id.clone(),
                        event.target_fn.clone(),
                        event.result_kind.clone(),
                        event.status.clone(),
                        event.meta.as_ref().map(|v| v.to_string()),
                        event.created_at.as_str(),
                    ],
                )
                .await?;
        }
        Ok(())
    }

    /// Count of stored events by type for a cluster (test and ops support).
    pub async fn count_events(
        &self,
        cluster_id: &str,
        event_type: &str,
    ) -> Result<i64, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM events WHERE cluster_id = ?1 AND type = ?2",
                params![cluster_id, event_type],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }
}
