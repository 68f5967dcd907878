//! Blob rows — out-of-band storage for oversized job results.

use chrono::{DateTime, Utc};
use libsql::params;
use uuid::Uuid;

use super::{LibSqlStore, now_ts, parse_ts};
use crate::error::StoreError;

/// A stored blob.
#[derive(Debug, Clone)]
pub struct Blob {
    pub id: String,
    pub cluster_id: String,
    pub job_id: Option<String>,
    pub run_id: Option<String>,
    pub name: String,
    pub data: String,
    pub size: usize,
    pub created_at: DateTime<Utc>,
}

impl LibSqlStore {
    /// Store a blob and return its id.
    pub async fn insert_blob(
        &self,
        cluster_id: &str,
        job_id: Option<&str>,
        run_id: Option<&str>,
        name: &str,
        data: &str,
    ) -> Result<String, StoreError> {
        let id = Uuid::now_v7().to_string();
        self.conn()
            .execute(
                "INSERT INTO blobs (id, cluster_id, job_id, run_id, name, data, size, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id.as_str(),
                    cluster_id,
                    job_id.map(|s| s.to_string()),
                    run_id.map(|s| s.to_string()),
                    name,
                    data,
                    data.len() as i64,
                    now_ts(),
                ],
            )
            .await?;
        Ok(id)
    }

    pub async fn get_blob(
        &self,
        cluster_id: &str,
        blob_id: &str,
    ) -> Result<Option<Blob>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, job_id, run_id, name, data, size, created_at \
                 FROM blobs WHERE cluster_id = ?1 AND id = ?2",
                params![cluster_id, blob_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => {
                let created_str: String = row.get(6)?;
                Ok(Some(Blob {
                    id: row.get(0)?,
                    cluster_id: cluster_id.to_string(),
                    job_id: row.get(1)?,
                    run_id: row.get(2)?,
                    name: row.get(3)?,
                    data: row.get(4)?,
                    size: row.get::<i64>(5)? as usize,
                    created_at: parse_ts(&created_str),
                }))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blob_round_trips() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let payload = "x".repeat(1024);
        let id = store
            .insert_blob("c1", Some("j1"), Some("r1"), "result", &payload)
            .await
            .unwrap();

        let blob = store.get_blob("c1", &id).await.unwrap().unwrap();
        assert_eq!(blob.job_id.as_deref(), Some("j1"));
        assert_eq!(blob.name, "result");
        assert_eq!(blob.size, 1024);
        assert_eq!(blob.data, payload);

        assert!(store.get_blob("c1", "missing").await.unwrap().is_none());
    }
}
