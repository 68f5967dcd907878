//! Run rows.

use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LibSqlStore, now_ts, parse_ts};
use crate::error::StoreError;

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Paused,
    Done,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => RunStatus::Running,
            "paused" => RunStatus::Paused,
            "done" => RunStatus::Done,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Pending,
        }
    }

    /// Whether a new user message may be appended in this state.
    pub fn accepts_input(&self) -> bool {
        matches!(
            self,
            RunStatus::Pending | RunStatus::Paused | RunStatus::Done | RunStatus::Failed
        )
    }
}

/// A full run record.
#[derive(Debug, Clone)]
pub struct Run {
    pub id: String,
    pub cluster_id: String,
    pub status: RunStatus,
    pub name: Option<String>,
    pub system_prompt: Option<String>,
    pub result_schema: Option<Value>,
    pub attached_functions: Vec<String>,
    pub model_identifier: Option<String>,
    pub interactive: bool,
    pub enable_summarization: bool,
    pub enable_result_grounding: bool,
    pub test: bool,
    pub test_mocks: Option<Value>,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new run row.
#[derive(Debug, Clone, Default)]
pub struct RunInsert {
    pub id: String,
    pub cluster_id: String,
    pub name: Option<String>,
    pub system_prompt: Option<String>,
    pub result_schema: Option<Value>,
    pub attached_functions: Vec<String>,
    pub model_identifier: Option<String>,
    pub interactive: bool,
    pub enable_summarization: bool,
    pub enable_result_grounding: bool,
    pub test: bool,
    pub test_mocks: Option<Value>,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
}

const RUN_COLUMNS: &str = "id, cluster_id, status, name, system_prompt, result_schema, \
     attached_functions, model_identifier, interactive, enable_summarization, \
     enable_result_grounding, test, test_mocks, auth_context, run_context, \
     failure_reason, created_at";

fn row_to_run(row: &libsql::Row) -> Result<Run, StoreError> {
    let status_str: String = row.get(2)?;
    let schema_str: Option<String> = row.get(5)?;
    let functions_str: Option<String> = row.get(6)?;
    let mocks_str: Option<String> = row.get(12)?;
    let auth_str: Option<String> = row.get(13)?;
    let ctx_str: Option<String> = row.get(14)?;
    let created_str: String = row.get(16)?;

    Ok(Run {
        id: row.get(0)?,
        cluster_id: row.get(1)?,
        status: RunStatus::parse(&status_str),
        name: row.get(3)?,
        system_prompt: row.get(4)?,
        result_schema: schema_str.as_deref().map(serde_json::from_str).transpose()?,
        attached_functions: functions_str
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default(),
        model_identifier: row.get(7)?,
        interactive: row.get::<i64>(8)? != 0,
        enable_summarization: row.get::<i64>(9)? != 0,
        enable_result_grounding: row.get::<i64>(10)? != 0,
        test: row.get::<i64>(11)? != 0,
        test_mocks: mocks_str.as_deref().map(serde_json::from_str).transpose()?,
        auth_context: auth_str.as_deref().map(serde_json::from_str).transpose()?,
        run_context: ctx_str.as_deref().map(serde_json::from_str).transpose()?,
        failure_reason: row.get(15)?,
        created_at: parse_ts(&created_str),
    })
}

impl LibSqlStore {
    pub async fn insert_run(&self, insert: &RunInsert) -> Result<(), StoreError> {
        let now = now_ts();
        self.conn()
            .execute(
                "INSERT INTO runs (id, cluster_id, status, name, system_prompt, result_schema, \
                 attached_functions, model_identifier, interactive, enable_summarization, \
                 enable_result_grounding, test, test_mocks, auth_context, run_context, \
                 created_at, updated_at) \
                 VALUES (?1, ?2, 'pending', ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                 ?14, ?15, ?15) \
                 ON CONFLICT (cluster_id, id) DO NOTHING",
                params![
                    insert.id.as_str(),
                    insert.cluster_id.as_str(),
                    insert.name.clone(),
                    insert.system_prompt.clone(),
                    insert.result_schema.as_ref().map(|v| v.to_string()),
                    serde_json::to_string(&insert.attached_functions)?,
                    insert.model_identifier.clone(),
                    insert.interactive as i64,
                    insert.enable_summarization as i64,
                    insert.enable_result_grounding as i64,
                    insert.test as i64,
                    insert.test_mocks.as_ref().map(|v| v.to_string()),
                    insert.auth_context.as_ref().map(|v| v.to_string()),
                    insert.run_context.as_ref().map(|v| v.to_string()),
                    now,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get_run(&self, cluster_id: &str, run_id: &str) -> Result<Option<Run>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE cluster_id = ?1 AND id = ?2"),
                params![cluster_id, run_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row_to_run(&row)?)),
            None => Ok(None),
        }
    }

    /// Set a run's status; a failure reason may only accompany `failed`.
    pub async fn update_run_status(
        &self,
        cluster_id: &str,
        run_id: &str,
        status: RunStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "UPDATE runs SET status = ?1, failure_reason = ?2, updated_at = ?3 \
                 WHERE cluster_id = ?4 AND id = ?5",
                params![
                    status.as_str(),
                    failure_reason.map(|s| s.to_string()),
                    now_ts(),
                    cluster_id,
                    run_id,
                ],
            )
            .await?;
        Ok(())
    }

    /// Mark a run running, clearing any stale failure reason.
    pub async fn mark_run_running(&self, cluster_id: &str, run_id: &str) -> Result<(), StoreError> {
        self.update_run_status(cluster_id, run_id, RunStatus::Running, None)
            .await
    }

    /// Delete a run together with its messages and jobs.
    pub async fn delete_run(&self, cluster_id: &str, run_id: &str) -> Result<(), StoreError> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM run_messages WHERE cluster_id = ?1 AND run_id = ?2",
            params![cluster_id, run_id],
        )
        .await?;
        conn.execute(
            "DELETE FROM jobs WHERE cluster_id = ?1 AND run_id = ?2",
            params![cluster_id, run_id],
        )
        .await?;
        conn.execute(
            "DELETE FROM runs WHERE cluster_id = ?1 AND id = ?2",
            params![cluster_id, run_id],
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn insert(id: &str) -> RunInsert {
        RunInsert {
            id: id.to_string(),
            cluster_id: "c1".into(),
            name: Some("triage".into()),
            system_prompt: Some("You triage support tickets.".into()),
            attached_functions: vec!["orders_lookup".into()],
            interactive: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn round_trips_a_run() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let mut ins = insert("r1");
        ins.result_schema = Some(json!({"type": "object"}));
        store.insert_run(&ins).await.unwrap();

        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.name.as_deref(), Some("triage"));
        assert_eq!(run.attached_functions, vec!["orders_lookup".to_string()]);
        assert_eq!(run.result_schema, Some(json!({"type": "object"})));
        assert!(run.interactive);
        assert!(!run.test);
    }

    #[tokio::test]
    async fn status_transitions_and_failure_reason() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.insert_run(&insert("r1")).await.unwrap();

        store
            .update_run_status("c1", "r1", RunStatus::Failed, Some("model unavailable"))
            .await
            .unwrap();
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.failure_reason.as_deref(), Some("model unavailable"));

        // Restarting clears the reason.
        store.mark_run_running("c1", "r1").await.unwrap();
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.failure_reason.is_none());
    }

    #[tokio::test]
    async fn delete_removes_run_and_children() {
        let store = LibSqlStore::open_in_memory().await.unwrap();
        store.insert_run(&insert("r1")).await.unwrap();
        store.delete_run("c1", "r1").await.unwrap();
        assert!(store.get_run("c1", "r1").await.unwrap().is_none());
    }
}
