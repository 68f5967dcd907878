//! Run message rows and the message data model.
//!
//! Message ids are UUIDv7, so their canonical text form sorts
//! chronologically. Ordering queries rely on this instead of a separate
//! sequence column.

use chrono::{DateTime, Utc};
use libsql::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{LibSqlStore, now_ts, parse_ts};
use crate::error::StoreError;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Stable id used for job idempotency and result correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

/// The payload of a run message, discriminated by sender role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessageData {
    /// User input.
    Human { message: String },
    /// Initial message generated from a run template.
    Template { message: String },
    /// Corrective guidance injected by the orchestrator.
    Supervisor { message: String },
    /// A structured model response.
    Agent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        done: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issue: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        invocations: Vec<Invocation>,
    },
    /// A model response that failed validation, kept for context.
    AgentInvalid { message: String },
    /// The outcome of a tool invocation, keyed by invocation id.
    InvocationResult { id: String, result: Value },
}

impl MessageData {
    pub fn type_name(&self) -> &'static str {
        match self {
            MessageData::Human { .. } => "human",
            MessageData::Template { .. } => "template",
            MessageData::Supervisor { .. } => "supervisor",
            MessageData::Agent { .. } => "agent",
            MessageData::AgentInvalid { .. } => "agent-invalid",
            MessageData::InvocationResult { .. } => "invocation-result",
        }
    }

    /// Whether this message counts as external progress for cycle detection.
    pub fn is_progress(&self) -> bool {
        matches!(
            self,
            MessageData::Human { .. } | MessageData::InvocationResult { .. }
        )
    }
}

/// A persisted run message.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: Uuid,
    pub cluster_id: String,
    pub run_id: String,
    pub data: MessageData,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a new message with a time-ordered id.
    pub fn new(cluster_id: &str, run_id: &str, data: MessageData) -> Self {
        Self {
            id: Uuid::now_v7(),
            cluster_id: cluster_id.to_string(),
            run_id: run_id.to_string(),
            data,
            created_at: Utc::now(),
        }
    }
}

impl LibSqlStore {
    pub async fn insert_message(&self, message: &Message) -> Result<(), StoreError> {
        self.conn()
            .execute(
                "INSERT INTO run_messages (id, cluster_id, run_id, type, data, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.cluster_id.as_str(),
                    message.run_id.as_str(),
                    message.data.type_name(),
                    serde_json::to_string(&message.data)?,
                    now_ts(),
                ],
            )
            .await?;
        Ok(())
    }

    /// All messages for a run, oldest first.
    pub async fn list_messages(
        &self,
        cluster_id: &str,
        run_id: &str,
    ) -> Result<Vec<Message>, StoreError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, data, created_at FROM run_messages \
                 WHERE cluster_id = ?1 AND run_id = ?2 ORDER BY id",
                params![cluster_id, run_id],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            let id_str: String = row.get(0)?;
            let data_str: String = row.get(1)?;
            let created_str: String = row.get(2)?;
            out.push(Message {
                id: Uuid::parse_str(&id_str)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?,
                cluster_id: cluster_id.to_string(),
                run_id: run_id.to_string(),
                data: serde_json::from_str(&data_str)?,
                created_at: parse_ts(&created_str),
            });
        }
        Ok(out)
    }

    /// Remove specific messages (context compaction).
    ///
    /// The batch commits as one transaction: an agent message and the
    /// results answering it must never be separated by a partial delete.
    pub async fn delete_messages(
        &self,
        cluster_id: &str,
        run_id: &str,
        ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let tx = self.conn().transaction().await?;
        for id in ids {
            tx.execute(
                "DELETE FROM run_messages \
                 WHERE cluster_id = ?1 AND run_id = ?2 AND id = ?3",
                params![cluster_id, run_id, id.to_string()],
            )
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
