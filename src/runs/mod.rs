//! Agent runs — lifecycle, input gating, and resume signalling.

pub mod compaction;
pub mod orchestrator;
pub mod queue;

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result, RunError};
use crate::events::{EventWriter, types};
use crate::store::{LibSqlStore, Message, MessageData, Run, RunInsert, RunStatus};
use queue::RunQueue;

/// The synthetic run that owns jobs created outside any agent run.
/// It is never processed by the orchestrator.
pub fn background_run_id(cluster_id: &str) -> String {
    format!("{cluster_id}BACKGROUND")
}

pub fn is_background_run(cluster_id: &str, run_id: &str) -> bool {
    run_id == background_run_id(cluster_id)
}

/// Parameters for creating a run.
#[derive(Debug, Clone, Default)]
pub struct CreateRunParams {
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
    /// Optional first human message; when present the run is signalled for
    /// processing immediately.
    pub initial_message: Option<String>,
}

/// Run lifecycle operations.
#[derive(Clone)]
pub struct RunService {
    store: LibSqlStore,
    events: EventWriter,
    queue: Arc<dyn RunQueue>,
    #[allow(dead_code)]
    config: Arc<Config>,
}

impl RunService {
    pub fn new(
        store: LibSqlStore,
        events: EventWriter,
        queue: Arc<dyn RunQueue>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            events,
            queue,
            config,
        }
    }

    pub async fn create_run(&self, params: CreateRunParams) -> Result<Run> {
        let id = Uuid::now_v7().to_string();
        self.store
            .insert_run(&RunInsert {
                id: id.clone(),
                cluster_id: params.cluster_id.clone(),
                name: params.name,
                system_prompt: params.system_prompt,
                result_schema: params.result_schema,
                attached_functions: params.attached_functions,
                model_identifier: params.model_identifier,
                interactive: params.interactive,
                enable_summarization: params.enable_summarization,
                enable_result_grounding: params.enable_result_grounding,
                test: params.test,
                test_mocks: params.test_mocks,
                auth_context: params.auth_context,
                run_context: params.run_context,
            })
            .await
            .map_err(Error::Store)?;
        info!(run_id = %id, cluster_id = %params.cluster_id, "Run created");

        if let Some(message) = params.initial_message {
            self.store
                .insert_message(&Message::new(
                    &params.cluster_id,
                    &id,
                    MessageData::Human { message },
                ))
                .await
                .map_err(Error::Store)?;
            self.queue.signal(&params.cluster_id, &id);
        }

        self.get_run(&params.cluster_id, &id).await
    }

    pub async fn get_run(&self, cluster_id: &str, run_id: &str) -> Result<Run> {
        self.store
            .get_run(cluster_id, run_id)
            .await
            .map_err(Error::Store)?
            .ok_or_else(|| {
                RunError::NotFound {
                    id: run_id.to_string(),
                }
                .into()
            })
    }

    /// Append a human message and wake the run. Fails if the run cannot
    /// accept input right now; a busy run is signalled anyway so it makes
    /// progress on whatever it is stuck on.
    pub async fn add_message(&self, cluster_id: &str, run_id: &str, message: String) -> Result<()> {
        self.assert_run_ready(cluster_id, run_id).await?;
        self.store
            .insert_message(&Message::new(
                cluster_id,
                run_id,
                MessageData::Human { message },
            ))
            .await
            .map_err(Error::Store)?;
        self.queue.signal(cluster_id, run_id);
        Ok(())
    }

    /// Re-signal a run for processing (retry after failure or restart).
    pub async fn create_retry(&self, cluster_id: &str, run_id: &str) -> Result<()> {
        self.get_run(cluster_id, run_id).await?;
        self.store
            .update_run_status(cluster_id, run_id, RunStatus::Pending, None)
            .await
            .map_err(Error::Store)?;
        self.events.write(crate::store::EventRow {
            cluster_id: cluster_id.to_string(),
            event_type: types::RUN_STATUS_CHANGED.into(),
            run_id: Some(run_id.to_string()),
            status: Some(RunStatus::Pending.as_str().into()),
            ..Default::default()
        });
        self.queue.signal(cluster_id, run_id);
        Ok(())
    }

    pub async fn delete_run(&self, cluster_id: &str, run_id: &str) -> Result<()> {
        self.get_run(cluster_id, run_id).await?;
        self.store
            .delete_run(cluster_id, run_id)
            .await
            .map_err(Error::Store)?;
        Ok(())
    }

    /// Check that a run can accept a new human message.
    async fn assert_run_ready(&self, cluster_id: &str, run_id: &str) -> Result<()> {
        let run = self.get_run(cluster_id, run_id).await?;
        if !run.interactive {
            return Err(RunError::NotInteractive.into());
        }
        if !run.status.accepts_input() {
            return Err(RunError::Busy {
                reason: format!("run is {}", run.status.as_str()),
            }
            .into());
        }

        let waiting = self
            .store
            .waiting_job_ids(cluster_id, run_id)
            .await
            .map_err(Error::Store)?;
        if !waiting.is_empty() {
            // Nudge the run so the outstanding jobs get re-examined.
            self.queue.signal(cluster_id, run_id);
            return Err(RunError::Busy {
                reason: format!("waiting on {} job(s)", waiting.len()),
            }
            .into());
        }

        let messages = self
            .store
            .list_messages(cluster_id, run_id)
            .await
            .map_err(Error::Store)?;
        let Some(last) = messages.last() else {
            return Ok(());
        };
        match &last.data {
            MessageData::Agent { invocations, .. } => {
                let resolved: std::collections::HashSet<&str> = messages
                    .iter()
                    .filter_map(|m| match &m.data {
                        MessageData::InvocationResult { id, .. } => Some(id.as_str()),
                        _ => None,
                    })
                    .collect();
                let unresolved = invocations
                    .iter()
                    .filter_map(|i| i.id.as_deref())
                    .any(|id| !resolved.contains(id));
                if unresolved {
                    self.queue.signal(cluster_id, run_id);
                    return Err(RunError::Busy {
                        reason: "unresolved tool invocations".into(),
                    }
                    .into());
                }
                Ok(())
            }
            MessageData::InvocationResult { .. } => {
                // A result arrived but the model has not seen it yet.
                self.queue.signal(cluster_id, run_id);
                Err(RunError::Busy {
                    reason: "unprocessed messages".into(),
                }
                .into())
            }
            MessageData::Human { .. } | MessageData::Template { .. } => {
                self.queue.signal(cluster_id, run_id);
                Err(RunError::Busy {
                    reason: "unprocessed messages".into(),
                }
                .into())
            }
            MessageData::Supervisor { .. } | MessageData::AgentInvalid { .. } => {
                self.queue.signal(cluster_id, run_id);
                Err(RunError::Busy {
                    reason: "unprocessed messages".into(),
                }
                .into())
            }
        }
    }
}
