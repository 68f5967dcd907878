//! The run orchestrator — an explicit state machine stepped in a loop.
//!
//! Each pass over a run loads the full message history, decides the next
//! step from the shape of the tail, and either calls the model, dispatches
//! tool invocations, pauses, or finishes. All state lives in the message
//! store, so a crash at any point resumes cleanly: re-dispatching a tool
//! call reuses the invocation id as the job id and lands on the already
//! created job.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::compaction;
use super::queue::RunProcessor;
use super::is_background_run;
use crate::config::Config;
use crate::error::{AgentError, Error, Result};
use crate::events::{EventWriter, types};
use crate::model::{ModelClient, ModelRequest, build_output_schema};
use crate::store::{
    EventRow, Invocation, LibSqlStore, Message, MessageData, Run, RunStatus,
};
use crate::tools::{ToolContext, ToolOutcome, ToolResolver};

/// Guidance injected when the model neither finished nor called a tool.
const SUPERVISOR_NO_PROGRESS: &str = "If you have completed the task, set done to true and \
provide the final result or message. Otherwise you must request at least one tool invocation.";

/// Guidance injected when the model claimed completion without output.
const SUPERVISOR_EMPTY_COMPLETION: &str =
    "You set done to true but provided no result or message. Provide the final output.";

enum StepOutcome {
    /// Keep stepping.
    Continue,
    /// The run finished.
    Done,
    /// The run is blocked on external input (jobs or approvals).
    Paused,
}

pub struct RunOrchestrator {
    store: LibSqlStore,
    events: EventWriter,
    resolver: ToolResolver,
    model: Arc<dyn ModelClient>,
    config: Arc<Config>,
}

impl RunOrchestrator {
    pub fn new(
        store: LibSqlStore,
        events: EventWriter,
        resolver: ToolResolver,
        model: Arc<dyn ModelClient>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            events,
            resolver,
            model,
            config,
        }
    }

    pub async fn process_run(&self, cluster_id: &str, run_id: &str) -> Result<()> {
        if is_background_run(cluster_id, run_id) {
            return Ok(());
        }
        let Some(run) = self
            .store
            .get_run(cluster_id, run_id)
            .await
            .map_err(Error::Store)?
        else {
            warn!(run_id, "Resume signal for unknown run, ignoring");
            return Ok(());
        };

        self.store
            .mark_run_running(cluster_id, run_id)
            .await
            .map_err(Error::Store)?;
        self.emit_status(cluster_id, run_id, RunStatus::Running);

        match self.step_loop(&run).await {
            Ok(status) => {
                self.store
                    .update_run_status(cluster_id, run_id, status, None)
                    .await
                    .map_err(Error::Store)?;
                self.emit_status(cluster_id, run_id, status);
                info!(run_id, status = status.as_str(), "Run settled");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(run_id, error = %reason, "Run failed");
                self.store
                    .update_run_status(cluster_id, run_id, RunStatus::Failed, Some(&reason))
                    .await
                    .map_err(Error::Store)?;
                self.emit_status(cluster_id, run_id, RunStatus::Failed);
                Ok(())
            }
        }
    }

    async fn step_loop(&self, run: &Run) -> Result<RunStatus> {
        loop {
            let mut messages = self
                .store
                .list_messages(&run.cluster_id, &run.id)
                .await
                .map_err(Error::Store)?;

            let system_prompt = run.system_prompt.clone().unwrap_or_default();
            let window = self
                .model
                .context_window()
                .unwrap_or(self.config.default_context_window);
            if let Some(remove) = compaction::plan(&messages, &system_prompt, window)
                .map_err(Error::Agent)?
            {
                debug!(run_id = %run.id, count = remove.len(), "Compacting run context");
                self.store
                    .delete_messages(&run.cluster_id, &run.id, &remove)
                    .await
                    .map_err(Error::Store)?;
                messages = self
                    .store
                    .list_messages(&run.cluster_id, &run.id)
                    .await
                    .map_err(Error::Store)?;
            }

            // Outstanding jobs keep the run parked regardless of anything
            // else; their results will wake it.
            let waiting = self
                .store
                .waiting_job_ids(&run.cluster_id, &run.id)
                .await
                .map_err(Error::Store)?;
            if !waiting.is_empty() {
                debug!(run_id = %run.id, jobs = waiting.len(), "Run waiting on jobs");
                return Ok(RunStatus::Paused);
            }

            if messages.len() >= self.config.max_run_messages {
                return Err(AgentError::MessageCapExceeded.into());
            }
            let cycle_window = self.config.cycle_detection_window;
            if messages.len() >= cycle_window
                && !messages[messages.len() - cycle_window..]
                    .iter()
                    .any(|m| m.data.is_progress())
            {
                return Err(AgentError::CycleDetected.into());
            }

            match self.decide_step(run, &messages).await? {
                StepOutcome::Continue => continue,
                StepOutcome::Done => return Ok(RunStatus::Done),
                StepOutcome::Paused => return Ok(RunStatus::Paused),
            }
        }
    }

    async fn decide_step(&self, run: &Run, messages: &[Message]) -> Result<StepOutcome> {
        if let Some(MessageData::Agent {
            done, invocations, ..
        }) = last_agent_message(messages)
        {
            let resolved = resolved_invocation_ids(messages);
            let unresolved: Vec<&Invocation> = invocations
                .iter()
                .filter(|i| {
                    i.id.as_deref()
                        .is_none_or(|id| !resolved.contains(id))
                })
                .collect();
            if !unresolved.is_empty() {
                return self.run_tools(run, &unresolved).await;
            }
            if *done == Some(true) {
                return Ok(StepOutcome::Done);
            }
        }
        self.model_step(run, messages).await
    }

    async fn model_step(&self, run: &Run, messages: &[Message]) -> Result<StepOutcome> {
        let tool_names = self.resolver.names_for_run(run).await?;
        let output_schema = build_output_schema(&tool_names, run.result_schema.as_ref());
        let request = ModelRequest {
            system_prompt: run.system_prompt.clone().unwrap_or_default(),
            messages: messages.iter().map(|m| m.data.clone()).collect(),
            output_schema,
        };

        let mut output = self
            .model
            .structured(request)
            .await
            .map_err(Error::Model)?;
        self.events.write(EventRow {
            cluster_id: run.cluster_id.clone(),
            event_type: types::MODEL_INVOCATION.into(),
            run_id: Some(run.id.clone()),
            meta: Some(json!({ "model": self.model.identifier() })),
            ..Default::default()
        });

        // A response that both finishes and calls tools is treated as a
        // tool call; completion must come after the results are seen.
        if output.done == Some(true) && !output.invocations.is_empty() {
            output.done = Some(false);
            output.result = None;
        }

        if output.invocations.is_empty() && output.done != Some(true) {
            self.persist_corrective_pair(run, &output, SUPERVISOR_NO_PROGRESS)
                .await?;
            return Ok(StepOutcome::Continue);
        }
        if output.done == Some(true) && output.result.is_none() && output.message.is_none() {
            self.persist_corrective_pair(run, &output, SUPERVISOR_EMPTY_COMPLETION)
                .await?;
            return Ok(StepOutcome::Continue);
        }

        let mut invocations = output.invocations;
        for invocation in &mut invocations {
            if invocation.id.is_none() {
                invocation.id = Some(Uuid::now_v7().to_string());
            }
        }

        let done = output.done == Some(true);
        self.store
            .insert_message(&Message::new(
                &run.cluster_id,
                &run.id,
                MessageData::Agent {
                    done: output.done,
                    result: output.result,
                    message: output.message,
                    issue: output.issue,
                    invocations,
                },
            ))
            .await
            .map_err(Error::Store)?;

        if done {
            Ok(StepOutcome::Done)
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    /// Keep the invalid response in context and follow it with corrective
    /// guidance, so the model can see what it did wrong.
    async fn persist_corrective_pair(
        &self,
        run: &Run,
        output: &crate::model::ModelOutput,
        guidance: &str,
    ) -> Result<()> {
        let serialized = serde_json::to_string(output)
            .unwrap_or_else(|_| "<unserializable output>".to_string());
        self.store
            .insert_message(&Message::new(
                &run.cluster_id,
                &run.id,
                MessageData::AgentInvalid {
                    message: serialized,
                },
            ))
            .await
            .map_err(Error::Store)?;
        self.store
            .insert_message(&Message::new(
                &run.cluster_id,
                &run.id,
                MessageData::Supervisor {
                    message: guidance.to_string(),
                },
            ))
            .await
            .map_err(Error::Store)?;
        Ok(())
    }

    /// Dispatch the given invocations in parallel and persist their results
    /// in invocation order.
    async fn run_tools(&self, run: &Run, invocations: &[&Invocation]) -> Result<StepOutcome> {
        let executions = invocations.iter().map(|invocation| {
            let invocation = (*invocation).clone();
            async move {
                let id = invocation
                    .id
                    .clone()
                    .unwrap_or_else(|| Uuid::now_v7().to_string());
                let ctx = ToolContext {
                    cluster_id: run.cluster_id.clone(),
                    run_id: run.id.clone(),
                    tool_call_id: id.clone(),
                    auth_context: run.auth_context.clone(),
                    run_context: run.run_context.clone(),
                };
                let outcome = match self.resolver.resolve(run, &invocation.tool_name).await {
                    Ok(tool) => tool.execute(&ctx, invocation.input.clone()).await,
                    Err(e) => Err(e),
                };
                (id, invocation.tool_name.clone(), outcome)
            }
        });
        let results = futures::future::join_all(executions).await;

        let mut paused = false;
        for (id, tool_name, outcome) in results {
            let result_payload = match outcome {
                Ok(ToolOutcome::Resolved(value)) => Some(value),
                Ok(ToolOutcome::Rejected(value)) => Some(value),
                Ok(ToolOutcome::Pending { job_id }) => {
                    debug!(run_id = %run.id, job_id, "Tool call still executing, pausing run");
                    paused = true;
                    None
                }
                Ok(ToolOutcome::Interrupted) => {
                    debug!(run_id = %run.id, tool = %tool_name, "Tool call interrupted");
                    paused = true;
                    None
                }
                // Tool and validation failures are surfaced to the model so
                // it can correct itself; infrastructure errors abort.
                Err(Error::Tool(e)) => Some(json!({
                    "error": e.to_string(),
                    "toolName": tool_name,
                })),
                Err(e) => return Err(e),
            };
            if let Some(result) = result_payload {
                self.store
                    .insert_message(&Message::new(
                        &run.cluster_id,
                        &run.id,
                        MessageData::InvocationResult { id, result },
                    ))
                    .await
                    .map_err(Error::Store)?;
            }
        }

        if paused {
            Ok(StepOutcome::Paused)
        } else {
            Ok(StepOutcome::Continue)
        }
    }

    fn emit_status(&self, cluster_id: &str, run_id: &str, status: RunStatus) {
        self.events.write(EventRow {
            cluster_id: cluster_id.to_string(),
            event_type: types::RUN_STATUS_CHANGED.into(),
            run_id: Some(run_id.to_string()),
            status: Some(status.as_str().to_string()),
            ..Default::default()
        });
    }
}

/// The most recent agent message, looking past any results and guidance
/// appended after it. A partial parallel batch leaves the log ending in
/// `invocation-result` messages; resume must still see the agent message
/// that opened the batch so the unanswered calls get dispatched.
fn last_agent_message(messages: &[Message]) -> Option<&MessageData> {
    for message in messages.iter().rev() {
        match &message.data {
            MessageData::InvocationResult { .. } | MessageData::Supervisor { .. } => continue,
            MessageData::Agent { .. } => return Some(&message.data),
            _ => return None,
        }
    }
    None
}

fn resolved_invocation_ids(messages: &[Message]) -> HashSet<&str> {
    messages
        .iter()
        .filter_map(|m| match &m.data {
            MessageData::InvocationResult { id, .. } => Some(id.as_str()),
            _ => None,
        })
        .collect()
}

#[async_trait]
impl RunProcessor for RunOrchestrator {
    async fn process(&self, cluster_id: &str, run_id: &str) -> Result<()> {
        self.process_run(cluster_id, run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchService;
    use crate::model::{MockModel, ModelOutput};
    use crate::runs::queue::{NullQueue, RunQueue};
    use crate::store::{FunctionDefinition, RunInsert, ServiceDefinition};
    use std::time::Duration;

    async fn harness(config: Config, model: MockModel) -> (RunOrchestrator, LibSqlStore) {
        let config = Arc::new(config);
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let (events, _task) = EventWriter::spawn(store.clone(), &config);
        let dispatch = DispatchService::new(
            store.clone(),
            events.clone(),
            Arc::new(NullQueue) as Arc<dyn RunQueue>,
            Arc::clone(&config),
        );
        let orchestrator = RunOrchestrator::new(
            store.clone(),
            events,
            ToolResolver::new(dispatch),
            Arc::new(model),
            config,
        );
        (orchestrator, store)
    }

    async fn seed_run(store: &LibSqlStore, insert: RunInsert, first_message: &str) {
        store.insert_run(&insert).await.unwrap();
        store
            .insert_message(&Message::new(
                &insert.cluster_id,
                &insert.id,
                MessageData::Human {
                    message: first_message.into(),
                },
            ))
            .await
            .unwrap();
    }

    fn run_insert(id: &str) -> RunInsert {
        RunInsert {
            id: id.into(),
            cluster_id: "c1".into(),
            system_prompt: Some("You are a support agent.".into()),
            interactive: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn direct_completion() {
        let model = MockModel::new(vec![ModelOutput {
            done: Some(true),
            message: Some("Your order ships tomorrow.".into()),
            ..Default::default()
        }]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        seed_run(&store, run_insert("r1"), "Where is my order?").await;

        orchestrator.process_run("c1", "r1").await.unwrap();

        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
        let messages = store.list_messages("c1", "r1").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(matches!(
            &messages[1].data,
            MessageData::Agent { done: Some(true), .. }
        ));
    }

    #[tokio::test]
    async fn invalid_output_gets_corrective_pair() {
        // First response neither finishes nor invokes; the second recovers.
        let model = MockModel::new(vec![
            ModelOutput::default(),
            ModelOutput {
                done: Some(true),
                message: Some("Done now.".into()),
                ..Default::default()
            },
        ]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        seed_run(&store, run_insert("r1"), "Hello").await;

        orchestrator.process_run("c1", "r1").await.unwrap();

        let messages = store.list_messages("c1", "r1").await.unwrap();
        let kinds: Vec<&str> = messages.iter().map(|m| m.data.type_name()).collect();
        assert_eq!(
            kinds,
            vec!["human", "agent-invalid", "supervisor", "agent"]
        );
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
    }

    #[tokio::test]
    async fn empty_completion_is_corrected() {
        let model = MockModel::new(vec![
            ModelOutput {
                done: Some(true),
                ..Default::default()
            },
            ModelOutput {
                done: Some(true),
                message: Some("All resolved.".into()),
                ..Default::default()
            },
        ]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        seed_run(&store, run_insert("r1"), "Hello").await;

        orchestrator.process_run("c1", "r1").await.unwrap();
        let messages = store.list_messages("c1", "r1").await.unwrap();
        assert_eq!(messages[1].data.type_name(), "agent-invalid");
        assert_eq!(messages[2].data.type_name(), "supervisor");
    }

    #[tokio::test]
    async fn mocked_tool_round_trip() {
        let model = MockModel::new(vec![
            ModelOutput {
                invocations: vec![Invocation {
                    id: None,
                    tool_name: "orders_lookup".into(),
                    input: json!({"order_id": "o-1"}),
                    reasoning: None,
                }],
                ..Default::default()
            },
            ModelOutput {
                done: Some(true),
                message: Some("Order total is 42.".into()),
                ..Default::default()
            },
        ]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        let mut insert = run_insert("r1");
        insert.test = true;
        insert.test_mocks = Some(json!({
            "orders_lookup": { "output": { "total": 42 } }
        }));
        seed_run(&store, insert, "What is the total of o-1?").await;

        orchestrator.process_run("c1", "r1").await.unwrap();

        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
        let kinds: Vec<&str> = store
            .list_messages("c1", "r1")
            .await
            .unwrap()
            .iter()
            .map(|m| m.data.type_name())
            .collect();
        assert_eq!(
            kinds,
            vec!["human", "agent", "invocation-result", "agent"]
        );
    }

    #[tokio::test]
    async fn remote_tool_pauses_until_job_resolves() {
        let model = MockModel::new(vec![ModelOutput {
            invocations: vec![Invocation {
                id: Some("call-1".into()),
                tool_name: "orders_lookup".into(),
                input: json!({}),
                reasoning: None,
            }],
            ..Default::default()
        }]);
        let config = Config {
            sync_wait_ttl: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let (orchestrator, store) = harness(config, model).await;
        store
            .upsert_service_definition(
                "c1",
                &ServiceDefinition {
                    service: "orders".into(),
                    functions: vec![FunctionDefinition {
                        name: "lookup".into(),
                        description: None,
                        schema: None,
                        config: None,
                    }],
                },
                120,
            )
            .await
            .unwrap();
        seed_run(&store, run_insert("r1"), "Look it up").await;

        orchestrator.process_run("c1", "r1").await.unwrap();

        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Paused);
        // The job carries the invocation id and blocks the run.
        let waiting = store.waiting_job_ids("c1", "r1").await.unwrap();
        assert_eq!(waiting, vec!["call-1".to_string()]);
    }

    #[tokio::test]
    async fn unknown_tool_is_model_visible() {
        let model = MockModel::new(vec![
            ModelOutput {
                invocations: vec![Invocation {
                    id: Some("call-1".into()),
                    tool_name: "no_such_tool".into(),
                    input: json!({}),
                    reasoning: None,
                }],
                ..Default::default()
            },
            ModelOutput {
                done: Some(true),
                message: Some("I cannot do that.".into()),
                ..Default::default()
            },
        ]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        seed_run(&store, run_insert("r1"), "Do the thing").await;

        orchestrator.process_run("c1", "r1").await.unwrap();

        let messages = store.list_messages("c1", "r1").await.unwrap();
        let MessageData::InvocationResult { id, result } = &messages[2].data else {
            panic!("expected an invocation result");
        };
        assert_eq!(id, "call-1");
        assert!(result["error"].as_str().unwrap().contains("not found"));
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
    }

    #[tokio::test]
    async fn resume_dispatches_only_unanswered_invocations() {
        // A crash after a partial parallel batch leaves the log ending in
        // a result for one call while the other is still unanswered.
        let model = MockModel::new(vec![ModelOutput {
            done: Some(true),
            message: Some("Both checked.".into()),
            ..Default::default()
        }]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        let mut insert = run_insert("r1");
        insert.test = true;
        insert.test_mocks = Some(json!({
            "orders_lookup": { "output": { "total": 42 } },
            "orders_audit": { "output": { "clean": true } }
        }));
        seed_run(&store, insert, "Check the order").await;
        store
            .insert_message(&Message::new(
                "c1",
                "r1",
                MessageData::Agent {
                    done: Some(false),
                    result: None,
                    message: None,
                    issue: None,
                    invocations: vec![
                        Invocation {
                            id: Some("call-1".into()),
                            tool_name: "orders_lookup".into(),
                            input: json!({}),
                            reasoning: None,
                        },
                        Invocation {
                            id: Some("call-2".into()),
                            tool_name: "orders_audit".into(),
                            input: json!({}),
                            reasoning: None,
                        },
                    ],
                },
            ))
            .await
            .unwrap();
        store
            .insert_message(&Message::new(
                "c1",
                "r1",
                MessageData::InvocationResult {
                    id: "call-1".into(),
                    result: json!({ "total": 42 }),
                },
            ))
            .await
            .unwrap();

        orchestrator.process_run("c1", "r1").await.unwrap();

        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
        let messages = store.list_messages("c1", "r1").await.unwrap();
        let kinds: Vec<&str> = messages.iter().map(|m| m.data.type_name()).collect();
        assert_eq!(
            kinds,
            vec![
                "human",
                "agent",
                "invocation-result",
                "invocation-result",
                "agent"
            ]
        );
        // Exactly one new result, for the call that had none.
        let MessageData::InvocationResult { id, .. } = &messages[3].data else {
            panic!("expected an invocation result");
        };
        assert_eq!(id, "call-2");
        let answered: Vec<&str> = messages
            .iter()
            .filter_map(|m| match &m.data {
                MessageData::InvocationResult { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(answered, vec!["call-1", "call-2"]);
    }

    #[tokio::test]
    async fn cycle_is_detected() {
        // Every response is invalid, so nothing ever makes progress.
        let outputs = (0..20).map(|_| ModelOutput::default()).collect();
        let model = MockModel::new(outputs);
        let config = Config {
            cycle_detection_window: 4,
            ..Config::default()
        };
        let (orchestrator, store) = harness(config, model).await;
        seed_run(&store, run_insert("r1"), "Hello").await;

        orchestrator.process_run("c1", "r1").await.unwrap();
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.failure_reason.unwrap().contains("cycle"));
    }

    #[tokio::test]
    async fn message_cap_fails_the_run() {
        let model = MockModel::new(vec![]);
        let config = Config {
            max_run_messages: 2,
            cycle_detection_window: 100,
            ..Config::default()
        };
        let (orchestrator, store) = harness(config, model).await;
        seed_run(&store, run_insert("r1"), "one").await;
        store
            .insert_message(&Message::new(
                "c1",
                "r1",
                MessageData::Human { message: "two".into() },
            ))
            .await
            .unwrap();

        orchestrator.process_run("c1", "r1").await.unwrap();
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert!(
            run.failure_reason
                .unwrap()
                .contains("Maximum run message length")
        );
    }

    #[tokio::test]
    async fn done_and_invocations_treated_as_tool_call() {
        let model = MockModel::new(vec![
            ModelOutput {
                done: Some(true),
                result: Some(json!({"premature": true})),
                invocations: vec![Invocation {
                    id: None,
                    tool_name: "orders_lookup".into(),
                    input: json!({}),
                    reasoning: None,
                }],
                ..Default::default()
            },
            ModelOutput {
                done: Some(true),
                message: Some("Confirmed.".into()),
                ..Default::default()
            },
        ]);
        let (orchestrator, store) = harness(Config::default(), model).await;
        let mut insert = run_insert("r1");
        insert.test = true;
        insert.test_mocks = Some(json!({ "orders_lookup": { "output": 1 } }));
        seed_run(&store, insert, "Check").await;

        orchestrator.process_run("c1", "r1").await.unwrap();

        let messages = store.list_messages("c1", "r1").await.unwrap();
        let MessageData::Agent { done, result, .. } = &messages[1].data else {
            panic!("expected agent message");
        };
        // The premature completion was demoted to a plain tool call.
        assert_eq!(*done, Some(false));
        assert!(result.is_none());
        let run = store.get_run("c1", "r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
    }
}
