//! Agent-visible tools.
//!
//! A tool name is resolved against three sources in priority order: the
//! run's scripted mocks (test runs only), builtin tools, and finally
//! remote functions registered by worker services. Resolution failures are
//! surfaced to the model as an invocation result rather than failing the
//! run, so the agent can correct itself.

pub mod builtin;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatch::DispatchService;
use crate::error::{Error, ToolError};
use crate::store::Run;

/// Execution context handed to every tool call.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub cluster_id: String,
    pub run_id: String,
    /// The invocation id from the agent message, reused as the job id so
    /// that re-dispatch after a crash is idempotent.
    pub tool_call_id: String,
    pub auth_context: Option<Value>,
    pub run_context: Option<Value>,
}

/// The outcome of one tool call, as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// The tool produced a result.
    Resolved(Value),
    /// The tool (or a human) rejected the call; the payload is model-visible.
    Rejected(Value),
    /// The call was interrupted (approval flow); the run must pause.
    Interrupted,
    /// The backing job is still executing; the run pauses and resumes when
    /// the job resolves.
    Pending { job_id: String },
}

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> String;

    fn description(&self) -> String;

    /// JSON schema for the tool's input, when declared.
    fn schema(&self) -> Option<Value>;

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, Error>;
}

/// A scripted tool backed by a run's test mocks.
struct MockTool {
    name: String,
    output: Value,
}

#[async_trait]
impl AgentTool for MockTool {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        format!("Mocked tool {}", self.name)
    }

    fn schema(&self) -> Option<Value> {
        None
    }

    async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<ToolOutcome, Error> {
        Ok(ToolOutcome::Resolved(self.output.clone()))
    }
}

/// Resolves tool names for a run.
pub struct ToolResolver {
    dispatch: DispatchService,
}

impl ToolResolver {
    pub fn new(dispatch: DispatchService) -> Self {
        Self { dispatch }
    }

    /// Resolve a tool name: mocks first (test runs), then builtins, then
    /// remote registered functions.
    pub async fn resolve(&self, run: &Run, name: &str) -> Result<Arc<dyn AgentTool>, Error> {
        if run.test
            && let Some(mocks) = &run.test_mocks
            && let Some(mock) = mocks.get(name)
        {
            let output = mock.get("output").cloned().unwrap_or(Value::Null);
            return Ok(Arc::new(MockTool {
                name: name.to_string(),
                output,
            }));
        }

        if let Some(tool) = builtin::find(name) {
            return Ok(tool);
        }

        let definitions = self
            .dispatch
            .store()
            .list_service_definitions(&run.cluster_id)
            .await
            .map_err(Error::Store)?;
        for definition in &definitions {
            for function in &definition.functions {
                if function.config.as_ref().is_some_and(|c| c.private) {
                    continue;
                }
                if remote::tool_name(&definition.service, &function.name) == name {
                    return Ok(Arc::new(remote::RemoteTool::new(
                        self.dispatch.clone(),
                        definition.service.clone(),
                        function.clone(),
                    )));
                }
            }
        }

        Err(ToolError::NotFound {
            name: name.to_string(),
        }
        .into())
    }

    /// The tool names exposed to a run: its attached functions if any were
    /// named, otherwise every builtin plus every live non-private function.
    pub async fn names_for_run(&self, run: &Run) -> Result<Vec<String>, Error> {
        if !run.attached_functions.is_empty() {
            return Ok(run.attached_functions.clone());
        }

        let mut names: Vec<String> = builtin::all().iter().map(|t| t.name()).collect();
        let definitions = self
            .dispatch
            .store()
            .list_service_definitions(&run.cluster_id)
            .await
            .map_err(Error::Store)?;
        for definition in &definitions {
            for function in &definition.functions {
                if function.config.as_ref().is_some_and(|c| c.private) {
                    continue;
                }
                names.push(remote::tool_name(&definition.service, &function.name));
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::EventWriter;
    use crate::runs::queue::{NullQueue, RunQueue};
    use crate::store::{
        FunctionConfig, FunctionDefinition, LibSqlStore, RunInsert, ServiceDefinition,
    };
    use serde_json::json;

    async fn harness() -> (ToolResolver, LibSqlStore) {
        let config = Config::default();
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let (events, _task) = EventWriter::spawn(store.clone(), &config);
        let dispatch = DispatchService::new(
            store.clone(),
            events,
            Arc::new(NullQueue) as Arc<dyn RunQueue>,
            Arc::new(config),
        );
        (ToolResolver::new(dispatch), store)
    }

    fn run() -> Run {
        Run {
            id: "r1".into(),
            cluster_id: "c1".into(),
            status: crate::store::RunStatus::Running,
            name: None,
            system_prompt: None,
            result_schema: None,
            attached_functions: Vec::new(),
            model_identifier: None,
            interactive: true,
            enable_summarization: false,
            enable_result_grounding: false,
            test: false,
            test_mocks: None,
            auth_context: None,
            run_context: None,
            failure_reason: None,
            created_at: chrono::Utc::now(),
        }
    }

    fn ctx() -> ToolContext {
        ToolContext {
            cluster_id: "c1".into(),
            run_id: "r1".into(),
            tool_call_id: "call-1".into(),
            auth_context: None,
            run_context: None,
        }
    }

    #[tokio::test]
    async fn mocks_shadow_real_tools_in_test_runs() {
        let (resolver, store) = harness().await;
        store
            .insert_run(&RunInsert {
                id: "r1".into(),
                cluster_id: "c1".into(),
                interactive: true,
                ..Default::default()
            })
            .await
            .unwrap();

        let mut test_run = run();
        test_run.test = true;
        test_run.test_mocks = Some(json!({
            "orders_lookup": { "output": { "total": 99 } }
        }));

        let tool = resolver.resolve(&test_run, "orders_lookup").await.unwrap();
        let outcome = tool.execute(&ctx(), json!({})).await.unwrap();
        assert_eq!(outcome, ToolOutcome::Resolved(json!({ "total": 99 })));

        // Outside a test run the mock is ignored.
        let mut live_run = run();
        live_run.test_mocks = test_run.test_mocks.clone();
        let err = resolver.resolve(&live_run, "orders_lookup").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn builtins_and_remote_functions_resolve() {
        let (resolver, store) = harness().await;
        store
            .upsert_service_definition(
                "c1",
                &ServiceDefinition {
                    service: "orders".into(),
                    functions: vec![
                        FunctionDefinition {
                            name: "lookup".into(),
                            description: Some("Look up an order".into()),
                            schema: None,
                            config: None,
                        },
                        FunctionDefinition {
                            name: "audit".into(),
                            description: None,
                            schema: None,
                            config: Some(FunctionConfig {
                                private: true,
                                ..Default::default()
                            }),
                        },
                    ],
                },
                120,
            )
            .await
            .unwrap();

        let run = run();
        assert!(resolver.resolve(&run, "currentDateTime").await.is_ok());
        assert!(resolver.resolve(&run, "orders_lookup").await.is_ok());
        // Private functions are invisible to runs.
        assert!(resolver.resolve(&run, "orders_audit").await.is_err());

        let names = resolver.names_for_run(&run).await.unwrap();
        assert!(names.contains(&"currentDateTime".to_string()));
        assert!(names.contains(&"orders_lookup".to_string()));
        assert!(!names.contains(&"orders_audit".to_string()));
    }

    #[tokio::test]
    async fn attached_functions_pin_the_tool_list() {
        let (resolver, _store) = harness().await;
        let mut run = run();
        run.attached_functions = vec!["orders_lookup".into()];
        let names = resolver.names_for_run(&run).await.unwrap();
        assert_eq!(names, vec!["orders_lookup".to_string()]);
    }
}
