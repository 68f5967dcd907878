//! Remote tools backed by dispatched jobs.
//!
//! Each registered service function is exposed to runs as a tool named
//! `{service}_{function}`. Executing the tool creates a job (idempotent on
//! the invocation id), then waits a bounded time for a worker to resolve
//! it. If the job is still in flight when the wait expires, the call
//! reports `Pending` and the run pauses until the job's result resumes it.

use async_trait::async_trait;
use serde_json::{Value, json};

use super::{AgentTool, ToolContext, ToolOutcome};
use crate::dispatch::{CreateJobParams, DispatchService};
use crate::error::{Error, JobError, ToolError};
use crate::schema::SchemaNode;
use crate::store::{FunctionDefinition, ResultKind};

/// Result message recorded when a job reached a terminal state without
/// ever reporting a result.
pub const MISSING_RESULT_MESSAGE: &str = "Job did not return a result.";

pub fn tool_name(service: &str, function: &str) -> String {
    format!("{service}_{function}")
}

pub struct RemoteTool {
    dispatch: DispatchService,
    service: String,
    function: FunctionDefinition,
}

impl RemoteTool {
    pub fn new(dispatch: DispatchService, service: String, function: FunctionDefinition) -> Self {
        Self {
            dispatch,
            service,
            function,
        }
    }
}

#[async_trait]
impl AgentTool for RemoteTool {
    fn name(&self) -> String {
        tool_name(&self.service, &self.function.name)
    }

    fn description(&self) -> String {
        self.function.description.clone().unwrap_or_default()
    }

    fn schema(&self) -> Option<Value> {
        self.function.schema.clone()
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<ToolOutcome, Error> {
        if let Some(raw_schema) = &self.function.schema {
            let schema = SchemaNode::parse(raw_schema).map_err(Error::Schema)?;
            let violations = schema.validate(&input);
            if !violations.is_empty() {
                return Err(ToolError::InvalidInput {
                    name: self.name(),
                    reason: violations
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join("; "),
                }
                .into());
            }
        }

        let created = self
            .dispatch
            .create_job(CreateJobParams {
                cluster_id: ctx.cluster_id.clone(),
                service: self.service.clone(),
                target_fn: self.function.name.clone(),
                target_args: input,
                run_id: Some(ctx.run_id.clone()),
                tool_call_id: Some(ctx.tool_call_id.clone()),
                auth_context: ctx.auth_context.clone(),
                run_context: ctx.run_context.clone(),
            })
            .await?;

        let job = match self
            .dispatch
            .get_job_status_sync(&ctx.cluster_id, &created.id, None)
            .await
        {
            Ok(job) => job,
            Err(Error::Job(JobError::PollTimeout { id, .. })) => {
                return Ok(ToolOutcome::Pending { job_id: id });
            }
            Err(e) => return Err(e),
        };

        match (job.result, job.result_kind) {
            (Some(result), Some(ResultKind::Resolution)) => Ok(ToolOutcome::Resolved(result)),
            (Some(result), Some(ResultKind::Rejection)) => Ok(ToolOutcome::Rejected(result)),
            (_, Some(ResultKind::Interrupt)) => Ok(ToolOutcome::Interrupted),
            _ => Ok(ToolOutcome::Rejected(
                json!({ "message": MISSING_RESULT_MESSAGE }),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::events::EventWriter;
    use crate::runs::queue::{NullQueue, RunQueue};
    use crate::store::LibSqlStore;
    use std::sync::Arc;
    use std::time::Duration;

    async fn harness() -> (DispatchService, LibSqlStore) {
        let config = Config {
            sync_wait_ttl: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let store = LibSqlStore::open_in_memory().await.unwrap();
        let (events, _task) = EventWriter::spawn(store.clone(), &config);
        let dispatch = DispatchService::new(
            store.clone(),
            events,
            Arc::new(NullQueue) as Arc<dyn RunQueue>,
            Arc::new(config),
        );
        (dispatch, store)
    }

    fn tool(dispatch: DispatchService) -> RemoteTool {
        RemoteTool::new(
            dispatch,
            "orders".into(),
            FunctionDefinition {
                name: "lookup".into(),
                description: Some("Look up an order".into()),
                schema: Some(json!({
                    "type": "object",
                    "properties": { "order_id": { "type": "string" } },
                    "required": ["order_id"]
                })),
                config: None,
            },
        )
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
    async fn invalid_input_rejected_before_dispatch() {
        let (dispatch, store) = harness().await;
        let tool = tool(dispatch);

        let err = tool.execute(&ctx(), json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Tool(ToolError::InvalidInput { .. })));
        // No job was created.
        assert!(store.get_job("c1", "call-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unclaimed_job_reports_pending() {
        let (dispatch, _store) = harness().await;
        let tool = tool(dispatch);

        let outcome = tool
            .execute(&ctx(), json!({"order_id": "o-1"}))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ToolOutcome::Pending {
                job_id: "call-1".into()
            }
        );
    }

    #[tokio::test]
    async fn worker_resolution_is_returned() {
        let (dispatch, store) = harness().await;
        let tool = tool(dispatch.clone());

        let worker = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            store.acknowledge("c1", "call-1", "m1").await.unwrap();
            dispatch
                .persist_job_result(
                    "c1",
                    "call-1",
                    "m1",
                    json!({"total": 12}),
                    ResultKind::Resolution,
                    None,
                )
                .await
                .unwrap();
        });

        let outcome = tool
            .execute(&ctx(), json!({"order_id": "o-1"}))
            .await
            .unwrap();
        assert_eq!(outcome, ToolOutcome::Resolved(json!({"total": 12})));
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn terminal_job_without_result_is_rejected() {
        let (dispatch, store) = harness().await;
        let tool = tool(dispatch);

        // A prior dispatch of this invocation stalled to death.
        let first = tool.execute(&ctx(), json!({"order_id": "o-1"})).await.unwrap();
        assert!(matches!(first, ToolOutcome::Pending { .. }));
        store.claim_pending("c1", "orders", "m1", 1).await.unwrap();
        store.mark_stalled("c1", "call-1").await.unwrap();
        store.fail_stalled("c1", "call-1").await.unwrap();

        // Re-dispatch is idempotent and sees the terminal result-less job.
        let outcome = tool
            .execute(&ctx(), json!({"order_id": "o-1"}))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ToolOutcome::Rejected(json!({ "message": MISSING_RESULT_MESSAGE }))
        );
    }
}
