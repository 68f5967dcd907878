//! Builtin tools available to every run without worker registration.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use super::{AgentTool, ToolContext, ToolOutcome};
use crate::error::Error;

/// Look up a builtin tool by name.
pub fn find(name: &str) -> Option<Arc<dyn AgentTool>> {
    all().into_iter().find(|tool| tool.name() == name)
}

pub fn all() -> Vec<Arc<dyn AgentTool>> {
    vec![Arc::new(CurrentDateTime)]
}

/// Reports the current wall-clock time. Models have no reliable sense of
/// "now", so time-sensitive runs need this anchored externally.
struct CurrentDateTime;

#[async_trait]
impl AgentTool for CurrentDateTime {
    fn name(&self) -> String {
        "currentDateTime".into()
    }

    fn description(&self) -> String {
        "Returns the current date and time in ISO 8601 and unix epoch form".into()
    }

    fn schema(&self) -> Option<Value> {
        Some(json!({ "type": "object", "properties": {} }))
    }

    async fn execute(&self, _ctx: &ToolContext, _input: Value) -> Result<ToolOutcome, Error> {
        let now = Utc::now();
        Ok(ToolOutcome::Resolved(json!({
            "iso8601": now.to_rfc3339(),
            "unix": now.timestamp(),
        })))
    }
}
