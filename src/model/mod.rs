//! Reasoning-model abstraction.
//!
//! The orchestrator talks to the model through [`ModelClient`], asking for
//! a structured response that matches the run's output schema. The crate
//! ships a scripted [`MockModel`] used by test runs and the test suite;
//! production deployments plug in their own client.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ModelError;
use crate::store::{Invocation, MessageData};

/// A structured model response, before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<Invocation>,
}

/// The request handed to the model on each step.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<MessageData>,
    /// JSON schema the response must satisfy.
    pub output_schema: Value,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    fn identifier(&self) -> &str;

    /// Token capacity of the model's context, when known.
    fn context_window(&self) -> Option<usize>;

    async fn structured(&self, request: ModelRequest) -> Result<ModelOutput, ModelError>;
}

/// Rough token estimate used for compaction decisions: one token per four
/// characters of serialized text.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

pub fn estimate_message_tokens(data: &MessageData) -> usize {
    serde_json::to_string(data)
        .map(|s| estimate_tokens(&s))
        .unwrap_or(0)
}

/// Build the output schema the model must produce, given the tools exposed
/// to the run and an optional caller-supplied result schema.
pub fn build_output_schema(tool_names: &[String], result_schema: Option<&Value>) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert(
        "done".into(),
        json!({
            "type": "boolean",
            "description": "Whether the task is complete and no further invocations are needed"
        }),
    );
    properties.insert(
        "issue".into(),
        json!({
            "type": "string",
            "description": "Any issue preventing progress"
        }),
    );
    match result_schema {
        Some(schema) => {
            properties.insert("result".into(), schema.clone());
        }
        None => {
            properties.insert(
                "message".into(),
                json!({
                    "type": "string",
                    "description": "The final response to the user"
                }),
            );
        }
    }
    properties.insert(
        "invocations".into(),
        json!({
            "type": "array",
            "items": {
                "type": "object",
                "properties": {
                    "toolName": { "type": "string", "enum": tool_names },
                    "input": { "type": "object" },
                    "reasoning": { "type": "string" }
                },
                "required": ["toolName", "input"]
            }
        }),
    );

    json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    })
}

/// Scripted model that replays a fixed sequence of outputs.
pub struct MockModel {
    identifier: String,
    context_window: Option<usize>,
    outputs: Mutex<VecDeque<ModelOutput>>,
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl MockModel {
    pub fn new(outputs: Vec<ModelOutput>) -> Self {
        Self {
            identifier: "mock".into(),
            context_window: None,
            outputs: Mutex::new(outputs.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = Some(window);
        self
    }
}

#[async_trait]
impl ModelClient for MockModel {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn context_window(&self) -> Option<usize> {
        self.context_window
    }

    async fn structured(&self, request: ModelRequest) -> Result<ModelOutput, ModelError> {
        self.requests.lock().unwrap().push(request);
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::RequestFailed {
                identifier: self.identifier.clone(),
                reason: "mock model script exhausted".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_schema_shape() {
        let schema = build_output_schema(&["orders_lookup".into()], None);
        assert_eq!(
            schema["properties"]["invocations"]["items"]["properties"]["toolName"]["enum"],
            json!(["orders_lookup"])
        );
        // No result schema: a free-form message slot instead.
        assert!(schema["properties"].get("message").is_some());
        assert!(schema["properties"].get("result").is_none());

        let result_schema = json!({"type": "object", "properties": {"total": {"type": "number"}}});
        let schema = build_output_schema(&[], Some(&result_schema));
        assert_eq!(schema["properties"]["result"], result_schema);
        assert!(schema["properties"].get("message").is_none());
    }

    #[test]
    fn token_estimation() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn mock_replays_in_order() {
        let mock = MockModel::new(vec![
            ModelOutput {
                message: Some("first".into()),
                ..Default::default()
            },
            ModelOutput {
                done: Some(true),
                message: Some("second".into()),
                ..Default::default()
            },
        ]);
        let request = ModelRequest {
            system_prompt: String::new(),
            messages: Vec::new(),
            output_schema: json!({}),
        };

        let first = mock.structured(request.clone()).await.unwrap();
        assert_eq!(first.message.as_deref(), Some("first"));
        let second = mock.structured(request.clone()).await.unwrap();
        assert_eq!(second.done, Some(true));
        assert!(mock.structured(request).await.is_err());
    }
}
