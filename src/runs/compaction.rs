//! Context compaction.
//!
//! Before each model call the estimated token footprint of the system
//! prompt plus message history is checked against the model's context
//! window. When it crosses the threshold, old messages are dropped oldest
//! first. An agent message and all invocation results answering it are
//! dropped together, so the model never sees a result for a call it has no
//! record of making. Human and template messages are never dropped.

use std::collections::HashSet;

use uuid::Uuid;

use crate::error::AgentError;
use crate::model::{estimate_message_tokens, estimate_tokens};
use crate::store::{Message, MessageData};

/// Fraction of the context window the prompt plus history may occupy.
const TOTAL_THRESHOLD: f64 = 0.95;
/// Fraction of the context window the system prompt alone may occupy.
const SYSTEM_PROMPT_THRESHOLD: f64 = 0.70;

/// Message ids to delete, or `None` when the history fits.
pub fn plan(
    messages: &[Message],
    system_prompt: &str,
    context_window: usize,
) -> Result<Option<Vec<Uuid>>, AgentError> {
    let system_tokens = estimate_tokens(system_prompt);
    let system_limit = (context_window as f64 * SYSTEM_PROMPT_THRESHOLD) as usize;
    if system_tokens > system_limit {
        return Err(AgentError::SystemPromptTooLarge {
            limit: system_limit,
        });
    }

    let budget = (context_window as f64 * TOTAL_THRESHOLD) as usize;
    let mut message_tokens: Vec<usize> = messages
        .iter()
        .map(|m| estimate_message_tokens(&m.data))
        .collect();
    let mut total = system_tokens + message_tokens.iter().sum::<usize>();
    if total <= budget {
        return Ok(None);
    }

    let mut removed: HashSet<Uuid> = HashSet::new();
    for (index, message) in messages.iter().enumerate() {
        if total <= budget {
            break;
        }
        if removed.contains(&message.id) {
            continue;
        }
        match &message.data {
            // User-authored context is never dropped.
            MessageData::Human { .. } | MessageData::Template { .. } => continue,
            MessageData::Agent { invocations, .. } => {
                let invocation_ids: HashSet<&str> =
                    invocations.iter().filter_map(|i| i.id.as_deref()).collect();
                removed.insert(message.id);
                total = total.saturating_sub(message_tokens[index]);
                message_tokens[index] = 0;
                // Results answering this agent message go with it.
                for (other_index, other) in messages.iter().enumerate() {
                    if let MessageData::InvocationResult { id, .. } = &other.data
                        && invocation_ids.contains(id.as_str())
                        && removed.insert(other.id)
                    {
                        total = total.saturating_sub(message_tokens[other_index]);
                        message_tokens[other_index] = 0;
                    }
                }
            }
            MessageData::Supervisor { .. }
            | MessageData::AgentInvalid { .. }
            | MessageData::InvocationResult { .. } => {
                removed.insert(message.id);
                total = total.saturating_sub(message_tokens[index]);
                message_tokens[index] = 0;
            }
        }
    }

    if total > budget {
        return Err(AgentError::InvalidState(
            "message history cannot be reduced below the context budget".into(),
        ));
    }
    Ok(Some(removed.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Invocation;
    use serde_json::json;

    fn message(data: MessageData) -> Message {
        Message::new("c1", "r1", data)
    }

    fn agent_with_call(call_id: &str, padding: usize) -> Message {
        message(MessageData::Agent {
            done: Some(false),
            result: None,
            message: Some("x".repeat(padding)),
            issue: None,
            invocations: vec![Invocation {
                id: Some(call_id.into()),
                tool_name: "orders_lookup".into(),
                input: json!({}),
                reasoning: None,
            }],
        })
    }

    fn result_for(call_id: &str, padding: usize) -> Message {
        message(MessageData::InvocationResult {
            id: call_id.into(),
            result: json!("y".repeat(padding)),
        })
    }

    #[test]
    fn fits_without_compaction() {
        let messages = vec![message(MessageData::Human {
            message: "short".into(),
        })];
        assert_eq!(plan(&messages, "prompt", 10_000).unwrap(), None);
    }

    #[test]
    fn oversized_system_prompt_is_fatal() {
        let prompt = "p".repeat(4_000);
        let err = plan(&[], &prompt, 1_000).unwrap_err();
        assert!(matches!(err, AgentError::SystemPromptTooLarge { .. }));
    }

    #[test]
    fn agent_and_its_results_removed_together() {
        let human = message(MessageData::Human {
            message: "find my order".into(),
        });
        let agent = agent_with_call("call-1", 400);
        let result = result_for("call-1", 400);
        let recent = message(MessageData::Human {
            message: "and the other one".into(),
        });
        let messages = vec![human.clone(), agent.clone(), result.clone(), recent.clone()];

        // Window small enough to force the old exchange out.
        let removed = plan(&messages, "", 200).unwrap().unwrap();
        assert!(removed.contains(&agent.id));
        assert!(removed.contains(&result.id));
        assert!(!removed.contains(&human.id));
        assert!(!removed.contains(&recent.id));
    }

    #[test]
    fn irreducible_history_is_invalid() {
        let messages = vec![message(MessageData::Human {
            message: "h".repeat(4_000),
        })];
        let err = plan(&messages, "", 1_000).unwrap_err();
        assert!(matches!(err, AgentError::InvalidState(_)));
    }
}
