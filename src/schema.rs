//! Tagged schema values for tool input validation.
//!
//! Service functions register their input shape as a JSON-Schema-like
//! document. Rather than introspecting untyped JSON at validation time, the
//! document is parsed once into a `SchemaNode` discriminated union so that
//! validation and serialization are total functions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SchemaError;

/// A parsed schema node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SchemaNode {
    Object {
        #[serde(default)]
        properties: BTreeMap<String, SchemaNode>,
        #[serde(default)]
        required: Vec<String>,
        #[serde(default = "default_true", rename = "additionalProperties")]
        additional_properties: bool,
    },
    Array {
        items: Option<Box<SchemaNode>>,
    },
    String {
        #[serde(default, rename = "enum")]
        one_of: Option<Vec<String>>,
    },
    Number,
    Integer,
    Boolean,
    Null,
}

fn default_true() -> bool {
    true
}

/// A single validation failure, with a dotted path into the value.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl SchemaNode {
    /// Parse a raw JSON schema document.
    pub fn parse(raw: &Value) -> Result<Self, SchemaError> {
        serde_json::from_value(raw.clone()).map_err(|e| SchemaError::Invalid(e.to_string()))
    }

    /// Validate a value against this schema. Returns all violations found.
    pub fn validate(&self, value: &Value) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        self.validate_at(value, "$", &mut violations);
        violations
    }

    fn validate_at(&self, value: &Value, path: &str, out: &mut Vec<SchemaViolation>) {
        match self {
            SchemaNode::Object {
                properties,
                required,
                additional_properties,
            } => {
                let Some(map) = value.as_object() else {
                    out.push(violation(path, "expected an object"));
                    return;
                };
                for key in required {
                    if !map.contains_key(key) {
                        out.push(violation(path, &format!("missing required property {key}")));
                    }
                }
                for (key, item) in map {
                    match properties.get(key) {
                        Some(schema) => {
                            schema.validate_at(item, &format!("{path}.{key}"), out);
                        }
                        None if !additional_properties => {
                            out.push(violation(path, &format!("unexpected property {key}")));
                        }
                        None => {}
                    }
                }
            }
            SchemaNode::Array { items } => {
                let Some(list) = value.as_array() else {
                    out.push(violation(path, "expected an array"));
                    return;
                };
                if let Some(schema) = items {
                    for (i, item) in list.iter().enumerate() {
                        schema.validate_at(item, &format!("{path}[{i}]"), out);
                    }
                }
            }
            SchemaNode::String { one_of } => {
                let Some(s) = value.as_str() else {
                    out.push(violation(path, "expected a string"));
                    return;
                };
                if let Some(allowed) = one_of
                    && !allowed.iter().any(|v| v == s)
                {
                    out.push(violation(path, &format!("value {s:?} is not permitted")));
                }
            }
            SchemaNode::Number => {
                if !value.is_number() {
                    out.push(violation(path, "expected a number"));
                }
            }
            SchemaNode::Integer => {
                if !value.is_i64() && !value.is_u64() {
                    out.push(violation(path, "expected an integer"));
                }
            }
            SchemaNode::Boolean => {
                if !value.is_boolean() {
                    out.push(violation(path, "expected a boolean"));
                }
            }
            SchemaNode::Null => {
                if !value.is_null() {
                    out.push(violation(path, "expected null"));
                }
            }
        }
    }
}

fn violation(path: &str, message: &str) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        message: message.to_string(),
    }
}

/// Validate a service or function name: 1-64 chars, alphanumeric plus `_`/`-`.
pub fn validate_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 64 {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: "must be between 1 and 64 characters".into(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason: "must contain only alphanumeric characters, '_' or '-'".into(),
        });
    }
    Ok(())
}

/// Extract a cache-key value from `args` by following a dot-separated path
/// (e.g. `"user.id"`). The leading `$.` of a JSON path is accepted.
pub fn extract_key_path<'a>(path: &str, args: &'a Value) -> Option<&'a Value> {
    let path = path.strip_prefix("$.").unwrap_or(path);
    let mut current = args;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}
