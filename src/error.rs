//! Error types for Foreman.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Run error: {0}")]
    Run(#[from] RunError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

impl Error {
    /// Whether the caller may retry the failed operation with backoff.
    ///
    /// Validation and not-found errors are permanent; busy/conflict and
    /// transient infrastructure errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Store(StoreError::Connection(_))
                | Error::Run(RunError::Busy { .. })
                | Error::Job(JobError::AlreadyClaimed { .. })
                | Error::Model(ModelError::RateLimited { .. })
                | Error::Model(ModelError::Unavailable { .. })
        )
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<libsql::Error> for StoreError {
    fn from(e: libsql::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Job dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {id} not found")]
    NotFound { id: String },

    #[error("Service {service} has no registered function {function}")]
    NotRegistered { service: String, function: String },

    #[error("Invalid job arguments: {reason}")]
    InvalidArguments { reason: String },

    #[error("Job {id} is already claimed")]
    AlreadyClaimed { id: String },

    #[error("Job {id} already has an approval decision")]
    AlreadyDecided { id: String },

    #[error("Job {id} is in state {state}, cannot transition to {target}")]
    InvalidTransition {
        id: String,
        state: String,
        target: String,
    },

    #[error("Job {id} did not resolve within {ttl:?}")]
    PollTimeout { id: String, ttl: Duration },
}

/// Run lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Run {id} not found")]
    NotFound { id: String },

    #[error("Run is not interactive and cannot accept new messages")]
    NotInteractive,

    #[error("Run is not ready for new messages: {reason}")]
    Busy { reason: String },
}

/// Fatal errors raised while stepping the agent loop.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Maximum run message length exceeded")]
    MessageCapExceeded,

    #[error("Detected cycle in run")]
    CycleDetected,

    #[error("System prompt can not exceed {limit} tokens")]
    SystemPromptTooLarge { limit: usize },

    #[error("Run state is invalid: {0}")]
    InvalidState(String),
}

/// Tool resolution and execution errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool {name} not found")]
    NotFound { name: String },

    #[error("Invalid input for tool {name}: {reason}")]
    InvalidInput { name: String, reason: String },
}

/// Reasoning-model client errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model {identifier} request failed: {reason}")]
    RequestFailed { identifier: String, reason: String },

    #[error("Model {identifier} rate limited, retry after {retry_after:?}")]
    RateLimited {
        identifier: String,
        retry_after: Option<Duration>,
    },

    #[error("Model {identifier} temporarily unavailable")]
    Unavailable { identifier: String },
}

/// Schema definition and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid schema: {0}")]
    Invalid(String),

    #[error("Invalid function name {name}: {reason}")]
    InvalidName { name: String, reason: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
