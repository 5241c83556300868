//! Error types for the Ironloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the retry policy of the
//! model adapter is expressed here so callers can test it without a network.

use thiserror::Error;

/// The top-level error type for all Ironloop operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the model adapter.
///
/// Transient categories (network transport, 429, 5xx, backend "overloaded"
/// and "rate limited") are retryable; everything else surfaces immediately.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Backend error ({kind}): {message}")]
    Api { kind: String, message: String },

    #[error("Malformed backend response: {0}")]
    InvalidResponse(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("All {attempts} attempts failed: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ModelError>,
    },
}

impl ModelError {
    /// Whether the retry loop should try again after this failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            ModelError::Network(_) => true,
            ModelError::Http { status, .. } => *status == 429 || *status >= 500,
            ModelError::Api { kind, .. } => {
                kind == "overloaded_error" || kind == "rate_limit_error"
            }
            _ => false,
        }
    }
}

/// Errors from the persistent store (memory + tasks).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Task #{id} not found or not in a valid state for {operation}")]
    InvalidTransition { id: i64, operation: String },

    #[error("Task #{0} not found")]
    TaskNotFound(i64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Errors from tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Errors from the process supervisor's swap/rollback machinery.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Swap failed: {0}")]
    SwapFailed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from running an agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Agent failure: {0}")]
    Failed(String),
}
