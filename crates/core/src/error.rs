//! Error types for the Hearth domain.
//!
//! Uses `thiserror` for ergonomic error definitions. Each bounded
//! context has its own error enum, aggregated under [`Error`].

use thiserror::Error;

/// The top-level error type for all Hearth operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures raised by the model backend or its stream parsers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Non-success HTTP status from the backend. The display string is
    /// part of the consumer contract — it is forwarded verbatim as the
    /// loop's error event.
    #[error("Ollama request failed: {status_code} - {message}")]
    Backend { status_code: u16, message: String },

    /// Network failure before or during the response stream.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A response frame that could not be decoded. The stream fails
    /// instead of skipping the frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The stream ended in a way the protocol does not allow.
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

/// Failures raised by tool lookup or execution.
///
/// The agent loop converts these into `Error: ...` result strings and
/// feeds them back to the model; a tool failure never aborts the loop.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

/// Failures raised by the message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
