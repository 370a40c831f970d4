//! Provider trait — the abstraction over the model backend.
//!
//! A Provider takes a conversation plus a tool catalogue and returns a
//! lazy, finite stream of [`ProviderEvent`]s for one model turn. The
//! agent loop consumes the stream without knowing which backend is
//! behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};

/// One request to the model backend: a conversation snapshot, the tool
/// catalogue, and the model to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The model identifier (e.g. "qwen3:8b").
    pub model: String,

    /// The conversation messages, oldest first.
    pub messages: Vec<Message>,

    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name.
    pub name: String,

    /// Description of what the tool does.
    pub description: String,

    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

/// An event produced while streaming one model turn.
///
/// `Thinking` and `TextDelta` may repeat in any order; `ToolCalls` is
/// terminal — it is the last event of a turn that dispatches tools.
/// A turn that ends in plain text simply ends the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// A delta of hidden reasoning text.
    Thinking { content: String },

    /// A delta of user-visible text.
    TextDelta { content: String },

    /// The terminal tool-dispatch batch for this turn.
    ToolCalls { calls: Vec<MessageToolCall> },
}

/// The receiving end of one provider turn.
///
/// Dropping the receiver is the cancellation signal: the producer task
/// notices its next send failing, returns, and drops the backend
/// response body, which aborts the underlying request.
pub type ProviderStream = mpsc::Receiver<Result<ProviderEvent, ProviderError>>;

/// The model backend contract.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g. "ollama").
    fn name(&self) -> &str;

    /// Open one streaming model turn.
    ///
    /// Returns an error before yielding any event if the backend
    /// rejects the request (non-success status, unreachable host).
    /// Mid-stream failures arrive as `Err` items on the stream.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ProviderStream, ProviderError>;
}
