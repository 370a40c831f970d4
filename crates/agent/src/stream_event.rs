//! Loop-level streaming events.
//!
//! `LoopEvent` is what the gateway forwards to clients over SSE and
//! what the CLI renders in the terminal. The discriminator is the
//! `type` field:
//!
//! - `conversation` — one-shot, identifies the persistent conversation
//! - `thinking`     — hidden reasoning delta
//! - `text_delta`   — visible text delta
//! - `tool_call`    — the agent is invoking a tool
//! - `tool_result`  — tool execution completed
//! - `text`         — terminal compatibility event with the full final text
//! - `error`        — terminal failure
//! - `done`         — always the last event on any path

use serde::{Deserialize, Serialize};

use hearth_core::message::MessageToolCall;

/// Events emitted by the agent loop during one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// Identifies the persistent conversation; emitted by the request
    /// handler before the first model event.
    Conversation { id: String },

    /// A delta of hidden reasoning text.
    Thinking { content: String },

    /// A delta of user-visible text.
    TextDelta { content: String },

    /// The agent is invoking a tool.
    ToolCall { call: MessageToolCall },

    /// A tool invocation completed; `result` is always a string, with
    /// failures surfaced as `Error: ...` text.
    ToolResult { call_id: String, result: String },

    /// The fully accumulated visible text of the final turn, for
    /// consumers that do not assemble deltas themselves. Streaming
    /// consumers should ignore it.
    Text { content: String },

    /// Terminal failure. At most one per invocation, always followed
    /// by `Done`.
    Error { message: String },

    /// Terminal success marker; always the last event emitted.
    Done,
}

impl LoopEvent {
    /// The wire discriminator for this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Conversation { .. } => "conversation",
            Self::Thinking { .. } => "thinking",
            Self::TextDelta { .. } => "text_delta",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Text { .. } => "text",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    /// Whether this event terminates the stream (after `Done`).
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}
