//! Core domain types for Hearth.
//!
//! This crate defines the vocabulary shared by every other crate:
//! messages and conversations, the streaming [`Provider`] contract,
//! the [`Tool`] contract and registry, the [`MessageStore`] contract,
//! and the error taxonomy. It has no I/O of its own.

pub mod error;
pub mod message;
pub mod provider;
pub mod store;
pub mod tool;

pub use error::{Error, ProviderError, Result, StoreError, ToolError};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{ChatRequest, Provider, ProviderEvent, ProviderStream, ToolDefinition};
pub use store::{ConversationSummary, MessageStore};
pub use tool::{Tool, ToolRegistry, ToolResult};
