//! MessageStore trait — the persistence contract for conversations.
//!
//! The agent loop itself never touches the store; the gateway's
//! request handler saves messages as the event stream flows by.
//! Backends live in the `hearth-store` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::message::{Conversation, Message};

/// A conversation row without its messages, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: Option<String>,
    pub message_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The persistence contract.
///
/// Implementations must be safe to share between concurrent requests.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a new conversation row and return it (empty).
    async fn create_conversation(
        &self,
        title: Option<String>,
    ) -> std::result::Result<Conversation, StoreError>;

    /// Fetch a conversation with its messages ordered by insertion.
    ///
    /// Returns `ConversationNotFound` for an unknown id.
    async fn get_conversation(&self, id: &str)
    -> std::result::Result<Conversation, StoreError>;

    /// List all conversations, most recently updated first.
    async fn list_conversations(
        &self,
    ) -> std::result::Result<Vec<ConversationSummary>, StoreError>;

    /// Append a message to a conversation.
    async fn save_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> std::result::Result<(), StoreError>;

    /// Delete a conversation and all of its messages atomically.
    async fn delete_conversation(&self, id: &str) -> std::result::Result<(), StoreError>;
}
