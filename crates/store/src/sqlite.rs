//! SQLite message store.
//!
//! Two tables: `conversations` and `messages`, with messages ordered
//! by insertion (monotonic sequence column — wall-clock timestamps are
//! kept for display but not relied on for ordering). Deleting a
//! conversation removes its messages in the same transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use hearth_core::error::StoreError;
use hearth_core::message::{Conversation, ConversationId, Message, MessageToolCall, Role};
use hearth_core::store::{ConversationSummary, MessageStore};

/// A SQLite-backed [`MessageStore`].
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    ///
    /// Pass `":memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        if path != ":memory:"
            && let Some(parent) = std::path::Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Storage(format!("create db directory: {e}")))?;
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // A pooled `:memory:` database is a different database per
        // connection, so the ephemeral case must stay on one.
        let max_connections = if path == ":memory:" { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!(path, "SQLite message store initialized");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY,
                title       TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                tool_calls      TEXT NOT NULL DEFAULT '[]',
                tool_call_id    TEXT,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
        let role: String = row.get("role");
        let role = role
            .parse::<Role>()
            .map_err(StoreError::Storage)?;

        let tool_calls: String = row.get("tool_calls");
        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls)
            .map_err(|e| StoreError::Storage(format!("corrupt tool_calls column: {e}")))?;

        let created_at: String = row.get("created_at");
        let timestamp = parse_timestamp(&created_at)?;

        Ok(Message {
            id: row.get("id"),
            role,
            content: row.get("content"),
            tool_calls,
            tool_call_id: row.get("tool_call_id"),
            timestamp,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("corrupt timestamp '{s}': {e}")))
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn create_conversation(
        &self,
        title: Option<String>,
    ) -> Result<Conversation, StoreError> {
        let mut conversation = Conversation::new();
        conversation.title = title;

        sqlx::query("INSERT INTO conversations (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(conversation.id.to_string())
            .bind(&conversation.title)
            .bind(conversation.created_at.to_rfc3339())
            .bind(conversation.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("insert conversation: {e}")))?;

        debug!(conversation_id = %conversation.id, "Conversation created");
        Ok(conversation)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation, StoreError> {
        let row = sqlx::query("SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("select conversation: {e}")))?
            .ok_or_else(|| StoreError::ConversationNotFound(id.to_string()))?;

        let message_rows = sqlx::query(
            "SELECT id, role, content, tool_calls, tool_call_id, created_at
             FROM messages WHERE conversation_id = ? ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("select messages: {e}")))?;

        let messages = message_rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;

        let created_at: String = row.get("created_at");
        let updated_at: String = row.get("updated_at");

        Ok(Conversation {
            id: ConversationId::from(id),
            messages,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            title: row.get("title"),
        })
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT c.id, c.title, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id) AS message_count
             FROM conversations c ORDER BY c.updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("list conversations: {e}")))?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                let updated_at: String = row.get("updated_at");
                Ok(ConversationSummary {
                    id: row.get("id"),
                    title: row.get("title"),
                    message_count: row.get("message_count"),
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    async fn save_message(
        &self,
        conversation_id: &str,
        message: &Message,
    ) -> Result<(), StoreError> {
        let tool_calls = serde_json::to_string(&message.tool_calls)
            .map_err(|e| StoreError::Storage(format!("serialize tool_calls: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO messages (id, conversation_id, role, content, tool_calls, tool_call_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id)
        .bind(conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(tool_calls)
        .bind(&message.tool_call_id)
        .bind(message.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                return Err(StoreError::ConversationNotFound(conversation_id.to_string()));
            }
            Err(e) => return Err(StoreError::Storage(format!("insert message: {e}"))),
        }

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("touch conversation: {e}")))?;

        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin delete: {e}")))?;

        sqlx::query("DELETE FROM messages WHERE conversation_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("delete messages: {e}")))?;

        let deleted = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("delete conversation: {e}")))?;

        if deleted.rows_affected() == 0 {
            // Roll back so a miss leaves nothing half-done.
            let _ = tx.rollback().await;
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit delete: {e}")))?;

        debug!(conversation_id = id, "Conversation deleted");
        Ok(())
    }
}
