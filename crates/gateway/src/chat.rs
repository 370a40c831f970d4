//! The streaming chat endpoint.
//!
//! `POST /api/chat` resolves the conversation, persists the user
//! message, runs the agent loop over the stored history, and streams
//! every loop event back as SSE. Loop events are mirrored into the
//! store as they flow by, so the persisted conversation always matches
//! what the client saw.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, Sse};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use hearth_agent::{AgentLoop, LoopConfig, LoopEvent};
use hearth_core::error::StoreError;
use hearth_core::message::Message;
use hearth_core::store::MessageStore;

use crate::api::ErrorResponse;
use crate::SharedState;
use crate::sse::{EventStreamAdapter, encode_event};

#[derive(Debug, Deserialize)]
pub struct ChatPayload {
    /// Existing conversation ID (omit to create a new one).
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// The user's message.
    pub message: String,

    /// Model override for this request.
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatPayload>,
) -> Result<
    Sse<impl Stream<Item = Result<SseEvent, Infallible>>>,
    (StatusCode, Json<ErrorResponse>),
> {
    // Resolve or create the conversation; an explicit unknown id is
    // the caller's mistake, not an invitation to create one.
    let conversation = match &payload.conversation_id {
        Some(id) => state
            .store
            .get_conversation(id)
            .await
            .map_err(store_error)?,
        None => state
            .store
            .create_conversation(None)
            .await
            .map_err(store_error)?,
    };
    let conversation_id = conversation.id.to_string();

    info!(conversation_id = %conversation_id, "chat request");

    let user_message = Message::user(&payload.message);
    state
        .store
        .save_message(&conversation_id, &user_message)
        .await
        .map_err(store_error)?;

    let mut history = conversation.messages;
    history.push(user_message);

    let config = LoopConfig {
        model: payload
            .model
            .unwrap_or_else(|| state.default_model.clone()),
        max_iterations: state.max_iterations,
        system_prompt: state.system_prompt.clone(),
    };

    let agent = AgentLoop::new(state.provider.clone(), state.tools.clone(), config);
    let loop_rx = agent.run_stream(&history);

    let (tx, rx) = mpsc::channel(128);
    tokio::spawn(bridge_loop_events(
        state.store.clone(),
        conversation_id.clone(),
        loop_rx,
        tx,
    ));

    let cancelled_id = conversation_id.clone();
    let stream = EventStreamAdapter::new(rx)
        .on_cancel(move || {
            info!(conversation_id = %cancelled_id, "Client cancelled chat stream");
        })
        .map(|event| Ok::<_, Infallible>(SseEvent::default().data(encode_event(&event))));

    Ok(Sse::new(stream))
}

fn store_error(e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        StoreError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// Forward loop events to the consumer channel, mirroring them into
/// the store.
///
/// The `conversation` event is prepended before the first model event.
/// Each `tool_call` is persisted as an assistant message carrying that
/// one call and each `tool_result` as the matching tool-role message,
/// so every stored call id is followed by exactly one stored result in
/// order. A send failure means the consumer disconnected; returning
/// drops `loop_rx`, which cancels the loop and the backend request.
pub(crate) async fn bridge_loop_events(
    store: Arc<dyn MessageStore>,
    conversation_id: String,
    mut loop_rx: mpsc::Receiver<LoopEvent>,
    tx: mpsc::Sender<LoopEvent>,
) {
    if tx
        .send(LoopEvent::Conversation {
            id: conversation_id.clone(),
        })
        .await
        .is_err()
    {
        return;
    }

    while let Some(event) = loop_rx.recv().await {
        persist_event(store.as_ref(), &conversation_id, &event).await;
        if tx.send(event).await.is_err() {
            return;
        }
    }
}

async fn persist_event(store: &dyn MessageStore, conversation_id: &str, event: &LoopEvent) {
    let result = match event {
        LoopEvent::ToolCall { call } => {
            store
                .save_message(
                    conversation_id,
                    &Message::assistant_tool_calls(vec![call.clone()]),
                )
                .await
        }
        LoopEvent::ToolResult { call_id, result } => {
            store
                .save_message(conversation_id, &Message::tool_result(call_id, result))
                .await
        }
        LoopEvent::Text { content } => {
            store
                .save_message(conversation_id, &Message::assistant(content))
                .await
        }
        // Deltas, thinking, and terminal markers are stream-only.
        _ => return,
    };

    if let Err(e) = result {
        // Persistence is best-effort from the stream's point of view;
        // the client's events keep flowing.
        warn!(conversation_id, error = %e, "Failed to persist loop event");
    }
}
