//! Conversation CRUD and tool listing handlers.

use axum::extract::{Json, Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use hearth_core::error::StoreError;
use hearth_core::message::Message;

use crate::SharedState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
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

// ── Conversations ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ConversationListResponse {
    conversations: Vec<ConversationSummaryDto>,
}

#[derive(Serialize)]
struct ConversationSummaryDto {
    id: String,
    title: Option<String>,
    message_count: i64,
    created_at: String,
    updated_at: String,
}

pub async fn list_conversations_handler(
    State(state): State<SharedState>,
) -> Result<Json<ConversationListResponse>, (StatusCode, Json<ErrorResponse>)> {
    let summaries = state.store.list_conversations().await.map_err(store_error)?;
    Ok(Json(ConversationListResponse {
        conversations: summaries
            .into_iter()
            .map(|s| ConversationSummaryDto {
                id: s.id,
                title: s.title,
                message_count: s.message_count,
                created_at: s.created_at.to_rfc3339(),
                updated_at: s.updated_at.to_rfc3339(),
            })
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct CreateConversationPayload {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Serialize)]
pub struct CreateConversationResponse {
    id: String,
    created_at: String,
}

pub async fn create_conversation_handler(
    State(state): State<SharedState>,
    Json(payload): Json<CreateConversationPayload>,
) -> Result<(StatusCode, Json<CreateConversationResponse>), (StatusCode, Json<ErrorResponse>)> {
    let conversation = state
        .store
        .create_conversation(payload.title)
        .await
        .map_err(store_error)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            id: conversation.id.to_string(),
            created_at: conversation.created_at.to_rfc3339(),
        }),
    ))
}

#[derive(Serialize)]
pub struct ConversationDetailResponse {
    id: String,
    title: Option<String>,
    created_at: String,
    updated_at: String,
    messages: Vec<MessageDto>,
}

#[derive(Serialize)]
struct MessageDto {
    id: String,
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ToolCallDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
    timestamp: String,
}

#[derive(Serialize)]
struct ToolCallDto {
    id: String,
    name: String,
    arguments: String,
}

impl From<&Message> for MessageDto {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id.clone(),
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| ToolCallDto {
                    id: tc.id.clone(),
                    name: tc.name.clone(),
                    arguments: tc.arguments.clone(),
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
            timestamp: m.timestamp.to_rfc3339(),
        }
    }
}

pub async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, (StatusCode, Json<ErrorResponse>)> {
    let conversation = state.store.get_conversation(&id).await.map_err(store_error)?;
    Ok(Json(ConversationDetailResponse {
        id: conversation.id.to_string(),
        title: conversation.title,
        created_at: conversation.created_at.to_rfc3339(),
        updated_at: conversation.updated_at.to_rfc3339(),
        messages: conversation.messages.iter().map(MessageDto::from).collect(),
    }))
}

pub async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<ErrorResponse>)> {
    state
        .store
        .delete_conversation(&id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Tools ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

#[derive(Serialize)]
struct ToolDto {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

pub async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let mut tools: Vec<ToolDto> = state
        .tools
        .definitions()
        .into_iter()
        .map(|d| ToolDto {
            name: d.name,
            description: d.description,
            parameters: d.parameters,
        })
        .collect();
    tools.sort_by(|a, b| a.name.cmp(&b.name));
    let count = tools.len();
    Json(ToolListResponse { tools, count })
}
