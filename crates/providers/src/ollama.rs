//! Ollama provider — streams chat turns from a local Ollama server.
//!
//! Speaks the native `/api/chat` protocol: a single POST with
//! `stream: true`, answered by newline-delimited JSON frames of
//! `{message: {role, content, tool_calls?}, done}`. A turn ends either
//! on a `done` frame with tool calls (tool dispatch) or on a plain
//! `done` frame (final text).
//!
//! Content deltas pass through the [`ThinkTagParser`] so reasoning
//! wrapped in `<think>` tags is separated from the visible answer.

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use hearth_core::error::ProviderError;
use hearth_core::message::{Message, MessageToolCall, Role};
use hearth_core::provider::{ChatRequest, Provider, ProviderEvent, ProviderStream, ToolDefinition};

use crate::ndjson::NdjsonDecoder;
use crate::think::ThinkTagParser;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// A provider backed by a local Ollama server.
pub struct OllamaProvider {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create a provider against the given base URL (default
    /// `http://localhost:11434`).
    ///
    /// No request timeout is set: streaming turns are long-lived and
    /// the consumer cancels by dropping the stream. Connection setup
    /// gets a short bound so an absent server fails fast.
    pub fn new(base_url: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client,
        }
    }

    /// Convert our messages to Ollama's wire format.
    ///
    /// Tool-role messages must carry the originating tool's name; only
    /// the call id is stored on the message, so the name is recovered
    /// by scanning backward for the assistant message that issued the
    /// call. Unresolvable ids fall back to the id itself.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: Some(tc.id.clone()),
                                function: ApiFunctionCall {
                                    name: tc.name.clone(),
                                    // Arguments travel as a JSON object
                                    // on the wire; invalid stored
                                    // payloads are passed through as a
                                    // string rather than dropped.
                                    arguments: Some(
                                        serde_json::from_str(&tc.arguments).unwrap_or_else(
                                            |_| serde_json::Value::String(tc.arguments.clone()),
                                        ),
                                    ),
                                },
                            })
                            .collect(),
                    )
                },
                tool_name: match m.role {
                    Role::Tool => m
                        .tool_call_id
                        .as_deref()
                        .map(|id| resolve_tool_name(&messages[..i], id)),
                    _ => None,
                },
            })
            .collect()
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }
}

/// Find the name of the tool a call id belongs to by scanning earlier
/// messages newest-first.
fn resolve_tool_name(earlier: &[Message], call_id: &str) -> String {
    earlier
        .iter()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_calls.iter())
        .find(|tc| tc.id == call_id)
        .map(|tc| tc.name.clone())
        .unwrap_or_else(|| call_id.to_string())
}

/// Normalize raw backend tool calls: arguments become a canonical JSON
/// string whether the backend sent object or string form, and calls
/// without an id get a fresh unique one.
fn normalize_tool_calls(raw: Vec<ApiToolCall>) -> Vec<MessageToolCall> {
    raw.into_iter()
        .map(|tc| {
            let arguments = match tc.function.arguments {
                Some(serde_json::Value::String(s)) => s,
                Some(value) => value.to_string(),
                None => "{}".to_string(),
            };
            MessageToolCall {
                id: tc
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                name: tc.function.name,
                arguments,
            }
        })
        .collect()
}

/// Decode one NDJSON line into a chat frame.
fn parse_frame(line: &str) -> Result<ChatFrame, ProviderError> {
    serde_json::from_str(line).map_err(|e| ProviderError::MalformedFrame(format!("{e}: {line}")))
}

/// What the frame loop should do after a frame.
enum FrameOutcome {
    Continue,
    EndOfTurn,
}

/// Apply one frame: tool-call terminals end the turn, content deltas
/// go through the tag parser. Returns `Err(())` when the consumer has
/// gone away and the producer should stop.
async fn handle_frame(
    frame: ChatFrame,
    tags: &mut ThinkTagParser,
    tx: &mpsc::Sender<Result<ProviderEvent, ProviderError>>,
) -> Result<FrameOutcome, ()> {
    // Content can ride on any frame, including the terminal one.
    if let Some(content) = frame.message.as_ref().and_then(|m| m.content.as_deref())
        && !content.is_empty()
    {
        for event in tags.push(content) {
            if tx.send(Ok(event)).await.is_err() {
                return Err(());
            }
        }
    }

    if frame.done {
        let calls = frame
            .message
            .and_then(|m| m.tool_calls)
            .unwrap_or_default();
        if !calls.is_empty() {
            let calls = normalize_tool_calls(calls);
            debug!(count = calls.len(), "Turn ended with tool calls");
            if tx.send(Ok(ProviderEvent::ToolCalls { calls })).await.is_err() {
                return Err(());
            }
        }
        return Ok(FrameOutcome::EndOfTurn);
    }

    Ok(FrameOutcome::Continue)
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn chat_stream(&self, request: ChatRequest) -> Result<ProviderStream, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        debug!(model = %request.model, messages = request.messages.len(), "Opening chat stream");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %error_body, "Backend rejected chat request");
            return Err(ProviderError::Backend {
                status_code: status.as_u16(),
                message: error_body,
            });
        }

        let (tx, rx) = mpsc::channel(64);

        // Read the response body on a separate task; the receiver
        // going away is the cancellation signal. Returning from the
        // task drops the body, which aborts the request.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = NdjsonDecoder::new();
            let mut tags = ThinkTagParser::new();

            while let Some(read) = byte_stream.next().await {
                let bytes = match read {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::Transport(e.to_string()))).await;
                        return;
                    }
                };

                let frames = match decoder.push(&bytes) {
                    Ok(frames) => frames,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                };

                for line in frames {
                    let frame = match parse_frame(&line) {
                        Ok(f) => f,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    match handle_frame(frame, &mut tags, &tx).await {
                        Ok(FrameOutcome::Continue) => {}
                        Ok(FrameOutcome::EndOfTurn) => {
                            // Flush any buffered sentinel prefix as its
                            // surrounding segment before closing.
                            for event in tags.finish() {
                                if tx.send(Ok(event)).await.is_err() {
                                    return;
                                }
                            }
                            return;
                        }
                        Err(()) => return,
                    }
                }
            }

            // EOF without a done frame: flush the trailing partial
            // frame, then the tag parser.
            match decoder.finish() {
                Ok(Some(line)) => {
                    let frame = match parse_frame(&line) {
                        Ok(f) => f,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    if handle_frame(frame, &mut tags, &tx).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            for event in tags.finish() {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });

        Ok(rx)
    }
}

// --- Ollama wire types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// One NDJSON frame of the streaming response.
#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(default)]
    message: Option<FrameMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct FrameMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}
