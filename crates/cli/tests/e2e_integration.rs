//! End-to-end integration tests for the Hearth agent runtime.
//!
//! These exercise the full pipeline from HTTP request to SSE output:
//! gateway routing, the agent loop over a scripted streaming provider,
//! tool dispatch, event-stream adaptation, and persistence.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;

use hearth_core::error::ProviderError;
use hearth_core::message::{MessageToolCall, Role};
use hearth_core::provider::{ChatRequest, Provider, ProviderEvent, ProviderStream};
use hearth_core::store::MessageStore;
use hearth_core::tool::ToolRegistry;
use hearth_gateway::{GatewayState, SharedState, build_router};
use hearth_store::SqliteStore;

// ── Scripted streaming provider ──────────────────────────────────────────

/// Replays scripted turns, each a sequence of provider events.
struct ScriptedProvider {
    turns: Mutex<Vec<Vec<ProviderEvent>>>,
}

impl ScriptedProvider {
    fn new(turns: Vec<Vec<ProviderEvent>>) -> Self {
        Self {
            turns: Mutex::new(turns),
        }
    }

    fn text(deltas: &[&str]) -> Vec<ProviderEvent> {
        deltas
            .iter()
            .map(|d| ProviderEvent::TextDelta {
                content: d.to_string(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn chat_stream(&self, _request: ChatRequest) -> Result<ProviderStream, ProviderError> {
        let events = {
            let mut turns = self.turns.lock().unwrap();
            if turns.is_empty() {
                panic!("ScriptedProvider exhausted");
            }
            turns.remove(0)
        };
        let (tx, rx) = tokio::sync::mpsc::channel(64);
        tokio::spawn(async move {
            for event in events {
                if tx.send(Ok(event)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }
}

async fn test_state(turns: Vec<Vec<ProviderEvent>>) -> (SharedState, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::new(":memory:").await.unwrap());
    let state = Arc::new(GatewayState {
        provider: Arc::new(ScriptedProvider::new(turns)),
        tools: Arc::new(hearth_tools::default_registry()),
        store: store.clone(),
        default_model: "mock".into(),
        system_prompt: None,
        max_iterations: 10,
    });
    (state, store)
}

/// Parse the `data:` payloads of an SSE body into type strings.
fn sse_event_types(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| {
            let value: serde_json::Value = serde_json::from_str(data).expect("frame is JSON");
            value["type"].as_str().expect("frame has a type").to_string()
        })
        .collect()
}

async fn post_chat(state: SharedState, payload: serde_json::Value) -> (StatusCode, String) {
    let app = build_router(state);
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&body).to_string())
}

// ── E2E: chat streaming ──────────────────────────────────────────────────

#[tokio::test]
async fn e2e_plain_text_reply() {
    let (state, _) = test_state(vec![ScriptedProvider::text(&["Hel", "lo"])]).await;
    let (status, body) = post_chat(state, serde_json::json!({"message": "Hi"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_event_types(&body),
        vec!["conversation", "text_delta", "text_delta", "text", "done"]
    );
    assert!(body.contains(r#""content":"Hel""#));
    assert!(body.contains(r#""content":"Hello""#));
}

#[tokio::test]
async fn e2e_tool_call_roundtrip_persists_conversation() {
    let turns = vec![
        vec![ProviderEvent::ToolCalls {
            calls: vec![MessageToolCall {
                id: "call_1".into(),
                name: "shell".into(),
                arguments: r#"{"command":"echo file1"}"#.into(),
            }],
        }],
        ScriptedProvider::text(&["done"]),
    ];
    let (state, store) = test_state(turns).await;
    let (status, body) = post_chat(state, serde_json::json!({"message": "ls"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        sse_event_types(&body),
        vec![
            "conversation",
            "tool_call",
            "tool_result",
            "text_delta",
            "text",
            "done"
        ]
    );
    assert!(body.contains(r#""result":"file1""#));

    // Persisted shape: user, assistant(tool_calls), tool, assistant.
    let conversations = store.list_conversations().await.unwrap();
    assert_eq!(conversations.len(), 1);
    let conversation = store.get_conversation(&conversations[0].id).await.unwrap();
    let roles: Vec<Role> = conversation.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);

    // Every stored call id is answered by the following tool message.
    assert_eq!(conversation.messages[1].tool_calls[0].id, "call_1");
    assert_eq!(
        conversation.messages[2].tool_call_id.as_deref(),
        Some("call_1")
    );
    assert_eq!(conversation.messages[3].content, "done");
}

#[tokio::test]
async fn e2e_thinking_then_reply() {
    let turns = vec![vec![
        ProviderEvent::Thinking {
            content: "plan".into(),
        },
        ProviderEvent::TextDelta {
            content: "answer".into(),
        },
    ]];
    let (state, _) = test_state(turns).await;
    let (_, body) = post_chat(state, serde_json::json!({"message": "Hi"})).await;

    assert_eq!(
        sse_event_types(&body),
        vec!["conversation", "thinking", "text_delta", "text", "done"]
    );
}

#[tokio::test]
async fn e2e_backend_failure_surfaces_as_error_event() {
    struct FailingProvider;

    #[async_trait::async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }
        async fn chat_stream(
            &self,
            _request: ChatRequest,
        ) -> Result<ProviderStream, ProviderError> {
            Err(ProviderError::Backend {
                status_code: 500,
                message: "model not loaded".into(),
            })
        }
    }

    let store = Arc::new(SqliteStore::new(":memory:").await.unwrap());
    let state = Arc::new(GatewayState {
        provider: Arc::new(FailingProvider),
        tools: Arc::new(ToolRegistry::new()),
        store,
        default_model: "mock".into(),
        system_prompt: None,
        max_iterations: 10,
    });

    let (status, body) = post_chat(state, serde_json::json!({"message": "Hi"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sse_event_types(&body), vec!["conversation", "error", "done"]);
    assert!(body.contains("Ollama request failed: 500 - model not loaded"));
}

#[tokio::test]
async fn e2e_unknown_conversation_id_is_404() {
    let (state, _) = test_state(vec![]).await;
    let (status, _) = post_chat(
        state,
        serde_json::json!({"message": "Hi", "conversation_id": "ghost"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn e2e_followup_carries_history() {
    let turns = vec![
        ScriptedProvider::text(&["first answer"]),
        ScriptedProvider::text(&["second answer"]),
    ];
    let (state, store) = test_state(turns).await;

    let (_, body) = post_chat(state.clone(), serde_json::json!({"message": "first"})).await;
    let conversation_id = body
        .lines()
        .find_map(|l| l.strip_prefix("data: "))
        .map(|d| serde_json::from_str::<serde_json::Value>(d).unwrap())
        .and_then(|v| v["id"].as_str().map(String::from))
        .expect("conversation event carries the id");

    let (status, _) = post_chat(
        state,
        serde_json::json!({"message": "second", "conversation_id": conversation_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let conversation = store.get_conversation(&conversation_id).await.unwrap();
    let contents: Vec<&str> = conversation
        .messages
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        contents,
        vec!["first", "first answer", "second", "second answer"]
    );
}

// ── E2E: REST surface ────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_health_and_tools() {
    let (state, _) = test_state(vec![]).await;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/tools")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["count"], 3);
    let names: Vec<&str> = value["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["file_read", "file_write", "shell"]);
}

#[tokio::test]
async fn e2e_conversation_crud() {
    let (state, _) = test_state(vec![]).await;
    let app = build_router(state);

    // Create.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/conversations")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title":"my chat"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let created: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // List.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/conversations")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let listed: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(listed["conversations"].as_array().unwrap().len(), 1);

    // Fetch.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Delete.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    // Gone.
    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/conversations/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
