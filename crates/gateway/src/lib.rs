//! HTTP API gateway for Hearth.
//!
//! Exposes the streaming chat endpoint plus conversation CRUD and
//! tool listing. Built on Axum.
//!
//! Endpoints:
//!
//! - `POST /api/chat`               — send a message, stream SSE events
//! - `GET  /api/conversations`      — list conversations
//! - `POST /api/conversations`      — create a conversation
//! - `GET  /api/conversations/{id}` — fetch a conversation with messages
//! - `DELETE /api/conversations/{id}` — delete a conversation
//! - `GET  /api/tools`              — list available tools
//! - `GET  /health`                 — liveness check

pub mod api;
pub mod chat;
pub mod sse;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use hearth_core::provider::Provider;
use hearth_core::store::MessageStore;
use hearth_core::tool::ToolRegistry;

/// Shared state for all gateway routes.
pub struct GatewayState {
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolRegistry>,
    pub store: Arc<dyn MessageStore>,
    pub default_model: String,
    pub system_prompt: Option<String>,
    pub max_iterations: u32,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/conversations", get(api::list_conversations_handler))
        .route("/api/conversations", post(api::create_conversation_handler))
        .route("/api/conversations/{id}", get(api::get_conversation_handler))
        .route(
            "/api/conversations/{id}",
            axum::routing::delete(api::delete_conversation_handler),
        )
        .route("/api/tools", get(api::list_tools_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server.
pub async fn start(config: hearth_config::AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider: Arc<dyn Provider> = Arc::new(hearth_providers::OllamaProvider::new(Some(
        &config.backend.base_url,
    )));

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(hearth_tools::ShellTool::new(
        config.tools.allowed_commands.clone(),
    )));
    registry.register(Box::new(hearth_tools::FileReadTool::with_restrictions(
        config.tools.allowed_roots.clone(),
        config.tools.forbidden_paths.clone(),
    )));
    registry.register(Box::new(hearth_tools::FileWriteTool::with_restrictions(
        config.tools.allowed_roots.clone(),
        config.tools.forbidden_paths.clone(),
    )));

    let store = Arc::new(hearth_store::SqliteStore::new(&config.store.path).await?);

    let state = Arc::new(GatewayState {
        provider,
        tools: Arc::new(registry),
        store,
        default_model: config.default_model.clone(),
        system_prompt: config.system_prompt.clone(),
        max_iterations: config.max_iterations,
    });

    let app = build_router(state);

    info!(addr = %addr, model = %config.default_model, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
