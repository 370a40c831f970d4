//! The agent reasoning loop implementation.
//!
//! One invocation owns a private copy of the conversation, repeatedly
//! opens a streaming provider turn against it, and either forwards the
//! turn's text to the consumer or executes the tool batch the turn
//! ended with and goes around again. The loop's output channel carries
//! [`LoopEvent`]s; the final event is always `done`.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use hearth_core::message::{Message, MessageToolCall};
use hearth_core::provider::{ChatRequest, Provider, ProviderEvent};
use hearth_core::tool::ToolRegistry;

use crate::stream_event::LoopEvent;

/// Configuration for one loop invocation.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// The model identifier passed to the provider.
    pub model: String,

    /// Maximum number of provider turns. Must be strictly positive.
    pub max_iterations: u32,

    /// Optional system prompt prepended to the conversation.
    pub system_prompt: Option<String>,
}

impl LoopConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_iterations: 10,
            system_prompt: None,
        }
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// The core agent loop that orchestrates model streaming and tool
/// execution.
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
}

impl AgentLoop {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: LoopConfig) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Run the loop against a snapshot of the caller's messages.
    ///
    /// The messages are copied; the caller's list is never mutated.
    /// The returned receiver yields events in emission order and is
    /// the cancellation handle: dropping it stops the loop at its next
    /// send, which closes the current provider stream and with it the
    /// backend request.
    pub fn run_stream(&self, messages: &[Message]) -> mpsc::Receiver<LoopEvent> {
        let (tx, rx) = mpsc::channel(128);

        let provider = self.provider.clone();
        let tools = self.tools.clone();
        let config = self.config.clone();
        let messages = messages.to_vec();

        tokio::spawn(run_loop(provider, tools, config, messages, tx));

        rx
    }
}

/// Emit a terminal error followed by done. Send failures mean the
/// consumer is gone; nothing left to do either way.
async fn fail(tx: &mpsc::Sender<LoopEvent>, message: impl Into<String>) {
    let message = message.into();
    warn!(error = %message, "Agent loop failed");
    if tx.send(LoopEvent::Error { message }).await.is_err() {
        return;
    }
    let _ = tx.send(LoopEvent::Done).await;
}

async fn run_loop(
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    config: LoopConfig,
    messages: Vec<Message>,
    tx: mpsc::Sender<LoopEvent>,
) {
    if config.max_iterations == 0 {
        fail(&tx, "Invalid maxIterations").await;
        return;
    }

    // Private conversation context for this invocation.
    let mut context: Vec<Message> = Vec::with_capacity(messages.len() + 1);
    if let Some(prompt) = &config.system_prompt {
        context.push(Message::system(prompt));
    }
    context.extend(messages);

    let tool_defs = tools.definitions();

    info!(
        model = %config.model,
        max_iterations = config.max_iterations,
        tools = tool_defs.len(),
        "Agent loop starting"
    );

    for iteration in 1..=config.max_iterations {
        debug!(iteration, messages = context.len(), "Agent loop iteration");

        let request = ChatRequest {
            model: config.model.clone(),
            messages: context.clone(),
            tools: tool_defs.clone(),
        };

        let mut turn = match provider.chat_stream(request).await {
            Ok(stream) => stream,
            Err(e) => {
                fail(&tx, e.to_string()).await;
                return;
            }
        };

        let mut accumulated_text = String::new();
        let mut pending_tool_calls: Option<Vec<MessageToolCall>> = None;

        while let Some(item) = turn.recv().await {
            match item {
                Ok(ProviderEvent::Thinking { content }) => {
                    if tx.send(LoopEvent::Thinking { content }).await.is_err() {
                        return;
                    }
                }
                Ok(ProviderEvent::TextDelta { content }) => {
                    accumulated_text.push_str(&content);
                    if tx.send(LoopEvent::TextDelta { content }).await.is_err() {
                        return;
                    }
                }
                Ok(ProviderEvent::ToolCalls { calls }) => {
                    // Terminal for this turn; stop consuming.
                    pending_tool_calls = Some(calls);
                    break;
                }
                Err(e) => {
                    fail(&tx, e.to_string()).await;
                    return;
                }
            }
        }
        // Closing the turn here releases the backend connection before
        // tools run.
        drop(turn);

        let Some(calls) = pending_tool_calls else {
            // Clean end of turn with no tool calls: final answer.
            if !accumulated_text.is_empty()
                && tx
                    .send(LoopEvent::Text {
                        content: accumulated_text,
                    })
                    .await
                    .is_err()
            {
                return;
            }
            let _ = tx.send(LoopEvent::Done).await;
            return;
        };

        if calls.is_empty() {
            fail(&tx, "Provider returned empty tool_calls").await;
            return;
        }

        context.push(Message::assistant_tool_calls(calls.clone()));

        // Dispatch strictly in batch order so the event stream and the
        // accumulated context are deterministic.
        for call in calls {
            debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");

            if tx
                .send(LoopEvent::ToolCall { call: call.clone() })
                .await
                .is_err()
            {
                return;
            }

            // A failing tool is not a loop failure: the error text is
            // handed back to the model as the result.
            let result = match tools.execute(&call.name, &call.arguments).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed");
                    format!("Error: {e}")
                }
            };

            if tx
                .send(LoopEvent::ToolResult {
                    call_id: call.id.clone(),
                    result: result.clone(),
                })
                .await
                .is_err()
            {
                return;
            }

            context.push(Message::tool_result(&call.id, &result));
        }
    }

    fail(&tx, "Max iterations reached").await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hearth_core::error::{ProviderError, ToolError};
    use hearth_core::provider::ProviderStream;
    use hearth_core::tool::{Tool, ToolResult};
    use std::sync::Mutex;

    /// One scripted provider turn: either a stream of events or an
    /// up-front failure.
    type Turn = Result<Vec<Result<ProviderEvent, ProviderError>>, ProviderError>;

    /// A mock provider that replays scripted turns and records every
    /// request it receives.
    struct ScriptedProvider {
        turns: Mutex<Vec<Turn>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedProvider {
        fn new(turns: Vec<Turn>) -> Self {
            Self {
                turns: Mutex::new(turns),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn request(&self, index: usize) -> ChatRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn chat_stream(
            &self,
            request: ChatRequest,
        ) -> Result<ProviderStream, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let turn = {
                let mut turns = self.turns.lock().unwrap();
                if turns.is_empty() {
                    panic!("ScriptedProvider: no more turns");
                }
                turns.remove(0)
            };
            let events = turn?;
            let (tx, rx) = mpsc::channel(64);
            tokio::spawn(async move {
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    fn text_turn(deltas: &[&str]) -> Turn {
        Ok(deltas
            .iter()
            .map(|d| {
                Ok(ProviderEvent::TextDelta {
                    content: d.to_string(),
                })
            })
            .collect())
    }

    fn tool_turn(calls: Vec<MessageToolCall>) -> Turn {
        Ok(vec![Ok(ProviderEvent::ToolCalls { calls })])
    }

    fn bash_call(id: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: "bash".into(),
            arguments: r#"{"cmd":"ls"}"#.into(),
        }
    }

    /// A tool that returns a fixed output.
    struct StaticTool {
        name: &'static str,
        output: &'static str,
    }

    #[async_trait]
    impl Tool for StaticTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "static test tool"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Ok(ToolResult {
                success: true,
                output: self.output.to_string(),
            })
        }
    }

    fn registry_with_bash() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(StaticTool {
            name: "bash",
            output: "file1",
        }));
        Arc::new(registry)
    }

    async fn collect(mut rx: mpsc::Receiver<LoopEvent>) -> Vec<LoopEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn run(
        turns: Vec<Turn>,
        tools: Arc<ToolRegistry>,
        config: LoopConfig,
        messages: &[Message],
    ) -> (Arc<ScriptedProvider>, mpsc::Receiver<LoopEvent>) {
        let provider = Arc::new(ScriptedProvider::new(turns));
        let agent = AgentLoop::new(provider.clone(), tools, config);
        let rx = agent.run_stream(messages);
        (provider, rx)
    }

    #[tokio::test]
    async fn plain_text_reply() {
        let (_, rx) = run(
            vec![text_turn(&["Hel", "lo"])],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::TextDelta {
                    content: "Hel".into()
                },
                LoopEvent::TextDelta {
                    content: "lo".into()
                },
                LoopEvent::Text {
                    content: "Hello".into()
                },
                LoopEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn single_tool_call_then_reply() {
        let (provider, rx) = run(
            vec![tool_turn(vec![bash_call("call_x")]), text_turn(&["done"])],
            registry_with_bash(),
            LoopConfig::new("test-model"),
            &[Message::user("ls")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::ToolCall {
                    call: bash_call("call_x")
                },
                LoopEvent::ToolResult {
                    call_id: "call_x".into(),
                    result: "file1".into()
                },
                LoopEvent::TextDelta {
                    content: "done".into()
                },
                LoopEvent::Text {
                    content: "done".into()
                },
                LoopEvent::Done,
            ]
        );

        // The second turn must see the assistant tool-call message and
        // the tool result accumulated into the context.
        assert_eq!(provider.call_count(), 2);
        let second = provider.request(1);
        let n = second.messages.len();
        assert_eq!(second.messages[n - 2].tool_calls.len(), 1);
        assert_eq!(second.messages[n - 1].content, "file1");
        assert_eq!(
            second.messages[n - 1].tool_call_id.as_deref(),
            Some("call_x")
        );
    }

    #[tokio::test]
    async fn thinking_then_reply() {
        let turn = Ok(vec![
            Ok(ProviderEvent::Thinking {
                content: "plan".into(),
            }),
            Ok(ProviderEvent::TextDelta {
                content: "answer".into(),
            }),
        ]);
        let (_, rx) = run(
            vec![turn],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::Thinking {
                    content: "plan".into()
                },
                LoopEvent::TextDelta {
                    content: "answer".into()
                },
                LoopEvent::Text {
                    content: "answer".into()
                },
                LoopEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn tool_error_fed_back_as_result() {
        // No tools registered: the call fails, the loop keeps going.
        let (provider, rx) = run(
            vec![
                tool_turn(vec![bash_call("call_1")]),
                text_turn(&["recovered"]),
            ],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("ls")],
        );
        let events = collect(rx).await;

        match &events[1] {
            LoopEvent::ToolResult { call_id, result } => {
                assert_eq!(call_id, "call_1");
                assert!(result.starts_with("Error: "), "got: {result}");
            }
            other => panic!("expected tool result, got {other:?}"),
        }
        assert_eq!(
            events.last(),
            Some(&LoopEvent::Done),
            "loop must survive a failing tool"
        );

        // The error text reaches the next turn as a tool message.
        let second = provider.request(1);
        let last = second.messages.last().unwrap();
        assert!(last.content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn backend_failure_becomes_error_event() {
        let (_, rx) = run(
            vec![Err(ProviderError::Backend {
                status_code: 500,
                message: "boom".into(),
            })],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::Error {
                    message: "Ollama request failed: 500 - boom".into()
                },
                LoopEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn midstream_failure_becomes_error_event() {
        let turn = Ok(vec![
            Ok(ProviderEvent::TextDelta {
                content: "par".into(),
            }),
            Err(ProviderError::Transport("connection reset".into())),
        ]);
        let (_, rx) = run(
            vec![turn],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        // Partial content already delivered stays delivered.
        assert_eq!(
            events[0],
            LoopEvent::TextDelta {
                content: "par".into()
            }
        );
        assert!(matches!(events[1], LoopEvent::Error { .. }));
        assert_eq!(events[2], LoopEvent::Done);
    }

    #[tokio::test]
    async fn iteration_cap_reached() {
        let (_, rx) = run(
            vec![
                tool_turn(vec![bash_call("call_1")]),
                tool_turn(vec![bash_call("call_2")]),
            ],
            registry_with_bash(),
            LoopConfig::new("test-model").with_max_iterations(2),
            &[Message::user("loop forever")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::ToolCall {
                    call: bash_call("call_1")
                },
                LoopEvent::ToolResult {
                    call_id: "call_1".into(),
                    result: "file1".into()
                },
                LoopEvent::ToolCall {
                    call: bash_call("call_2")
                },
                LoopEvent::ToolResult {
                    call_id: "call_2".into(),
                    result: "file1".into()
                },
                LoopEvent::Error {
                    message: "Max iterations reached".into()
                },
                LoopEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn single_iteration_with_tool_batch_hits_the_cap() {
        let (_, rx) = run(
            vec![tool_turn(vec![bash_call("call_1")])],
            registry_with_bash(),
            LoopConfig::new("test-model").with_max_iterations(1),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::ToolCall {
                    call: bash_call("call_1")
                },
                LoopEvent::ToolResult {
                    call_id: "call_1".into(),
                    result: "file1".into()
                },
                LoopEvent::Error {
                    message: "Max iterations reached".into()
                },
                LoopEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn zero_max_iterations_never_invokes_provider() {
        let (provider, rx) = run(
            vec![],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model").with_max_iterations(0),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::Error {
                    message: "Invalid maxIterations".into()
                },
                LoopEvent::Done,
            ]
        );
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn empty_tool_calls_batch_is_a_protocol_error() {
        let (_, rx) = run(
            vec![tool_turn(vec![])],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                LoopEvent::Error {
                    message: "Provider returned empty tool_calls".into()
                },
                LoopEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn empty_final_text_emits_no_text_event() {
        let (_, rx) = run(
            vec![text_turn(&[])],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;
        assert_eq!(events, vec![LoopEvent::Done]);
    }

    #[tokio::test]
    async fn system_prompt_prepended_to_context() {
        let (provider, rx) = run(
            vec![text_turn(&["ok"])],
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model").with_system_prompt("You are terse."),
            &[Message::user("Hi")],
        );
        collect(rx).await;
        let request = provider.request(0);
        assert_eq!(
            request.messages[0].role,
            hearth_core::message::Role::System
        );
        assert_eq!(request.messages[0].content, "You are terse.");
        assert_eq!(request.messages[1].content, "Hi");
    }

    #[tokio::test]
    async fn caller_messages_are_not_mutated() {
        let messages = vec![Message::user("Hi")];
        let snapshot = serde_json::to_string(&messages).unwrap();
        let (_, rx) = run(
            vec![tool_turn(vec![bash_call("call_1")]), text_turn(&["ok"])],
            registry_with_bash(),
            LoopConfig::new("test-model"),
            &messages,
        );
        collect(rx).await;
        assert_eq!(serde_json::to_string(&messages).unwrap(), snapshot);
    }

    #[tokio::test]
    async fn every_tool_result_follows_its_call() {
        let (_, rx) = run(
            vec![
                tool_turn(vec![bash_call("call_a"), bash_call("call_b")]),
                text_turn(&["ok"]),
            ],
            registry_with_bash(),
            LoopConfig::new("test-model"),
            &[Message::user("Hi")],
        );
        let events = collect(rx).await;

        let mut open: Vec<String> = Vec::new();
        for event in &events {
            match event {
                LoopEvent::ToolCall { call } => open.push(call.id.clone()),
                LoopEvent::ToolResult { call_id, .. } => {
                    let last = open.pop().expect("result without preceding call");
                    assert_eq!(&last, call_id);
                }
                _ => {}
            }
        }
        assert!(open.is_empty());
        assert_eq!(events.last(), Some(&LoopEvent::Done));
    }

    #[tokio::test]
    async fn dropping_the_receiver_cancels_the_loop() {
        // An endless provider turn; the consumer walks away after the
        // first delta.
        struct EndlessProvider;

        #[async_trait]
        impl Provider for EndlessProvider {
            fn name(&self) -> &str {
                "endless"
            }
            async fn chat_stream(
                &self,
                _request: ChatRequest,
            ) -> Result<ProviderStream, ProviderError> {
                let (tx, rx) = mpsc::channel(1);
                tokio::spawn(async move {
                    loop {
                        if tx
                            .send(Ok(ProviderEvent::TextDelta {
                                content: "x".into(),
                            }))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                });
                Ok(rx)
            }
        }

        let agent = AgentLoop::new(
            Arc::new(EndlessProvider),
            Arc::new(ToolRegistry::new()),
            LoopConfig::new("test-model"),
        );
        let mut rx = agent.run_stream(&[Message::user("Hi")]);
        assert!(rx.recv().await.is_some());
        drop(rx);
        // Give the loop a moment to observe the closed channel; the
        // test passing is the absence of a hang or panic.
        tokio::task::yield_now().await;
    }
}
