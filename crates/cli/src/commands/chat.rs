//! `hearth chat` — talk to the agent in the terminal.
//!
//! Streams the loop events as they arrive: visible text inline,
//! thinking dimmed, tool activity as bracketed notices. Interactive
//! mode keeps the conversation in memory so follow-up messages carry
//! the full history, including tool exchanges.

use std::io::Write;
use std::sync::Arc;

use hearth_agent::{AgentLoop, LoopConfig, LoopEvent};
use hearth_config::AppConfig;
use hearth_core::message::Message;
use hearth_core::provider::Provider;
use hearth_providers::OllamaProvider;

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

pub async fn run(
    message: Option<String>,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    let provider: Arc<dyn Provider> =
        Arc::new(OllamaProvider::new(Some(&config.backend.base_url)));
    let tools = Arc::new(hearth_tools::default_registry());

    let mut loop_config = LoopConfig::new(model.unwrap_or_else(|| config.default_model.clone()))
        .with_max_iterations(config.max_iterations);
    if let Some(prompt) = &config.system_prompt {
        loop_config = loop_config.with_system_prompt(prompt);
    }

    let agent = AgentLoop::new(provider, tools, loop_config);

    match message {
        Some(message) => {
            let mut history = vec![Message::user(message)];
            run_turn(&agent, &mut history).await;
        }
        None => interactive(&agent).await?,
    }

    Ok(())
}

async fn interactive(agent: &AgentLoop) -> Result<(), Box<dyn std::error::Error>> {
    let mut history: Vec<Message> = Vec::new();
    let stdin = std::io::stdin();

    println!("hearth chat — empty line or Ctrl-D to exit");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        history.push(Message::user(line));
        run_turn(agent, &mut history).await;
    }

    Ok(())
}

/// Run one loop invocation, rendering events and folding the turn's
/// outcome back into the history the same way the gateway persists it.
async fn run_turn(agent: &AgentLoop, history: &mut Vec<Message>) {
    let mut rx = agent.run_stream(history);
    let mut in_thinking = false;

    while let Some(event) = rx.recv().await {
        match event {
            LoopEvent::Thinking { content } => {
                if !in_thinking {
                    print!("{DIM}");
                    in_thinking = true;
                }
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            LoopEvent::TextDelta { content } => {
                if in_thinking {
                    print!("{RESET}\n");
                    in_thinking = false;
                }
                print!("{content}");
                let _ = std::io::stdout().flush();
            }
            LoopEvent::ToolCall { call } => {
                if in_thinking {
                    print!("{RESET}\n");
                    in_thinking = false;
                }
                println!("{DIM}[tool] {}({}){RESET}", call.name, call.arguments);
                history.push(Message::assistant_tool_calls(vec![call]));
            }
            LoopEvent::ToolResult { call_id, result } => {
                let preview: String = result.chars().take(200).collect();
                println!("{DIM}[result] {preview}{RESET}");
                history.push(Message::tool_result(&call_id, &result));
            }
            LoopEvent::Text { content } => {
                history.push(Message::assistant(content));
            }
            LoopEvent::Error { message } => {
                if in_thinking {
                    print!("{RESET}");
                    in_thinking = false;
                }
                eprintln!("\nerror: {message}");
            }
            LoopEvent::Done => {
                if in_thinking {
                    print!("{RESET}");
                }
                println!();
            }
            LoopEvent::Conversation { .. } => {}
        }
    }
}
