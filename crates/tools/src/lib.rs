//! Built-in tool implementations for Hearth.
//!
//! Tools give the agent the ability to act: run shell commands and
//! read/write files. All three are sandboxed — the shell by a command
//! allowlist, the file tools by path validation.

pub mod file_read;
pub mod file_write;
pub mod path;
pub mod shell;

use hearth_core::tool::ToolRegistry;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use shell::ShellTool;

/// Create a default tool registry with all built-in tools.
///
/// Security defaults:
/// - Shell: only common safe commands (ls, cat, grep, git, ...)
/// - File read/write: sensitive paths (~/.ssh, /etc/shadow, ...) blocked
pub fn default_registry() -> ToolRegistry {
    let safe_commands: Vec<String> = [
        "ls", "cat", "head", "tail", "echo", "pwd", "date", "whoami", "wc", "grep", "find",
        "which", "git", "cargo", "rustc",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let forbidden_paths: Vec<String> = [
        "~/.ssh",
        "~/.gnupg",
        "~/.aws",
        "/etc/shadow",
        "/etc/passwd",
        "/etc/sudoers",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(ShellTool::new(safe_commands)));
    registry.register(Box::new(FileReadTool::with_restrictions(
        Vec::new(),
        forbidden_paths.clone(),
    )));
    registry.register(Box::new(FileWriteTool::with_restrictions(
        Vec::new(),
        forbidden_paths,
    )));
    registry
}
