//! The Hearth agent loop.
//!
//! [`AgentLoop`] drives one chat request end to end: it streams model
//! turns from a [`Provider`](hearth_core::Provider), forwards thinking
//! and text deltas as they arrive, dispatches tool calls through the
//! registry, folds tool results back into the conversation, and bounds
//! the number of turns. Consumers read the resulting [`LoopEvent`]
//! stream; dropping it cancels the whole pipeline down to the backend
//! request.

pub mod loop_runner;
pub mod stream_event;

pub use loop_runner::{AgentLoop, LoopConfig};
pub use stream_event::LoopEvent;
