//! The consumer-facing event stream adapter.
//!
//! Wraps the agent loop's event channel as a `Stream` with the
//! delivery guarantees the SSE endpoint promises:
//!
//! - the stream closes right after the `done` event;
//! - a loop that dies without yielding `done` produces a synthetic
//!   `error` followed by `done`, so consumers always see a terminal
//!   pair;
//! - dropping the adapter before `done` (client disconnect) fires an
//!   injectable cancellation callback and, by dropping the channel,
//!   cancels the loop, the provider turn, and the backend request.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::warn;

use hearth_agent::LoopEvent;

type CancelHook = Box<dyn FnOnce() + Send>;

/// Adapts a loop event channel into a terminating event stream.
pub struct EventStreamAdapter {
    rx: mpsc::Receiver<LoopEvent>,
    /// Synthetic terminal events queued after an abnormal close.
    trailer: VecDeque<LoopEvent>,
    /// Set once `done` has been yielded; the stream is over.
    finished: bool,
    on_cancel: Option<CancelHook>,
}

impl EventStreamAdapter {
    pub fn new(rx: mpsc::Receiver<LoopEvent>) -> Self {
        Self {
            rx,
            trailer: VecDeque::new(),
            finished: false,
            on_cancel: None,
        }
    }

    /// Install a callback invoked if the consumer abandons the stream
    /// before `done`.
    pub fn on_cancel(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(hook));
        self
    }

    fn yield_event(&mut self, event: LoopEvent) -> Poll<Option<LoopEvent>> {
        if event.is_done() {
            self.finished = true;
            // Normal completion; the cancel hook must not fire.
            self.on_cancel = None;
        }
        Poll::Ready(Some(event))
    }
}

impl Stream for EventStreamAdapter {
    type Item = LoopEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        if let Some(event) = this.trailer.pop_front() {
            return this.yield_event(event);
        }

        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => this.yield_event(event),
            Poll::Ready(None) => {
                // The loop went away without a terminal event. That is
                // a bug upstream, but the consumer still gets a
                // well-formed ending.
                warn!("Loop channel closed without done; synthesizing terminal events");
                this.trailer.push_back(LoopEvent::Done);
                this.yield_event(LoopEvent::Error {
                    message: "Agent loop terminated unexpectedly".into(),
                })
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for EventStreamAdapter {
    fn drop(&mut self) {
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
    }
}

/// Encode one event as an SSE frame body (the `data:` prefix and
/// blank-line delimiter are added by axum).
pub fn encode_event(event: &LoopEvent) -> String {
    serde_json::to_string(event).unwrap_or_default()
}
