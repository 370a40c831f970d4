//! Think-tag state machine.
//!
//! Local reasoning models wrap their hidden chain-of-thought in
//! literal `<think>` / `</think>` sentinels inside the ordinary
//! content stream. This parser classifies every character as thinking
//! or visible text, surviving sentinels split across arbitrary chunk
//! boundaries. No regex: the sentinel boundary must be observable
//! per character so a half-sentinel at a read boundary stays intact.
//!
//! Matching is exact and case-sensitive. A `<think>` inside a thinking
//! segment is literal text (no nesting).

use hearth_core::provider::ProviderEvent;

const OPEN_TAG: &str = "<think>";
const CLOSE_TAG: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    /// In visible text.
    Outside,
    /// Accumulating a possible `<think>`.
    MaybeOpen,
    /// In thinking text.
    Inside,
    /// Accumulating a possible `</think>`.
    MaybeClose,
}

/// Splits a chunked character stream into thinking and visible
/// segments.
///
/// One parser instance lives for exactly one provider turn. Feed
/// chunks with [`push`](Self::push); call [`finish`](Self::finish)
/// once at end-of-turn to flush anything still buffered.
pub struct ThinkTagParser {
    state: TagState,
    /// Partial sentinel match, at most `</think>` long.
    partial: String,
    visible: String,
    thinking: String,
}

impl ThinkTagParser {
    pub fn new() -> Self {
        Self {
            state: TagState::Outside,
            partial: String::new(),
            visible: String::new(),
            thinking: String::new(),
        }
    }

    /// Process one input chunk, returning the events it completes.
    ///
    /// A chunk yields its events in input order. The partial-sentinel
    /// accumulator and state survive to the next chunk.
    pub fn push(&mut self, chunk: &str) -> Vec<ProviderEvent> {
        let mut events = Vec::new();
        for ch in chunk.chars() {
            self.step(ch, &mut events);
        }
        self.flush(&mut events);
        events
    }

    /// Flush whatever remains at end-of-turn.
    ///
    /// A pending sentinel prefix is emitted as part of its surrounding
    /// segment: a half-open `<think` becomes visible text, a half-open
    /// `</think` becomes thinking text.
    pub fn finish(mut self) -> Vec<ProviderEvent> {
        match self.state {
            TagState::MaybeOpen => {
                let partial = std::mem::take(&mut self.partial);
                self.visible.push_str(&partial);
            }
            TagState::MaybeClose => {
                let partial = std::mem::take(&mut self.partial);
                self.thinking.push_str(&partial);
            }
            TagState::Outside | TagState::Inside => {}
        }
        let mut events = Vec::new();
        self.flush(&mut events);
        events
    }

    fn step(&mut self, ch: char, events: &mut Vec<ProviderEvent>) {
        match self.state {
            TagState::Outside => {
                if ch == '<' {
                    self.flush_visible(events);
                    self.partial.push('<');
                    self.state = TagState::MaybeOpen;
                } else {
                    self.visible.push(ch);
                }
            }
            TagState::MaybeOpen => {
                self.partial.push(ch);
                if self.partial == OPEN_TAG {
                    self.partial.clear();
                    self.state = TagState::Inside;
                } else if !OPEN_TAG.starts_with(self.partial.as_str()) {
                    // Dead start. Everything buffered before this
                    // character can no longer open a tag; it belongs
                    // to the visible segment. The current character is
                    // re-processed from Outside so `<<` re-arms the
                    // matcher.
                    self.partial.pop();
                    let dead = std::mem::take(&mut self.partial);
                    self.visible.push_str(&dead);
                    self.state = TagState::Outside;
                    self.step(ch, events);
                }
            }
            TagState::Inside => {
                if ch == '<' {
                    self.flush_thinking(events);
                    self.partial.push('<');
                    self.state = TagState::MaybeClose;
                } else {
                    self.thinking.push(ch);
                }
            }
            TagState::MaybeClose => {
                self.partial.push(ch);
                if self.partial == CLOSE_TAG {
                    self.partial.clear();
                    self.state = TagState::Outside;
                } else if !CLOSE_TAG.starts_with(self.partial.as_str()) {
                    // Dead start inside a thinking segment; mirror of
                    // the MaybeOpen case.
                    self.partial.pop();
                    let dead = std::mem::take(&mut self.partial);
                    self.thinking.push_str(&dead);
                    self.state = TagState::Inside;
                    self.step(ch, events);
                }
            }
        }
    }

    fn flush(&mut self, events: &mut Vec<ProviderEvent>) {
        // Segment buffers are flushed on every transition, so at most
        // one of the two is non-empty here.
        self.flush_visible(events);
        self.flush_thinking(events);
    }

    fn flush_visible(&mut self, events: &mut Vec<ProviderEvent>) {
        if !self.visible.is_empty() {
            events.push(ProviderEvent::TextDelta {
                content: std::mem::take(&mut self.visible),
            });
        }
    }

    fn flush_thinking(&mut self, events: &mut Vec<ProviderEvent>) {
        if !self.thinking.is_empty() {
            events.push(ProviderEvent::Thinking {
                content: std::mem::take(&mut self.thinking),
            });
        }
    }
}

impl Default for ThinkTagParser {
    fn default() -> Self {
        Self::new()
    }
}
