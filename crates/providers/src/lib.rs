//! Model backend providers for Hearth.
//!
//! The only shipped backend is [`OllamaProvider`], which streams
//! newline-delimited JSON from a local Ollama server. The streaming
//! plumbing is split into three layers:
//!
//! - [`ndjson::NdjsonDecoder`] — byte stream → complete frames,
//!   tolerant of multi-byte characters and frames split across reads.
//! - [`think::ThinkTagParser`] — content deltas → thinking vs visible
//!   segments, with tag sentinels surviving chunk boundaries.
//! - [`OllamaProvider`] — wire serialization and the frame loop that
//!   turns backend frames into provider events.

pub mod ndjson;
pub mod ollama;
pub mod think;

pub use ollama::OllamaProvider;
