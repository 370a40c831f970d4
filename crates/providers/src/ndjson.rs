//! Streaming decoder for newline-delimited JSON response bodies.
//!
//! The backend streams one JSON object per `\n`. Network reads land on
//! arbitrary boundaries, so the decoder must hold both incomplete
//! UTF-8 sequences and incomplete frames across reads. Frames are
//! yielded atomically once their delimiter arrives; trailing bytes
//! after the last delimiter are flushed as a final frame at
//! end-of-stream.

use hearth_core::error::ProviderError;

/// Incremental bytes → frames decoder.
///
/// Feed network reads with [`push`](Self::push); call
/// [`finish`](Self::finish) exactly once at end-of-stream.
pub struct NdjsonDecoder {
    /// Bytes not yet decodable as UTF-8 (an incomplete code point).
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a delimiter.
    line: String,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            line: String::new(),
        }
    }

    /// Consume one read's worth of bytes, returning every frame it
    /// completes (possibly none).
    ///
    /// Fails the stream on invalid UTF-8. An incomplete multi-byte
    /// sequence at the end of the read is held until the next read.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ProviderError> {
        self.pending.extend_from_slice(bytes);

        let valid_up_to = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(ProviderError::MalformedFrame(format!(
                    "invalid UTF-8 at byte {} of response stream",
                    e.valid_up_to()
                )));
            }
        };

        if valid_up_to > 0 {
            // The prefix was just validated, so this is lossless.
            self.line
                .push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
            self.pending.drain(..valid_up_to);
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let frame: String = self.line.drain(..=pos).collect();
            let frame = frame.trim_end_matches(['\n', '\r']);
            if !frame.is_empty() {
                frames.push(frame.to_string());
            }
        }
        Ok(frames)
    }

    /// Flush the trailing partial frame at end-of-stream, if any.
    ///
    /// Fails if the stream ended mid-code-point.
    pub fn finish(mut self) -> Result<Option<String>, ProviderError> {
        if !self.pending.is_empty() {
            return Err(ProviderError::MalformedFrame(
                "response stream ended inside a multi-byte character".into(),
            ));
        }
        let rest = std::mem::take(&mut self.line);
        let rest = rest.trim_end_matches(['\n', '\r']);
        if rest.is_empty() {
            Ok(None)
        } else {
            Ok(Some(rest.to_string()))
        }
    }
}

impl Default for NdjsonDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_complete_frame() {
        let mut dec = NdjsonDecoder::new();
        let frames = dec.push(b"{\"done\":false}\n").unwrap();
        assert_eq!(frames, vec![r#"{"done":false}"#]);
        assert_eq!(dec.finish().unwrap(), None);
    }

    #[test]
    fn multiple_frames_in_one_read() {
        let mut dec = NdjsonDecoder::new();
        let frames = dec.push(b"{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], r#"{"a":1}"#);
        assert_eq!(frames[1], r#"{"b":2}"#);
    }

    #[test]
    fn frame_split_across_reads() {
        let mut dec = NdjsonDecoder::new();
        assert!(dec.push(b"{\"content\":").unwrap().is_empty());
        let frames = dec.push(b"\"hi\"}\n").unwrap();
        assert_eq!(frames, vec![r#"{"content":"hi"}"#]);
    }

    #[test]
    fn multibyte_character_split_across_reads() {
        // "é" is 0xC3 0xA9.
        let mut dec = NdjsonDecoder::new();
        assert!(dec.push(b"{\"c\":\"caf\xc3").unwrap().is_empty());
        let frames = dec.push(b"\xa9\"}\n").unwrap();
        assert_eq!(frames, vec!["{\"c\":\"café\"}"]);
    }

    #[test]
    fn four_byte_character_split_three_ways() {
        // "🦀" is F0 9F A6 80.
        let mut dec = NdjsonDecoder::new();
        assert!(dec.push(b"\"\xf0\x9f").unwrap().is_empty());
        assert!(dec.push(b"\xa6").unwrap().is_empty());
        let frames = dec.push(b"\x80\"\n").unwrap();
        assert_eq!(frames, vec!["\"🦀\""]);
    }

    #[test]
    fn invalid_utf8_fails_the_stream() {
        let mut dec = NdjsonDecoder::new();
        let err = dec.push(b"ok\xff\xfe").unwrap_err();
        assert!(matches!(err, ProviderError::MalformedFrame(_)));
    }

    #[test]
    fn trailing_frame_flushed_at_eof() {
        let mut dec = NdjsonDecoder::new();
        assert!(dec.push(b"{\"last\":true}").unwrap().is_empty());
        assert_eq!(dec.finish().unwrap(), Some(r#"{"last":true}"#.to_string()));
    }

    #[test]
    fn eof_inside_multibyte_sequence_fails() {
        let mut dec = NdjsonDecoder::new();
        dec.push(b"x\xc3").unwrap();
        assert!(dec.finish().is_err());
    }

    #[test]
    fn crlf_delimiters_are_stripped() {
        let mut dec = NdjsonDecoder::new();
        let frames = dec.push(b"{\"a\":1}\r\n").unwrap();
        assert_eq!(frames, vec![r#"{"a":1}"#]);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut dec = NdjsonDecoder::new();
        let frames = dec.push(b"\n\n{\"a\":1}\n\n").unwrap();
        assert_eq!(frames, vec![r#"{"a":1}"#]);
    }
}
