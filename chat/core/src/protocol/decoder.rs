//! Event Decoder
//!
//! Buffers incoming bytes and yields complete, parsed [`StreamEvent`]s.
//!
//! # Record Format
//!
//! ```text
//! data: {"type":"content","content":"Hel"}\n
//! \n
//! data: {"type":"content","content":"lo"}\n
//! data: [DONE]\n
//! ```
//!
//! Records are newline-delimited. The `data:` prefix is optional so that bare
//! NDJSON streams decode the same way. Other SSE fields and comments are
//! framing and never produce events. `[DONE]` terminates the stream.
//!
//! # Leniency
//!
//! A record that does not parse is logged, counted and skipped. The decoder
//! never fails; the records around a bad one are still emitted in order.

use std::collections::VecDeque;

use super::event::StreamEvent;

/// Sentinel record that ends a stream
pub const TERMINATOR: &str = "[DONE]";

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Counters for one decoder instance
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoderStats {
    /// Bytes pushed into the decoder
    pub bytes_received: u64,
    /// Events successfully decoded
    pub events_decoded: u64,
    /// Records that failed to parse
    pub skipped_records: u64,
}

/// Decoder state machine for streaming event parsing
#[derive(Debug)]
pub struct EventDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Parsed events waiting to be taken
    ready: VecDeque<StreamEvent>,
    terminated: bool,
    stats: DecoderStats,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            ready: VecDeque::new(),
            terminated: false,
            stats: DecoderStats::default(),
        }
    }

    /// Append bytes to the buffer and parse every complete line in it
    pub fn push(&mut self, data: &[u8]) {
        if self.terminated {
            return;
        }
        self.stats.bytes_received += data.len() as u64;

        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);

        while !self.terminated {
            let Some(offset) = self.buffer[self.read_pos..]
                .iter()
                .position(|&b| b == b'\n')
            else {
                break;
            };
            let line_end = self.read_pos + offset;
            let line = self.buffer[self.read_pos..line_end].to_vec();
            self.read_pos = line_end + 1;
            self.handle_line(&line);
        }

        if self.terminated {
            self.clear_buffer();
        }
    }

    /// Signal end of transport; a final unterminated line is decoded now
    pub fn finish(&mut self) {
        if !self.terminated && self.read_pos < self.buffer.len() {
            let line = self.buffer[self.read_pos..].to_vec();
            self.handle_line(&line);
        }
        self.clear_buffer();
    }

    /// Take the next decoded event, in receipt order
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        self.ready.pop_front()
    }

    /// Iterate over every event decoded so far
    pub fn drain_events(&mut self) -> impl Iterator<Item = StreamEvent> + '_ {
        self.ready.drain(..)
    }

    /// Whether the terminator record has been seen
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Bytes buffered but not yet part of a complete line
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Decoder counters
    #[must_use]
    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }

    fn handle_line(&mut self, raw: &[u8]) {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        let Some(payload) = record_payload(line) else {
            return;
        };

        if payload == TERMINATOR {
            tracing::trace!("Stream terminator received");
            self.terminated = true;
            return;
        }

        match serde_json::from_str::<StreamEvent>(payload) {
            Ok(event) => {
                self.stats.events_decoded += 1;
                self.ready.push_back(event);
            }
            Err(e) => {
                self.stats.skipped_records += 1;
                tracing::warn!(
                    error = %e,
                    record = %truncate_for_log(payload),
                    "Skipping malformed stream record"
                );
            }
        }
    }
}

/// Extract the record payload from one line, or `None` for framing lines
fn record_payload(line: &str) -> Option<&str> {
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }

    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim();
        return (!data.is_empty()).then_some(data);
    }

    // Other SSE fields carry no records
    for field in ["event:", "id:", "retry:"] {
        if line.starts_with(field) {
            return None;
        }
    }

    Some(line.trim())
}

fn truncate_for_log(payload: &str) -> String {
    const MAX: usize = 200;
    if payload.len() <= MAX {
        return payload.to_string();
    }
    let mut end = MAX;
    while !payload.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &payload[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::event::CompletionSummary;
    use pretty_assertions::assert_eq;

    fn decode_all(chunks: &[&[u8]]) -> Vec<StreamEvent> {
        let mut decoder = EventDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            decoder.push(chunk);
            events.extend(decoder.drain_events());
        }
        decoder.finish();
        events.extend(decoder.drain_events());
        events
    }

    fn content(text: &str) -> StreamEvent {
        StreamEvent::Content {
            content: text.to_string(),
        }
    }

    const SAMPLE: &str = concat!(
        "data: {\"type\":\"connected\",\"session_id\":\"s1\"}\n\n",
        "data: {\"type\":\"thinking\",\"content\":\"plan\"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"héllo \"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"wörld ✓\"}\n\n",
        "data: {\"type\":\"done\",\"output_tokens\":3}\n\n",
        "data: [DONE]\n\n",
    );

    #[test]
    fn test_decode_sse_records() {
        let events = decode_all(&[SAMPLE.as_bytes()]);
        assert_eq!(events.len(), 5);
        assert!(matches!(events[0], StreamEvent::Connected { .. }));
        assert_eq!(events[2], content("héllo "));
        assert_eq!(events[3], content("wörld ✓"));
        assert!(matches!(events[4], StreamEvent::Done(_)));
    }

    #[test]
    fn test_decode_bare_ndjson() {
        let input = b"{\"type\":\"content\",\"content\":\"a\"}\r\n{\"type\":\"content\",\"content\":\"b\"}\n";
        assert_eq!(decode_all(&[input]), vec![content("a"), content("b")]);
    }

    #[test]
    fn test_fragmentation_invariance_at_every_split() {
        let bytes = SAMPLE.as_bytes();
        let expected = decode_all(&[bytes]);

        // Splits include points inside multi-byte characters
        for split in 0..=bytes.len() {
            let (head, tail) = bytes.split_at(split);
            assert_eq!(decode_all(&[head, tail]), expected, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let bytes = SAMPLE.as_bytes();
        let chunks: Vec<&[u8]> = bytes.chunks(1).collect();
        assert_eq!(decode_all(&chunks), decode_all(&[bytes]));
    }

    #[test]
    fn test_partial_line_is_held_back() {
        let mut decoder = EventDecoder::new();
        decoder.push(b"data: {\"type\":\"content\",");
        assert!(decoder.next_event().is_none());
        assert!(decoder.pending_bytes() > 0);

        decoder.push(b"\"content\":\"x\"}\n");
        assert_eq!(decoder.next_event(), Some(content("x")));
        assert_eq!(decoder.pending_bytes(), 0);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let input = concat!(
            "data: {\"type\":\"content\",\"content\":\"one\"}\n",
            "data: {not json at all\n",
            "data: {\"type\":\"content\",\"content\":\"two\"}\n",
        );
        let mut decoder = EventDecoder::new();
        decoder.push(input.as_bytes());

        let events: Vec<_> = decoder.drain_events().collect();
        assert_eq!(events, vec![content("one"), content("two")]);
        assert_eq!(decoder.stats().skipped_records, 1);
        assert_eq!(decoder.stats().events_decoded, 2);
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let input = "data: {\"type\":\"ping\"}\ndata: {\"type\":\"content\",\"content\":\"ok\"}\n";
        assert_eq!(decode_all(&[input.as_bytes()]), vec![content("ok")]);
    }

    #[test]
    fn test_terminator_stops_decoding() {
        let mut decoder = EventDecoder::new();
        decoder.push(b"data: {\"type\":\"content\",\"content\":\"a\"}\ndata: [DONE]\ndata: {\"type\":\"content\",\"content\":\"late\"}\n");
        assert!(decoder.is_terminated());

        decoder.push(b"data: {\"type\":\"content\",\"content\":\"later\"}\n");
        decoder.finish();

        let events: Vec<_> = decoder.drain_events().collect();
        assert_eq!(events, vec![content("a")]);
    }

    #[test]
    fn test_bare_terminator() {
        let mut decoder = EventDecoder::new();
        decoder.push(b"[DONE]\n");
        assert!(decoder.is_terminated());
    }

    #[test]
    fn test_framing_lines_are_ignored() {
        let input = concat!(
            ": keep-alive\n",
            "event: message\n",
            "id: 7\n",
            "retry: 1000\n",
            "data:\n",
            "\n",
            "data: {\"type\":\"cancelled\"}\n",
        );
        let mut decoder = EventDecoder::new();
        decoder.push(input.as_bytes());

        let events: Vec<_> = decoder.drain_events().collect();
        assert_eq!(
            events,
            vec![StreamEvent::Cancelled(CompletionSummary::default())]
        );
        assert_eq!(decoder.stats().skipped_records, 0);
    }

    #[test]
    fn test_finish_flushes_unterminated_record() {
        let mut decoder = EventDecoder::new();
        decoder.push(b"data: {\"type\":\"content\",\"content\":\"tail\"}");
        assert!(decoder.next_event().is_none());

        decoder.finish();
        assert_eq!(decoder.next_event(), Some(content("tail")));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_for_log(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 203);
    }
}
