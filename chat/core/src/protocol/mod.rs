//! Completion Stream Protocol
//!
//! The gateway answers a completion request with a line-oriented stream of
//! JSON records, each tagged by a `type` field, and ends it with a `[DONE]`
//! sentinel. This module turns raw (arbitrarily fragmented) bytes into typed
//! events.
//!
//! # Architecture
//!
//! ```text
//!   bytes chunk ──push()──▶ EventDecoder ──next_event()──▶ StreamEvent
//!                            │ line buffer
//!                            │ data: prefix / framing
//!                            │ lenient JSON parse
//!                            └ [DONE] terminator
//! ```
//!
//! # Example
//!
//! ```ignore
//! use chat_core::protocol::{EventDecoder, StreamEvent};
//!
//! let mut decoder = EventDecoder::new();
//! decoder.push(b"data: {\"type\":\"content\",\"content\":\"hi\"}\n");
//! while let Some(event) = decoder.next_event() {
//!     println!("{}", event.kind());
//! }
//! ```

mod decoder;
mod event;

pub use decoder::{DecoderStats, EventDecoder, TERMINATOR};
pub use event::{tool_result_status, CompletionSummary, StreamEvent};
