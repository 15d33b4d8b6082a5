//! Stream Workers
//!
//! One worker drives one model's contribution to one turn.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── StreamWorker ────────────────────────┐
//! │                                                              │
//! │  CompletionBackend ──chunks──▶ EventDecoder ──events──┐      │
//! │        ▲                                              ▼      │
//! │        │ drop on cancel                      TurnAccumulator │
//! │  CancellationToken                                    │      │
//! │                                                       ▼      │
//! │                         ActiveMessage ──mutate(id)──▶ Store  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Workers of the same turn share nothing but the store (each through its own
//! message id) and the session slot (adopt-once).

mod accumulator;
mod worker;

pub use accumulator::{apply_summary, TurnAccumulator};
pub use worker::{ActiveMessage, StreamWorker, WorkerError, WorkerOutcome, WorkerStats};
