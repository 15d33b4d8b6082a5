//! Stream Worker
//!
//! Drives one model's contribution to one turn: opens the connection, feeds
//! the body through its own [`EventDecoder`], accumulates deltas and writes
//! them into the single assistant message it owns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::accumulator::{apply_summary, TurnAccumulator};
use crate::backend::{BackendError, CompletionBackend, CompletionRequest};
use crate::messages::{ChatMessage, MessageId};
use crate::protocol::{CompletionSummary, EventDecoder, StreamEvent};
use crate::session::SessionSlot;
use crate::store::ConversationStore;

// ============================================================================
// Outcome
// ============================================================================

/// How a worker's turn ended without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The backend finished the turn
    Completed,
    /// The turn was aborted; partial output is kept
    Cancelled,
}

/// Why a worker's turn failed
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The connection could not be opened
    #[error("{0}")]
    Open(#[from] BackendError),

    /// The backend reported an error event
    #[error("{0}")]
    Backend(String),

    /// The connection broke mid-stream
    #[error("Connection lost: {0}")]
    Transport(String),

    /// The body ended before any terminal event
    #[error("Stream ended before completion")]
    StreamEnded,
}

/// Counters for one worker run
#[derive(Clone, Debug, Default)]
pub struct WorkerStats {
    /// Body chunks received
    pub chunks_received: u64,
    /// Body bytes received
    pub bytes_received: u64,
    /// Events that changed the message
    pub events_applied: u64,
    /// Records the decoder skipped
    pub skipped_records: u64,
    /// Time from start to the first text delta
    pub time_to_first_delta: Option<Duration>,
    /// Total run time
    pub duration: Duration,
}

// ============================================================================
// Active Message
// ============================================================================

/// Write access to exactly one message in the store
#[derive(Clone, Debug)]
pub struct ActiveMessage {
    store: ConversationStore,
    id: MessageId,
}

impl ActiveMessage {
    /// Bind a handle to a message id
    #[must_use]
    pub fn new(store: ConversationStore, id: MessageId) -> Self {
        Self { store, id }
    }

    /// The owned message id
    #[must_use]
    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// Mutate the owned message; `false` if it no longer exists
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        self.store.mutate(&self.id, f)
    }
}

// ============================================================================
// Worker
// ============================================================================

/// One streamed completion for one target model
pub struct StreamWorker {
    backend: Arc<dyn CompletionBackend>,
    request: CompletionRequest,
    message: ActiveMessage,
    session: SessionSlot,
    cancel: CancellationToken,
    accumulator: TurnAccumulator,
    decoder: EventDecoder,
    stats: WorkerStats,
    started: Instant,
}

impl StreamWorker {
    /// Create a worker that streams `request` into `message`
    #[must_use]
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        request: CompletionRequest,
        message: ActiveMessage,
        session: SessionSlot,
        cancel: CancellationToken,
    ) -> Self {
        let accumulator = TurnAccumulator::new(request.tools_enabled.unwrap_or(false));
        Self {
            backend,
            request,
            message,
            session,
            cancel,
            accumulator,
            decoder: EventDecoder::new(),
            stats: WorkerStats::default(),
            started: Instant::now(),
        }
    }

    /// Run the stream to a terminal state.
    ///
    /// The owned message is always frozen (`streaming == false`) when this
    /// returns, whatever the result.
    pub async fn run(mut self) -> Result<WorkerOutcome, WorkerError> {
        let span = tracing::info_span!(
            "stream_worker",
            model = %self.request.model,
            message_id = %self.message.id(),
        );

        async move {
            self.started = Instant::now();
            let result = self.stream().await;

            self.stats.duration = self.started.elapsed();
            self.stats.skipped_records = self.decoder.stats().skipped_records;
            let stats = &self.stats;
            match &result {
                Ok(outcome) => tracing::info!(
                    ?outcome,
                    chunks = stats.chunks_received,
                    bytes = stats.bytes_received,
                    events = stats.events_applied,
                    skipped = stats.skipped_records,
                    first_delta = ?stats.time_to_first_delta,
                    duration = ?stats.duration,
                    "Stream finished"
                ),
                Err(e) => tracing::warn!(
                    error = %e,
                    chunks = stats.chunks_received,
                    bytes = stats.bytes_received,
                    duration = ?stats.duration,
                    "Stream failed"
                ),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn stream(&mut self) -> Result<WorkerOutcome, WorkerError> {
        let cancel = self.cancel.clone();

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.backend.open_stream(&self.request) => Some(result),
        };
        let mut body = match opened {
            None => return Ok(self.cancelled()),
            Some(Ok(body)) => body,
            Some(Err(_)) if cancel.is_cancelled() => return Ok(self.cancelled()),
            Some(Err(e)) => {
                self.freeze();
                return Err(WorkerError::Open(e));
            }
        };
        tracing::debug!(backend = self.backend.name(), "Stream opened");

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                next = body.next() => Some(next),
            };
            // Dropping the body aborts the connection
            let Some(next) = next else {
                drop(body);
                return Ok(self.cancelled());
            };

            match next {
                Some(Ok(chunk)) => {
                    self.stats.chunks_received += 1;
                    self.stats.bytes_received += chunk.len() as u64;
                    self.decoder.push(&chunk);
                    if let Some(result) = self.drain_decoded() {
                        return result;
                    }
                    if self.decoder.is_terminated() {
                        return Ok(self.complete(&CompletionSummary::default(), false));
                    }
                }
                Some(Err(_)) if cancel.is_cancelled() => return Ok(self.cancelled()),
                Some(Err(e)) => {
                    self.freeze();
                    return Err(WorkerError::Transport(e.to_string()));
                }
                None => {
                    self.decoder.finish();
                    if let Some(result) = self.drain_decoded() {
                        return result;
                    }
                    if self.decoder.is_terminated() {
                        return Ok(self.complete(&CompletionSummary::default(), false));
                    }
                    self.freeze();
                    return Err(WorkerError::StreamEnded);
                }
            }
        }
    }

    /// Apply every decoded event; `Some` once a terminal event was handled
    fn drain_decoded(&mut self) -> Option<Result<WorkerOutcome, WorkerError>> {
        while let Some(event) = self.decoder.next_event() {
            if let Some(result) = self.handle_event(event) {
                return Some(result);
            }
        }
        None
    }

    fn handle_event(&mut self, event: StreamEvent) -> Option<Result<WorkerOutcome, WorkerError>> {
        tracing::trace!(kind = event.kind(), "Stream event");

        match event {
            StreamEvent::Connected { session_id } => {
                if let Some(id) = session_id {
                    self.session.adopt(id);
                }
                None
            }
            StreamEvent::Done(summary) => Some(Ok(self.complete(&summary, false))),
            StreamEvent::Cancelled(summary) => Some(Ok(self.complete(&summary, true))),
            StreamEvent::Error { .. } if self.cancel.is_cancelled() => Some(Ok(self.cancelled())),
            StreamEvent::Error { error } => {
                self.freeze();
                Some(Err(WorkerError::Backend(error)))
            }
            event => {
                if self.accumulator.apply(&event) {
                    self.stats.events_applied += 1;
                    if self.stats.time_to_first_delta.is_none()
                        && matches!(event, StreamEvent::Content { .. } | StreamEvent::Thinking { .. })
                    {
                        self.stats.time_to_first_delta = Some(self.started.elapsed());
                    }
                    let accumulator = &self.accumulator;
                    self.message.update(|m| accumulator.write_into(m));
                }
                None
            }
        }
    }

    fn complete(&mut self, summary: &CompletionSummary, cancelled: bool) -> WorkerOutcome {
        self.accumulator.absorb_final(summary);
        let accumulator = &self.accumulator;
        self.message.update(|m| {
            accumulator.write_into(m);
            apply_summary(m, summary);
            m.cancelled = cancelled;
            m.streaming = false;
        });
        if cancelled {
            WorkerOutcome::Cancelled
        } else {
            WorkerOutcome::Completed
        }
    }

    fn cancelled(&mut self) -> WorkerOutcome {
        tracing::debug!("Stream cancelled");
        self.complete(&CompletionSummary::default(), true)
    }

    /// Freeze after a failure; `cancelled` stays untouched
    fn freeze(&self) {
        let accumulator = &self.accumulator;
        self.message.update(|m| {
            accumulator.write_into(m);
            m.streaming = false;
        });
    }
}
