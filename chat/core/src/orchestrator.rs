//! Chat Orchestrator - The Conversation Core
//!
//! The orchestrator is the entry point UI surfaces talk to. It owns:
//! - the conversation store and the current session id
//! - session-wide status, error and cancellation
//! - fan-out of one stream worker per target model, and the join on all of them
//!
//! # Design Philosophy
//!
//! The orchestrator is UI-agnostic. A surface sends turns, cancels, edits and
//! regenerates through `&self` methods and observes results through the store
//! snapshot, [`ConversationStore::subscribe`] and [`ChatOrchestrator::subscribe_status`].
//! Misuse (sending while busy, editing an unknown id) is absorbed, logged and
//! reported as [`TurnOutcome::Ignored`] or `false`, never as an error.
//!
//! # Status Machine
//!
//! ```text
//! Idle ──send──▶ Connecting ──spawned──▶ Streaming ──all settled──▶ Idle
//!   ▲                                        │   └──any failure───▶ Error
//!   │                                     cancel                      │
//!   └──────────── all settled ◀── Cancelling                    send (retry)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, CompletionBackend, CompletionRequest, SessionStore};
use crate::config::ChatConfig;
use crate::messages::{ChatMessage, MessageId, MessageRole, ResponseGroupId, SessionId};
use crate::session::{transcript_to_messages, SessionSlot};
use crate::store::ConversationStore;
use crate::streaming::{ActiveMessage, StreamWorker, WorkerOutcome};

/// Session-wide streaming status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamStatus {
    /// No turn in flight
    #[default]
    Idle,
    /// User message appended, workers being started
    Connecting,
    /// Workers are streaming
    Streaming,
    /// Cancellation requested, waiting for workers to settle
    Cancelling,
    /// The last turn failed; see [`ChatOrchestrator::error`]
    Error,
}

impl StreamStatus {
    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming | Self::Cancelling)
    }
}

/// How a send or regenerate request ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Rejected without side effects (busy, unknown id, nothing to regenerate)
    Ignored,
    /// Every worker completed
    Completed,
    /// The turn was cancelled; partial output is kept
    Cancelled,
    /// At least one worker failed; carries the session error
    Failed(String),
}

#[derive(Debug, Default)]
struct TurnState {
    error: Option<String>,
    cancel: Option<CancellationToken>,
}

/// The conversation orchestrator
pub struct ChatOrchestrator {
    backend: Arc<dyn CompletionBackend>,
    sessions: Arc<dyn SessionStore>,
    config: ChatConfig,
    store: ConversationStore,
    session: SessionSlot,
    /// Error and cancellation; status changes happen under this lock too
    state: Mutex<TurnState>,
    status: watch::Sender<StreamStatus>,
}

impl ChatOrchestrator {
    /// Create an orchestrator with an empty conversation
    pub fn new(
        backend: Arc<dyn CompletionBackend>,
        sessions: Arc<dyn SessionStore>,
        config: ChatConfig,
    ) -> Self {
        let store = ConversationStore::with_capacity(config.broadcast_capacity);
        let (status, _) = watch::channel(StreamStatus::Idle);
        Self {
            backend,
            sessions,
            config,
            store,
            session: SessionSlot::new(),
            state: Mutex::new(TurnState::default()),
            status,
        }
    }

    // ========================================================================
    // Read Side
    // ========================================================================

    /// Snapshot of every message
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.store.snapshot()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> StreamStatus {
        *self.status.borrow()
    }

    /// Whether a turn is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.status().is_busy()
    }

    /// Error of the last failed turn
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    /// Session id, once the gateway assigned one or a session was attached
    #[must_use]
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.session.get()
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    /// The conversation store
    #[must_use]
    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    /// Conversation settings
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Send a user message to `target_models` (the default model if empty)
    /// and wait until every worker settled.
    ///
    /// Dropping the returned future aborts the workers mid-stream.
    pub async fn send_message(
        &self,
        content: impl Into<String>,
        target_models: Vec<String>,
    ) -> TurnOutcome {
        let Some(cancel) = self.try_begin_turn() else {
            return TurnOutcome::Ignored;
        };
        self.run_turn(cancel, content.into(), target_models).await
    }

    /// Re-run the turn that produced `id`.
    ///
    /// Finds the nearest user message at or before `id`, drops it and
    /// everything after it, then sends its content again to the same models.
    /// Truncation starts at that user message rather than at `id`, so the
    /// user turn is re-created instead of duplicated, and sibling answers of
    /// a multi-model turn that sit before `id` are regenerated with it.
    pub async fn regenerate_message(&self, id: &MessageId) -> TurnOutcome {
        let messages = self.store.snapshot();
        let Some(index) = messages.iter().position(|m| &m.id == id) else {
            tracing::debug!(message_id = %id, "Regenerate ignored: unknown message");
            return TurnOutcome::Ignored;
        };
        let Some((user_index, user)) = messages[..=index]
            .iter()
            .enumerate()
            .rev()
            .find(|(_, m)| m.role == MessageRole::User)
        else {
            tracing::debug!(message_id = %id, "Regenerate ignored: no user message before it");
            return TurnOutcome::Ignored;
        };
        let content = user.content.clone();
        let target_models = user.target_models.clone().unwrap_or_default();

        let Some(cancel) = self.try_begin_turn() else {
            return TurnOutcome::Ignored;
        };
        tracing::info!(message_id = %id, from_index = user_index, "Regenerating turn");
        self.store.truncate_from(user_index);
        self.run_turn(cancel, content, target_models).await
    }

    /// Request cancellation of the in-flight turn.
    ///
    /// Returns `false` (and does nothing) unless workers are streaming.
    pub fn cancel_stream(&self) -> bool {
        let state = self.state.lock();
        if self.status() != StreamStatus::Streaming {
            tracing::debug!(status = ?self.status(), "Cancel ignored: not streaming");
            return false;
        }
        let Some(ref cancel) = state.cancel else {
            return false;
        };
        tracing::info!("Cancelling stream");
        self.status.send_replace(StreamStatus::Cancelling);
        cancel.cancel();
        true
    }

    /// Replace the content of a finished message, keeping its history
    pub fn edit_message(&self, id: &MessageId, new_content: impl Into<String>) -> bool {
        match self.store.edit(id, new_content) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "Edit ignored");
                false
            }
        }
    }

    /// Start over: drop every message, the session id and the error
    pub fn clear_messages(&self) -> bool {
        let mut state = self.state.lock();
        if self.status().is_busy() {
            tracing::debug!("Clear ignored: turn in flight");
            return false;
        }
        self.store.clear();
        self.session.clear();
        state.error = None;
        self.status.send_replace(StreamStatus::Idle);
        true
    }

    /// Load a persisted session and make it the current conversation.
    ///
    /// Returns `Ok(false)` if a turn is in flight.
    ///
    /// # Errors
    ///
    /// Returns the backend error if the transcript cannot be loaded; the
    /// current conversation is left untouched.
    pub async fn attach_session(&self, session_id: &SessionId) -> Result<bool, BackendError> {
        if self.is_busy() {
            tracing::debug!(%session_id, "Attach ignored: turn in flight");
            return Ok(false);
        }

        let loaded = self.sessions.load_session(session_id).await?;

        let _state = self.state.lock();
        if self.status().is_busy() {
            tracing::debug!(%session_id, "Attach dropped: a turn started while loading");
            return Ok(false);
        }
        let id = loaded.id.clone();
        let messages = transcript_to_messages(loaded);
        tracing::info!(session_id = %id, messages = messages.len(), "Attached session");
        self.store.replace_all(messages);
        self.session.set(id);
        Ok(true)
    }

    // ========================================================================
    // Turn Internals
    // ========================================================================

    /// Move to `Connecting` if idle (or failed); returns the turn's token
    fn try_begin_turn(&self) -> Option<CancellationToken> {
        let mut state = self.state.lock();
        if self.status().is_busy() {
            tracing::debug!(status = ?self.status(), "Turn ignored: another turn is in flight");
            return None;
        }
        let cancel = CancellationToken::new();
        state.error = None;
        state.cancel = Some(cancel.clone());
        self.status.send_replace(StreamStatus::Connecting);
        Some(cancel)
    }

    async fn run_turn(
        &self,
        cancel: CancellationToken,
        content: String,
        target_models: Vec<String>,
    ) -> TurnOutcome {
        let explicit = normalize_models(target_models);
        let models = if explicit.is_empty() {
            vec![self.config.default_model.clone()]
        } else {
            explicit.clone()
        };

        let mut user = ChatMessage::user(content);
        if !explicit.is_empty() {
            user.target_models = Some(explicit);
        }
        self.store.append(user);

        let history = self
            .store
            .build_history(&self.config.default_model, &self.config.model_names);
        let group = (models.len() > 1).then(ResponseGroupId::new);
        let session_id = self.session.get();

        tracing::info!(
            models = ?models,
            history = history.len(),
            session_id = ?session_id,
            "Starting turn"
        );

        let mut workers = JoinSet::new();
        let mut placeholders = Vec::with_capacity(models.len());
        for model in models {
            let placeholder = ChatMessage::assistant_placeholder(
                model.clone(),
                group.clone(),
                self.config.tools_enabled,
            );
            let message_id = placeholder.id.clone();
            self.store.append(placeholder);

            let mut request = CompletionRequest::new(model.clone(), history.clone())
                .with_temperature(self.config.temperature)
                .with_session(session_id.clone())
                .with_working_dir(self.config.working_dir.clone());
            if self.config.tools_enabled {
                request = request.with_tools(true);
            }

            let worker = StreamWorker::new(
                Arc::clone(&self.backend),
                request,
                ActiveMessage::new(self.store.clone(), message_id.clone()),
                self.session.clone(),
                cancel.child_token(),
            );
            let label = model.clone();
            workers.spawn(async move { (label, worker.run().await) });
            placeholders.push((model, message_id));
        }

        {
            let _state = self.state.lock();
            if self.status() == StreamStatus::Connecting {
                self.status.send_replace(StreamStatus::Streaming);
            }
        }

        // Fan-in: wait for every worker, even after one failed
        let mut failures = Vec::new();
        let mut cancelled = false;
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(WorkerOutcome::Completed))) => {}
                Ok((_, Ok(WorkerOutcome::Cancelled))) => cancelled = true,
                Ok((model, Err(e))) => failures.push(format!("{model}: {e}")),
                Err(e) => tracing::error!(error = %e, "Stream worker task failed"),
            }
        }

        // A worker that died without settling leaves its message streaming
        if self.store.active_count() > 0 {
            for (model, message_id) in &placeholders {
                let orphaned = self
                    .store
                    .get(message_id)
                    .is_some_and(|m| m.streaming);
                if orphaned {
                    self.store.mutate(message_id, |m| m.streaming = false);
                    failures.push(format!("{model}: stream worker stopped unexpectedly"));
                }
            }
        }

        self.finish_turn(&cancel, failures, cancelled)
    }

    fn finish_turn(
        &self,
        cancel: &CancellationToken,
        failures: Vec<String>,
        cancelled: bool,
    ) -> TurnOutcome {
        let mut state = self.state.lock();
        state.cancel = None;

        if !failures.is_empty() {
            let error = failures.join("; ");
            tracing::warn!(error = %error, "Turn failed");
            state.error = Some(error.clone());
            self.status.send_replace(StreamStatus::Error);
            return TurnOutcome::Failed(error);
        }

        self.status.send_replace(StreamStatus::Idle);
        if cancelled || cancel.is_cancelled() {
            tracing::info!("Turn cancelled");
            TurnOutcome::Cancelled
        } else {
            tracing::info!("Turn completed");
            TurnOutcome::Completed
        }
    }
}

/// Trim, drop blanks and de-duplicate while keeping first-seen order
fn normalize_models(models: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(models.len());
    for model in models {
        let model = model.trim();
        if !model.is_empty() && !out.iter().any(|m| m == model) {
            out.push(model.to_string());
        }
    }
    out
}
