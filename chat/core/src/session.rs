//! Session Management
//!
//! The current session id and loading of persisted transcripts.
//!
//! # Design Philosophy
//!
//! The gateway, not the client, creates sessions. A fresh conversation has no
//! id until the first worker sees a `connected` event carrying one. Several
//! workers of one turn may all report an id, so workers only ever adopt into
//! an empty slot. Only the orchestrator replaces or clears the id (attach and
//! clear).

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::PersistedSession;
use crate::messages::{now_ms, ChatMessage, MessageId, MessageRole, SessionId};

/// Shared holder of the current session id
#[derive(Clone, Debug, Default)]
pub struct SessionSlot {
    inner: Arc<RwLock<Option<SessionId>>>,
}

impl SessionSlot {
    /// Create an empty slot
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current session id, if any
    #[must_use]
    pub fn get(&self) -> Option<SessionId> {
        self.inner.read().clone()
    }

    /// Store `id` only if no session is known yet.
    ///
    /// Returns `true` if the id was adopted.
    pub fn adopt(&self, id: SessionId) -> bool {
        let mut slot = self.inner.write();
        if slot.is_some() {
            return false;
        }
        tracing::info!(session_id = %id, "Session assigned by gateway");
        *slot = Some(id);
        true
    }

    /// Replace the session id unconditionally
    pub fn set(&self, id: SessionId) {
        *self.inner.write() = Some(id);
    }

    /// Forget the session id
    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

/// Convert a persisted transcript into store messages.
///
/// Persisted ids are kept. Roles other than user and assistant are dropped,
/// and unparseable timestamps fall back to the current time.
#[must_use]
pub fn transcript_to_messages(session: PersistedSession) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(session.messages.len());

    for persisted in session.messages {
        let role = match persisted.role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            other => {
                tracing::debug!(role = other, id = %persisted.id, "Skipping persisted message with unsupported role");
                continue;
            }
        };

        let mut message = ChatMessage::new(role, persisted.content);
        message.id = MessageId(persisted.id);
        message.timestamp = persisted
            .created_at
            .as_deref()
            .and_then(parse_timestamp_ms)
            .unwrap_or_else(now_ms);
        if role == MessageRole::Assistant {
            message.agent_model = persisted.agent_name;
        }
        messages.push(message);
    }

    messages
}

fn parse_timestamp_ms(raw: &str) -> Option<u64> {
    let parsed = chrono::DateTime::parse_from_rfc3339(raw).ok()?;
    u64::try_from(parsed.timestamp_millis()).ok()
}
