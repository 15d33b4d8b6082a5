//! Conversation Store
//!
//! The ordered, mutable list of messages for the active session.
//!
//! # Design Philosophy
//!
//! The store is a cheap, cloneable handle. The orchestrator appends and
//! truncates, each stream worker mutates exactly one message by id, and UI
//! readers take snapshots or subscribe to [`StoreChange`] notifications.
//! Locks are held only for the duration of one operation and never across an
//! `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::backend::HistoryEntry;
use crate::messages::{ChatMessage, MessageId, MessageRole};

/// Default capacity of the change notification channel
pub const DEFAULT_CHANGE_CAPACITY: usize = 256;

/// Errors from store operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// No message with this id
    #[error("Message {0} not found")]
    NotFound(MessageId),

    /// The message is still owned by a stream worker
    #[error("Message {0} is still streaming")]
    StillStreaming(MessageId),
}

/// A change notification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreChange {
    /// A message was pushed to the end
    Appended(MessageId),
    /// A message was mutated in place (streaming delta, completion, tool update)
    Updated(MessageId),
    /// A terminal message was edited
    Edited(MessageId),
    /// Messages from this index onward were removed
    Truncated {
        /// First removed index
        from: usize,
    },
    /// The whole list was replaced (session attach)
    Replaced {
        /// New message count
        count: usize,
    },
    /// The list was emptied
    Cleared,
}

/// Shared conversation state
#[derive(Clone, Debug)]
pub struct ConversationStore {
    messages: Arc<RwLock<Vec<ChatMessage>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANGE_CAPACITY)
    }

    /// Create an empty store with a given notification buffer
    #[must_use]
    pub fn with_capacity(change_capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(change_capacity.max(1));
        Self {
            messages: Arc::new(RwLock::new(Vec::new())),
            changes,
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Push a message to the end
    pub fn append(&self, message: ChatMessage) {
        let id = message.id.clone();
        self.messages.write().push(message);
        self.notify(StoreChange::Appended(id));
    }

    /// Apply `f` to the message with `id`.
    ///
    /// Returns `false` if no such message exists.
    pub fn mutate<F>(&self, id: &MessageId, f: F) -> bool
    where
        F: FnOnce(&mut ChatMessage),
    {
        {
            let mut messages = self.messages.write();
            let Some(message) = messages.iter_mut().find(|m| &m.id == id) else {
                return false;
            };
            f(message);
        }
        self.notify(StoreChange::Updated(id.clone()));
        true
    }

    /// Replace the content of a terminal message, keeping its history
    pub fn edit(&self, id: &MessageId, new_content: impl Into<String>) -> Result<(), StoreError> {
        {
            let mut messages = self.messages.write();
            let message = messages
                .iter_mut()
                .find(|m| &m.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            if message.streaming {
                return Err(StoreError::StillStreaming(id.clone()));
            }
            message.apply_edit(new_content);
        }
        self.notify(StoreChange::Edited(id.clone()));
        Ok(())
    }

    /// Drop every message at `index` and after; out of range is a no-op
    pub fn truncate_from(&self, index: usize) {
        {
            let mut messages = self.messages.write();
            if index >= messages.len() {
                return;
            }
            messages.truncate(index);
        }
        self.notify(StoreChange::Truncated { from: index });
    }

    /// Replace the whole list
    pub fn replace_all(&self, messages: Vec<ChatMessage>) {
        let count = messages.len();
        *self.messages.write() = messages;
        self.notify(StoreChange::Replaced { count });
    }

    /// Remove every message
    pub fn clear(&self) {
        self.messages.write().clear();
        self.notify(StoreChange::Cleared);
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Copy of every message, in order
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.read().clone()
    }

    /// Copy of one message
    #[must_use]
    pub fn get(&self, id: &MessageId) -> Option<ChatMessage> {
        self.messages.read().iter().find(|m| &m.id == id).cloned()
    }

    /// Number of messages
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    /// Whether the store has no messages
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Number of messages still owned by a worker
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.messages.read().iter().filter(|m| m.streaming).count()
    }

    /// Request history for the next turn.
    ///
    /// Assistant turns requested from a model other than `primary_model` are
    /// prefixed with `[<display name>] `, using `names` and falling back to
    /// the model id. Turns loaded from a transcript carry no requested model
    /// and are attributed by `agent_model`. Empty assistant turns are left out.
    #[must_use]
    pub fn build_history(
        &self,
        primary_model: &str,
        names: &HashMap<String, String>,
    ) -> Vec<HistoryEntry> {
        let messages = self.messages.read();
        messages
            .iter()
            .filter_map(|m| match m.role {
                MessageRole::User => Some(HistoryEntry::new(MessageRole::User, m.content.clone())),
                MessageRole::Assistant if m.content.is_empty() => None,
                MessageRole::Assistant => {
                    let author = m.target_model.as_deref().or(m.agent_model.as_deref());
                    let content = match author {
                        Some(model) if model != primary_model => {
                            let name = names.get(model).map_or(model, String::as_str);
                            format!("[{name}] {}", m.content)
                        }
                        _ => m.content.clone(),
                    };
                    Some(HistoryEntry::new(MessageRole::Assistant, content))
                }
            })
            .collect()
    }

    /// Subscribe to change notifications
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: StoreChange) {
        // No receivers is fine
        let _ = self.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn assistant(model: &str, content: &str) -> ChatMessage {
        let mut msg = ChatMessage::assistant_placeholder(model, None, false);
        msg.content = content.to_string();
        msg.streaming = false;
        msg
    }

    #[test]
    fn test_append_keeps_order() {
        let store = ConversationStore::new();
        let a = ChatMessage::user("a");
        let b = ChatMessage::user("b");
        let (a_id, b_id) = (a.id.clone(), b.id.clone());

        store.append(a);
        store.append(b);

        assert_eq!(store.len(), 2);
        let ids: Vec<_> = store.snapshot().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![a_id, b_id]);
    }

    #[test]
    fn test_mutate_targets_one_message() {
        let store = ConversationStore::new();
        let first = assistant("m1", "");
        let second = assistant("m1", "");
        let (first_id, second_id) = (first.id.clone(), second.id.clone());
        store.append(first);
        store.append(second);

        assert!(store.mutate(&second_id, |m| m.content.push_str("x")));
        assert_eq!(store.get(&first_id).unwrap().content, "");
        assert_eq!(store.get(&second_id).unwrap().content, "x");

        assert!(!store.mutate(&MessageId::from("missing"), |m| m.content.clear()));
    }

    #[test]
    fn test_edit_rules() {
        let store = ConversationStore::new();
        let done = ChatMessage::user("original");
        let live = ChatMessage::assistant_placeholder("m1", None, false);
        let (done_id, live_id) = (done.id.clone(), live.id.clone());
        store.append(done);
        store.append(live);

        store.edit(&done_id, "fixed").unwrap();
        let edited = store.get(&done_id).unwrap();
        assert_eq!(edited.content, "fixed");
        assert_eq!(edited.previous_versions, vec!["original"]);

        assert_eq!(
            store.edit(&live_id, "nope"),
            Err(StoreError::StillStreaming(live_id.clone()))
        );
        assert_eq!(
            store.edit(&MessageId::from("x"), "nope"),
            Err(StoreError::NotFound(MessageId::from("x")))
        );
    }

    #[test]
    fn test_truncate_from() {
        let store = ConversationStore::new();
        for text in ["a", "b", "c"] {
            store.append(ChatMessage::user(text));
        }

        store.truncate_from(10);
        assert_eq!(store.len(), 3);

        store.truncate_from(1);
        let remaining: Vec<_> = store.snapshot().into_iter().map(|m| m.content).collect();
        assert_eq!(remaining, vec!["a"]);
    }

    #[test]
    fn test_active_count() {
        let store = ConversationStore::new();
        store.append(ChatMessage::user("q"));
        store.append(ChatMessage::assistant_placeholder("m1", None, false));
        store.append(ChatMessage::assistant_placeholder("m2", None, false));
        assert_eq!(store.active_count(), 2);

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.active_count(), 0);
    }

    #[test]
    fn test_build_history_prefixes_other_models() {
        let store = ConversationStore::new();
        store.append(ChatMessage::user("q1"));
        store.append(assistant("primary", "a1"));
        store.append(assistant("gpt-4o", "a2"));
        store.append(assistant("mystery", "a3"));
        store.append(assistant("primary", ""));
        store.append(ChatMessage::user("q2"));

        let names = HashMap::from([("gpt-4o".to_string(), "GPT-4o".to_string())]);
        let history = store.build_history("primary", &names);

        let rendered: Vec<_> = history
            .iter()
            .map(|h| format!("{}:{}", h.role.as_str(), h.content))
            .collect();
        assert_eq!(
            rendered,
            vec![
                "user:q1",
                "assistant:a1",
                "assistant:[GPT-4o] a2",
                "assistant:[mystery] a3",
                "user:q2",
            ]
        );
    }

    #[test]
    fn test_build_history_attributes_by_requested_model() {
        let store = ConversationStore::new();
        store.append(ChatMessage::user("q1"));
        // The gateway reported a dated variant of the primary model
        let mut answer = assistant("m1", "ans");
        answer.agent_model = Some("m1-2025-01-01".to_string());
        store.append(answer);
        // A loaded transcript only knows who answered
        let mut loaded = ChatMessage::new(MessageRole::Assistant, "old");
        loaded.agent_model = Some("m2".to_string());
        store.append(loaded);
        store.append(ChatMessage::user("q2"));

        let history: Vec<_> = store
            .build_history("m1", &HashMap::new())
            .into_iter()
            .map(|h| h.content)
            .collect();
        assert_eq!(history, vec!["q1", "ans", "[m2] old", "q2"]);
    }

    #[tokio::test]
    async fn test_change_notifications() {
        let store = ConversationStore::new();
        let mut changes = store.subscribe();

        let msg = ChatMessage::user("hi");
        let id = msg.id.clone();
        store.append(msg);
        store.mutate(&id, |m| m.content.push('!'));
        store.edit(&id, "hello").unwrap();
        store.truncate_from(0);
        store.replace_all(vec![ChatMessage::user("loaded")]);
        store.clear();

        assert_eq!(changes.recv().await.unwrap(), StoreChange::Appended(id.clone()));
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Updated(id.clone()));
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Edited(id));
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Truncated { from: 0 });
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Replaced { count: 1 });
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Cleared);
    }
}
