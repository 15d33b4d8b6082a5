//! Conversation Messages
//!
//! The message model shared by the store, the stream workers and UI readers.
//!
//! # Design Philosophy
//!
//! A `ChatMessage` is created once (at send or regenerate time), mutated only
//! by the worker that owns it while `streaming` is true, and frozen afterwards.
//! The only later mutation is an explicit edit, which keeps every prior version.
//!
//! Field names serialize in camelCase because these records are handed to UI
//! collaborators unchanged.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        Self(format!("msg_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Session identifier, assigned by the gateway
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Links the assistant messages produced for one user turn under multi-model fan-out
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseGroupId(pub String);

impl ResponseGroupId {
    /// Generate a new unique group ID
    pub fn new() -> Self {
        Self(format!("grp_{}", uuid::Uuid::new_v4().simple()))
    }
}

impl Default for ResponseGroupId {
    fn default() -> Self {
        Self::new()
    }
}

/// Who authored a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// The operator
    User,
    /// A backing model
    Assistant,
}

impl MessageRole {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Lifecycle of a tool invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    /// Invocation started, no result yet
    Running,
    /// Finished successfully
    Complete,
    /// Finished with an error
    Error,
}

impl ToolStatus {
    /// Whether this status is final
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One structured tool invocation surfaced inside a stream
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecution {
    /// Backend-supplied identifier, unique within one stream
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as received
    pub input: serde_json::Value,
    /// Current status
    pub status: ToolStatus,
    /// Result, present once the status is terminal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// When the invocation was announced (Unix ms)
    pub started_at: u64,
    /// When the result arrived (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<u64>,
}

impl ToolExecution {
    /// A freshly announced invocation
    pub fn started(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            status: ToolStatus::Running,
            result: None,
            started_at: now_ms(),
            completed_at: None,
        }
    }

    /// Move to a terminal status.
    ///
    /// Returns `false` (and changes nothing) if the invocation already left
    /// `Running` or if `status` is not terminal.
    pub fn finish(&mut self, status: ToolStatus, result: Option<serde_json::Value>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.result = Some(result.unwrap_or(serde_json::Value::Null));
        self.completed_at = Some(now_ms());
        true
    }
}

/// One conversational turn
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub role: MessageRole,
    /// Accumulated text
    pub content: String,
    /// Accumulated reasoning text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Tool invocations, present when tool calling was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_executions: Option<Vec<ToolExecution>>,
    /// When the message was created (Unix timestamp ms)
    pub timestamp: u64,
    /// Model that produced this turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_model: Option<String>,
    /// Provider of that model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_provider: Option<String>,
    /// Model this assistant turn was requested from; `agent_model` may be a
    /// resolved variant of it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_model: Option<String>,
    /// Prompt tokens reported on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Output tokens reported on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Reasoning tokens reported on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_tokens: Option<u64>,
    /// Whether the backend cut the output short
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
    /// Output limit the request asked for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens_requested: Option<u64>,
    /// Output limit the model enforces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_limit: Option<u64>,
    /// Human-readable truncation notice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation_warning: Option<String>,
    /// Aborted before natural completion
    #[serde(default)]
    pub cancelled: bool,
    /// Edited after completion
    #[serde(default)]
    pub edited: bool,
    /// When the last edit happened (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<u64>,
    /// Prior contents, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub previous_versions: Vec<String>,
    /// Shared by the assistant messages of one multi-model turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_group_id: Option<ResponseGroupId>,
    /// Models explicitly requested for this (user) turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_models: Option<Vec<String>>,
    /// Still owned by a stream worker
    #[serde(default)]
    pub streaming: bool,
}

impl ChatMessage {
    /// Create a completed message
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
            thinking: None,
            tool_executions: None,
            timestamp: now_ms(),
            agent_model: None,
            agent_provider: None,
            target_model: None,
            input_tokens: None,
            output_tokens: None,
            thinking_tokens: None,
            truncated: None,
            max_tokens_requested: None,
            model_limit: None,
            truncation_warning: None,
            cancelled: false,
            edited: false,
            edited_at: None,
            previous_versions: Vec::new(),
            response_group_id: None,
            target_models: None,
            streaming: false,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create an empty assistant message that a worker will stream into
    pub fn assistant_placeholder(
        target_model: impl Into<String>,
        response_group_id: Option<ResponseGroupId>,
        tools_enabled: bool,
    ) -> Self {
        let target_model = target_model.into();
        let mut msg = Self::new(MessageRole::Assistant, String::new());
        msg.agent_model = Some(target_model.clone());
        msg.target_model = Some(target_model);
        msg.response_group_id = response_group_id;
        msg.tool_executions = tools_enabled.then(Vec::new);
        msg.streaming = true;
        msg
    }

    /// Whether the message reached a terminal state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !self.streaming
    }

    /// Replace the content, keeping the old one in `previous_versions`
    pub fn apply_edit(&mut self, new_content: impl Into<String>) {
        let old = std::mem::replace(&mut self.content, new_content.into());
        self.previous_versions.push(old);
        self.edited = true;
        self.edited_at = Some(now_ms());
    }

    /// Tool invocations recorded so far
    #[must_use]
    pub fn tools(&self) -> &[ToolExecution] {
        self.tool_executions.as_deref().unwrap_or(&[])
    }
}

/// Get current timestamp in milliseconds
pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
