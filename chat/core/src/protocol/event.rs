//! Stream Event Records
//!
//! Typed form of the JSON records the gateway emits inside a completion
//! stream. Every record carries a `type` tag; the set of tags is closed and
//! anything outside it fails to deserialize (and is skipped by the decoder).

use serde::{Deserialize, Serialize};

use crate::messages::{SessionId, ToolStatus};

/// One decoded protocol event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Connection accepted; may carry the session the gateway assigned
    Connected {
        /// Session assigned or resumed by the gateway
        #[serde(default)]
        session_id: Option<SessionId>,
    },

    /// Reasoning delta
    Thinking {
        /// Text to append
        content: String,
    },

    /// Answer delta
    Content {
        /// Text to append
        content: String,
    },

    /// A tool invocation started
    ToolUse {
        /// Invocation id, unique within this stream
        id: String,
        /// Tool name
        name: String,
        /// Arguments
        #[serde(default)]
        input: serde_json::Value,
    },

    /// A tool invocation finished
    ToolResult {
        /// Invocation id this result belongs to
        #[serde(alias = "id")]
        tool_use_id: String,
        /// Tool output
        #[serde(default, alias = "output")]
        result: Option<serde_json::Value>,
        /// Explicit terminal status
        #[serde(default)]
        status: Option<ToolStatus>,
        /// Error flag, used when `status` is absent
        #[serde(default)]
        is_error: bool,
    },

    /// Generation finished normally
    Done(CompletionSummary),

    /// Generation stopped because the request was aborted
    Cancelled(CompletionSummary),

    /// Generation failed
    Error {
        /// Error description
        #[serde(alias = "message")]
        error: String,
    },
}

impl StreamEvent {
    /// Whether this event ends the turn
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Cancelled(_) | Self::Error { .. })
    }

    /// Tag name, for logging
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::Thinking { .. } => "thinking",
            Self::Content { .. } => "content",
            Self::ToolUse { .. } => "tool_use",
            Self::ToolResult { .. } => "tool_result",
            Self::Done(_) => "done",
            Self::Cancelled(_) => "cancelled",
            Self::Error { .. } => "error",
        }
    }
}

/// Resolve the terminal status a `tool_result` record reports
#[must_use]
pub fn tool_result_status(status: Option<ToolStatus>, is_error: bool) -> ToolStatus {
    match status {
        Some(status) if status.is_terminal() => status,
        _ if is_error => ToolStatus::Error,
        _ => ToolStatus::Complete,
    }
}

/// Identity, usage and truncation data reported when a turn ends
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSummary {
    /// Final text, for backends that deliver it with the terminal record
    pub content: Option<String>,
    /// Final reasoning text
    pub thinking: Option<String>,
    /// Model that actually produced the turn
    pub model: Option<String>,
    /// Provider of that model
    pub provider: Option<String>,
    /// Prompt tokens
    pub input_tokens: Option<u64>,
    /// Output tokens
    pub output_tokens: Option<u64>,
    /// Reasoning tokens
    pub thinking_tokens: Option<u64>,
    /// Output was cut at the token limit
    pub truncated: Option<bool>,
    /// Limit the request asked for
    pub max_tokens_requested: Option<u64>,
    /// Limit the model enforces
    pub model_limit: Option<u64>,
    /// Notice to show next to a truncated answer
    pub truncation_warning: Option<String>,
}
