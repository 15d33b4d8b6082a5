//! Gateway Backend Traits
//!
//! Trait definitions for the two gateway services the conversation core
//! consumes: the streaming completion endpoint and the session persistence
//! endpoint. Stream workers and the orchestrator only see these traits, so
//! tests can script byte streams without a network.

use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::messages::{MessageRole, SessionId};

/// Raw response body chunks of one completion stream
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>;

/// Errors raised while talking to the gateway
#[derive(Debug, Error)]
pub enum BackendError {
    /// Client could not be built from the given configuration
    #[error("Invalid gateway configuration: {0}")]
    Config(String),

    /// The HTTP request could not be sent or its response read
    #[error("Gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The gateway answered with a non-success status
    #[error("Gateway returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as text
        body: String,
    },

    /// The requested session does not exist
    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    /// The body arrived but could not be interpreted
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),

    /// The connection broke while the body was streaming
    #[error("Stream transport error: {0}")]
    Transport(String),
}

/// One history entry in a completion request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Author of the turn
    pub role: MessageRole,
    /// Turn text (possibly prefixed with the producing model's name)
    pub content: String,
}

impl HistoryEntry {
    /// Create a history entry
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Body of a streamed completion request
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// Target model identifier
    pub model: String,
    /// Conversation so far, oldest first
    pub messages: Vec<HistoryEntry>,
    /// Sampling temperature
    pub temperature: f32,
    /// Session to resume, if one is known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Working directory for tool execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Whether the model may call tools
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_enabled: Option<bool>,
    /// Always true; the core only consumes streamed responses
    pub stream: bool,
}

impl CompletionRequest {
    /// Create a request for `model` over `messages`
    pub fn new(model: impl Into<String>, messages: Vec<HistoryEntry>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.7,
            session_id: None,
            working_dir: None,
            tools_enabled: None,
            stream: true,
        }
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature.clamp(0.0, 2.0);
        self
    }

    /// Resume an existing session
    #[must_use]
    pub fn with_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }

    /// Set the tool working directory
    #[must_use]
    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Enable or disable tool calling
    #[must_use]
    pub fn with_tools(mut self, enabled: bool) -> Self {
        self.tools_enabled = Some(enabled);
        self
    }
}

/// A session transcript as the persistence service returns it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedSession {
    /// Session identifier
    pub id: SessionId,
    /// Messages, oldest first
    #[serde(default)]
    pub messages: Vec<PersistedMessage>,
}

/// One message of a persisted transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedMessage {
    /// Server-side message id (string or number on the wire)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Role name (`user`, `assistant`, others are ignored on load)
    pub role: String,
    /// Message text
    #[serde(default)]
    pub content: String,
    /// RFC 3339 creation time
    #[serde(default)]
    pub created_at: Option<String>,
    /// Model that produced an assistant message
    #[serde(default)]
    pub agent_name: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(n) => n.to_string(),
    })
}

/// Streaming completion endpoint
///
/// Implement this trait to add another transport for completion streams.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool {
        true
    }

    /// Open one streamed completion.
    ///
    /// The returned stream yields raw body chunks; dropping it aborts the
    /// connection.
    async fn open_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError>;
}

/// Session persistence endpoint
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a full transcript by id
    async fn load_session(&self, session_id: &SessionId) -> Result<PersistedSession, BackendError>;
}

/// Gateway connection configuration
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://localhost:8080`
    pub base_url: String,
    /// Bearer token sent with every request
    pub api_key: Option<String>,
    /// TCP connect timeout; streams themselves have no total timeout
    pub connect_timeout: Duration,
    /// Path of the streaming completion endpoint
    pub stream_path: String,
    /// Path prefix of the session endpoint
    pub sessions_path: String,
    /// Path of the health endpoint
    pub health_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            stream_path: "/api/chat/stream".to_string(),
            sessions_path: "/api/sessions".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Create configuration for a base URL with default paths
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Set the API key
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}
