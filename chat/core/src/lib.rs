//! Chat Core - Streaming Conversation Core for the Model Gateway Console
//!
//! This crate provides the conversation logic behind the operator console's
//! chat view, independent of any UI. It streams completions from one or more
//! models at once, decodes the gateway's event protocol incrementally, tracks
//! tool invocations, and supports cancel, edit and regenerate without
//! corrupting in-flight or historical state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         UI Surface                               │
//! │   send / cancel / edit / regenerate / attach      snapshots,    │
//! │                  │                                 StoreChange,  │
//! │                  ▼                                 StreamStatus  │
//! └──────────────────┼──────────────────────────────────────▲────────┘
//!                    │                                      │
//! ┌──────────────────┼──────────────── CHAT CORE ───────────┼────────┐
//! │  ┌───────────────┴────────────────┐       ┌─────────────┴──────┐ │
//! │  │        ChatOrchestrator        │──────▶│ ConversationStore  │ │
//! │  │  status · error · cancel token │       └─────────────▲──────┘ │
//! │  └───────┬───────────────┬────────┘                     │        │
//! │          │ JoinSet       │                    mutate(id)│        │
//! │   ┌──────▼─────┐   ┌─────▼──────┐                       │        │
//! │   │StreamWorker│   │StreamWorker│  ... one per model ───┘        │
//! │   │  decoder   │   │  decoder   │                                │
//! │   └──────┬─────┘   └─────┬──────┘                                │
//! └──────────┼───────────────┼───────────────────────────────────────┘
//!            ▼               ▼
//!        CompletionBackend (GatewayClient over HTTP)
//! ```
//!
//! # Key Types
//!
//! - [`ChatOrchestrator`]: the entry point; owns status, error and fan-out
//! - [`ConversationStore`]: the shared, ordered message list
//! - [`StreamWorker`]: drives one model's stream into one message
//! - [`EventDecoder`]: bytes in, [`StreamEvent`]s out
//! - [`GatewayClient`]: reqwest implementation of the backend traits
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use chat_core::{load_config, ChatOrchestrator, GatewayClient};
//!
//! let config = load_config()?;
//! let client = Arc::new(GatewayClient::new(&config.gateway)?);
//! let chat = ChatOrchestrator::new(client.clone(), client, config.chat);
//!
//! chat.send_message("Compare your answers", vec!["gpt-4o".into(), "claude-sonnet".into()])
//!     .await;
//! for message in chat.messages() {
//!     println!("{:?}: {}", message.agent_model, message.content);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: gateway traits and the HTTP client
//! - [`config`]: TOML, environment and CLI configuration layering
//! - [`messages`]: the message model shared with UI collaborators
//! - [`orchestrator`]: the public conversation entry point
//! - [`protocol`]: stream event records and the incremental decoder
//! - [`session`]: session id slot and transcript loading
//! - [`store`]: the conversation store
//! - [`streaming`]: per-model stream workers

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod messages;
pub mod orchestrator;
pub mod protocol;
pub mod session;
pub mod store;
pub mod streaming;

// Re-exports for convenience
pub use backend::{
    BackendError, ChunkStream, CompletionBackend, CompletionRequest, GatewayClient, GatewayConfig,
    HistoryEntry, PersistedMessage, PersistedSession, SessionStore,
};
pub use messages::{
    ChatMessage, MessageId, MessageRole, ResponseGroupId, SessionId, ToolExecution, ToolStatus,
};
pub use orchestrator::{ChatOrchestrator, StreamStatus, TurnOutcome};
pub use protocol::{CompletionSummary, DecoderStats, EventDecoder, StreamEvent};
pub use session::{transcript_to_messages, SessionSlot};
pub use store::{ConversationStore, StoreChange, StoreError};

// Streaming exports
pub use streaming::{
    ActiveMessage, StreamWorker, TurnAccumulator, WorkerError, WorkerOutcome, WorkerStats,
};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, load_config_with_env, ChatConfig,
    ChatConfigFile, ConfigError, ConfigOverrides, ConfigSource, ConfigToml,
};
