//! Gateway Backend Integration
//!
//! Abstracted access to the two gateway services the conversation core
//! depends on: streamed completions and session persistence.
//!
//! # Available Backends
//!
//! - **Gateway**: the hosted model gateway over HTTP (default)
//!
//! # Usage
//!
//! ```ignore
//! use chat_core::backend::{CompletionBackend, CompletionRequest, GatewayClient, GatewayConfig};
//!
//! let client = GatewayClient::new(&GatewayConfig::new("http://localhost:8080"))?;
//! let request = CompletionRequest::new("gpt-4o", history);
//! let mut chunks = client.open_stream(&request).await?;
//! ```

mod gateway;
mod traits;

pub use gateway::GatewayClient;
pub use traits::{
    BackendError, ChunkStream, CompletionBackend, CompletionRequest, GatewayConfig, HistoryEntry,
    PersistedMessage, PersistedSession, SessionStore,
};
