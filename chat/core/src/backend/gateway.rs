//! Gateway HTTP Client
//!
//! reqwest implementation of [`CompletionBackend`] and [`SessionStore`] for the
//! hosted model gateway.
//!
//! # Gateway API
//!
//! - `POST {stream_path}` - streamed completion (`text/event-stream` body)
//! - `GET {sessions_path}/{id}` - full session transcript
//! - `GET {health_path}` - liveness probe
//!
//! Streams are long-lived, so the client only bounds connection setup. A
//! stream ends when the body ends or when the caller drops it, which aborts
//! the underlying connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::{StatusCode, Url};

use super::traits::{
    BackendError, ChunkStream, CompletionBackend, CompletionRequest, GatewayConfig,
    PersistedSession, SessionStore,
};
use crate::messages::SessionId;

/// Gateway client
#[derive(Clone, Debug)]
pub struct GatewayClient {
    /// Base URL without trailing slash
    base_url: Url,
    /// Bearer token
    api_key: Option<String>,
    stream_path: String,
    sessions_path: String,
    health_path: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl GatewayClient {
    /// Create a client from configuration
    pub fn new(config: &GatewayConfig) -> Result<Self, BackendError> {
        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            BackendError::Config(format!("invalid base URL {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "base URL {:?} cannot carry paths",
                config.base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            stream_path: config.stream_path.clone(),
            sessions_path: config.sessions_path.clone(),
            health_path: config.health_path.clone(),
            http_client,
        })
    }

    /// Base URL the client talks to
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| BackendError::Config(format!("invalid endpoint path {path:?}: {e}")))
    }

    /// Get stream endpoint URL
    fn stream_url(&self) -> Result<Url, BackendError> {
        self.endpoint(&self.stream_path)
    }

    /// Get session endpoint URL; the id is a single, escaped path segment
    fn session_url(&self, session_id: &SessionId) -> Result<Url, BackendError> {
        let mut url = self.endpoint(&self.sessions_path)?;
        url.path_segments_mut()
            .map_err(|()| BackendError::Config("sessions path cannot carry segments".to_string()))?
            .pop_if_empty()
            .push(&session_id.0);
        Ok(url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Turn a non-success response into [`BackendError::Status`]
async fn status_error(response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    BackendError::Status {
        status: status.as_u16(),
        body,
    }
}

#[async_trait]
impl CompletionBackend for GatewayClient {
    fn name(&self) -> &'static str {
        "Gateway"
    }

    async fn health_check(&self) -> bool {
        let Ok(url) = self.endpoint(&self.health_path) else {
            return false;
        };
        match self
            .authorize(self.http_client.get(url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "Gateway health check failed");
                false
            }
        }
    }

    async fn open_stream(&self, request: &CompletionRequest) -> Result<ChunkStream, BackendError> {
        let url = self.stream_url()?;
        tracing::debug!(%url, model = %request.model, history = request.messages.len(), "Opening completion stream");

        let response = self
            .authorize(self.http_client.post(url))
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        // Check for HTTP errors
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| BackendError::Transport(e.to_string())));

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl SessionStore for GatewayClient {
    async fn load_session(&self, session_id: &SessionId) -> Result<PersistedSession, BackendError> {
        let url = self.session_url(session_id)?;
        let response = self.authorize(self.http_client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(BackendError::SessionNotFound(session_id.clone()));
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json::<PersistedSession>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}
