//! HTTP client for the upstream agent service.

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::{AppError, Result};

/// Longest upstream error body quoted in an error message.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Raw answer chunks as they arrive from the upstream connection.
pub type ChunkStream = BoxStream<'static, Result<Bytes>>;

/// One question addressed to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Free-text question.
    pub question: String,
    /// Conversation thread the question belongs to.
    pub thread_id: String,
}

/// Streaming client for the upstream agent endpoint.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    url: String,
}

impl AgentClient {
    /// Build a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            url: config.url.clone(),
        })
    }

    /// Endpoint the client posts to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `request` and return the answer body as a chunk stream.
    ///
    /// Dropping the returned stream closes the upstream connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Upstream` if the request fails or the agent
    /// answers with a non-success status.
    pub async fn open(&self, request: &AgentRequest) -> Result<ChunkStream> {
        debug!(url = %self.url, thread_id = %request.thread_id, "opening upstream stream");

        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|err| AppError::Upstream(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            warn!(%status, "upstream rejected request");
            return Err(AppError::Upstream(format!(
                "agent answered {status}: {body}"
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|item| item.map_err(|err| AppError::Upstream(format!("stream read failed: {err}"))))
            .boxed())
    }
}
