//! Global configuration parsing and validation.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::demux::tags::TagSet;
use crate::{AppError, Result};

/// Upstream agent service connectivity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct UpstreamConfig {
    /// Absolute URL of the streaming agent endpoint.
    pub url: String,
    /// Whole-request timeout; 0 means no timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl UpstreamConfig {
    /// Request timeout, or `None` when disabled.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_seconds > 0).then(|| Duration::from_secs(self.timeout_seconds))
    }
}

/// Constants consumed by the stream demultiplexer.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct DemuxConfig {
    /// Literal introducing a tool-invocation notice.
    #[serde(default = "default_tool_tag")]
    pub tool_tag: String,
    /// Literal introducing a model-stream event.
    #[serde(default = "default_model_tag")]
    pub model_tag: String,
    /// Graph node whose streamed tokens form the answer transcript.
    #[serde(default = "default_generation_node")]
    pub generation_node: String,
    /// Event-kind marker of a streamed model token.
    #[serde(default = "default_stream_event")]
    pub stream_event: String,
    /// Upper bound on unconsumed bytes held by one session.
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: usize,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            tool_tag: default_tool_tag(),
            model_tag: default_model_tag(),
            generation_node: default_generation_node(),
            stream_event: default_stream_event(),
            max_buffer_bytes: default_max_buffer_bytes(),
        }
    }
}

impl DemuxConfig {
    /// Build the tag table from the configured literals.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the literals violate the tag invariants
    /// (empty, identical, or of differing byte length).
    pub fn tag_set(&self) -> Result<TagSet> {
        TagSet::new(&self.tool_tag, &self.model_tag)
    }

    /// Validate the demultiplexer constants.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let tags = self.tag_set()?;

        if self.generation_node.is_empty() {
            return Err(AppError::Config("generation_node must not be empty".into()));
        }
        if self.stream_event.is_empty() {
            return Err(AppError::Config("stream_event must not be empty".into()));
        }
        if self.max_buffer_bytes < tags.tag_len() {
            return Err(AppError::Config(format!(
                "max_buffer_bytes must be at least the tag length ({})",
                tags.tag_len()
            )));
        }

        Ok(())
    }
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_tool_tag() -> String {
    "Tool :".into()
}

fn default_model_tag() -> String {
    "Toly :".into()
}

fn default_generation_node() -> String {
    "Toly".into()
}

fn default_stream_event() -> String {
    "on_chat_model_stream".into()
}

fn default_max_buffer_bytes() -> usize {
    4 * 1_048_576
}

fn default_http_port() -> u16 {
    3000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP port for the SSE relay.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Upstream agent service settings.
    pub upstream: UpstreamConfig,
    /// Demultiplexer constants.
    #[serde(default)]
    pub demux: DemuxConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let url = self.upstream.url.as_str();
        let rest = url
            .strip_prefix("http://")
            .or_else(|| url.strip_prefix("https://"))
            .ok_or_else(|| {
                AppError::Config(format!("upstream.url must be an http(s) URL, got '{url}'"))
            })?;
        if rest.is_empty() || rest.starts_with('/') {
            return Err(AppError::Config(format!(
                "upstream.url is missing a host: '{url}'"
            )));
        }

        self.demux.validate()
    }
}
