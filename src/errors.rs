//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Framing and payload-decoding anomalies are deliberately absent: the
/// demultiplexer absorbs them locally and only logs them.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Transport failure while talking to the upstream agent service.
    Upstream(String),
    /// Demultiplexer session misuse or resource limit violation.
    Stream(String),
    /// The event sink rejected an event.
    Sink(String),
    /// The downstream consumer detached before the stream completed.
    Cancelled(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream: {msg}"),
            Self::Stream(msg) => write!(f, "stream: {msg}"),
            Self::Sink(msg) => write!(f, "sink: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
