//! Normalized events produced by a demultiplexer session.

use serde::Serialize;
use serde_json::Value;

use crate::{AppError, Result};

/// One event in the ordered output of a session.
///
/// Serialized with a `type` discriminator, e.g.
/// `{"type":"tool","payload":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    /// A tool invocation notice, emitted once per distinct invocation.
    Tool {
        /// The decoded notice object.
        payload: Value,
    },
    /// A fragment of model-generated answer text.
    ContentDelta {
        /// Text appended to the transcript.
        text: String,
    },
    /// Terminal success event carrying the whole transcript.
    ContentComplete {
        /// Concatenation of every emitted delta.
        text: String,
    },
}

/// Downstream consumer of session events.
pub trait EventSink {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sink` when the consumer can no longer accept events.
    fn emit(&mut self, event: StreamEvent) -> Result<()>;

    /// Deliver the terminal failure signal.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Sink` when the consumer can no longer accept it.
    fn fail(&mut self, error: &AppError) -> Result<()>;
}

/// Collects events in memory; failures are left to the caller, which also
/// receives the error from [`DemuxSession::abort`](super::DemuxSession::abort).
impl EventSink for Vec<StreamEvent> {
    fn emit(&mut self, event: StreamEvent) -> Result<()> {
        self.push(event);
        Ok(())
    }

    fn fail(&mut self, _error: &AppError) -> Result<()> {
        Ok(())
    }
}
