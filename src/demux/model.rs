//! Model-stream frames.
//!
//! Every graph event the agent emits arrives as a model frame. Only
//! streamed tokens from the generation node carry answer text; all other
//! well-formed events are consumed without output.

use serde_json::Value;
use tracing::{debug, warn};

use super::decode::{decode, Decoded};
use super::event::{EventSink, StreamEvent};
use super::Outcome;
use crate::Result;

/// Filters streamed tokens and accumulates the answer transcript.
#[derive(Debug)]
pub struct ModelProcessor {
    generation_node: String,
    stream_event: String,
    transcript: String,
    deltas: usize,
}

impl ModelProcessor {
    /// Create a processor accepting tokens of `stream_event` kind emitted
    /// by `generation_node`.
    #[must_use]
    pub fn new(generation_node: impl Into<String>, stream_event: impl Into<String>) -> Self {
        Self {
            generation_node: generation_node.into(),
            stream_event: stream_event.into(),
            transcript: String::new(),
            deltas: 0,
        }
    }

    /// Process one model-frame body.
    ///
    /// The body is decoded as-is, without trimming. `is_final_flush` has
    /// the same meaning as for [`ToolProcessor::process`](super::ToolProcessor::process).
    ///
    /// # Errors
    ///
    /// Propagates a failure of `sink` to accept the delta event.
    pub fn process<S>(&mut self, body: &[u8], is_final_flush: bool, sink: &mut S) -> Result<Outcome>
    where
        S: EventSink + ?Sized,
    {
        let event: Value = match decode(body) {
            Decoded::Complete(event) => event,
            Decoded::Incomplete if !is_final_flush => return Ok(Outcome::DeferUntilMore),
            Decoded::Incomplete => {
                warn!(bytes = body.len(), "model frame truncated, dropping");
                return Ok(Outcome::Dropped);
            }
            Decoded::Malformed(err) => {
                warn!(error = %err, bytes = body.len(), "model frame malformed, dropping");
                return Ok(Outcome::Dropped);
            }
        };

        let Some(text) = self.accepted_text(&event) else {
            return Ok(Outcome::Emitted);
        };

        self.transcript.push_str(&text);
        self.deltas += 1;
        sink.emit(StreamEvent::ContentDelta { text })?;
        Ok(Outcome::Emitted)
    }

    /// Answer text accumulated so far.
    #[must_use]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Number of deltas emitted so far.
    #[must_use]
    pub fn deltas(&self) -> usize {
        self.deltas
    }

    /// Hand over the transcript, leaving an empty one behind.
    pub fn take_transcript(&mut self) -> String {
        std::mem::take(&mut self.transcript)
    }

    fn accepted_text(&self, event: &Value) -> Option<String> {
        if event.get("event").and_then(Value::as_str) != Some(self.stream_event.as_str()) {
            return None;
        }

        let node = event
            .pointer("/metadata/langgraph_node")
            .and_then(Value::as_str);
        if node != Some(self.generation_node.as_str()) {
            debug!(node = node.unwrap_or("-"), "token from other node ignored");
            return None;
        }

        let content = event.pointer("/data/chunk/content")?;
        content_text(content).filter(|text| !text.is_empty())
    }
}

/// Text of a message-chunk `content`: a plain string, or the concatenated
/// `text` blocks of a content-block array.
fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(blocks) => {
            let text: String = blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(text) => Some(text.as_str()),
                    Value::Object(fields) if fields.get("type").and_then(Value::as_str) == Some("text") => {
                        fields.get("text").and_then(Value::as_str)
                    }
                    _ => None,
                })
                .collect();
            Some(text)
        }
        _ => None,
    }
}
