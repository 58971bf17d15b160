//! Tool-notice frames.
//!
//! The agent re-announces a tool invocation every time its graph state is
//! streamed, so each notice is keyed by tool name plus canonical keyword
//! arguments and forwarded only the first time the key is seen.

use std::collections::HashSet;

use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::decode::{decode, Decoded};
use super::event::{EventSink, StreamEvent};
use super::Outcome;
use crate::Result;

/// Decodes tool notices and suppresses repeats.
#[derive(Debug, Default)]
pub struct ToolProcessor {
    seen: HashSet<String>,
    emitted: usize,
    duplicates: usize,
}

impl ToolProcessor {
    /// Create a processor with an empty dedup set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one tool-frame body.
    ///
    /// `is_final_flush` is `true` when no further bytes can ever join
    /// `body`; an unfinished payload is then dropped instead of deferred.
    ///
    /// # Errors
    ///
    /// Propagates a failure of `sink` to accept the tool event.
    pub fn process<S>(&mut self, body: &[u8], is_final_flush: bool, sink: &mut S) -> Result<Outcome>
    where
        S: EventSink + ?Sized,
    {
        let notice: Value = match decode(body.trim_ascii()) {
            Decoded::Complete(notice) => notice,
            Decoded::Incomplete if !is_final_flush => return Ok(Outcome::DeferUntilMore),
            Decoded::Incomplete => {
                warn!(bytes = body.len(), "tool frame truncated, dropping");
                return Ok(Outcome::Dropped);
            }
            Decoded::Malformed(err) => {
                warn!(error = %err, bytes = body.len(), "tool frame malformed, dropping");
                return Ok(Outcome::Dropped);
            }
        };

        // The payload is forwarded exactly as decoded; only these two
        // fields are required to identify it.
        let (Some(tool_name), Some(additional_kwargs)) = (
            notice.get("tool_name").and_then(Value::as_str),
            notice.get("additional_kwargs"),
        ) else {
            warn!(bytes = body.len(), "tool frame lacks tool_name or additional_kwargs, dropping");
            return Ok(Outcome::Dropped);
        };

        let key = dedup_key(tool_name, additional_kwargs);
        if !self.seen.insert(key) {
            self.duplicates += 1;
            debug!(tool_name, "duplicate tool notice suppressed");
            return Ok(Outcome::Emitted);
        }

        debug!(tool_name, "tool notice");
        sink.emit(StreamEvent::Tool { payload: notice })?;
        self.emitted += 1;
        Ok(Outcome::Emitted)
    }

    /// Number of distinct notices forwarded so far.
    #[must_use]
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Number of repeated notices suppressed so far.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Release the dedup set. Counters are kept.
    pub fn clear(&mut self) {
        self.seen = HashSet::new();
    }
}

/// Stable identity of a tool invocation.
///
/// SHA-256 over the tool name, a NUL separator and the canonical form of
/// the keyword arguments, hex-encoded.
#[must_use]
pub fn dedup_key(tool_name: &str, additional_kwargs: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical(additional_kwargs).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compact JSON text with object keys sorted at every depth.
#[must_use]
pub fn canonical(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (idx, key) in keys.into_iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
