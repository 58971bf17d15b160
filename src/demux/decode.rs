//! Tri-state JSON decoding for frame bodies.
//!
//! A body cut at a chunk or tag boundary is not the same failure as a body
//! that can never parse. [`decode`] keeps the two apart so callers can
//! wait on the first and give up on the second.

use serde::de::{DeserializeOwned, IgnoredAny};

/// Result of decoding one frame body.
#[derive(Debug)]
pub enum Decoded<T> {
    /// The body holds one complete value of the requested shape.
    Complete(T),
    /// The body ended before the value did; more bytes may complete it.
    Incomplete,
    /// The body can never decode, whatever follows it.
    Malformed(serde_json::Error),
}

/// Syntax-only classification of a body, without materializing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Exactly one complete JSON value, optionally surrounded by whitespace.
    Complete,
    /// A valid prefix of a JSON value.
    Incomplete,
    /// Not a prefix of any JSON value.
    Malformed,
}

/// Decode `body` as one JSON value of type `T`.
#[must_use]
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Decoded<T> {
    match serde_json::from_slice::<T>(body) {
        Ok(value) => Decoded::Complete(value),
        Err(err) if err.is_eof() => Decoded::Incomplete,
        Err(err) => Decoded::Malformed(err),
    }
}

/// Classify `body` by JSON syntax alone.
#[must_use]
pub fn probe(body: &[u8]) -> Probe {
    match decode::<IgnoredAny>(body) {
        Decoded::Complete(_) => Probe::Complete,
        Decoded::Incomplete => Probe::Incomplete,
        Decoded::Malformed(_) => Probe::Malformed,
    }
}
