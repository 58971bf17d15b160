//! Incremental demultiplexer for tagged agent answer streams.
//!
//! The upstream agent answers with one continuous byte stream in which
//! every logical message starts with a fixed-length literal tag and runs
//! until the next tag or the end of the stream. Chunk boundaries fall
//! anywhere, including inside a tag or a JSON payload.
//!
//! Submodules:
//! - `tags`: tag table and incremental two-symbol lexer.
//! - `decode`: tri-state (`Complete` / `Incomplete` / `Malformed`) JSON decode.
//! - `frame`: frame extraction between consecutive tags.
//! - `tool`: tool-notice decoding and deduplication.
//! - `model`: model-token filtering and transcript accumulation.
//! - `event`: normalized output events and the [`EventSink`] seam.
//! - `session`: the per-request state machine driving all of the above.

pub mod decode;
pub mod event;
pub mod frame;
pub mod model;
pub mod session;
pub mod tags;
pub mod tool;

pub use event::{EventSink, StreamEvent};
pub use model::ModelProcessor;
pub use session::{DemuxSession, SessionState, SessionStats};
pub use tags::{TagKind, TagSet};
pub use tool::ToolProcessor;

/// What a processor did with one frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The body decoded; any resulting event has been emitted.
    Emitted,
    /// The body can never decode and was discarded.
    Dropped,
    /// The body may still be growing; leave it in the buffer.
    DeferUntilMore,
}

impl Outcome {
    /// Whether the frame has been consumed.
    #[must_use]
    pub fn is_resolved(self) -> bool {
        !matches!(self, Self::DeferUntilMore)
    }
}
