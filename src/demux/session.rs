//! Per-request demultiplexer session.
//!
//! A [`DemuxSession`] owns the raw buffer, the tool dedup set and the
//! answer transcript for exactly one upstream response. It is driven
//! synchronously by the upstream push interface:
//!
//! | Upstream signal | Session call                     |
//! |-----------------|----------------------------------|
//! | chunk arrived   | [`DemuxSession::feed`]           |
//! | end of stream   | [`DemuxSession::end_of_stream`]  |
//! | transport error | [`DemuxSession::abort`]          |
//! | consumer gone   | [`DemuxSession::cancel`]         |
//!
//! Each drain pass lexes the buffered window once, resolves its tool
//! frames, then its model frames, and finally consumes the buffer prefix
//! up to the first frame that is still unresolved.

use std::fmt::{Display, Formatter};

use bytes::{Buf, BytesMut};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event::{EventSink, StreamEvent};
use super::frame::{self, Frame};
use super::model::ModelProcessor;
use super::tags::{TagKind, TagScanner};
use super::tool::ToolProcessor;
use super::Outcome;
use crate::config::DemuxConfig;
use crate::{AppError, Result};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting chunks.
    Open,
    /// End of stream signaled; final lenient pass in progress.
    Draining,
    /// Terminal: the complete event has been emitted.
    Completed,
    /// Terminal: aborted, cancelled, or the sink failed.
    Failed,
}

impl SessionState {
    /// Whether the session reached a terminal state.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl Display for SessionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Open => "open",
            Self::Draining => "draining",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Counters describing one session's output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Raw bytes fed into the session.
    pub bytes_in: usize,
    /// Distinct tool events emitted.
    pub tool_events: usize,
    /// Repeated tool notices suppressed.
    pub duplicates: usize,
    /// Text deltas emitted.
    pub deltas: usize,
    /// Frames discarded because their payload could never decode.
    pub dropped: usize,
}

/// Stateful demultiplexer for one upstream response.
#[derive(Debug)]
pub struct DemuxSession {
    id: String,
    state: SessionState,
    buffer: BytesMut,
    scanner: TagScanner,
    tools: ToolProcessor,
    model: ModelProcessor,
    max_buffer_bytes: usize,
    bytes_in: usize,
    dropped: usize,
}

impl DemuxSession {
    /// Open a session configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the configured tag literals are invalid.
    pub fn new(config: &DemuxConfig) -> Result<Self> {
        let tags = config.tag_set()?;
        let id = Uuid::new_v4().to_string();
        debug!(session_id = %id, "demux session opened");

        Ok(Self {
            id,
            state: SessionState::Open,
            buffer: BytesMut::new(),
            scanner: TagScanner::new(tags),
            tools: ToolProcessor::new(),
            model: ModelProcessor::new(&config.generation_node, &config.stream_event),
            max_buffer_bytes: config.max_buffer_bytes,
            bytes_in: 0,
            dropped: 0,
        })
    }

    /// Session identifier used for log correlation.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Answer text accumulated so far.
    #[must_use]
    pub fn transcript(&self) -> &str {
        self.model.transcript()
    }

    /// Bytes received but not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Output counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            bytes_in: self.bytes_in,
            tool_events: self.tools.emitted(),
            duplicates: self.tools.duplicates(),
            deltas: self.model.deltas(),
            dropped: self.dropped,
        }
    }

    /// Append one upstream chunk and emit every message it completes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stream` if the session is not open or the
    /// unconsumed input exceeds the configured limit, and propagates sink
    /// failures. The session is `Failed` after any error.
    pub fn feed<S>(&mut self, chunk: &[u8], sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        self.ensure_open()?;
        self.buffer.extend_from_slice(chunk);
        self.bytes_in += chunk.len();

        if let Err(err) = self.drain_pass(false, sink) {
            return Err(self.sink_failed(err));
        }

        if self.buffer.len() > self.max_buffer_bytes {
            let err = AppError::Stream(format!(
                "unconsumed input exceeded {} bytes",
                self.max_buffer_bytes
            ));
            return Err(self.abort(err, sink));
        }

        Ok(())
    }

    /// Flush the remaining input leniently and emit the complete event.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Stream` if the session is not open, and
    /// propagates sink failures.
    pub fn end_of_stream<S>(&mut self, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        self.ensure_open()?;
        self.state = SessionState::Draining;

        if let Err(err) = self.drain_pass(true, sink) {
            return Err(self.sink_failed(err));
        }

        let text = self.model.transcript().to_owned();
        if let Err(err) = sink.emit(StreamEvent::ContentComplete { text }) {
            return Err(self.sink_failed(err));
        }

        self.release(SessionState::Completed);
        let stats = self.stats();
        info!(
            session_id = %self.id,
            tool_events = stats.tool_events,
            deltas = stats.deltas,
            dropped = stats.dropped,
            transcript_bytes = self.model.transcript().len(),
            "demux session completed"
        );
        Ok(())
    }

    /// Fail the session with `error`, signal the sink, and discard state.
    ///
    /// Returns `error` for the caller to propagate. On an already closed
    /// session nothing is signaled.
    pub fn abort<S>(&mut self, error: AppError, sink: &mut S) -> AppError
    where
        S: EventSink + ?Sized,
    {
        if self.state.is_closed() {
            return error;
        }

        warn!(session_id = %self.id, error = %error, "demux session failed");
        if let Err(sink_err) = sink.fail(&error) {
            debug!(session_id = %self.id, error = %sink_err, "failure signal not delivered");
        }
        self.release(SessionState::Failed);
        error
    }

    /// The consumer detached: discard all state without signaling.
    pub fn cancel(&mut self) {
        if self.state.is_closed() {
            return;
        }

        debug!(
            session_id = %self.id,
            buffered = self.buffer.len(),
            "demux session cancelled"
        );
        self.release(SessionState::Failed);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Open {
            Ok(())
        } else {
            Err(AppError::Stream(format!(
                "session {} is {}",
                self.id, self.state
            )))
        }
    }

    fn sink_failed(&mut self, err: AppError) -> AppError {
        warn!(session_id = %self.id, error = %err, "event sink failed");
        self.release(SessionState::Failed);
        err
    }

    fn release(&mut self, state: SessionState) {
        self.buffer = BytesMut::new();
        self.scanner.reset();
        self.tools.clear();
        if state == SessionState::Failed {
            self.model.take_transcript();
        }
        self.state = state;
    }

    /// Frames of the buffered window, in stream order.
    fn frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut cursor = self.scanner.first_hit();

        while let Some(hit) = cursor {
            let frame = frame::extract(&self.buffer, &self.scanner, hit);
            // Tags inside this frame's payload do not start frames.
            cursor = self.scanner.hit_at_or_after(frame.end());
            frames.push(frame);
        }

        frames
    }

    fn drain_pass<S>(&mut self, is_final: bool, sink: &mut S) -> Result<()>
    where
        S: EventSink + ?Sized,
    {
        self.scanner.advance(&self.buffer);
        let frames = self.frames();
        let mut resolved = vec![false; frames.len()];

        for kind in [TagKind::Tool, TagKind::Model] {
            for (idx, frame) in frames.iter().enumerate() {
                if frame.kind != kind {
                    continue;
                }
                if !frame.complete && !is_final {
                    break;
                }

                // A sealed frame can never grow, so it is judged as if flushing.
                let settled = is_final || frame.complete;
                let body = frame.body(&self.buffer);
                let outcome = match kind {
                    TagKind::Tool => self.tools.process(body, settled, sink)?,
                    TagKind::Model => self.model.process(body, settled, sink)?,
                };

                if outcome == Outcome::Dropped {
                    debug!(session_id = %self.id, kind = kind.as_str(), "frame dropped");
                    self.dropped += 1;
                }
                if !outcome.is_resolved() {
                    break;
                }
                resolved[idx] = true;
            }
        }

        let consumed = match frames.iter().zip(&resolved).find(|(_, done)| !**done) {
            Some((frame, _)) => frame.tag_offset,
            None if is_final => self.buffer.len(),
            None => frames
                .last()
                .map_or_else(|| self.scanner.settled_prefix(), Frame::end),
        };

        if consumed > 0 {
            debug!(
                session_id = %self.id,
                frames = frames.len(),
                consumed,
                "buffer prefix consumed"
            );
            self.buffer.advance(consumed);
            self.scanner.consume(consumed);
        }

        Ok(())
    }
}
