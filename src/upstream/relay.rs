//! Relay task.
//!
//! Pulls raw chunks from an upstream [`ChunkStream`](super::ChunkStream)
//! (or any compatible stream), pushes them through one [`DemuxSession`],
//! and forwards the resulting events through a tokio [`mpsc`] channel.
//!
//! The channel carries `Ok(event)` items followed by exactly one terminal
//! item: `Ok(StreamEvent::ContentComplete { .. })` on success or
//! `Err(AppError)` on failure. Nothing terminal is sent when the consumer
//! detaches or the relay is cancelled.
//!
//! Dropping the receiver cancels the upstream request: the relay stops
//! polling, discards the session state, and drops the upstream stream,
//! which closes its connection. This happens as soon as the receiver is
//! gone, even while the upstream is silent or yields no events.

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::demux::{DemuxSession, SessionState, SessionStats, StreamEvent};
use crate::Result;

/// How a relay run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The complete event was delivered.
    Completed(SessionStats),
    /// The session failed; the error was delivered as the terminal item.
    Failed,
    /// The receiver was dropped before the stream completed.
    Detached,
    /// The cancellation token fired.
    Cancelled,
}

/// Relay `upstream` through `session` into `event_tx` until a terminal
/// condition is reached.
///
/// # Cancellation
///
/// Respects `cancel`: when the token fires the relay discards the session
/// and returns [`RelayOutcome::Cancelled`] without a terminal item.
pub async fn run_relay<S>(
    mut session: DemuxSession,
    mut upstream: S,
    event_tx: mpsc::Sender<Result<StreamEvent>>,
    cancel: CancellationToken,
) -> RelayOutcome
where
    S: Stream<Item = Result<Bytes>> + Unpin + Send,
{
    let session_id = session.id().to_owned();
    let mut batch: Vec<StreamEvent> = Vec::new();

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "relay: cancellation received, stopping");
                session.cancel();
                return RelayOutcome::Cancelled;
            }

            () = event_tx.closed() => {
                warn!(session_id, "relay: event_tx closed, cancelling upstream");
                session.cancel();
                return RelayOutcome::Detached;
            }

            item = upstream.next() => {
                let step = match item {
                    Some(Ok(chunk)) => session.feed(&chunk, &mut batch),
                    None => {
                        debug!(session_id, "relay: upstream EOF");
                        session.end_of_stream(&mut batch)
                    }
                    Some(Err(err)) => Err(session.abort(err, &mut batch)),
                };

                for event in batch.drain(..) {
                    if event_tx.send(Ok(event)).await.is_err() {
                        warn!(session_id, "relay: event_tx closed, cancelling upstream");
                        session.cancel();
                        return RelayOutcome::Detached;
                    }
                }

                match step {
                    Err(err) => {
                        if event_tx.send(Err(err)).await.is_err() {
                            debug!(session_id, "relay: event_tx closed before failure could be delivered");
                        }
                        return RelayOutcome::Failed;
                    }
                    Ok(()) if session.state() == SessionState::Completed => {
                        return RelayOutcome::Completed(session.stats());
                    }
                    Ok(()) => {}
                }
            }
        }
    }
}
