//! Upstream agent service plumbing.
//!
//! - `client`: [`AgentClient`](client::AgentClient), the HTTP client that
//!   opens one streaming answer per question.
//! - `relay`: async task that pushes the upstream byte stream through a
//!   [`DemuxSession`](crate::demux::DemuxSession) and forwards the
//!   resulting events to a channel.

pub mod client;
pub mod relay;

pub use client::{AgentClient, AgentRequest, ChunkStream};
pub use relay::{run_relay, RelayOutcome};
