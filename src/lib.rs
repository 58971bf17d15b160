#![forbid(unsafe_code)]

//! `agent-demux` splits a tagged agent answer stream into tool notices
//! and answer text, and relays both to HTTP clients as Server-Sent Events.

pub mod config;
pub mod demux;
pub mod errors;
pub mod server;
pub mod upstream;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
