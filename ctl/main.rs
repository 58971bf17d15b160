#![forbid(unsafe_code)]

//! `agent-demux-ctl`: local CLI companion for `agent-demux`.
//!
//! Runs the demultiplexer outside the HTTP relay: either over a captured
//! upstream answer on disk, or against the live agent service. Every
//! event is printed to stdout as one JSON line; logs go to stderr.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use agent_demux::config::DemuxConfig;
use agent_demux::demux::{DemuxSession, EventSink, StreamEvent};
use agent_demux::upstream::{run_relay, AgentClient, AgentRequest, RelayOutcome};
use agent_demux::{AppError, GlobalConfig, Result};

/// Event channel depth for `ask`.
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Parser)]
#[command(
    name = "agent-demux-ctl",
    about = "Local CLI for the agent-demux stream demultiplexer",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Demultiplex a captured upstream answer.
    Replay {
        /// File holding the raw answer bytes.
        file: PathBuf,

        /// Feed the file in chunks of this many bytes.
        #[arg(long, default_value_t = 64)]
        chunk_size: usize,

        /// Take demux constants from this TOML configuration.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Ask the configured agent a question and print its answer events.
    Ask {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: PathBuf,

        /// Question text.
        #[arg(long)]
        question: String,

        /// Conversation thread identifier.
        #[arg(long, default_value = "ctl")]
        thread_id: String,
    },
}

/// Prints events to stdout as JSON lines.
struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    fn write_line(&mut self, line: &serde_json::Value) -> Result<()> {
        writeln!(self.out, "{line}").map_err(|err| AppError::Sink(format!("stdout: {err}")))
    }
}

impl<W: Write> EventSink for JsonLines<W> {
    fn emit(&mut self, event: StreamEvent) -> Result<()> {
        let line = serde_json::to_value(&event)
            .map_err(|err| AppError::Sink(format!("failed to encode event: {err}")))?;
        self.write_line(&line)
    }

    fn fail(&mut self, error: &AppError) -> Result<()> {
        self.write_line(&serde_json::json!({ "type": "error", "message": error.to_string() }))
    }
}

fn main() {
    let args = Cli::parse();
    // Logs share the terminal with the JSON output, so they go to stderr.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();

    let outcome = match args.command {
        Command::Replay {
            file,
            chunk_size,
            config,
        } => replay(&file, chunk_size, config.as_deref()),
        Command::Ask {
            config,
            question,
            thread_id,
        } => ask(&config, question, thread_id),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

/// Feed `file` through one session in `chunk_size` pieces.
fn replay(file: &std::path::Path, chunk_size: usize, config: Option<&std::path::Path>) -> Result<()> {
    if chunk_size == 0 {
        return Err(AppError::Config("--chunk-size must be positive".into()));
    }

    let demux = match config {
        Some(path) => GlobalConfig::load_from_path(path)?.demux,
        None => DemuxConfig::default(),
    };
    let raw = std::fs::read(file)
        .map_err(|err| AppError::Io(format!("cannot read {}: {err}", file.display())))?;

    let mut session = DemuxSession::new(&demux)?;
    let mut sink = JsonLines {
        out: io::stdout().lock(),
    };

    for chunk in raw.chunks(chunk_size) {
        session.feed(chunk, &mut sink)?;
    }
    session.end_of_stream(&mut sink)
}

/// Stream one live answer from the configured agent.
fn ask(config: &std::path::Path, question: String, thread_id: String) -> Result<()> {
    let config = GlobalConfig::load_from_path(config)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;

    runtime.block_on(async move {
        let client = AgentClient::new(&config.upstream)?;
        let session = DemuxSession::new(&config.demux)?;
        let upstream = client.open(&AgentRequest { question, thread_id }).await?;

        let (event_tx, mut event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let relay = tokio::spawn(run_relay(session, upstream, event_tx, CancellationToken::new()));

        let mut sink = JsonLines {
            out: io::stdout().lock(),
        };
        let mut failure = None;
        while let Some(item) = event_rx.recv().await {
            match item {
                Ok(event) => sink.emit(event)?,
                Err(err) => {
                    sink.fail(&err)?;
                    failure = Some(err);
                }
            }
        }

        match relay.await {
            Ok(RelayOutcome::Completed(_)) => Ok(()),
            Ok(_) => Err(failure.unwrap_or_else(|| AppError::Cancelled("relay stopped early".into()))),
            Err(err) => Err(AppError::Stream(format!("relay task failed: {err}"))),
        }
    })
}
