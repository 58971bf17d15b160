//! HTTP/SSE surface.
//!
//! `POST /stream` takes an [`AgentRequest`] body, opens the upstream
//! answer, and streams the demultiplexed events back as Server-Sent
//! Events:
//!
//! | Event                   | SSE encoding                                  |
//! |-------------------------|-----------------------------------------------|
//! | tool notice             | `event: tool`, JSON payload                   |
//! | text delta              | unnamed event, raw text                       |
//! | answer complete         | `event: content-complete`, `{"text": ...}`    |
//! | failure                 | `event: error`, error message                 |
//!
//! SSE data lines end at `\r`, `\n` or `\r\n`, so a text delta carrying
//! `\r\n` is sent with `\n` in its place and reaches the client as one
//! line break. The `content-complete` text is JSON and keeps it verbatim.
//!
//! `GET /health` answers `ok`.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::GlobalConfig;
use crate::demux::{DemuxSession, StreamEvent};
use crate::upstream::{run_relay, AgentClient, AgentRequest};
use crate::{AppError, Result};

/// Events buffered per stream before the relay waits for the client.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared state for request handlers.
#[derive(Debug)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Upstream agent client.
    pub client: AgentClient,
    /// Parent token of every relay; cancelled on shutdown.
    pub shutdown: CancellationToken,
}

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stream", post(stream_answer))
        .with_state(state)
}

/// Handler for `POST /stream`.
async fn stream_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AgentRequest>,
) -> Response {
    let session = match DemuxSession::new(&state.config.demux) {
        Ok(session) => session,
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, &err),
    };

    let upstream = match state.client.open(&request).await {
        Ok(upstream) => upstream,
        Err(err) => {
            error!(%err, thread_id = %request.thread_id, "failed to open upstream stream");
            return error_response(StatusCode::BAD_GATEWAY, &err);
        }
    };

    info!(
        session_id = %session.id(),
        thread_id = %request.thread_id,
        "streaming answer"
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    tokio::spawn(run_relay(
        session,
        upstream,
        event_tx,
        state.shutdown.child_token(),
    ));

    let events = futures_util::stream::unfold(event_rx, |mut rx| async move {
        let item = rx.recv().await?;
        Some((Ok::<Event, Infallible>(sse_event(item)), rx))
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// Encode one relay item as an SSE event.
#[must_use]
pub fn sse_event(item: Result<StreamEvent>) -> Event {
    match item {
        Ok(StreamEvent::Tool { payload }) => Event::default().event("tool").data(payload.to_string()),
        Ok(StreamEvent::ContentDelta { text }) => Event::default().data(text.replace("\r\n", "\n")),
        Ok(StreamEvent::ContentComplete { text }) => Event::default()
            .event("content-complete")
            .data(serde_json::json!({ "text": text }).to_string()),
        Err(err) => Event::default().event("error").data(err.to_string()),
    }
}

fn error_response(status: StatusCode, err: &AppError) -> Response {
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// Serve on `127.0.0.1:{config.http_port}` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the listener cannot be bound or the server
/// fails.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = SocketAddr::from(([127, 0, 0, 1], state.config.http_port));
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|err| AppError::Io(format!("failed to bind {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve on an already bound listener until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_on(listener: TcpListener, state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener has no local address: {err}")))?;
    info!(%addr, "starting HTTP/SSE relay");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
            shutdown.cancel();
        })
        .await
        .map_err(|err| AppError::Io(format!("server error: {err}")))?;

    info!("HTTP/SSE relay shut down");
    Ok(())
}
