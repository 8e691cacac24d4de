//! HTTP and WebSocket endpoint.
//!
//! This module is responsible for:
//!
//! 1. Serving the bootstrap page at `/`.  Each page load creates a session
//!    with a fresh client id and runs the page builder against it, in shadow
//!    or catching mode.  The orphan timer starts right away, so a page that
//!    never opens a socket does not keep its session.
//! 2. Upgrading `ws_path` requests to WebSockets.  The first frame on a socket
//!    must be a hello; it names the session to attach.  A hello for an
//!    unknown session is answered with close code [`UNKNOWN_SESSION`], which
//!    makes the browser reload the page.
//! 3. Routing inbound callbacks and error reports to the session.
//! 4. Detaching the session when the socket ends and starting its orphan
//!    timer.
//!
//! Each socket runs in its own task plus one forwarding task that drains the
//! session's outbound channel into the socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tether_core::{decode_client_message, encode_server_message, ClientMessage, ServerMessage};

use crate::application::{Document, Session};
use crate::domain::{RenderMode, ServerConfig};
use crate::infrastructure::page::render_page;
use crate::infrastructure::session_store::SessionStore;

/// Close code sent when a hello names a session the server does not have.
pub const UNKNOWN_SESSION: u16 = 4001;

/// Close code sent when the first frame is not a valid hello.
pub const PROTOCOL_ERROR: u16 = 4002;

/// Builds the initial page for a new session.
pub type PageBuilder = Arc<dyn Fn(&Document) + Send + Sync>;

/// Shared state of the router.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SessionStore>,
    pub config: Arc<ServerConfig>,
    pub builder: PageBuilder,
}

impl AppState {
    pub fn new(config: ServerConfig, builder: PageBuilder) -> Self {
        Self {
            store: SessionStore::new(config.orphan_timeout),
            config: Arc::new(config),
            builder,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    #[serde(rename = "clientId")]
    client_id: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let ws_path = state.config.ws_path.clone();
    Router::new()
        .route("/", get(serve_page))
        .route(&ws_path, get(ws_handler))
        .with_state(state)
}

/// Binds `config.bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(
    config: ServerConfig,
    builder: PageBuilder,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind listener on {}", config.bind_addr))?;
    info!("tether listening on http://{}", config.bind_addr);
    serve(listener, AppState::new(config, builder), running).await
}

/// Serves on an already-bound listener.  All sessions are closed on return.
pub async fn serve(listener: TcpListener, state: AppState, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let store = Arc::clone(&state.store);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(wait_for_shutdown(running))
        .await
        .context("HTTP server failed")?;
    store.close_all();
    Ok(())
}

async fn wait_for_shutdown(running: Arc<AtomicBool>) {
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    while running.load(Ordering::Relaxed) {
        tick.tick().await;
    }
    info!("shutdown flag set; stopping server");
}

// ── Page ──────────────────────────────────────────────────────────────────────

async fn serve_page(State(state): State<AppState>) -> Html<String> {
    let client_id = Uuid::new_v4().to_string();
    let debug_tokens = state.config.debug_tokens;
    let payload = match state.config.render_mode {
        RenderMode::Shadow => {
            let session = Arc::new(Session::with_shadow(client_id.clone(), debug_tokens));
            state.store.insert(Arc::clone(&session));
            state.store.schedule_expiry(&session);
            (state.builder)(&Document::new(session));
            String::new()
        }
        RenderMode::Catching => {
            let session = Arc::new(Session::new(client_id.clone(), debug_tokens));
            state.store.insert(Arc::clone(&session));
            state.store.schedule_expiry(&session);
            let document = Document::new(session);
            let ((), js) = document.session().catch_outbound(|| (state.builder)(&document));
            js
        }
    };
    Html(render_page(&client_id, &state.config.ws_path, &payload))
}

// ── Socket ────────────────────────────────────────────────────────────────────

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, params.client_id, state))
}

async fn handle_socket(socket: WebSocket, url_client_id: Option<String>, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let client_id = match await_hello(&mut stream, url_client_id).await {
        Ok(id) => id,
        Err(e) => {
            warn!("rejecting socket: {e:#}");
            close(&mut sink, PROTOCOL_ERROR, "expected hello").await;
            return;
        }
    };
    let Some(session) = state.store.get(&client_id) else {
        warn!("client {client_id}: hello for unknown session");
        close(&mut sink, UNKNOWN_SESSION, "unknown session").await;
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let attachment = session.transport_ready(tx);

    let forward_id = client_id.clone();
    let forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match encode_server_message(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("client {forward_id}: dropping unencodable {} message: {e}", msg.body.kind());
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                debug!("client {forward_id}: socket write failed");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_frame(&session, &text),
            Ok(Message::Close(_)) => break,
            Ok(Message::Binary(_)) => warn!("client {client_id}: binary frame ignored"),
            Ok(_) => {}
            Err(e) => {
                debug!("client {client_id}: socket error: {e}");
                break;
            }
        }
    }

    forward.abort();
    if session.detach_transport(attachment) {
        state.store.schedule_expiry(&session);
    }
}

/// Reads frames until the first text frame, which must be a hello.  Returns
/// the client id it names, falling back to the id in the socket URL.
async fn await_hello(
    stream: &mut SplitStream<WebSocket>,
    url_client_id: Option<String>,
) -> anyhow::Result<String> {
    while let Some(frame) = stream.next().await {
        match frame.context("socket failed before hello")? {
            Message::Text(text) => {
                return match decode_client_message(&text)? {
                    ClientMessage::Hello { client_id } => client_id
                        .or(url_client_id)
                        .context("hello carries no client id"),
                    other => bail!("expected hello, got {}", other.kind()),
                };
            }
            Message::Close(_) => bail!("socket closed before hello"),
            _ => {}
        }
    }
    bail!("socket ended before hello")
}

fn handle_frame(session: &Session, text: &str) {
    let msg = match decode_client_message(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("client {}: malformed frame: {e}", session.client_id());
            return;
        }
    };
    if let Some(claimed) = msg.client_id() {
        if claimed != session.client_id() {
            warn!(
                "client {}: dropping {} claiming client {claimed}",
                session.client_id(),
                msg.kind()
            );
            return;
        }
    }
    match msg {
        ClientMessage::Callback {
            callback_id, data, ..
        } => {
            session.handle_callback(callback_id, data);
        }
        ClientMessage::Error {
            debug_token, error, ..
        } => session.handle_error(&debug_token, error),
        ClientMessage::Hello { .. } => debug!("client {}: repeated hello ignored", session.client_id()),
    }
}

async fn close(sink: &mut SplitSink<WebSocket, Message>, code: u16, reason: &'static str) {
    let frame = CloseFrame {
        code,
        reason: reason.into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!("close frame not sent: {e}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
