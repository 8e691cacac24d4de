//! Network infrastructure for the headless client.
//!
//! Architecture:
//! - [`fetch_client_id`] loads the page with `reqwest` and reads the client
//!   id the server embedded in it.
//! - [`run`] owns the WebSocket.  Inbound text frames go through the
//!   [`ClientDispatcher`]; replies and application messages (listener
//!   callbacks) go out through the [`Connection`] queue, so nothing is lost
//!   while the socket is down.
//! - A clean close reconnects after `reconnect_delay`; anything else ends
//!   the run with [`RunOutcome::Reload`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::time;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use tether_core::{encode_client_message, ClientMessage};

use crate::application::{ClientDispatcher, Connection, ConnectionState};
use crate::domain::ClientConfig;

/// Marker preceding the client id in the served page.
const CLIENT_ID_MARKER: &str = "const tetherClientId = \"";

/// How often the read loop checks the `running` flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// Errors that can occur while loading the page.
#[derive(Debug, Error)]
pub enum ClientNetworkError {
    #[error("failed to connect to server at {addr}: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered, but not with a page.
    #[error("page request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The page did not carry a client id.
    #[error("page from {0} has no client id")]
    NoClientId(SocketAddr),
}

/// Why [`run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The session is gone; a browser would reload the page here.
    Reload,
    /// `running` was cleared.
    Stopped,
}

/// Loads `/` from `addr` and returns the client id embedded in the page.
///
/// # Errors
///
/// Returns [`ClientNetworkError`] if the server is unreachable or the page
/// does not carry an id.
pub async fn fetch_client_id(addr: SocketAddr) -> Result<String, ClientNetworkError> {
    let response = reqwest::get(format!("http://{addr}/")).await.map_err(|source| {
        if source.is_connect() {
            ClientNetworkError::ConnectFailed { addr, source }
        } else {
            ClientNetworkError::Http(source)
        }
    })?;
    let page = response.error_for_status()?.text().await?;
    extract_client_id(&page).ok_or(ClientNetworkError::NoClientId(addr))
}

fn extract_client_id(page: &str) -> Option<String> {
    let rest = page.split(CLIENT_ID_MARKER).nth(1)?;
    let id = rest.split('"').next()?;
    (!id.is_empty()).then(|| id.to_string())
}

/// Drives one page's socket until the session is lost or `running` clears.
///
/// Messages received on `outgoing` are sent as they arrive, or queued while
/// the socket is down.
///
/// # Errors
///
/// Returns an error if a frame cannot be written or encoded, or if a
/// server message cannot be applied.  A browser client cannot recover from
/// the latter either.
pub async fn run(
    config: ClientConfig,
    dispatcher: Arc<Mutex<ClientDispatcher>>,
    mut outgoing: mpsc::UnboundedReceiver<ClientMessage>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<RunOutcome> {
    let client_id = dispatcher.lock().await.client_id().to_string();
    let url = config.ws_url(&client_id);
    let mut connection = Connection::new(client_id.clone());
    let mut outgoing_open = true;

    while running.load(Ordering::Relaxed) {
        let ws = match connect_async(url.as_str()).await {
            Ok((ws, _)) => ws,
            Err(e) => {
                warn!("could not connect to {url}: {e}");
                connection.on_error();
                return Ok(RunOutcome::Reload);
            }
        };
        info!("client {client_id}: connected to {url}");
        let (mut sink, mut stream) = ws.split();
        for frame in connection.on_open()? {
            sink.send(Message::Text(frame)).await?;
        }

        let mut poll = time::interval(SHUTDOWN_POLL);
        let mut close_code = None;
        loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let replies = dispatcher.lock().await.handle_text(&text);
                        match replies {
                            Ok(replies) => {
                                for reply in replies {
                                    if let Some(frame) = connection.send(reply) {
                                        sink.send(Message::Text(frame)).await?;
                                    }
                                }
                            }
                            Err(e) => {
                                error!("client {client_id}: {e}");
                                return Err(e.into());
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_code = frame.map(|f| u16::from(f.code));
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("client {client_id}: socket error: {e}");
                        connection.on_error();
                        return Ok(RunOutcome::Reload);
                    }
                    None => break,
                },
                msg = outgoing.recv(), if outgoing_open => match msg {
                    Some(msg) => {
                        debug!("client {client_id}: sending {}", msg.kind());
                        let frame = encode_client_message(&msg)?;
                        if let Some(frame) = connection.send(frame) {
                            sink.send(Message::Text(frame)).await?;
                        }
                    }
                    None => outgoing_open = false,
                },
                _ = poll.tick() => {
                    if !running.load(Ordering::Relaxed) {
                        let close = CloseFrame {
                            code: CloseCode::Normal,
                            reason: "client stopping".into(),
                        };
                        if let Err(e) = sink.send(Message::Close(Some(close))).await {
                            debug!("close frame not sent: {e}");
                        }
                        return Ok(RunOutcome::Stopped);
                    }
                }
            }
        }

        match connection.on_close(close_code) {
            ConnectionState::Reconnecting => {
                info!("client {client_id}: reconnecting in {:?}", config.reconnect_delay);
                time::sleep(config.reconnect_delay).await;
                connection.reconnect();
            }
            _ => return Ok(RunOutcome::Reload),
        }
    }
    Ok(RunOutcome::Stopped)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
