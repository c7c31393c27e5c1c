//! WebSocket server: accept loop and per-connection session tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted connection to a WebSocket session.
//! 3. Creating one [`ProtocolServer`] per connection.
//! 4. Running a `select!` loop per connection that
//!    - decodes inbound text frames and answers each with the server's response,
//!    - forwards everything published on the session's outgoing channel.
//! 5. Shutting the session down when the connection ends.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! Each connection runs in its own Tokio task; the accept loop never waits on
//! session I/O.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use intercom_core::{decode_message, encode_message, ErrorClass, Message, SERVER_MESSAGE_ID};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{DeviceHandler, LogSink, ProtocolServer};
use crate::domain::ServerConfig;

const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves connections until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    config: ServerConfig,
    log_sink: Arc<dyn LogSink>,
    devices: Arc<dyn DeviceHandler>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!(addr = %config.bind_addr, "intercom server listening");
    serve(listener, config, log_sink, devices, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// # Errors
///
/// Currently infallible once bound; accept errors are logged and skipped.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    log_sink: Arc<dyn LogSink>,
    devices: Arc<dyn DeviceHandler>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the flag is rechecked while idle.
        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let server = ProtocolServer::new(
                    config.clone(),
                    Arc::clone(&devices),
                    Arc::clone(&log_sink),
                );
                tokio::spawn(handle_connection(stream, peer_addr, server));
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, server: ProtocolServer) {
    let session_id = Uuid::new_v4();
    info!(%session_id, %peer_addr, "client connected");

    let result = run_session(stream, peer_addr, &server, session_id).await;
    server.shutdown().await;

    match result {
        Ok(()) => info!(%session_id, "session closed normally"),
        Err(e) => warn!(%session_id, "session closed with error: {e:#}"),
    }
}

async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    server: &ProtocolServer,
    session_id: Uuid,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let mut outgoing = server.subscribe_outgoing();

    loop {
        tokio::select! {
            frame = ws_rx.next() => {
                let frame = match frame {
                    Some(Ok(frame)) => frame,
                    Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                        debug!(%session_id, "client stream ended");
                        break;
                    }
                    Some(Err(e)) => return Err(e).context("WebSocket read failed"),
                };

                match frame {
                    WsMessage::Text(text) => {
                        let response = match decode_message(&text) {
                            Ok(message) => server.handle(message).await,
                            Err(e) => {
                                warn!(%session_id, "undecodable frame: {e}");
                                Message::error(SERVER_MESSAGE_ID, ErrorClass::Message, e.to_string())
                            }
                        };
                        send(&mut ws_tx, &response).await?;
                    }
                    WsMessage::Binary(_) => {
                        let response = Message::error(
                            SERVER_MESSAGE_ID,
                            ErrorClass::Message,
                            "binary frames are not supported",
                        );
                        send(&mut ws_tx, &response).await?;
                    }
                    WsMessage::Close(_) => {
                        debug!(%session_id, "close frame received");
                        break;
                    }
                    // Pong replies are queued by tungstenite itself.
                    WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
                }
            }
            Some(message) = outgoing.recv() => {
                send(&mut ws_tx, &message).await?;
            }
        }
    }

    Ok(())
}

async fn send<S>(sink: &mut S, message: &Message) -> anyhow::Result<()>
where
    S: futures_util::Sink<WsMessage, Error = WsError> + Unpin,
{
    let text = encode_message(message).context("failed to encode outgoing message")?;
    sink.send(WsMessage::Text(text))
        .await
        .context("WebSocket send failed")
}
