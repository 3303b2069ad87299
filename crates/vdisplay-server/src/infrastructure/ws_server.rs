//! WebSocket server: accept loop and per-connection tasks.
//!
//! Each accepted connection runs two Tokio tasks:
//!
//! - **writer**: forwards every frame from the [`BroadcastHub`] to the
//!   socket, binary access units as binary frames and text lines as text
//!   frames;
//! - **reader**: reads text frames and hands them to the
//!   [`CommandDispatcher`] on the blocking pool, awaiting each one so a
//!   connection's commands run in the order they arrived.
//!
//! When either task ends the other is aborted and the connection is gone.
//! Closing a connection never touches the display session; other clients
//! may still be watching it.
//!
//! The accept loop polls the shared `running` flag every 200 ms and returns
//! once it is cleared.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::dispatch::CommandDispatcher;
use crate::infrastructure::broadcast::{BroadcastHub, Outbound};

/// How often the accept loop re-checks the shutdown flag.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the listener.
///
/// # Errors
///
/// Returns an error if the address is in use or cannot be bound.
pub async fn bind_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))?;
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    info!("vdisplay server listening on {local}");
    Ok(listener)
}

/// Accepts connections until `running` is cleared.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher>,
    hub: BroadcastHub,
    running: Arc<AtomicBool>,
) {
    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                let dispatcher = Arc::clone(&dispatcher);
                let hub = hub.clone();
                tokio::spawn(async move {
                    handle_connection(stream, peer, dispatcher, hub).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<CommandDispatcher>,
    hub: BroadcastHub,
) {
    let id = Uuid::new_v4();
    match run_connection(stream, peer, id, dispatcher, hub).await {
        Ok(()) => info!("connection {id} ({peer}) closed"),
        Err(e) => warn!("connection {id} ({peer}) closed with error: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer: SocketAddr,
    id: Uuid,
    dispatcher: Arc<CommandDispatcher>,
    hub: BroadcastHub,
) -> anyhow::Result<()> {
    let ws = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer}"))?;

    // Frames broadcast from here on reach this connection.
    let mut outbound = hub.subscribe();
    info!(
        "connection {id} open from {peer} ({} connected)",
        hub.connection_count()
    );

    let (mut ws_tx, mut ws_rx) = ws.split();

    // ── Writer: broadcast → socket ────────────────────────────────────────────
    let writer = tokio::spawn(async move {
        loop {
            let frame = match outbound.recv().await {
                Ok(frame) => frame,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("connection {id} fell behind; skipped {skipped} frame(s)");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let message = match frame {
                Outbound::Binary(bytes) => WsMessage::Binary(bytes),
                Outbound::Text(line) => WsMessage::Text(line),
            };
            if ws_tx.send(message).await.is_err() {
                debug!("connection {id}: send failed (peer gone)");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // ── Reader: socket → dispatcher ───────────────────────────────────────────
    let reader = tokio::spawn(async move {
        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    let dispatcher = Arc::clone(&dispatcher);
                    let handled =
                        tokio::task::spawn_blocking(move || dispatcher.handle_text(&text)).await;
                    if let Err(e) = handled {
                        error!("connection {id}: command handler panicked: {e}");
                    }
                }
                Ok(WsMessage::Binary(bytes)) => {
                    debug!("connection {id}: ignoring {} byte binary frame", bytes.len());
                }
                Ok(WsMessage::Close(_)) => break,
                // Ping/pong are answered by tungstenite.
                Ok(_) => {}
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => break,
                Err(e) => {
                    warn!("connection {id}: read error: {e}");
                    break;
                }
            }
        }
    });

    let writer_abort = writer.abort_handle();
    let reader_abort = reader.abort_handle();
    tokio::select! {
        _ = writer => debug!("connection {id}: writer finished"),
        _ = reader => debug!("connection {id}: reader finished"),
    }
    writer_abort.abort();
    reader_abort.abort();

    Ok(())
}
