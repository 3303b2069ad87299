//! One-shot startup self-test: connect to our own listener, then hang up.
//!
//! Confirms the listener accepts WebSocket handshakes before any real client
//! shows up.  It has no effect on the display session.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tracing::info;

/// Upper bound for the whole self-test.
pub const SELF_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Connects to `addr`, completes the handshake, and closes the connection.
///
/// An unspecified bind address (`0.0.0.0`) is reached through loopback.
///
/// # Errors
///
/// Returns an error if the connection, handshake or close fails or the
/// handshake does not complete within `limit`.
pub async fn run_self_test(addr: SocketAddr, limit: Duration) -> anyhow::Result<()> {
    let mut target = addr;
    if target.ip().is_unspecified() {
        target.set_ip(Ipv4Addr::LOCALHOST.into());
    }
    let url = format!("ws://{target}");

    let (mut ws, _response) = timeout(limit, connect_async(url.as_str()))
        .await
        .with_context(|| format!("self-test timed out connecting to {url}"))?
        .with_context(|| format!("self-test could not connect to {url}"))?;

    ws.close(None).await.context("self-test close failed")?;
    info!("self-test connection to {url} succeeded");
    Ok(())
}
