//! vdisplay server entry point (supervisor).
//!
//! Creates a virtual display on request, streams its H.264 encoding to every
//! connected client, and injects touch and key input into it.
//!
//! # Usage
//!
//! ```text
//! vdisplay-server [OPTIONS]
//!
//! Options:
//!   --port <PORT>        Listener port [default: 27183]
//!   --bind <ADDR>        Listener address [default: 127.0.0.1]
//!   --config <PATH>      TOML configuration file
//!   --log-file <PATH>    Persistent log file
//!   --no-self-test       Skip the startup self-test connection
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable            | Flag          |
//! |---------------------|---------------|
//! | `VDISPLAY_PORT`     | `--port`      |
//! | `VDISPLAY_BIND`     | `--bind`      |
//! | `VDISPLAY_CONFIG`   | `--config`    |
//! | `VDISPLAY_LOG_FILE` | `--log-file`  |
//!
//! `RUST_LOG` overrides the configured log level.
//!
//! # Startup order
//!
//! 1. Load configuration, apply flags.
//! 2. Create the broadcast hub, then logging (the diagnostic layer needs the hub).
//! 3. Wire the platform, bridge, injector, session controller and dispatcher.
//! 4. Bind the listener, spawn the self-test, install the Ctrl+C handler.
//! 5. Serve until Ctrl+C, then release the display session.

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use vdisplay_server::application::dispatch::CommandDispatcher;
use vdisplay_server::application::display_session::DisplayController;
use vdisplay_server::application::frame_sink::FrameSink;
use vdisplay_server::application::input_injector::InputInjector;
use vdisplay_server::application::privileged_bridge::PrivilegedServiceBridge;
use vdisplay_server::infrastructure::broadcast::BroadcastHub;
use vdisplay_server::infrastructure::config::ServerConfig;
use vdisplay_server::infrastructure::logging::init_logging;
use vdisplay_server::infrastructure::platform::simulated::{
    SimulatedDisplayServices, SimulatedEncoderFactory,
};
use vdisplay_server::infrastructure::self_test::{run_self_test, SELF_TEST_TIMEOUT};
use vdisplay_server::infrastructure::ws_server::{bind_listener, serve};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Virtual-display mirroring and remote-control server.
#[derive(Debug, Parser)]
#[command(
    name = "vdisplay-server",
    about = "Streams a virtual display as H.264 and injects input over a loopback WebSocket",
    version
)]
struct Cli {
    /// TCP port to listen on.  Overrides `[server] port`.
    #[arg(long, env = "VDISPLAY_PORT")]
    port: Option<u16>,

    /// IP address to bind.  Overrides `[server] bind_address`.
    ///
    /// The socket is unauthenticated; keep it on loopback.
    #[arg(long, env = "VDISPLAY_BIND")]
    bind: Option<String>,

    /// TOML configuration file.
    #[arg(long, env = "VDISPLAY_CONFIG")]
    config: Option<PathBuf>,

    /// Persistent log file.  Overrides `[logging] file`.
    #[arg(long, env = "VDISPLAY_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Skip the startup self-test connection.
    #[arg(long)]
    no_self_test: bool,
}

impl Cli {
    /// Loads the configuration file (if any) and applies the flags on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be read or parsed.
    fn into_server_config(self) -> anyhow::Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(bind) = self.bind {
            config.server.bind_address = bind;
        }
        if let Some(file) = self.log_file {
            config.logging.file = Some(file);
        }
        if self.no_self_test {
            config.server.self_test = false;
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_server_config()?;
    let addr = config.socket_addr()?;

    // ── Logging ───────────────────────────────────────────────────────────────
    let hub = BroadcastHub::new(config.server.broadcast_capacity);
    let sink: Arc<dyn FrameSink> = Arc::new(hub.clone());
    let _log_guard = init_logging(&config.logging, Arc::clone(&sink))?;

    info!("vdisplay server starting on {addr}");
    if !addr.ip().is_loopback() {
        warn!("listening on non-loopback address {addr}; the socket has no authentication");
    }

    // ── Wiring ────────────────────────────────────────────────────────────────
    let services = Arc::new(SimulatedDisplayServices::new());
    let encoders = Arc::new(SimulatedEncoderFactory::synthetic());
    let bridge = Arc::new(PrivilegedServiceBridge::new(services));
    let injector = Arc::new(
        InputInjector::new(Arc::clone(&bridge), config.tap_delay())
            .with_max_swipe(config.max_swipe()),
    );
    let controller = Arc::new(DisplayController::new(
        Arc::clone(&bridge),
        encoders,
        Arc::clone(&injector),
        Arc::clone(&sink),
        config.session_settings(),
    ));
    let dispatcher = Arc::new(CommandDispatcher::new(
        Arc::clone(&controller),
        injector,
        config.screenshot_service(),
        bridge,
        sink,
        config.display.default_bitrate_kbps,
    ));

    // ── Listener and self-test ────────────────────────────────────────────────
    let listener = bind_listener(addr).await?;
    let local_addr = listener.local_addr().context("listener has no local address")?;

    if config.server.self_test {
        tokio::spawn(async move {
            if let Err(e) = run_self_test(local_addr, SELF_TEST_TIMEOUT).await {
                error!("self-test failed: {e:#}");
            }
        });
    }

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    // ── Serve ─────────────────────────────────────────────────────────────────
    serve(listener, dispatcher, hub, running).await;

    let released = tokio::task::spawn_blocking(move || controller.release_display())
        .await
        .context("session release task failed")?;
    if released {
        info!("active display session released");
    }

    info!("vdisplay server stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
