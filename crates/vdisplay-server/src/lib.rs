//! vdisplay-server library crate.
//!
//! Re-exports all public modules so that integration tests in `tests/` and the
//! binary entry point in `main.rs` share the same module tree.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Automation client (text commands over WebSocket)
//!         ↕  binary access units / text frames (broadcast)
//! [vdisplay-server]
//!   ├── application/       Capability ports and the use cases built on them:
//!   │     privileged_bridge  display / window / activity services
//!   │     video_encoder      hardware encoder + drain thread
//!   │     display_session    IDLE → CREATING → STREAMING → RELEASING
//!   │     input_injector     tap / swipe / touch / key
//!   │     screenshot         one-off PNG capture
//!   │     dispatch           command line → use case
//!   └── infrastructure/
//!         broadcast          fan-out to every open connection
//!         ws_server          accept loop (tokio-tungstenite)
//!         self_test          one-shot startup connection
//!         logging            tracing layers, diagnostic forwarding
//!         config             CLI/TOML settings
//!         platform           simulated platform services
//! ```
//!
//! # Layer rules
//!
//! - `application` depends on `vdisplay-core` and on the capability traits it
//!   declares itself.  It never touches sockets or the Tokio runtime.
//! - `infrastructure` depends on everything else and supplies concrete
//!   implementations of the application's ports.

/// Application layer: capability ports and use cases.
pub mod application;

/// Infrastructure layer: network server, logging, configuration, platform adapters.
pub mod infrastructure;
