//! Infrastructure layer for the vdisplay server.
//!
//! Everything that touches the network, the Tokio runtime, the file system
//! or a concrete platform lives here:
//!
//! - [`broadcast`]: fan-out of outbound frames to every open connection.
//! - [`ws_server`]: WebSocket accept loop and per-connection tasks.
//! - [`self_test`]: one-shot startup connection to the server's own port.
//! - [`logging`]: `tracing` subscriber setup and diagnostic forwarding.
//! - [`config`]: TOML configuration file.
//! - [`platform`]: platform service implementations.

pub mod broadcast;
pub mod config;
pub mod logging;
pub mod platform;
pub mod self_test;
pub mod ws_server;
