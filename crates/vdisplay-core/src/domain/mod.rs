//! Domain rules for the vdisplay server.
//!
//! Everything here is pure: no OS calls, no threads, no sockets.  The server's
//! application layer applies these rules while it drives the platform.

/// Encoded access units and the CONFIG-before-FRAME ordering gate.
pub mod access_unit;

/// Virtual-display capability flags.
pub mod display_flags;

/// H.264 encoder configuration.
pub mod encoder_format;

/// Encoder dimension alignment and swipe interpolation.
pub mod geometry;

/// Synthetic touch and key events.
pub mod input;
