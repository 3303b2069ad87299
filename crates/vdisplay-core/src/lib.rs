//! # vdisplay-core
//!
//! Shared library for the vdisplay mirroring server containing the text
//! command grammar, the outbound text frame formats, and the pure geometry and
//! encoder rules that the server applies when it builds a virtual display.
//!
//! It has zero dependencies on OS APIs, encoders, or network sockets.
//!
//! # Architecture overview
//!
//! The vdisplay server creates an off-screen *virtual display*, feeds its
//! contents into a hardware H.264 encoder, and streams the encoded access
//! units to every client connected to a loopback WebSocket.  Clients drive the
//! display with single-line text commands (`CREATE_DISPLAY`, `TAP`, `SWIPE`,
//! `SCREENSHOT`, ...).
//!
//! This crate is the shared foundation.  It defines:
//!
//! - **`protocol`** – How clients talk to the server.  Each inbound text line
//!   is parsed into a typed [`Command`]; outbound text frames are built from
//!   [`ServerText`].
//!
//! - **`domain`** – Pure rules with no OS dependencies: dimension alignment for
//!   hardware encoders, linear swipe interpolation, virtual-display capability
//!   flags, the encoder format, and the CONFIG-before-FRAME ordering gate for
//!   encoded access units.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `vdisplay_core::Command` instead of `vdisplay_core::protocol::command::Command`.
pub use domain::access_unit::{AccessUnitKind, ConfigGate, EncodedAccessUnit};
pub use domain::display_flags::VirtualDisplayFlags;
pub use domain::encoder_format::EncoderFormat;
pub use domain::geometry::{align_dimension, swipe_path, DisplayGeometry, PathPoint, SwipePath};
pub use domain::input::{InputEvent, KeyAction, KeyEvent, MotionAction, MotionEvent, DEFAULT_DISPLAY_ID};
pub use protocol::command::{parse_command, Command, DisplayRequest, ProtocolError};
pub use protocol::response::ServerText;
