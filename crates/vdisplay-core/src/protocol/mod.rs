//! Protocol module containing the inbound command grammar and outbound text frames.
//!
//! Binary frames carry raw encoded access units with no additional framing, so
//! they need no codec here.

pub mod command;
pub mod response;

pub use command::{parse_command, Command, DisplayRequest, ProtocolError};
pub use response::ServerText;
