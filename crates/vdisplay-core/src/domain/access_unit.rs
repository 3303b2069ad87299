//! Encoded access units and the rule that orders them on the wire.
//!
//! # CONFIG before FRAME
//!
//! A decoder cannot decode any frame until it has seen the codec parameter
//! sets (SPS/PPS for H.264).  The encoder reports those in one of two ways:
//!
//! 1. as part of the *output format* it publishes when it first changes format, or
//! 2. as ordinary output buffers flagged "codec config".
//!
//! Some encoders do both.  [`ConfigGate`] makes sure exactly one CONFIG group
//! reaches clients per session, always before the first FRAME:
//!
//! ```text
//! AwaitingConfig ──format change──▶ Config(FormatChange) ──frame──▶ Streaming
//!       │                                                             ▲
//!       └──config buffer──▶ Config(Buffer) ──more config buffers──────┤
//!                                           └──frame──────────────────┘
//! ```
//!
//! Frames seen while still awaiting config are dropped, and any config seen
//! after the group was closed is dropped too.

/// Kind of an encoded access unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessUnitKind {
    /// Codec initialisation parameters.
    Config,
    /// An encoded picture.
    Frame,
}

/// One encoded, independently meaningful chunk of compressed video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAccessUnit {
    pub kind: AccessUnitKind,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigSource {
    FormatChange,
    Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GateState {
    AwaitingConfig,
    Config(ConfigSource),
    Streaming,
}

/// Admission gate enforcing one CONFIG group per session, before any FRAME.
#[derive(Debug, Clone)]
pub struct ConfigGate {
    state: GateState,
}

impl Default for ConfigGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigGate {
    pub fn new() -> Self {
        Self {
            state: GateState::AwaitingConfig,
        }
    }

    /// Returns `true` if the parameter sets of a format change should be
    /// broadcast.  Only the first config source of a session is admitted.
    pub fn admit_format_change(&mut self) -> bool {
        if self.state == GateState::AwaitingConfig {
            self.state = GateState::Config(ConfigSource::FormatChange);
            true
        } else {
            false
        }
    }

    /// Returns `true` if a buffer flagged as codec config should be broadcast.
    ///
    /// Several consecutive config buffers form one group, as long as no frame
    /// and no format change has been admitted before them.
    pub fn admit_config_buffer(&mut self) -> bool {
        match self.state {
            GateState::AwaitingConfig | GateState::Config(ConfigSource::Buffer) => {
                self.state = GateState::Config(ConfigSource::Buffer);
                true
            }
            _ => false,
        }
    }

    /// Returns `true` if a frame should be broadcast; closes the config group.
    pub fn admit_frame(&mut self) -> bool {
        match self.state {
            GateState::AwaitingConfig => false,
            GateState::Config(_) | GateState::Streaming => {
                self.state = GateState::Streaming;
                true
            }
        }
    }

    /// Returns `true` once a config group has been admitted.
    pub fn config_sent(&self) -> bool {
        self.state != GateState::AwaitingConfig
    }
}
