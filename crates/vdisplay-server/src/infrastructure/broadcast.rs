//! Fan-out of outbound frames to every open connection.
//!
//! A single bounded `tokio::sync::broadcast` channel carries every outbound
//! frame.  Each WebSocket connection subscribes when it opens and drops its
//! receiver when it closes, so joining and leaving never contend with a
//! sender.  A connection that falls more than `capacity` frames behind skips
//! the frames it missed; its writer task logs the gap.  The skip does not
//! distinguish unit kinds: a lag early in a session can drop the CONFIG units
//! as well as frames, and that connection then cannot decode the stream until
//! the session is recreated.
//!
//! A connection only sees frames sent after it subscribed.  In particular a
//! client that joins mid-session does not receive the session's CONFIG
//! units; the one-second key-frame interval bounds how long it waits for
//! a decodable picture.

use tokio::sync::broadcast;
use vdisplay_core::EncodedAccessUnit;

use crate::application::frame_sink::FrameSink;

/// Default number of frames a slow connection may lag behind.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// One outbound WebSocket frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Binary(Vec<u8>),
    Text(String),
}

/// Sending half of the outbound channel.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<Outbound>,
}

impl BroadcastHub {
    /// Creates a hub that buffers up to `capacity` frames per receiver.
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Registers a new connection.
    pub fn subscribe(&self) -> broadcast::Receiver<Outbound> {
        self.tx.subscribe()
    }

    /// Number of connections currently subscribed.
    pub fn connection_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Sends a frame to every subscriber.  Frames sent while nobody is
    /// connected are dropped.
    pub fn publish(&self, frame: Outbound) {
        // `send` only fails when there are no receivers.
        let _ = self.tx.send(frame);
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl FrameSink for BroadcastHub {
    fn send_access_unit(&self, unit: EncodedAccessUnit) {
        self.publish(Outbound::Binary(unit.bytes));
    }

    fn send_text(&self, line: String) {
        self.publish(Outbound::Text(line));
    }
}
