//! Outbound port: where encoded video and text responses go.

use vdisplay_core::EncodedAccessUnit;

/// Destination for everything the server sends to clients.
///
/// The production implementation broadcasts to every open connection; tests
/// use a recording sink.  Implementations must never block for long and must
/// never emit `tracing` events, because the diagnostic log layer forwards
/// events into this same sink.
pub trait FrameSink: Send + Sync {
    /// Sends one encoded access unit as one binary frame.
    fn send_access_unit(&self, unit: EncodedAccessUnit);

    /// Sends one text line as one text frame.
    fn send_text(&self, line: String);
}
