//! H.264 encoder configuration.

/// MIME type of the encoder output.
pub const H264_MIME: &str = "video/avc";

/// Frame rate the encoder is configured for.
pub const FRAME_RATE: u32 = 30;

/// Seconds between key frames.
///
/// One second is deliberately short: a client that joins mid-stream only has
/// to wait at most one second for a decodable frame.
pub const I_FRAME_INTERVAL_SECS: u32 = 1;

/// Format handed to the hardware encoder's `configure` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFormat {
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate_bps: u32,
    pub frame_rate: u32,
    pub i_frame_interval_secs: u32,
}

impl EncoderFormat {
    /// Builds the H.264 surface-input format for an already aligned size.
    pub fn h264(width: u32, height: u32, bitrate_bps: u32) -> Self {
        Self {
            mime: H264_MIME,
            width,
            height,
            bitrate_bps,
            frame_rate: FRAME_RATE,
            i_frame_interval_secs: I_FRAME_INTERVAL_SECS,
        }
    }
}
