//! VideoEncoderPipeline: the hardware H.264 encoder port and its drain thread.
//!
//! # Buffer lifecycle
//!
//! A hardware encoder owns a small pool of output buffers.  The drain loop
//! repeatedly asks for the next finished buffer:
//!
//! ```text
//! dequeue_output_buffer(timeout)
//!   ├─ TryAgainLater    nothing ready yet, poll again
//!   ├─ FormatChanged    output_format() now carries the codec parameter sets
//!   └─ Buffer(index)    get_output_buffer(index) → copy → release_output_buffer(index)
//! ```
//!
//! Every index returned by `dequeue_output_buffer` must be handed back with
//! `release_output_buffer` exactly once, otherwise the encoder runs out of
//! buffers and stalls.  The loop copies the payload out before releasing, so
//! the broadcast never aliases encoder memory.
//!
//! # Threading
//!
//! The loop runs on a dedicated OS thread (`vd-encoder-drain`), one per
//! session.  It stops on end-of-stream, when its `running` flag is cleared, or
//! on the first encoder error.  An error ends the thread and leaves the
//! pipeline dead; the owning session is then recreated by the next
//! `CREATE_DISPLAY`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};
use vdisplay_core::{AccessUnitKind, ConfigGate, EncodedAccessUnit, EncoderFormat};

use crate::application::frame_sink::FrameSink;

/// Grace period for the drain thread to exit after a forced encoder stop.
const FORCE_STOP_GRACE: Duration = Duration::from_millis(500);

/// Error type for encoder operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder configure failed: {0}")]
    Configure(String),
    #[error("encoder input surface unavailable: {0}")]
    Surface(String),
    #[error("encoder start failed: {0}")]
    Start(String),
    #[error("dequeueOutputBuffer failed: {0}")]
    Dequeue(String),
    #[error("output buffer {index}: {reason}")]
    Buffer { index: usize, reason: String },
    #[error("encoder stop failed: {0}")]
    Stop(String),
    #[error("could not spawn drain thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// Opaque handle to an encoder's input surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSurface {
    pub id: u64,
}

/// Output buffer flags as reported by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags(pub u32);

impl BufferFlags {
    pub const KEY_FRAME: u32 = 1 << 0;
    pub const CODEC_CONFIG: u32 = 1 << 1;
    pub const END_OF_STREAM: u32 = 1 << 2;

    pub fn is_key_frame(&self) -> bool {
        self.0 & Self::KEY_FRAME != 0
    }

    pub fn is_codec_config(&self) -> bool {
        self.0 & Self::CODEC_CONFIG != 0
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.0 & Self::END_OF_STREAM != 0
    }
}

/// Metadata of a dequeued output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferInfo {
    pub offset: usize,
    pub size: usize,
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

/// Result of one `dequeue_output_buffer` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueOutcome {
    TryAgainLater,
    FormatChanged,
    Buffer { index: usize, info: BufferInfo },
}

/// The encoder's current output format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputFormat {
    /// Codec-specific data (SPS, PPS), in order.
    pub parameter_sets: Vec<Vec<u8>>,
}

/// Creates configured encoders.
pub trait EncoderFactory: Send + Sync {
    /// Configures a new encoder for `format`.
    fn configure(&self, format: &EncoderFormat) -> Result<Arc<dyn HardwareEncoder>, EncoderError>;
}

/// A configured hardware encoder.
///
/// All methods take `&self`: the drain thread dequeues while the session
/// thread may signal end-of-stream or force a stop.
pub trait HardwareEncoder: Send + Sync {
    fn create_input_surface(&self) -> Result<InputSurface, EncoderError>;
    fn release_input_surface(&self, surface: InputSurface);
    fn start(&self) -> Result<(), EncoderError>;
    fn dequeue_output_buffer(&self, timeout: Duration) -> Result<DequeueOutcome, EncoderError>;
    fn output_format(&self) -> Result<OutputFormat, EncoderError>;
    fn get_output_buffer(&self, index: usize) -> Result<Vec<u8>, EncoderError>;
    fn release_output_buffer(&self, index: usize) -> Result<(), EncoderError>;
    fn signal_end_of_input_stream(&self) -> Result<(), EncoderError>;
    fn stop(&self) -> Result<(), EncoderError>;
    fn release(&self);
}

// ── Drain loop ────────────────────────────────────────────────────────────────

/// Counters collected by one drain thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub config_units: u64,
    pub frames: u64,
    pub bytes: u64,
    pub dropped: u64,
}

/// Why a drain loop ended.
#[derive(Debug)]
pub enum DrainExit {
    EndOfStream,
    Stopped,
    Failed(EncoderError),
}

/// Everything a finished drain loop reports back.
#[derive(Debug)]
pub struct DrainReport {
    pub exit: DrainExit,
    pub stats: DrainStats,
}

/// Polls `encoder` until end-of-stream, `running` is cleared, or an error.
pub fn drain_loop(
    encoder: &dyn HardwareEncoder,
    sink: &dyn FrameSink,
    running: &AtomicBool,
    poll_timeout: Duration,
) -> DrainReport {
    let mut gate = ConfigGate::new();
    let mut stats = DrainStats::default();

    let exit = loop {
        if !running.load(Ordering::Acquire) {
            break DrainExit::Stopped;
        }

        let outcome = match encoder.dequeue_output_buffer(poll_timeout) {
            Ok(outcome) => outcome,
            Err(e) => break DrainExit::Failed(e),
        };

        match outcome {
            DequeueOutcome::TryAgainLater => continue,

            DequeueOutcome::FormatChanged => {
                let format = match encoder.output_format() {
                    Ok(format) => format,
                    Err(e) => break DrainExit::Failed(e),
                };
                let sets: Vec<Vec<u8>> = format
                    .parameter_sets
                    .into_iter()
                    .filter(|set| !set.is_empty())
                    .collect();
                if sets.is_empty() {
                    debug!("encoder format changed without parameter sets");
                    continue;
                }
                if gate.admit_format_change() {
                    for bytes in sets {
                        sink.send_access_unit(EncodedAccessUnit {
                            kind: AccessUnitKind::Config,
                            bytes,
                        });
                        stats.config_units += 1;
                    }
                    debug!("broadcast {} config unit(s)", stats.config_units);
                } else {
                    debug!("ignoring repeated format change; config already sent");
                }
            }

            DequeueOutcome::Buffer { index, info } => {
                let forwarded = forward_buffer(encoder, sink, &mut gate, index, &info, &mut stats);
                let released = encoder.release_output_buffer(index);
                if let Err(e) = forwarded.and(released) {
                    break DrainExit::Failed(e);
                }
                if info.flags.is_end_of_stream() {
                    break DrainExit::EndOfStream;
                }
            }
        }
    };

    DrainReport { exit, stats }
}

/// Copies one dequeued buffer to the sink if the config gate admits it.
/// The caller releases the buffer whatever this returns.
fn forward_buffer(
    encoder: &dyn HardwareEncoder,
    sink: &dyn FrameSink,
    gate: &mut ConfigGate,
    index: usize,
    info: &BufferInfo,
    stats: &mut DrainStats,
) -> Result<(), EncoderError> {
    if info.size == 0 {
        return Ok(());
    }

    let data = encoder.get_output_buffer(index)?;
    let payload = info
        .offset
        .checked_add(info.size)
        .and_then(|end| data.get(info.offset..end))
        .ok_or_else(|| EncoderError::Buffer {
            index,
            reason: format!(
                "range {}+{} outside buffer of {} bytes",
                info.offset,
                info.size,
                data.len()
            ),
        })?;

    if info.flags.is_codec_config() {
        if gate.admit_config_buffer() {
            sink.send_access_unit(EncodedAccessUnit {
                kind: AccessUnitKind::Config,
                bytes: payload.to_vec(),
            });
            stats.config_units += 1;
        } else {
            stats.dropped += 1;
        }
    } else if gate.admit_frame() {
        sink.send_access_unit(EncodedAccessUnit {
            kind: AccessUnitKind::Frame,
            bytes: payload.to_vec(),
        });
        stats.frames += 1;
        stats.bytes += payload.len() as u64;
        trace!(
            "frame {} ({} bytes, pts={}us, key={})",
            stats.frames,
            payload.len(),
            info.presentation_time_us,
            info.flags.is_key_frame()
        );
    } else {
        trace!("dropping frame dequeued before codec config");
        stats.dropped += 1;
    }
    Ok(())
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// How [`VideoEncoderPipeline::shutdown`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The drain thread exited on its own and was joined.
    Joined,
    /// The join timed out; the encoder was stopped and the thread then exited.
    ForceStopped,
    /// The thread did not exit even after a forced stop and was detached.
    Detached,
}

impl ShutdownOutcome {
    /// Returns `true` if shutdown already called `stop()` on the encoder.
    pub fn encoder_stopped(&self) -> bool {
        !matches!(self, ShutdownOutcome::Joined)
    }
}

/// A running drain thread bound to one encoder.
pub struct VideoEncoderPipeline {
    encoder: Arc<dyn HardwareEncoder>,
    running: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    finished: mpsc::Receiver<DrainReport>,
    thread: Option<JoinHandle<()>>,
}

impl VideoEncoderPipeline {
    /// Spawns the drain thread for an already started encoder.
    ///
    /// # Errors
    ///
    /// Returns [`EncoderError::Thread`] if the OS refuses to spawn the thread.
    pub fn start(
        encoder: Arc<dyn HardwareEncoder>,
        sink: Arc<dyn FrameSink>,
        poll_timeout: Duration,
    ) -> Result<Self, EncoderError> {
        let running = Arc::new(AtomicBool::new(true));
        let alive = Arc::new(AtomicBool::new(true));
        let (report_tx, report_rx) = mpsc::channel();

        let thread = {
            let encoder = Arc::clone(&encoder);
            let running = Arc::clone(&running);
            let alive = Arc::clone(&alive);
            std::thread::Builder::new()
                .name("vd-encoder-drain".to_string())
                .spawn(move || {
                    let report = drain_loop(&*encoder, &*sink, &running, poll_timeout);
                    alive.store(false, Ordering::Release);
                    match &report.exit {
                        DrainExit::EndOfStream => debug!("drain thread reached end of stream"),
                        DrainExit::Stopped => debug!("drain thread stopped"),
                        DrainExit::Failed(e) => {
                            error!("encoder drain failed, session is dead: {e}")
                        }
                    }
                    // The receiver is gone if shutdown already gave up on us.
                    let _ = report_tx.send(report);
                })
                .map_err(EncoderError::Thread)?
        };

        Ok(Self {
            encoder,
            running,
            alive,
            finished: report_rx,
            thread: Some(thread),
        })
    }

    /// Returns `false` once the drain thread has exited for any reason.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Signals end-of-stream and waits up to `join_timeout` for the drain
    /// thread.  If it does not exit in time the encoder is stopped to unblock
    /// it; a thread that still does not exit is detached.
    pub fn shutdown(mut self, join_timeout: Duration) -> ShutdownOutcome {
        if self.is_alive() {
            if let Err(e) = self.encoder.signal_end_of_input_stream() {
                warn!("could not signal end of stream: {e}");
            }
        }

        match self.finished.recv_timeout(join_timeout) {
            Ok(report) => {
                self.join();
                info!(
                    "drain thread joined: {} config unit(s), {} frame(s), {} bytes, {} dropped",
                    report.stats.config_units,
                    report.stats.frames,
                    report.stats.bytes,
                    report.stats.dropped
                );
                ShutdownOutcome::Joined
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // The thread ended without reporting (it panicked).
                self.join();
                ShutdownOutcome::Joined
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!("drain thread did not finish within {join_timeout:?}; forcing encoder stop");
                self.running.store(false, Ordering::Release);
                if let Err(e) = self.encoder.stop() {
                    warn!("forced encoder stop failed: {e}");
                }
                match self.finished.recv_timeout(FORCE_STOP_GRACE) {
                    Ok(_) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                        self.join();
                        ShutdownOutcome::ForceStopped
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        error!("drain thread still running after forced stop; detaching it");
                        self.thread.take();
                        ShutdownOutcome::Detached
                    }
                }
            }
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("drain thread panicked");
            }
        }
    }
}

impl Drop for VideoEncoderPipeline {
    fn drop(&mut self) {
        // A pipeline dropped without shutdown must not leave its thread polling.
        self.running.store(false, Ordering::Release);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
