//! Simulated platform: display services, a hardware encoder and a
//! recording frame sink, all in memory.
//!
//! # Display services
//!
//! [`SimulatedDisplayServices`] hands out display ids starting at 2, records
//! every call, and can be told to fail individual operations through its
//! `fail_*` flags.
//!
//! # Encoder
//!
//! [`SimulatedEncoderFactory`] creates [`SimulatedEncoder`]s in one of two
//! modes:
//!
//! - **synthetic** (the default, used by the binary): one format change
//!   carrying an SPS and a PPS, then a frame every ~33 ms, an IDR frame every
//!   thirtieth;
//! - **scripted**: a fixed list of [`ScriptedOutput`]s, then nothing.
//!
//! In both modes an encoder answers `signal_end_of_input_stream` with an
//! end-of-stream buffer on the next dequeue, unless `ignore_end_of_stream`
//! is set (to exercise the forced-stop path).  Output buffers are tracked
//! so tests can check every dequeued index was released.
//!
//! # Usage in tests
//!
//! ```ignore
//! let services = Arc::new(SimulatedDisplayServices { fail_create: true, ..SimulatedDisplayServices::new() });
//! let encoders = Arc::new(SimulatedEncoderFactory::synthetic());
//! // ... build a DisplayController, run it ...
//! assert!(encoders.last_encoder().unwrap().is_released());
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use vdisplay_core::{EncodedAccessUnit, EncoderFormat, InputEvent};

use crate::application::frame_sink::FrameSink;
use crate::application::privileged_bridge::{
    DisplayServices, ImePolicy, LaunchIntent, LaunchOptions, PlatformError, VirtualDisplayHandle,
    VirtualDisplayRequest,
};
use crate::application::video_encoder::{
    BufferFlags, BufferInfo, DequeueOutcome, EncoderError, EncoderFactory, HardwareEncoder,
    InputSurface, OutputFormat,
};

/// Platform level the simulated services report by default.
pub const SIMULATED_PLATFORM_LEVEL: u32 = 34;

/// First id handed out for a virtual display.
const FIRST_DISPLAY_ID: u32 = 2;

/// Interval between synthetic frames.
const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(33);

/// One IDR frame every this many synthetic frames.
const SYNTHETIC_GOP: u64 = 30;

const SYNTHETIC_SPS: [u8; 12] = [
    0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16,
];
const SYNTHETIC_PPS: [u8; 8] = [0x00, 0x00, 0x00, 0x01, 0x68, 0xCE, 0x3C, 0x80];

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Display services ──────────────────────────────────────────────────────────

/// In-memory [`DisplayServices`] that records every call.
#[derive(Default)]
pub struct SimulatedDisplayServices {
    /// Reported platform level.
    pub platform_level: u32,
    /// When `true`, `create_virtual_display` is rejected.
    pub fail_create: bool,
    /// When `true`, `set_ime_policy` fails.
    pub fail_ime: bool,
    /// When `true`, every launch fails with `ActivityNotFound`.
    pub fail_launch: bool,
    /// When `true`, every injected event is rejected.
    pub fail_inject: bool,
    pub next_display: AtomicU32,
    pub created: Mutex<Vec<VirtualDisplayRequest>>,
    pub live: Mutex<Vec<VirtualDisplayHandle>>,
    pub released: Mutex<Vec<VirtualDisplayHandle>>,
    pub ime: Mutex<Vec<(u32, ImePolicy)>>,
    pub launched: Mutex<Vec<(LaunchIntent, LaunchOptions)>>,
    pub injected: Mutex<Vec<InputEvent>>,
}

impl SimulatedDisplayServices {
    pub fn new() -> Self {
        Self {
            platform_level: SIMULATED_PLATFORM_LEVEL,
            ..Self::default()
        }
    }

    pub fn created_displays(&self) -> Vec<VirtualDisplayRequest> {
        lock(&self.created).clone()
    }

    /// Displays created and not yet released.
    pub fn live_displays(&self) -> Vec<VirtualDisplayHandle> {
        lock(&self.live).clone()
    }

    pub fn released_displays(&self) -> Vec<VirtualDisplayHandle> {
        lock(&self.released).clone()
    }

    pub fn ime_policies(&self) -> Vec<(u32, ImePolicy)> {
        lock(&self.ime).clone()
    }

    pub fn launches(&self) -> Vec<(LaunchIntent, LaunchOptions)> {
        lock(&self.launched).clone()
    }

    pub fn events(&self) -> Vec<InputEvent> {
        lock(&self.injected).clone()
    }
}

impl DisplayServices for SimulatedDisplayServices {
    fn platform_level(&self) -> u32 {
        self.platform_level
    }

    fn create_virtual_display(
        &self,
        request: &VirtualDisplayRequest,
    ) -> Result<VirtualDisplayHandle, PlatformError> {
        if self.fail_create {
            return Err(PlatformError::Rejected {
                operation: "createVirtualDisplay",
                reason: "simulated failure".to_string(),
            });
        }
        let display_id = FIRST_DISPLAY_ID + self.next_display.fetch_add(1, Ordering::Relaxed);
        let handle = VirtualDisplayHandle {
            display_id,
            token: u64::from(display_id),
        };
        lock(&self.created).push(request.clone());
        lock(&self.live).push(handle);
        Ok(handle)
    }

    fn release_virtual_display(&self, handle: &VirtualDisplayHandle) -> Result<(), PlatformError> {
        let mut live = lock(&self.live);
        let Some(position) = live.iter().position(|h| h == handle) else {
            return Err(PlatformError::Rejected {
                operation: "releaseVirtualDisplay",
                reason: format!("display {} is not live", handle.display_id),
            });
        };
        live.remove(position);
        lock(&self.released).push(*handle);
        Ok(())
    }

    fn set_ime_policy(&self, display_id: u32, policy: ImePolicy) -> Result<(), PlatformError> {
        if self.fail_ime {
            return Err(PlatformError::Unavailable("window service".to_string()));
        }
        lock(&self.ime).push((display_id, policy));
        Ok(())
    }

    fn start_activity(
        &self,
        intent: &LaunchIntent,
        options: &LaunchOptions,
    ) -> Result<(), PlatformError> {
        if self.fail_launch {
            return Err(PlatformError::ActivityNotFound(intent.package.clone()));
        }
        lock(&self.launched).push((intent.clone(), *options));
        Ok(())
    }

    fn inject_input_event(&self, event: &InputEvent) -> Result<(), PlatformError> {
        if self.fail_inject {
            return Err(PlatformError::Rejected {
                operation: "injectInputEvent",
                reason: "simulated failure".to_string(),
            });
        }
        lock(&self.injected).push(*event);
        Ok(())
    }
}

// ── Encoder ───────────────────────────────────────────────────────────────────

/// One step of a scripted encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutput {
    /// The output format changed; the payload is its parameter sets.
    FormatChanged(Vec<Vec<u8>>),
    /// An output buffer.
    Buffer { bytes: Vec<u8>, flags: BufferFlags },
    /// An empty buffer flagged end-of-stream.
    EndOfStream,
    /// `dequeue_output_buffer` fails with this reason.
    Fail(String),
}

impl ScriptedOutput {
    pub fn frame(bytes: Vec<u8>) -> Self {
        ScriptedOutput::Buffer {
            bytes,
            flags: BufferFlags::default(),
        }
    }

    pub fn key_frame(bytes: Vec<u8>) -> Self {
        ScriptedOutput::Buffer {
            bytes,
            flags: BufferFlags(BufferFlags::KEY_FRAME),
        }
    }

    pub fn config(bytes: Vec<u8>) -> Self {
        ScriptedOutput::Buffer {
            bytes,
            flags: BufferFlags(BufferFlags::CODEC_CONFIG),
        }
    }
}

/// Creates [`SimulatedEncoder`]s and records what it was asked to configure.
#[derive(Default)]
pub struct SimulatedEncoderFactory {
    /// `None` selects the synthetic stream.
    pub script: Option<Vec<ScriptedOutput>>,
    pub fail_configure: bool,
    pub fail_surface: bool,
    pub fail_start: bool,
    /// Encoders never answer end-of-stream.
    pub ignore_end_of_stream: bool,
    pub configured: Mutex<Vec<EncoderFormat>>,
    pub encoders: Mutex<Vec<Arc<SimulatedEncoder>>>,
}

impl SimulatedEncoderFactory {
    pub fn synthetic() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<ScriptedOutput>) -> Self {
        Self {
            script: Some(script),
            ..Self::default()
        }
    }

    pub fn configured_formats(&self) -> Vec<EncoderFormat> {
        lock(&self.configured).clone()
    }

    pub fn created_encoders(&self) -> Vec<Arc<SimulatedEncoder>> {
        lock(&self.encoders).clone()
    }

    pub fn last_encoder(&self) -> Option<Arc<SimulatedEncoder>> {
        lock(&self.encoders).last().cloned()
    }
}

impl EncoderFactory for SimulatedEncoderFactory {
    fn configure(&self, format: &EncoderFormat) -> Result<Arc<dyn HardwareEncoder>, EncoderError> {
        if self.fail_configure {
            return Err(EncoderError::Configure("simulated failure".to_string()));
        }
        let mut encoders = lock(&self.encoders);
        let encoder = Arc::new(SimulatedEncoder {
            id: encoders.len() as u64 + 1,
            format: format.clone(),
            source: match &self.script {
                Some(script) => Source::Scripted(Mutex::new(script.iter().cloned().collect())),
                None => Source::Synthetic(Mutex::new(SyntheticState::default())),
            },
            fail_surface: self.fail_surface,
            fail_start: self.fail_start,
            ignore_end_of_stream: self.ignore_end_of_stream,
            output_format: Mutex::new(OutputFormat::default()),
            buffers: Mutex::new(HashMap::new()),
            next_index: AtomicUsize::new(0),
            dequeued: AtomicU64::new(0),
            surface: Mutex::new(None),
            surface_released: AtomicBool::new(false),
            started: AtomicBool::new(false),
            eos_signaled: AtomicBool::new(false),
            eos_delivered: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            released: AtomicBool::new(false),
        });
        lock(&self.configured).push(format.clone());
        encoders.push(Arc::clone(&encoder));
        Ok(encoder)
    }
}

enum Source {
    Scripted(Mutex<VecDeque<ScriptedOutput>>),
    Synthetic(Mutex<SyntheticState>),
}

#[derive(Default)]
struct SyntheticState {
    format_announced: bool,
    started_at: Option<Instant>,
    frames: u64,
}

/// In-memory [`HardwareEncoder`].
pub struct SimulatedEncoder {
    pub id: u64,
    pub format: EncoderFormat,
    source: Source,
    fail_surface: bool,
    fail_start: bool,
    ignore_end_of_stream: bool,
    output_format: Mutex<OutputFormat>,
    buffers: Mutex<HashMap<usize, Vec<u8>>>,
    next_index: AtomicUsize,
    dequeued: AtomicU64,
    surface: Mutex<Option<InputSurface>>,
    surface_released: AtomicBool,
    started: AtomicBool,
    eos_signaled: AtomicBool,
    eos_delivered: AtomicBool,
    stopped: AtomicBool,
    released: AtomicBool,
}

impl SimulatedEncoder {
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn surface_released(&self) -> bool {
        self.surface_released.load(Ordering::Acquire)
    }

    pub fn end_of_stream_signaled(&self) -> bool {
        self.eos_signaled.load(Ordering::Acquire)
    }

    /// Buffers dequeued and not yet released.
    pub fn outstanding_buffers(&self) -> usize {
        lock(&self.buffers).len()
    }

    /// Total number of output buffers handed out.
    pub fn dequeued_buffers(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    fn hand_out(&self, bytes: Vec<u8>, flags: BufferFlags, pts_us: i64) -> DequeueOutcome {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let info = BufferInfo {
            offset: 0,
            size: bytes.len(),
            presentation_time_us: pts_us,
            flags,
        };
        lock(&self.buffers).insert(index, bytes);
        self.dequeued.fetch_add(1, Ordering::Relaxed);
        DequeueOutcome::Buffer { index, info }
    }

    fn end_of_stream_due(&self) -> bool {
        self.eos_signaled.load(Ordering::Acquire)
            && !self.ignore_end_of_stream
            && !self.eos_delivered.swap(true, Ordering::AcqRel)
    }

    fn next_scripted(
        &self,
        script: &Mutex<VecDeque<ScriptedOutput>>,
        timeout: Duration,
    ) -> Result<DequeueOutcome, EncoderError> {
        let step = lock(script).pop_front();
        match step {
            Some(ScriptedOutput::FormatChanged(sets)) => {
                *lock(&self.output_format) = OutputFormat {
                    parameter_sets: sets,
                };
                Ok(DequeueOutcome::FormatChanged)
            }
            Some(ScriptedOutput::Buffer { bytes, flags }) => Ok(self.hand_out(bytes, flags, 0)),
            Some(ScriptedOutput::EndOfStream) => Ok(self.hand_out(
                Vec::new(),
                BufferFlags(BufferFlags::END_OF_STREAM),
                0,
            )),
            Some(ScriptedOutput::Fail(reason)) => Err(EncoderError::Dequeue(reason)),
            None => {
                std::thread::sleep(timeout);
                Ok(DequeueOutcome::TryAgainLater)
            }
        }
    }

    fn next_synthetic(
        &self,
        state: &Mutex<SyntheticState>,
        timeout: Duration,
    ) -> Result<DequeueOutcome, EncoderError> {
        let mut state = lock(state);
        if !state.format_announced {
            state.format_announced = true;
            *lock(&self.output_format) = OutputFormat {
                parameter_sets: vec![SYNTHETIC_SPS.to_vec(), SYNTHETIC_PPS.to_vec()],
            };
            return Ok(DequeueOutcome::FormatChanged);
        }

        let started_at = *state.started_at.get_or_insert_with(Instant::now);
        let due = started_at + SYNTHETIC_FRAME_INTERVAL * state.frames as u32;
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > timeout {
                drop(state);
                std::thread::sleep(timeout);
                return Ok(DequeueOutcome::TryAgainLater);
            }
            std::thread::sleep(wait);
        }

        let frame = state.frames;
        state.frames += 1;
        let key = frame % SYNTHETIC_GOP == 0;
        let mut bytes = vec![0x00, 0x00, 0x00, 0x01, if key { 0x65 } else { 0x41 }];
        bytes.extend_from_slice(&frame.to_be_bytes());
        let flags = BufferFlags(if key { BufferFlags::KEY_FRAME } else { 0 });
        let pts_us = (SYNTHETIC_FRAME_INTERVAL.as_micros() as i64) * frame as i64;
        Ok(self.hand_out(bytes, flags, pts_us))
    }
}

impl HardwareEncoder for SimulatedEncoder {
    fn create_input_surface(&self) -> Result<InputSurface, EncoderError> {
        if self.fail_surface {
            return Err(EncoderError::Surface("simulated failure".to_string()));
        }
        let surface = InputSurface { id: self.id };
        *lock(&self.surface) = Some(surface);
        Ok(surface)
    }

    fn release_input_surface(&self, surface: InputSurface) {
        let mut current = lock(&self.surface);
        if *current == Some(surface) {
            *current = None;
            self.surface_released.store(true, Ordering::Release);
        }
    }

    fn start(&self) -> Result<(), EncoderError> {
        if self.fail_start {
            return Err(EncoderError::Start("simulated failure".to_string()));
        }
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    fn dequeue_output_buffer(&self, timeout: Duration) -> Result<DequeueOutcome, EncoderError> {
        if !self.is_started() || self.is_released() {
            return Err(EncoderError::Dequeue("encoder is not running".to_string()));
        }
        if self.is_stopped() {
            std::thread::sleep(timeout);
            return Ok(DequeueOutcome::TryAgainLater);
        }
        if self.end_of_stream_due() {
            return Ok(self.hand_out(
                Vec::new(),
                BufferFlags(BufferFlags::END_OF_STREAM),
                0,
            ));
        }
        match &self.source {
            Source::Scripted(script) => self.next_scripted(script, timeout),
            Source::Synthetic(state) => self.next_synthetic(state, timeout),
        }
    }

    fn output_format(&self) -> Result<OutputFormat, EncoderError> {
        Ok(lock(&self.output_format).clone())
    }

    fn get_output_buffer(&self, index: usize) -> Result<Vec<u8>, EncoderError> {
        lock(&self.buffers)
            .get(&index)
            .cloned()
            .ok_or_else(|| EncoderError::Buffer {
                index,
                reason: "not dequeued".to_string(),
            })
    }

    fn release_output_buffer(&self, index: usize) -> Result<(), EncoderError> {
        lock(&self.buffers)
            .remove(&index)
            .map(|_| ())
            .ok_or_else(|| EncoderError::Buffer {
                index,
                reason: "released twice or never dequeued".to_string(),
            })
    }

    fn signal_end_of_input_stream(&self) -> Result<(), EncoderError> {
        self.eos_signaled.store(true, Ordering::Release);
        Ok(())
    }

    fn stop(&self) -> Result<(), EncoderError> {
        self.stopped.store(true, Ordering::Release);
        Ok(())
    }

    fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

// ── Recording sink ────────────────────────────────────────────────────────────

/// [`FrameSink`] that keeps everything it is sent.
#[derive(Default)]
pub struct RecordingSink {
    pub units: Mutex<Vec<EncodedAccessUnit>>,
    pub lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn access_units(&self) -> Vec<EncodedAccessUnit> {
        lock(&self.units).clone()
    }

    pub fn text_lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }
}

impl FrameSink for RecordingSink {
    fn send_access_unit(&self, unit: EncodedAccessUnit) {
        lock(&self.units).push(unit);
    }

    fn send_text(&self, line: String) {
        lock(&self.lines).push(line);
    }
}
