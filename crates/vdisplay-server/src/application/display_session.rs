//! DisplaySession: lifecycle of the single virtual display and its encoder.
//!
//! # State machine
//!
//! ```text
//! IDLE ──ensure_display──▶ CREATING ──ok──▶ STREAMING ──release_display──▶ RELEASING ──▶ IDLE
//!                              │
//!                              └──any step fails: roll back──▶ IDLE
//! ```
//!
//! At most one session exists.  Every transition runs with the controller's
//! mutex held from start to finish, so concurrent commands from different
//! connections observe either the state before or the state after it.
//!
//! # Creation order
//!
//! 1. configure the encoder for the aligned size
//! 2. obtain its input surface
//! 3. start the encoder
//! 4. create the virtual display rendering into the surface
//! 5. set the display's IME policy (best-effort)
//! 6. start the drain thread and bind the input injector
//!
//! A failure at any step releases what steps before it acquired, in reverse
//! order.  See [`PartialSession`].
//!
//! # Dead sessions
//!
//! If the drain thread dies (encoder error), the session stays in the slot
//! but is no longer alive.  The next `ensure_display` tears it down and
//! builds a fresh one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use vdisplay_core::{DisplayGeometry, EncoderFormat};

use crate::application::frame_sink::FrameSink;
use crate::application::input_injector::InputInjector;
use crate::application::privileged_bridge::{
    ImePolicy, PlatformError, PrivilegedServiceBridge, VirtualDisplayHandle,
};
use crate::application::video_encoder::{
    EncoderError, EncoderFactory, HardwareEncoder, InputSurface, VideoEncoderPipeline,
};

/// Lifecycle state of the display session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Creating,
    Streaming,
    Releasing,
}

/// Error type for session creation.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("encoder setup failed: {0}")]
    Encoder(#[from] EncoderError),
    #[error("virtual display setup failed: {0}")]
    Platform(#[from] PlatformError),
}

/// Tunables of the session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Name the virtual display is registered under.
    pub display_name: String,
    /// How long one drain poll waits for an output buffer.
    pub drain_poll_timeout: Duration,
    /// How long release waits for the drain thread before forcing a stop.
    pub drain_join_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            display_name: "vdisplay".to_string(),
            drain_poll_timeout: Duration::from_millis(100),
            drain_join_timeout: Duration::from_secs(2),
        }
    }
}

/// Public description of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveDisplay {
    pub display_id: u32,
    /// Aligned geometry the encoder and display were created with.
    pub geometry: DisplayGeometry,
    pub bitrate_bps: u32,
}

struct Session {
    display: ActiveDisplay,
    handle: VirtualDisplayHandle,
    encoder: Arc<dyn HardwareEncoder>,
    surface: InputSurface,
    pipeline: VideoEncoderPipeline,
}

struct SessionSlot {
    state: SessionState,
    session: Option<Session>,
}

/// Owns the session slot and performs every transition.
pub struct DisplayController {
    slot: Mutex<SessionSlot>,
    bridge: Arc<PrivilegedServiceBridge>,
    encoders: Arc<dyn EncoderFactory>,
    injector: Arc<InputInjector>,
    sink: Arc<dyn FrameSink>,
    settings: SessionSettings,
}

impl DisplayController {
    pub fn new(
        bridge: Arc<PrivilegedServiceBridge>,
        encoders: Arc<dyn EncoderFactory>,
        injector: Arc<InputInjector>,
        sink: Arc<dyn FrameSink>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            slot: Mutex::new(SessionSlot {
                state: SessionState::Idle,
                session: None,
            }),
            bridge,
            encoders,
            injector,
            sink,
            settings,
        }
    }

    /// Makes sure a streaming session exists.
    ///
    /// A live session is returned unchanged, whatever size was requested.
    /// A dead session is released and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if any creation step fails; the controller is
    /// then back in [`SessionState::Idle`] with nothing leaked.
    pub fn ensure_display(
        &self,
        requested: DisplayGeometry,
        bitrate_bps: u32,
    ) -> Result<ActiveDisplay, SessionError> {
        let mut slot = self.lock();

        if let Some(session) = &slot.session {
            if session.pipeline.is_alive() {
                debug!(
                    "display {} already streaming; ignoring new size request",
                    session.display.display_id
                );
                return Ok(session.display);
            }
            warn!(
                "session on display {} is dead; recreating it",
                session.display.display_id
            );
        }
        if let Some(dead) = slot.session.take() {
            slot.state = SessionState::Releasing;
            self.teardown(dead);
        }

        slot.state = SessionState::Creating;
        match self.create_session(requested, bitrate_bps) {
            Ok(session) => {
                let display = session.display;
                slot.session = Some(session);
                slot.state = SessionState::Streaming;
                Ok(display)
            }
            Err(e) => {
                slot.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Releases the session if there is one.  Returns `false` if there was
    /// nothing to release.
    pub fn release_display(&self) -> bool {
        let mut slot = self.lock();
        let Some(session) = slot.session.take() else {
            return false;
        };
        slot.state = SessionState::Releasing;
        self.teardown(session);
        slot.state = SessionState::Idle;
        true
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Id of the session's virtual display, live or dead.
    pub fn display_id(&self) -> Option<u32> {
        self.lock()
            .session
            .as_ref()
            .map(|session| session.display.display_id)
    }

    pub fn active(&self) -> Option<ActiveDisplay> {
        self.lock().session.as_ref().map(|session| session.display)
    }

    /// Returns `true` if a session exists and its drain thread is running.
    pub fn is_alive(&self) -> bool {
        self.lock()
            .session
            .as_ref()
            .is_some_and(|session| session.pipeline.is_alive())
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    fn lock(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_session(
        &self,
        requested: DisplayGeometry,
        bitrate_bps: u32,
    ) -> Result<Session, SessionError> {
        let geometry = requested.aligned();
        if geometry != requested {
            debug!(
                "aligned {}x{} to {}x{} for the encoder",
                requested.width, requested.height, geometry.width, geometry.height
            );
        }

        let format = EncoderFormat::h264(geometry.width, geometry.height, bitrate_bps);
        let encoder = self.encoders.configure(&format)?;
        let mut partial = PartialSession::new(&self.bridge, Arc::clone(&encoder));

        let surface = encoder.create_input_surface()?;
        partial.surface = Some(surface);

        encoder.start()?;
        partial.started = true;

        let handle =
            self.bridge
                .create_virtual_display(&self.settings.display_name, geometry, surface)?;
        partial.display = Some(handle);

        self.bridge.set_ime_policy(handle.display_id, ImePolicy::Local);

        let pipeline = VideoEncoderPipeline::start(
            Arc::clone(&encoder),
            Arc::clone(&self.sink),
            self.settings.drain_poll_timeout,
        )?;
        partial.disarm();

        self.injector.bind_display(Some(handle.display_id));

        let display = ActiveDisplay {
            display_id: handle.display_id,
            geometry,
            bitrate_bps,
        };
        info!(
            "display session streaming: display {} at {}x{}@{}dpi, {} bps",
            handle.display_id, geometry.width, geometry.height, geometry.dpi, bitrate_bps
        );

        Ok(Session {
            display,
            handle,
            encoder,
            surface,
            pipeline,
        })
    }

    fn teardown(&self, session: Session) {
        let display_id = session.display.display_id;

        let outcome = session.pipeline.shutdown(self.settings.drain_join_timeout);
        if !outcome.encoder_stopped() {
            if let Err(e) = session.encoder.stop() {
                warn!("stopping encoder of display {display_id} failed: {e}");
            }
        }

        self.bridge.release_virtual_display(&session.handle);
        session.encoder.release_input_surface(session.surface);
        session.encoder.release();
        self.injector.bind_display(None);

        info!("display session on display {display_id} released ({outcome:?})");
    }
}

/// Rollback guard for a session under construction.
///
/// Records each acquired resource; dropping the guard while still armed
/// releases them in reverse order.
struct PartialSession<'a> {
    bridge: &'a PrivilegedServiceBridge,
    encoder: Arc<dyn HardwareEncoder>,
    surface: Option<InputSurface>,
    started: bool,
    display: Option<VirtualDisplayHandle>,
    armed: bool,
}

impl<'a> PartialSession<'a> {
    fn new(bridge: &'a PrivilegedServiceBridge, encoder: Arc<dyn HardwareEncoder>) -> Self {
        Self {
            bridge,
            encoder,
            surface: None,
            started: false,
            display: None,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartialSession<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!("display session creation failed; rolling back");
        if let Some(handle) = self.display.take() {
            self.bridge.release_virtual_display(&handle);
        }
        if self.started {
            if let Err(e) = self.encoder.stop() {
                debug!("stopping encoder during rollback failed: {e}");
            }
        }
        if let Some(surface) = self.surface.take() {
            self.encoder.release_input_surface(surface);
        }
        self.encoder.release();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
