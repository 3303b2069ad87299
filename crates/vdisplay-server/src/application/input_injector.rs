//! InputInjector: synthesizes touch and key events and injects them into the
//! currently bound display.
//!
//! The injector starts out targeting the default display.  The display
//! session rebinds it to the virtual display when one is created and back to
//! the default when the session is released.  Every event carries the target
//! that was current at the moment it was injected.
//!
//! Gestures are built from the pure helpers in `vdisplay-core`; this module
//! only adds timing (sleeps between phases) and the platform call.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;
use vdisplay_core::{
    swipe_path, InputEvent, KeyAction, KeyEvent, MotionAction, MotionEvent, PathPoint,
    DEFAULT_DISPLAY_ID,
};

use crate::application::privileged_bridge::{PlatformError, PrivilegedServiceBridge};

/// Delay between the down and up events of a tap.
pub const DEFAULT_TAP_DELAY: Duration = Duration::from_millis(50);

/// Longest swipe the injector will play back.  Longer requests are shortened.
pub const DEFAULT_MAX_SWIPE: Duration = Duration::from_secs(10);

/// Error type for input injection.
#[derive(Debug, Error)]
pub enum InjectionError {
    #[error("injecting {phase} on display {display_id} failed: {source}")]
    Rejected {
        phase: &'static str,
        display_id: u32,
        #[source]
        source: PlatformError,
    },
}

/// Injects synthesized input into the bound display.
pub struct InputInjector {
    bridge: Arc<PrivilegedServiceBridge>,
    target: AtomicU32,
    /// Down time of the gesture opened by `touch_down`, if any.
    gesture_down_ms: Mutex<Option<u64>>,
    epoch: Instant,
    tap_delay: Duration,
    max_swipe_ms: u64,
}

impl InputInjector {
    pub fn new(bridge: Arc<PrivilegedServiceBridge>, tap_delay: Duration) -> Self {
        Self {
            bridge,
            target: AtomicU32::new(DEFAULT_DISPLAY_ID),
            gesture_down_ms: Mutex::new(None),
            epoch: Instant::now(),
            tap_delay,
            max_swipe_ms: DEFAULT_MAX_SWIPE.as_millis() as u64,
        }
    }

    /// Sets the longest swipe that is played back in full.
    pub fn with_max_swipe(mut self, limit: Duration) -> Self {
        self.max_swipe_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Retargets all following events.  `None` selects the default display.
    ///
    /// An open `touch_down` gesture is abandoned: it belonged to the old display.
    pub fn bind_display(&self, display_id: Option<u32>) {
        let id = display_id.unwrap_or(DEFAULT_DISPLAY_ID);
        let previous = self.target.swap(id, Ordering::AcqRel);
        if previous != id {
            debug!("input target changed from display {previous} to {id}");
        }
        *self.gesture() = None;
    }

    /// Display the next event will be injected into.
    pub fn target_display(&self) -> u32 {
        self.target.load(Ordering::Acquire)
    }

    /// Down at `(x, y)`, short pause, up at `(x, y)`.
    pub fn tap(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        let down_time = self.now_ms();
        self.inject_motion(MotionAction::Down, x, y, down_time, down_time)?;
        std::thread::sleep(self.tap_delay);
        self.inject_motion(MotionAction::Up, x, y, down_time, self.now_ms())
    }

    /// Down at the start point, interpolated moves spread across
    /// `duration_ms`, up at the end point.
    ///
    /// `duration_ms` is clamped to the configured maximum swipe length.
    ///
    /// The up event is attempted even if a move failed, so the platform never
    /// sees a pointer left down.  The first error is returned.
    pub fn swipe(
        &self,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
    ) -> Result<(), InjectionError> {
        if duration_ms > self.max_swipe_ms {
            debug!(
                "swipe duration {duration_ms} ms shortened to {} ms",
                self.max_swipe_ms
            );
        }
        let path = swipe_path(x1, y1, x2, y2, duration_ms.min(self.max_swipe_ms));
        let started = Instant::now();
        let down_time = self.now_ms();

        self.inject_motion(MotionAction::Down, path.down.x, path.down.y, down_time, down_time)?;

        let mut first_error = None;
        for point in &path.moves {
            self.sleep_until(started, point);
            if let Err(e) =
                self.inject_motion(MotionAction::Move, point.x, point.y, down_time, self.now_ms())
            {
                first_error.get_or_insert(e);
            }
        }

        self.sleep_until(started, &path.up);
        let up = self.inject_motion(MotionAction::Up, path.up.x, path.up.y, down_time, self.now_ms());

        match first_error {
            Some(e) => Err(e),
            None => up,
        }
    }

    /// Opens a gesture at `(x, y)`.
    pub fn touch_down(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        let now = self.now_ms();
        *self.gesture() = Some(now);
        self.inject_motion(MotionAction::Down, x, y, now, now)
    }

    /// Moves the pointer of the open gesture.
    pub fn touch_move(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        let now = self.now_ms();
        let down_time = self.gesture().unwrap_or(now);
        self.inject_motion(MotionAction::Move, x, y, down_time, now)
    }

    /// Closes the open gesture at `(x, y)`.
    pub fn touch_up(&self, x: i32, y: i32) -> Result<(), InjectionError> {
        let now = self.now_ms();
        let down_time = self.gesture().take().unwrap_or(now);
        self.inject_motion(MotionAction::Up, x, y, down_time, now)
    }

    /// Key down followed by key up.
    pub fn key(&self, key_code: i32) -> Result<(), InjectionError> {
        let down_time = self.now_ms();
        self.inject_key(KeyAction::Down, key_code, down_time, down_time)?;
        self.inject_key(KeyAction::Up, key_code, down_time, self.now_ms())
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn gesture(&self) -> std::sync::MutexGuard<'_, Option<u64>> {
        self.gesture_down_ms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn sleep_until(&self, started: Instant, point: &PathPoint) {
        let Some(due) = started.checked_add(Duration::from_millis(point.offset_ms)) else {
            return;
        };
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }
    }

    fn inject_motion(
        &self,
        action: MotionAction,
        x: i32,
        y: i32,
        down_time_ms: u64,
        event_time_ms: u64,
    ) -> Result<(), InjectionError> {
        let display_id = self.target_display();
        let event = InputEvent::Motion(MotionEvent {
            action,
            x,
            y,
            down_time_ms,
            event_time_ms,
            display_id,
        });
        self.inject(event, motion_phase(action), display_id)
    }

    fn inject_key(
        &self,
        action: KeyAction,
        key_code: i32,
        down_time_ms: u64,
        event_time_ms: u64,
    ) -> Result<(), InjectionError> {
        let display_id = self.target_display();
        let event = InputEvent::Key(KeyEvent {
            action,
            key_code,
            down_time_ms,
            event_time_ms,
            display_id,
        });
        let phase = match action {
            KeyAction::Down => "key down",
            KeyAction::Up => "key up",
        };
        self.inject(event, phase, display_id)
    }

    fn inject(
        &self,
        event: InputEvent,
        phase: &'static str,
        display_id: u32,
    ) -> Result<(), InjectionError> {
        self.bridge
            .inject_input_event(&event)
            .map_err(|source| InjectionError::Rejected {
                phase,
                display_id,
                source,
            })
    }
}

fn motion_phase(action: MotionAction) -> &'static str {
    match action {
        MotionAction::Down => "touch down",
        MotionAction::Move => "touch move",
        MotionAction::Up => "touch up",
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
