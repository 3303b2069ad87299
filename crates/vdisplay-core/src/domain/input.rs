//! Synthetic input events targeted at a display.
//!
//! Coordinates are absolute pixels in the target display's space.  Times are
//! monotonic milliseconds; `down_time_ms` is the time the gesture (or key
//! press) started and is shared by every event of that gesture.

/// Id of the host's built-in display, used when no virtual display is active.
pub const DEFAULT_DISPLAY_ID: u32 = 0;

/// Phase of a single-pointer touch gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionAction {
    Down,
    Move,
    Up,
}

/// Phase of a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Down,
    Up,
}

/// A single-pointer touch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub action: MotionAction,
    pub x: i32,
    pub y: i32,
    pub down_time_ms: u64,
    pub event_time_ms: u64,
    pub display_id: u32,
}

/// A key event identified by a platform key code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key_code: i32,
    pub down_time_ms: u64,
    pub event_time_ms: u64,
    pub display_id: u32,
}

/// Any event the injector can hand to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Motion(MotionEvent),
    Key(KeyEvent),
}

impl InputEvent {
    /// Display the event is targeted at.
    pub fn display_id(&self) -> u32 {
        match self {
            InputEvent::Motion(m) => m.display_id,
            InputEvent::Key(k) => k.display_id,
        }
    }

    /// Time the event happened.
    pub fn event_time_ms(&self) -> u64 {
        match self {
            InputEvent::Motion(m) => m.event_time_ms,
            InputEvent::Key(k) => k.event_time_ms,
        }
    }
}
