//! Display geometry: encoder dimension alignment and swipe interpolation.
//!
//! # Why align to 8?
//!
//! Hardware H.264 encoders work on 16x16 macroblocks and many of them reject
//! input surfaces whose width or height is not a multiple of 8 (some even 16).
//! Rounding *down* keeps the encoded picture inside the area the virtual
//! display actually renders, so no garbage rows or columns are encoded.

/// Encoder dimensions are rounded down to a multiple of this value.
pub const ENCODER_ALIGNMENT: u32 = 8;

/// Smallest dimension handed to the encoder when alignment collapses a value.
pub const MIN_ENCODER_DIMENSION: u32 = 2;

/// Interval between interpolated move events during a swipe.
pub const SWIPE_STEP_MS: u64 = 16;

/// Upper bound on the number of steps in one swipe.  Longer swipes widen
/// the step instead of adding moves.
pub const MAX_SWIPE_STEPS: u64 = 1000;

/// Rounds `value` down to a multiple of [`ENCODER_ALIGNMENT`], clamping to
/// [`MIN_ENCODER_DIMENSION`] when the result would be zero.
///
/// # Examples
///
/// ```rust
/// use vdisplay_core::align_dimension;
///
/// assert_eq!(align_dimension(1079), 1072);
/// assert_eq!(align_dimension(2339), 2336);
/// assert_eq!(align_dimension(5), 2);
/// ```
pub fn align_dimension(value: u32) -> u32 {
    let aligned = value - value % ENCODER_ALIGNMENT;
    if aligned == 0 {
        MIN_ENCODER_DIMENSION
    } else {
        aligned
    }
}

/// Pixel size and density of a virtual display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
}

impl DisplayGeometry {
    pub fn new(width: u32, height: u32, dpi: u32) -> Self {
        Self { width, height, dpi }
    }

    /// Returns the geometry with width and height aligned for the encoder.
    /// Density is unchanged.
    pub fn aligned(self) -> Self {
        Self {
            width: align_dimension(self.width),
            height: align_dimension(self.height),
            dpi: self.dpi,
        }
    }
}

// ── Swipe interpolation ───────────────────────────────────────────────────────

/// One point of a gesture, `offset_ms` after the gesture started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathPoint {
    pub x: i32,
    pub y: i32,
    pub offset_ms: u64,
}

/// The full event plan for a swipe: one down, interior moves, one up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwipePath {
    pub down: PathPoint,
    pub moves: Vec<PathPoint>,
    pub up: PathPoint,
}

/// Plans a linear swipe from `(x1, y1)` to `(x2, y2)` over `duration_ms`.
///
/// The gesture is split into `duration_ms / SWIPE_STEP_MS` steps, clamped to
/// `1..=MAX_SWIPE_STEPS`.  Moves are placed at the interior step boundaries only, so the down is
/// always at the start point at offset 0, the up is always at the end point at
/// offset `duration_ms`, and every move offset lies strictly between them.
/// Durations shorter than two steps produce no moves.
pub fn swipe_path(x1: i32, y1: i32, x2: i32, y2: i32, duration_ms: u64) -> SwipePath {
    let steps = (duration_ms / SWIPE_STEP_MS).clamp(1, MAX_SWIPE_STEPS);

    let moves = (1..steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            PathPoint {
                x: lerp(x1, x2, t),
                y: lerp(y1, y2, t),
                offset_ms: scale_offset(duration_ms, i, steps),
            }
        })
        .collect();

    SwipePath {
        down: PathPoint {
            x: x1,
            y: y1,
            offset_ms: 0,
        },
        moves,
        up: PathPoint {
            x: x2,
            y: y2,
            offset_ms: duration_ms,
        },
    }
}

/// `duration_ms * i / steps` without overflowing; `i < steps` keeps the result
/// below `duration_ms`.
fn scale_offset(duration_ms: u64, i: u64, steps: u64) -> u64 {
    (u128::from(duration_ms) * u128::from(i) / u128::from(steps)) as u64
}

fn lerp(from: i32, to: i32, t: f64) -> i32 {
    let value = from as f64 + (to as f64 - from as f64) * t;
    value.round() as i32
}

// ── Tests ─────────────────────────────────────────────────────────────────────
