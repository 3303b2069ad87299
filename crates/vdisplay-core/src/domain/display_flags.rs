//! Capability flags requested when a virtual display is created.
//!
//! The bit values follow the host display manager's virtual-display flag
//! constants.  Flags introduced by newer platform levels are only requested
//! when the platform reports a level that understands them; older display
//! managers reject unknown bits.

/// Platform level that introduced the trusted / display-group / unlock /
/// touch-feedback flags.
pub const EXTENDED_FLAGS_LEVEL: u32 = 33;

/// Platform level that introduced the own-focus flag.
pub const OWN_FOCUS_LEVEL: u32 = 34;

/// Bit set of virtual-display capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VirtualDisplayFlags(pub u32);

impl VirtualDisplayFlags {
    pub const PUBLIC: u32 = 1 << 0;
    pub const PRESENTATION: u32 = 1 << 1;
    pub const OWN_CONTENT_ONLY: u32 = 1 << 3;
    pub const SUPPORTS_TOUCH: u32 = 1 << 6;
    pub const ROTATES_WITH_CONTENT: u32 = 1 << 7;
    pub const TRUSTED: u32 = 1 << 10;
    pub const OWN_DISPLAY_GROUP: u32 = 1 << 11;
    pub const ALWAYS_UNLOCKED: u32 = 1 << 12;
    pub const TOUCH_FEEDBACK_DISABLED: u32 = 1 << 13;
    pub const OWN_FOCUS: u32 = 1 << 14;

    /// Flags every platform level accepts.
    pub const BASE: u32 = Self::PUBLIC
        | Self::PRESENTATION
        | Self::OWN_CONTENT_ONLY
        | Self::SUPPORTS_TOUCH
        | Self::ROTATES_WITH_CONTENT;

    /// Returns the flag set to request on a platform of the given level.
    pub fn for_platform_level(level: u32) -> Self {
        let mut bits = Self::BASE;
        if level >= EXTENDED_FLAGS_LEVEL {
            bits |= Self::TRUSTED
                | Self::OWN_DISPLAY_GROUP
                | Self::ALWAYS_UNLOCKED
                | Self::TOUCH_FEEDBACK_DISABLED;
        }
        if level >= OWN_FOCUS_LEVEL {
            bits |= Self::OWN_FOCUS;
        }
        Self(bits)
    }

    /// Returns `true` if every bit of `flag` is set.
    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}
