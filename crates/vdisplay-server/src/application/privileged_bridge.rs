//! PrivilegedServiceBridge: narrow access to the host's display, window,
//! activity, and input services.
//!
//! # Why a capability trait?
//!
//! Creating a virtual display that other apps can render into, changing a
//! display's IME policy, launching activities onto a specific display, and
//! injecting input are all restricted operations.  The host grants them only
//! to a process running under a system identity.  How that identity is
//! obtained is platform plumbing; the rest of the server only needs the
//! handful of operations listed on [`DisplayServices`].
//!
//! The trait is injected at construction time.  Production builds pass a
//! platform binding, tests pass a mock, and `main.rs` currently passes the
//! simulated platform from `infrastructure::platform`.
//!
//! # No rollback
//!
//! Every operation mutates live OS state.  Nothing here undoes a partially
//! completed sequence; the caller ([`crate::application::display_session`])
//! releases whatever it successfully acquired.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};
use vdisplay_core::{DisplayGeometry, InputEvent, VirtualDisplayFlags};

use crate::application::video_encoder::InputSurface;

/// Error type for privileged platform calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// The service refused or threw.
    #[error("{operation} rejected by platform: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },

    /// The target of an activity launch does not exist.
    #[error("no launchable activity for package '{0}'")]
    ActivityNotFound(String),

    /// The service handle could not be obtained.
    #[error("platform service unavailable: {0}")]
    Unavailable(String),
}

/// Handle to a created virtual display.
///
/// `display_id` is the id the platform assigned; `token` identifies the
/// display object for the release call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualDisplayHandle {
    pub display_id: u32,
    pub token: u64,
}

/// Everything the platform needs to create a virtual display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDisplayRequest {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub surface: InputSurface,
    pub flags: VirtualDisplayFlags,
}

/// Where the soft keyboard is shown for a display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ImePolicy {
    /// Show the IME on the display itself.
    Local = 0,
    /// Show the IME on the default display.
    FallbackDisplay = 1,
    /// Never show the IME.
    Hide = 2,
}

/// Intent flag: start the activity in a new task.
pub const FLAG_ACTIVITY_NEW_TASK: u32 = 0x1000_0000;

/// Launch request for a package's main activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchIntent {
    pub package: String,
    pub flags: u32,
}

/// Options attached to an activity launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchOptions {
    pub launch_display_id: u32,
}

/// Privileged display / window / activity / input capability.
///
/// Each supported platform provides an implementation in the infrastructure
/// layer.
#[cfg_attr(test, mockall::automock)]
pub trait DisplayServices: Send + Sync {
    /// Platform API level; decides which newer display flags are understood.
    fn platform_level(&self) -> u32;

    /// Creates a virtual display rendering into `request.surface`.
    fn create_virtual_display(
        &self,
        request: &VirtualDisplayRequest,
    ) -> Result<VirtualDisplayHandle, PlatformError>;

    /// Releases a display returned by [`create_virtual_display`](Self::create_virtual_display).
    fn release_virtual_display(&self, handle: &VirtualDisplayHandle) -> Result<(), PlatformError>;

    /// Sets the IME policy of a display.
    fn set_ime_policy(&self, display_id: u32, policy: ImePolicy) -> Result<(), PlatformError>;

    /// Starts an activity.
    fn start_activity(
        &self,
        intent: &LaunchIntent,
        options: &LaunchOptions,
    ) -> Result<(), PlatformError>;

    /// Injects one input event.
    fn inject_input_event(&self, event: &InputEvent) -> Result<(), PlatformError>;
}

/// The only path from the application layer to [`DisplayServices`].
///
/// Adds flag selection, logging, and the best-effort semantics of the IME
/// policy call on top of the raw capability.
pub struct PrivilegedServiceBridge {
    services: Arc<dyn DisplayServices>,
}

impl PrivilegedServiceBridge {
    pub fn new(services: Arc<dyn DisplayServices>) -> Self {
        Self { services }
    }

    /// Creates a virtual display bound to `surface` with the capability flags
    /// appropriate for the platform level.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] if the platform refuses the display.
    pub fn create_virtual_display(
        &self,
        name: &str,
        geometry: DisplayGeometry,
        surface: InputSurface,
    ) -> Result<VirtualDisplayHandle, PlatformError> {
        let level = self.services.platform_level();
        let flags = VirtualDisplayFlags::for_platform_level(level);
        let request = VirtualDisplayRequest {
            name: name.to_string(),
            width: geometry.width,
            height: geometry.height,
            dpi: geometry.dpi,
            surface,
            flags,
        };

        let handle = self.services.create_virtual_display(&request)?;
        info!(
            "virtual display '{name}' created: id={} {}x{}@{}dpi flags={:#x} (platform level {level})",
            handle.display_id, geometry.width, geometry.height, geometry.dpi, flags.0
        );
        Ok(handle)
    }

    /// Releases a virtual display.  Failures are logged; there is nothing
    /// further the caller could do about them.
    pub fn release_virtual_display(&self, handle: &VirtualDisplayHandle) {
        match self.services.release_virtual_display(handle) {
            Ok(()) => debug!("virtual display {} released", handle.display_id),
            Err(e) => warn!("releasing virtual display {} failed: {e}", handle.display_id),
        }
    }

    /// Sets a display's IME policy.  Best-effort: returns `false` and logs on
    /// failure, never propagates the error.
    pub fn set_ime_policy(&self, display_id: u32, policy: ImePolicy) -> bool {
        match self.services.set_ime_policy(display_id, policy) {
            Ok(()) => {
                debug!("IME policy of display {display_id} set to {policy:?}");
                true
            }
            Err(e) => {
                warn!("could not set IME policy of display {display_id}: {e}");
                false
            }
        }
    }

    /// Launches `package`'s main activity on `display_id` in a new task.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] if the package has no launchable activity or
    /// the launch is rejected.
    pub fn launch_app(&self, package: &str, display_id: u32) -> Result<(), PlatformError> {
        let intent = LaunchIntent {
            package: package.to_string(),
            flags: FLAG_ACTIVITY_NEW_TASK,
        };
        let options = LaunchOptions {
            launch_display_id: display_id,
        };
        self.services.start_activity(&intent, &options)?;
        info!("launched '{package}' on display {display_id}");
        Ok(())
    }

    /// Injects one input event.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError`] if the platform rejects the event.
    pub fn inject_input_event(&self, event: &InputEvent) -> Result<(), PlatformError> {
        self.services.inject_input_event(event)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    fn surface() -> InputSurface {
        InputSurface { id: 7 }
    }

    #[test]
    fn test_create_virtual_display_requests_level_specific_flags() {
        // Arrange
        let mut services = MockDisplayServices::new();
        services.expect_platform_level().return_const(34u32);
        services
            .expect_create_virtual_display()
            .withf(|req| {
                req.width == 1072
                    && req.height == 2336
                    && req.dpi == 320
                    && req.surface.id == 7
                    && req.flags.contains(VirtualDisplayFlags::OWN_FOCUS)
                    && req.flags.contains(VirtualDisplayFlags::SUPPORTS_TOUCH)
            })
            .times(1)
            .returning(|_| {
                Ok(VirtualDisplayHandle {
                    display_id: 12,
                    token: 1,
                })
            });
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        // Act
        let handle = bridge
            .create_virtual_display("test", DisplayGeometry::new(1072, 2336, 320), surface())
            .unwrap();

        // Assert
        assert_eq!(handle.display_id, 12);
    }

    #[test]
    fn test_create_virtual_display_propagates_rejection() {
        let mut services = MockDisplayServices::new();
        services.expect_platform_level().return_const(30u32);
        services.expect_create_virtual_display().returning(|_| {
            Err(PlatformError::Rejected {
                operation: "createVirtualDisplay",
                reason: "denied".to_string(),
            })
        });
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        let result =
            bridge.create_virtual_display("test", DisplayGeometry::new(8, 8, 160), surface());

        assert!(matches!(result, Err(PlatformError::Rejected { .. })));
    }

    #[test]
    fn test_set_ime_policy_failure_is_not_fatal() {
        let mut services = MockDisplayServices::new();
        services
            .expect_set_ime_policy()
            .with(eq(5u32), eq(ImePolicy::Local))
            .times(1)
            .returning(|_, _| Err(PlatformError::Unavailable("window service".to_string())));
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        assert!(!bridge.set_ime_policy(5, ImePolicy::Local));
    }

    #[test]
    fn test_set_ime_policy_success() {
        let mut services = MockDisplayServices::new();
        services.expect_set_ime_policy().returning(|_, _| Ok(()));
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        assert!(bridge.set_ime_policy(5, ImePolicy::Local));
    }

    #[test]
    fn test_launch_app_targets_display_in_new_task() {
        let mut services = MockDisplayServices::new();
        services
            .expect_start_activity()
            .withf(|intent, options| {
                intent.package == "com.example.notes"
                    && intent.flags & FLAG_ACTIVITY_NEW_TASK != 0
                    && options.launch_display_id == 9
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        assert!(bridge.launch_app("com.example.notes", 9).is_ok());
    }

    #[test]
    fn test_launch_missing_package_fails() {
        let mut services = MockDisplayServices::new();
        services
            .expect_start_activity()
            .returning(|intent, _| Err(PlatformError::ActivityNotFound(intent.package.clone())));
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        let err = bridge.launch_app("com.missing", 0).unwrap_err();
        assert!(matches!(err, PlatformError::ActivityNotFound(p) if p == "com.missing"));
    }

    #[test]
    fn test_release_failure_is_swallowed() {
        let mut services = MockDisplayServices::new();
        services
            .expect_release_virtual_display()
            .times(1)
            .returning(|_| Err(PlatformError::Unavailable("gone".to_string())));
        let bridge = PrivilegedServiceBridge::new(Arc::new(services));

        // Must not panic.
        bridge.release_virtual_display(&VirtualDisplayHandle {
            display_id: 3,
            token: 3,
        });
    }
}
