//! Command dispatch: one text line from a client → one use case.
//!
//! Commands never produce an acknowledgement.  The only text a command can
//! cause is a screenshot result; everything else is visible to clients only
//! through the video stream or the diagnostic log lines.
//!
//! Malformed commands are logged under [`PROTOCOL_LOG_TARGET`] and dropped.
//! The diagnostic log layer does not forward that target, so a malformed
//! command produces no outbound frame at all.

use std::sync::Arc;

use tracing::{debug, error, warn};
use vdisplay_core::{parse_command, Command, DisplayGeometry, ProtocolError, DEFAULT_DISPLAY_ID};

use crate::application::display_session::DisplayController;
use crate::application::frame_sink::FrameSink;
use crate::application::input_injector::{InjectionError, InputInjector};
use crate::application::privileged_bridge::PrivilegedServiceBridge;
use crate::application::screenshot::ScreenshotService;

/// `tracing` target for rejected command lines.
pub const PROTOCOL_LOG_TARGET: &str = "vdisplay::protocol";

/// Bitrate used when `CREATE_DISPLAY` does not name one.
pub const DEFAULT_BITRATE_KBPS: u32 = 4_000;

/// Routes parsed commands to the session, injector, and screenshot service.
pub struct CommandDispatcher {
    controller: Arc<DisplayController>,
    injector: Arc<InputInjector>,
    screenshots: ScreenshotService,
    bridge: Arc<PrivilegedServiceBridge>,
    sink: Arc<dyn FrameSink>,
    default_bitrate_kbps: u32,
}

impl CommandDispatcher {
    pub fn new(
        controller: Arc<DisplayController>,
        injector: Arc<InputInjector>,
        screenshots: ScreenshotService,
        bridge: Arc<PrivilegedServiceBridge>,
        sink: Arc<dyn FrameSink>,
        default_bitrate_kbps: u32,
    ) -> Self {
        Self {
            controller,
            injector,
            screenshots,
            bridge,
            sink,
            default_bitrate_kbps,
        }
    }

    pub fn controller(&self) -> &Arc<DisplayController> {
        &self.controller
    }

    /// Handles one text frame, which may hold several newline-separated
    /// commands.  Blank lines are skipped.
    pub fn handle_text(&self, text: &str) {
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.handle_line(line);
        }
    }

    /// Parses and runs one command line.
    pub fn handle_line(&self, line: &str) {
        match parse_command(line) {
            Ok(command) => self.dispatch(command),
            Err(ProtocolError::Empty) => {}
            Err(ProtocolError::UnknownKeyword(keyword)) => {
                debug!(target: PROTOCOL_LOG_TARGET, "ignoring unknown command '{keyword}'");
            }
            Err(e) => {
                warn!(target: PROTOCOL_LOG_TARGET, "ignoring malformed command: {e}");
            }
        }
    }

    /// Runs one parsed command.  Failures are logged, never returned.
    pub fn dispatch(&self, command: Command) {
        let keyword = command.keyword();
        debug!("dispatching {keyword}");

        match command {
            Command::CreateDisplay(request) => {
                let kbps = request.bitrate_kbps.unwrap_or(self.default_bitrate_kbps);
                let geometry = DisplayGeometry::new(request.width, request.height, request.dpi);
                match self
                    .controller
                    .ensure_display(geometry, kbps.saturating_mul(1_000))
                {
                    Ok(active) => debug!("{keyword}: display {} ready", active.display_id),
                    Err(e) => error!("{keyword} failed: {e}"),
                }
            }

            Command::DestroyDisplay | Command::Stop => {
                if !self.controller.release_display() {
                    debug!("{keyword}: no active display");
                }
            }

            Command::Tap { x, y } => report(keyword, self.injector.tap(x, y)),
            Command::Swipe {
                x1,
                y1,
                x2,
                y2,
                duration_ms,
            } => report(keyword, self.injector.swipe(x1, y1, x2, y2, duration_ms)),
            Command::TouchDown { x, y } => report(keyword, self.injector.touch_down(x, y)),
            Command::TouchMove { x, y } => report(keyword, self.injector.touch_move(x, y)),
            Command::TouchUp { x, y } => report(keyword, self.injector.touch_up(x, y)),
            Command::Key { key_code } => report(keyword, self.injector.key(key_code)),

            Command::Screenshot => {
                self.screenshots
                    .respond(self.controller.display_id(), &*self.sink);
            }

            Command::LaunchApp { package } => {
                let display_id = self.controller.display_id().unwrap_or(DEFAULT_DISPLAY_ID);
                match self.bridge.launch_app(&package, display_id) {
                    Ok(()) => {}
                    Err(e) => warn!("{keyword} '{package}' failed: {e}"),
                }
            }
        }
    }
}

fn report(keyword: &str, result: Result<(), InjectionError>) {
    match result {
        Ok(()) => {}
        Err(e) => warn!("{keyword} failed: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
