//! ScreenshotService: one-off PNG capture of the active virtual display.
//!
//! The capture runs the platform's frame-buffer utility as a subprocess,
//! reads the PNG it wrote, and answers with one text frame:
//!
//! ```text
//! SCREENSHOT_DATA <base64 PNG>      on success
//! SCREENSHOT_ERROR <reason>         on failure
//! ```
//!
//! The utility is described by an argv template in which `{display}` and
//! `{path}` are substituted.  The output file is left in place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use thiserror::Error;
use tracing::{debug, info, warn};
use vdisplay_core::ServerText;

use crate::application::frame_sink::FrameSink;

/// Default capture command.
pub const DEFAULT_CAPTURE_COMMAND: [&str; 5] = ["screencap", "-d", "{display}", "-p", "{path}"];

/// Default location of the captured PNG.
pub const DEFAULT_OUTPUT_PATH: &str = "/data/local/tmp/vdisplay_screenshot.png";

/// Error type for a screenshot capture.
#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("no virtual display is active")]
    NoVirtualDisplay,
    #[error("capture command template is empty")]
    EmptyCommand,
    #[error("capture utility could not be started: {0}")]
    SpawnFailed(#[source] io::Error),
    #[error("capture utility exited with code {0}")]
    ExitCode(i32),
    #[error("capture utility was terminated by a signal")]
    ExitSignal,
    #[error("capture file {} is missing", .0.display())]
    FileMissing(PathBuf),
    #[error("capture file {} is empty", .0.display())]
    EmptyFile(PathBuf),
    #[error("reading capture file failed: {0}")]
    Io(#[source] io::Error),
}

impl ScreenshotError {
    /// Short reason code sent to clients in `SCREENSHOT_ERROR`.
    pub fn reason(&self) -> String {
        match self {
            ScreenshotError::NoVirtualDisplay => "no_virtual_display".to_string(),
            ScreenshotError::EmptyCommand | ScreenshotError::SpawnFailed(_) => {
                "spawn_failed".to_string()
            }
            ScreenshotError::ExitCode(code) => format!("exit_code_{code}"),
            ScreenshotError::ExitSignal => "exit_signal".to_string(),
            ScreenshotError::FileMissing(_) => "file_missing".to_string(),
            ScreenshotError::EmptyFile(_) => "empty_file".to_string(),
            ScreenshotError::Io(_) => "io_error".to_string(),
        }
    }
}

/// Captures screenshots of the active display.
#[derive(Debug, Clone)]
pub struct ScreenshotService {
    command: Vec<String>,
    output_path: PathBuf,
}

impl Default for ScreenshotService {
    fn default() -> Self {
        Self::new(
            DEFAULT_CAPTURE_COMMAND.iter().map(|s| s.to_string()).collect(),
            PathBuf::from(DEFAULT_OUTPUT_PATH),
        )
    }
}

impl ScreenshotService {
    pub fn new(command: Vec<String>, output_path: PathBuf) -> Self {
        Self {
            command,
            output_path,
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Captures `display_id` and returns the base64-encoded PNG.
    ///
    /// # Errors
    ///
    /// Returns [`ScreenshotError`] for every failure; `display_id == None`
    /// fails with [`ScreenshotError::NoVirtualDisplay`] before anything runs.
    pub fn capture(&self, display_id: Option<u32>) -> Result<String, ScreenshotError> {
        let display_id = display_id.ok_or(ScreenshotError::NoVirtualDisplay)?;

        let argv = self.argv(display_id);
        let (program, args) = argv.split_first().ok_or(ScreenshotError::EmptyCommand)?;
        debug!("running capture utility: {}", argv.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(ScreenshotError::SpawnFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                debug!("capture utility stderr: {}", stderr.trim());
            }
            return Err(match output.status.code() {
                Some(code) => ScreenshotError::ExitCode(code),
                None => ScreenshotError::ExitSignal,
            });
        }

        let png = match fs::read(&self.output_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ScreenshotError::FileMissing(self.output_path.clone()))
            }
            Err(e) => return Err(ScreenshotError::Io(e)),
        };
        if png.is_empty() {
            return Err(ScreenshotError::EmptyFile(self.output_path.clone()));
        }

        info!("captured display {display_id}: {} byte PNG", png.len());
        Ok(STANDARD.encode(&png))
    }

    /// Captures `display_id` and sends the result line to `sink`.
    /// Returns `true` on success.
    pub fn respond(&self, display_id: Option<u32>, sink: &dyn FrameSink) -> bool {
        let (line, ok) = match self.capture(display_id) {
            Ok(payload) => (ServerText::ScreenshotData(payload), true),
            Err(ScreenshotError::NoVirtualDisplay) => {
                debug!("screenshot requested with no active virtual display");
                (ServerText::ScreenshotError(ScreenshotError::NoVirtualDisplay.reason()), false)
            }
            Err(e) => {
                warn!("screenshot failed: {e}");
                (ServerText::ScreenshotError(e.reason()), false)
            }
        };
        sink.send_text(line.to_string());
        ok
    }

    fn argv(&self, display_id: u32) -> Vec<String> {
        let display = display_id.to_string();
        let path = self.output_path.to_string_lossy();
        self.command
            .iter()
            .map(|arg| arg.replace("{display}", &display).replace("{path}", &path))
            .collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
