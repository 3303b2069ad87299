//! Outbound text frames.
//!
//! Every text frame the server sends is one line built from [`ServerText`]:
//!
//! ```text
//! SCREENSHOT_DATA <base64 PNG>
//! SCREENSHOT_ERROR <reason>
//! LOG <LEVEL> <target>: <message>
//! ```

use std::fmt;

/// A text frame sent from the server to every connected client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerText {
    /// A successful screenshot; the payload is the base64-encoded PNG.
    ScreenshotData(String),
    /// A failed screenshot with a short machine-readable reason code.
    ScreenshotError(String),
    /// A best-effort diagnostic log line.
    Log {
        level: String,
        target: String,
        message: String,
    },
}

impl fmt::Display for ServerText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerText::ScreenshotData(payload) => write!(f, "SCREENSHOT_DATA {payload}"),
            ServerText::ScreenshotError(reason) => write!(f, "SCREENSHOT_ERROR {reason}"),
            ServerText::Log {
                level,
                target,
                message,
            } => {
                // Diagnostics must stay on one line.
                let message = message.replace(['\r', '\n'], " ");
                write!(f, "LOG {level} {target}: {message}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screenshot_data_line() {
        let line = ServerText::ScreenshotData("iVBORw0KGgo=".to_string()).to_string();
        assert_eq!(line, "SCREENSHOT_DATA iVBORw0KGgo=");
    }

    #[test]
    fn test_screenshot_error_line() {
        let line = ServerText::ScreenshotError("no_virtual_display".to_string()).to_string();
        assert_eq!(line, "SCREENSHOT_ERROR no_virtual_display");
    }

    #[test]
    fn test_log_line_is_single_line() {
        let line = ServerText::Log {
            level: "WARN".to_string(),
            target: "vdisplay_server::application".to_string(),
            message: "first\nsecond".to_string(),
        }
        .to_string();
        assert_eq!(line, "LOG WARN vdisplay_server::application: first second");
        assert!(!line.contains('\n'));
    }
}
