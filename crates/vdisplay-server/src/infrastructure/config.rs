//! TOML configuration for the server.
//!
//! Every field has a serde default, so an absent file, an empty file and a
//! partial file all produce a working configuration.  Command-line flags are
//! applied on top by `main.rs`.
//!
//! ```toml
//! [server]
//! bind_address = "127.0.0.1"
//! port = 27183
//!
//! [display]
//! default_bitrate_kbps = 4000
//!
//! [encoder]
//! drain_poll_timeout_ms = 100
//! drain_join_timeout_ms = 2000
//!
//! [input]
//! tap_delay_ms = 50
//! max_swipe_ms = 10000
//!
//! [screenshot]
//! command = ["screencap", "-d", "{display}", "-p", "{path}"]
//! output_path = "/data/local/tmp/vdisplay_screenshot.png"
//!
//! [logging]
//! level = "info"
//! diagnostic_level = "info"
//! file = "/data/local/tmp/vdisplay.log"
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::display_session::SessionSettings;
use crate::application::screenshot::{
    ScreenshotService, DEFAULT_CAPTURE_COMMAND, DEFAULT_OUTPUT_PATH,
};

/// Default TCP port of the command/stream socket.
pub const DEFAULT_PORT: u16 = 27183;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `bind_address` and `port` do not form a socket address.
    #[error("invalid listen address '{0}'")]
    InvalidAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub encoder: EncoderSection,
    #[serde(default)]
    pub input: InputSection,
    #[serde(default)]
    pub screenshot: ScreenshotSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSection {
    /// IP address to bind.  Keep this on loopback: the socket has no
    /// authentication.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Frames a slow connection may fall behind before it skips ahead.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    /// Connect once to the listener at startup.
    #[serde(default = "default_true")]
    pub self_test: bool,
}

/// Virtual display settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplaySection {
    #[serde(default = "default_display_name")]
    pub name: String,
    /// Bitrate for `CREATE_DISPLAY` without an explicit one.
    #[serde(default = "default_bitrate_kbps")]
    pub default_bitrate_kbps: u32,
}

/// Encoder drain thread settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderSection {
    #[serde(default = "default_drain_poll_timeout_ms")]
    pub drain_poll_timeout_ms: u64,
    #[serde(default = "default_drain_join_timeout_ms")]
    pub drain_join_timeout_ms: u64,
}

/// Input injection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputSection {
    #[serde(default = "default_tap_delay_ms")]
    pub tap_delay_ms: u64,
    /// Longer swipes are shortened to this duration.
    #[serde(default = "default_max_swipe_ms")]
    pub max_swipe_ms: u64,
}

/// Screenshot utility settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenshotSection {
    /// Argv template; `{display}` and `{path}` are substituted.
    #[serde(default = "default_screenshot_command")]
    pub command: Vec<String>,
    #[serde(default = "default_screenshot_path")]
    pub output_path: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// Filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Lowest level forwarded to clients as `LOG` lines.
    #[serde(default = "default_log_level")]
    pub diagnostic_level: String,
    /// Persistent log file; none when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_broadcast_capacity() -> usize {
    crate::infrastructure::broadcast::DEFAULT_BROADCAST_CAPACITY
}
fn default_true() -> bool {
    true
}
fn default_display_name() -> String {
    "vdisplay".to_string()
}
fn default_bitrate_kbps() -> u32 {
    crate::application::dispatch::DEFAULT_BITRATE_KBPS
}
fn default_drain_poll_timeout_ms() -> u64 {
    100
}
fn default_drain_join_timeout_ms() -> u64 {
    2_000
}
fn default_tap_delay_ms() -> u64 {
    50
}
fn default_max_swipe_ms() -> u64 {
    10_000
}
fn default_screenshot_command() -> Vec<String> {
    DEFAULT_CAPTURE_COMMAND.iter().map(|s| s.to_string()).collect()
}
fn default_screenshot_path() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_PATH)
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            broadcast_capacity: default_broadcast_capacity(),
            self_test: default_true(),
        }
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            name: default_display_name(),
            default_bitrate_kbps: default_bitrate_kbps(),
        }
    }
}

impl Default for EncoderSection {
    fn default() -> Self {
        Self {
            drain_poll_timeout_ms: default_drain_poll_timeout_ms(),
            drain_join_timeout_ms: default_drain_join_timeout_ms(),
        }
    }
}

impl Default for InputSection {
    fn default() -> Self {
        Self {
            tap_delay_ms: default_tap_delay_ms(),
            max_swipe_ms: default_max_swipe_ms(),
        }
    }
}

impl Default for ScreenshotSection {
    fn default() -> Self {
        Self {
            command: default_screenshot_command(),
            output_path: default_screenshot_path(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            diagnostic_level: default_log_level(),
            file: None,
        }
    }
}

// ── Loading and derived settings ──────────────────────────────────────────────

impl ServerConfig {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses configuration text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Address the WebSocket listener binds.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let text = format!("{}:{}", self.server.bind_address, self.server.port);
        text.parse().map_err(|_| ConfigError::InvalidAddress(text))
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            display_name: self.display.name.clone(),
            drain_poll_timeout: Duration::from_millis(self.encoder.drain_poll_timeout_ms),
            drain_join_timeout: Duration::from_millis(self.encoder.drain_join_timeout_ms),
        }
    }

    pub fn tap_delay(&self) -> Duration {
        Duration::from_millis(self.input.tap_delay_ms)
    }

    pub fn max_swipe(&self) -> Duration {
        Duration::from_millis(self.input.max_swipe_ms)
    }

    pub fn screenshot_service(&self) -> ScreenshotService {
        ScreenshotService::new(
            self.screenshot.command.clone(),
            self.screenshot.output_path.clone(),
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_yields_defaults() {
        // Arrange / Act
        let config = ServerConfig::from_toml_str("").unwrap();

        // Assert
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.server.port, 27183);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.display.default_bitrate_kbps, 4000);
        assert_eq!(config.encoder.drain_poll_timeout_ms, 100);
        assert_eq!(config.encoder.drain_join_timeout_ms, 2000);
        assert_eq!(config.input.tap_delay_ms, 50);
        assert_eq!(config.input.max_swipe_ms, 10_000);
        assert_eq!(config.screenshot.command[0], "screencap");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = ServerConfig::from_toml_str(
            r#"
            [server]
            port = 9000

            [logging]
            file = "/tmp/vd.log"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert!(config.server.self_test);
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/vd.log")));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let result = ServerConfig::from_toml_str("[server\nport = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = ServerConfig::load(Path::new("/nonexistent/vdisplay/config.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_socket_addr_from_sections() {
        let mut config = ServerConfig::default();
        config.server.port = 1234;
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:1234");

        config.server.bind_address = "not an ip".to_string();
        assert!(matches!(
            config.socket_addr(),
            Err(ConfigError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_derived_settings_use_milliseconds() {
        let mut config = ServerConfig::default();
        config.encoder.drain_join_timeout_ms = 750;
        config.input.tap_delay_ms = 20;
        config.input.max_swipe_ms = 3000;

        assert_eq!(
            config.session_settings().drain_join_timeout,
            Duration::from_millis(750)
        );
        assert_eq!(config.tap_delay(), Duration::from_millis(20));
        assert_eq!(config.max_swipe(), Duration::from_secs(3));
    }
}
