//! Text command grammar: parses one inbound line into a typed [`Command`].
//!
//! # Grammar
//!
//! Commands are single lines of whitespace-delimited tokens.  The first token
//! is an upper-case keyword; the rest are its arguments.
//!
//! ```text
//! CREATE_DISPLAY [width height dpi [bitrateKbps]]   # defaults 1080,1920,320
//! DESTROY_DISPLAY | STOP
//! TAP x y
//! SWIPE x1 y1 x2 y2 durationMs
//! TOUCH_DOWN x y | TOUCH_MOVE x y | TOUCH_UP x y
//! KEY keyCode
//! SCREENSHOT
//! LAUNCH_APP packageName
//! ```
//!
//! # Error policy
//!
//! The parser never panics.  A missing or unparseable argument yields
//! [`ProtocolError::MissingArgument`] / [`ProtocolError::InvalidNumber`]; an
//! unrecognised keyword yields [`ProtocolError::UnknownKeyword`].  The server
//! logs these and drops the command without answering.  Extra trailing tokens
//! are ignored.

use std::str::{FromStr, SplitWhitespace};

use thiserror::Error;

/// Width used by `CREATE_DISPLAY` when no size is given.
pub const DEFAULT_DISPLAY_WIDTH: u32 = 1080;
/// Height used by `CREATE_DISPLAY` when no size is given.
pub const DEFAULT_DISPLAY_HEIGHT: u32 = 1920;
/// Density used by `CREATE_DISPLAY` when no size is given.
pub const DEFAULT_DISPLAY_DPI: u32 = 320;

/// Errors produced while parsing a command line.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line contained no tokens.
    #[error("empty command line")]
    Empty,

    /// The first token is not a known keyword.
    #[error("unknown command keyword '{0}'")]
    UnknownKeyword(String),

    /// A required argument was absent.
    #[error("{command}: missing argument '{argument}'")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// An argument could not be parsed as the expected number type.
    #[error("{command}: argument '{argument}' is not a valid number: '{value}'")]
    InvalidNumber {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
}

/// Requested size and bitrate of the virtual display.
///
/// `bitrate_kbps` is `None` when the client did not send one; the server then
/// applies its configured default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayRequest {
    pub width: u32,
    pub height: u32,
    pub dpi: u32,
    pub bitrate_kbps: Option<u32>,
}

impl Default for DisplayRequest {
    fn default() -> Self {
        Self {
            width: DEFAULT_DISPLAY_WIDTH,
            height: DEFAULT_DISPLAY_HEIGHT,
            dpi: DEFAULT_DISPLAY_DPI,
            bitrate_kbps: None,
        }
    }
}

/// A parsed client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateDisplay(DisplayRequest),
    DestroyDisplay,
    Stop,
    Tap {
        x: i32,
        y: i32,
    },
    Swipe {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        duration_ms: u64,
    },
    TouchDown {
        x: i32,
        y: i32,
    },
    TouchMove {
        x: i32,
        y: i32,
    },
    TouchUp {
        x: i32,
        y: i32,
    },
    Key {
        key_code: i32,
    },
    Screenshot,
    LaunchApp {
        package: String,
    },
}

impl Command {
    /// Returns the wire keyword for this command.
    ///
    /// Used in log messages so argument values never need to be formatted.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::CreateDisplay(_) => "CREATE_DISPLAY",
            Command::DestroyDisplay => "DESTROY_DISPLAY",
            Command::Stop => "STOP",
            Command::Tap { .. } => "TAP",
            Command::Swipe { .. } => "SWIPE",
            Command::TouchDown { .. } => "TOUCH_DOWN",
            Command::TouchMove { .. } => "TOUCH_MOVE",
            Command::TouchUp { .. } => "TOUCH_UP",
            Command::Key { .. } => "KEY",
            Command::Screenshot => "SCREENSHOT",
            Command::LaunchApp { .. } => "LAUNCH_APP",
        }
    }
}

/// Parses a single command line.
///
/// # Errors
///
/// See the module-level error policy.
///
/// # Examples
///
/// ```rust
/// use vdisplay_core::{parse_command, Command};
///
/// assert_eq!(parse_command("TAP 540 960"), Ok(Command::Tap { x: 540, y: 960 }));
/// assert!(parse_command("TAP abc def").is_err());
/// ```
pub fn parse_command(line: &str) -> Result<Command, ProtocolError> {
    let mut tokens = line.split_whitespace();
    let keyword = tokens.next().ok_or(ProtocolError::Empty)?;

    match keyword {
        "CREATE_DISPLAY" => parse_create_display(ArgReader::new("CREATE_DISPLAY", tokens)),
        "DESTROY_DISPLAY" => Ok(Command::DestroyDisplay),
        "STOP" => Ok(Command::Stop),
        "TAP" => {
            let mut args = ArgReader::new("TAP", tokens);
            Ok(Command::Tap {
                x: args.number("x")?,
                y: args.number("y")?,
            })
        }
        "SWIPE" => {
            let mut args = ArgReader::new("SWIPE", tokens);
            Ok(Command::Swipe {
                x1: args.number("x1")?,
                y1: args.number("y1")?,
                x2: args.number("x2")?,
                y2: args.number("y2")?,
                duration_ms: args.number("durationMs")?,
            })
        }
        "TOUCH_DOWN" => {
            let mut args = ArgReader::new("TOUCH_DOWN", tokens);
            Ok(Command::TouchDown {
                x: args.number("x")?,
                y: args.number("y")?,
            })
        }
        "TOUCH_MOVE" => {
            let mut args = ArgReader::new("TOUCH_MOVE", tokens);
            Ok(Command::TouchMove {
                x: args.number("x")?,
                y: args.number("y")?,
            })
        }
        "TOUCH_UP" => {
            let mut args = ArgReader::new("TOUCH_UP", tokens);
            Ok(Command::TouchUp {
                x: args.number("x")?,
                y: args.number("y")?,
            })
        }
        "KEY" => {
            let mut args = ArgReader::new("KEY", tokens);
            Ok(Command::Key {
                key_code: args.number("keyCode")?,
            })
        }
        "SCREENSHOT" => Ok(Command::Screenshot),
        "LAUNCH_APP" => {
            let mut args = ArgReader::new("LAUNCH_APP", tokens);
            Ok(Command::LaunchApp {
                package: args.word("packageName")?.to_string(),
            })
        }
        other => Err(ProtocolError::UnknownKeyword(other.to_string())),
    }
}

/// `CREATE_DISPLAY` takes either no arguments or at least `width height dpi`.
fn parse_create_display(mut args: ArgReader<'_>) -> Result<Command, ProtocolError> {
    match args.remaining() {
        0 => Ok(Command::CreateDisplay(DisplayRequest::default())),
        1 => Err(args.missing("height")),
        2 => Err(args.missing("dpi")),
        _ => {
            let width = args.number("width")?;
            let height = args.number("height")?;
            let dpi = args.number("dpi")?;
            let bitrate_kbps = if args.remaining() > 0 {
                Some(args.number("bitrateKbps")?)
            } else {
                None
            };
            Ok(Command::CreateDisplay(DisplayRequest {
                width,
                height,
                dpi,
                bitrate_kbps,
            }))
        }
    }
}

// ── Argument reader ───────────────────────────────────────────────────────────

struct ArgReader<'a> {
    command: &'static str,
    tokens: SplitWhitespace<'a>,
}

impl<'a> ArgReader<'a> {
    fn new(command: &'static str, tokens: SplitWhitespace<'a>) -> Self {
        Self { command, tokens }
    }

    fn remaining(&self) -> usize {
        self.tokens.clone().count()
    }

    fn missing(&self, argument: &'static str) -> ProtocolError {
        ProtocolError::MissingArgument {
            command: self.command,
            argument,
        }
    }

    fn word(&mut self, argument: &'static str) -> Result<&'a str, ProtocolError> {
        self.tokens.next().ok_or_else(|| self.missing(argument))
    }

    fn number<T: FromStr>(&mut self, argument: &'static str) -> Result<T, ProtocolError> {
        let raw = self.word(argument)?;
        raw.parse().map_err(|_| ProtocolError::InvalidNumber {
            command: self.command,
            argument,
            value: raw.to_string(),
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_display_without_arguments_uses_defaults() {
        let cmd = parse_command("CREATE_DISPLAY").unwrap();
        assert_eq!(
            cmd,
            Command::CreateDisplay(DisplayRequest {
                width: 1080,
                height: 1920,
                dpi: 320,
                bitrate_kbps: None,
            })
        );
    }

    #[test]
    fn test_create_display_with_size_and_bitrate() {
        let cmd = parse_command("CREATE_DISPLAY 1080 1920 320 4000").unwrap();
        assert_eq!(
            cmd,
            Command::CreateDisplay(DisplayRequest {
                width: 1080,
                height: 1920,
                dpi: 320,
                bitrate_kbps: Some(4000),
            })
        );
    }

    #[test]
    fn test_create_display_without_bitrate_leaves_it_unset() {
        let cmd = parse_command("CREATE_DISPLAY 1079 2339 320").unwrap();
        match cmd {
            Command::CreateDisplay(req) => {
                assert_eq!((req.width, req.height, req.dpi), (1079, 2339, 320));
                assert_eq!(req.bitrate_kbps, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_create_display_with_partial_size_is_rejected() {
        assert_eq!(
            parse_command("CREATE_DISPLAY 1080"),
            Err(ProtocolError::MissingArgument {
                command: "CREATE_DISPLAY",
                argument: "height",
            })
        );
        assert_eq!(
            parse_command("CREATE_DISPLAY 1080 1920"),
            Err(ProtocolError::MissingArgument {
                command: "CREATE_DISPLAY",
                argument: "dpi",
            })
        );
    }

    #[test]
    fn test_create_display_with_invalid_bitrate_is_rejected() {
        let err = parse_command("CREATE_DISPLAY 1080 1920 320 fast").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidNumber {
                argument: "bitrateKbps",
                ..
            }
        ));
    }

    #[test]
    fn test_negative_width_is_rejected() {
        let err = parse_command("CREATE_DISPLAY -1080 1920 320").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidNumber { argument: "width", .. }));
    }

    #[test]
    fn test_tap_with_valid_coordinates() {
        assert_eq!(parse_command("TAP 10 20"), Ok(Command::Tap { x: 10, y: 20 }));
    }

    #[test]
    fn test_tap_with_unparseable_coordinates() {
        let err = parse_command("TAP abc def").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidNumber {
                command: "TAP",
                argument: "x",
                value: "abc".to_string(),
            }
        );
    }

    #[test]
    fn test_tap_missing_y() {
        assert_eq!(
            parse_command("TAP 10"),
            Err(ProtocolError::MissingArgument {
                command: "TAP",
                argument: "y",
            })
        );
    }

    #[test]
    fn test_swipe_parses_all_five_arguments() {
        assert_eq!(
            parse_command("SWIPE 100 200 300 400 250"),
            Ok(Command::Swipe {
                x1: 100,
                y1: 200,
                x2: 300,
                y2: 400,
                duration_ms: 250,
            })
        );
    }

    #[test]
    fn test_swipe_with_negative_duration_is_rejected() {
        let err = parse_command("SWIPE 1 2 3 4 -5").unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidNumber {
                argument: "durationMs",
                ..
            }
        ));
    }

    #[test]
    fn test_touch_commands() {
        assert_eq!(parse_command("TOUCH_DOWN 1 2"), Ok(Command::TouchDown { x: 1, y: 2 }));
        assert_eq!(parse_command("TOUCH_MOVE 3 4"), Ok(Command::TouchMove { x: 3, y: 4 }));
        assert_eq!(parse_command("TOUCH_UP 5 6"), Ok(Command::TouchUp { x: 5, y: 6 }));
    }

    #[test]
    fn test_key_command() {
        assert_eq!(parse_command("KEY 4"), Ok(Command::Key { key_code: 4 }));
    }

    #[test]
    fn test_launch_app_requires_package() {
        assert_eq!(
            parse_command("LAUNCH_APP com.example.app"),
            Ok(Command::LaunchApp {
                package: "com.example.app".to_string()
            })
        );
        assert!(matches!(
            parse_command("LAUNCH_APP"),
            Err(ProtocolError::MissingArgument { .. })
        ));
    }

    #[test]
    fn test_argument_free_commands() {
        assert_eq!(parse_command("DESTROY_DISPLAY"), Ok(Command::DestroyDisplay));
        assert_eq!(parse_command("STOP"), Ok(Command::Stop));
        assert_eq!(parse_command("SCREENSHOT"), Ok(Command::Screenshot));
    }

    #[test]
    fn test_extra_tokens_are_ignored() {
        assert_eq!(parse_command("TAP 1 2 3 4"), Ok(Command::Tap { x: 1, y: 2 }));
    }

    #[test]
    fn test_surrounding_whitespace_is_tolerated() {
        assert_eq!(parse_command("  TAP\t1   2 \r"), Ok(Command::Tap { x: 1, y: 2 }));
    }

    #[test]
    fn test_unknown_keyword() {
        assert_eq!(
            parse_command("REBOOT now"),
            Err(ProtocolError::UnknownKeyword("REBOOT".to_string()))
        );
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert!(matches!(
            parse_command("tap 1 2"),
            Err(ProtocolError::UnknownKeyword(_))
        ));
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(parse_command(""), Err(ProtocolError::Empty));
        assert_eq!(parse_command("   "), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_keyword_names_round_trip_through_parser() {
        let lines = [
            "CREATE_DISPLAY",
            "DESTROY_DISPLAY",
            "STOP",
            "TAP 1 1",
            "SWIPE 1 1 2 2 10",
            "TOUCH_DOWN 1 1",
            "TOUCH_MOVE 1 1",
            "TOUCH_UP 1 1",
            "KEY 3",
            "SCREENSHOT",
            "LAUNCH_APP a.b",
        ];
        for line in lines {
            let cmd = parse_command(line).unwrap();
            assert!(line.starts_with(cmd.keyword()), "{line}");
        }
    }
}
