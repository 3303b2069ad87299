//! `tracing` subscriber setup.
//!
//! Three outputs share one `EnvFilter`:
//!
//! - stdout, through the usual `fmt` layer;
//! - an optional persistent file, through `tracing-appender`'s non-blocking
//!   writer (the returned guard must live until shutdown or buffered lines
//!   are lost);
//! - connected clients, through [`DiagnosticLayer`], which turns each event
//!   into a `LOG <LEVEL> <target>: <message>` text frame on the broadcast.
//!
//! The diagnostic layer is handed its sink at construction; there is no
//! global logger to look up.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context as _};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use vdisplay_core::ServerText;

use crate::application::dispatch::PROTOCOL_LOG_TARGET;
use crate::application::frame_sink::FrameSink;
use crate::infrastructure::config::LoggingSection;

/// Forwards log events to clients as diagnostic text frames.
///
/// Events under [`PROTOCOL_LOG_TARGET`] are never forwarded: rejected
/// commands must not produce outbound frames.
pub struct DiagnosticLayer {
    sink: Arc<dyn FrameSink>,
    max_level: Level,
}

impl DiagnosticLayer {
    /// Forwards events at `max_level` or more severe.
    pub fn new(sink: Arc<dyn FrameSink>, max_level: Level) -> Self {
        Self { sink, max_level }
    }
}

impl<S: Subscriber> Layer<S> for DiagnosticLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        // More verbose levels compare greater.
        if *meta.level() > self.max_level || meta.target().starts_with(PROTOCOL_LOG_TARGET) {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let line = ServerText::Log {
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: visitor.finish(),
        };
        self.sink.send_text(line.to_string());
    }
}

/// Collects the `message` field plus any structured fields as `key=value`.
#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else if self.message.is_empty() {
            self.fields.trim_start().to_string()
        } else {
            format!("{}{}", self.message, self.fields)
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            let _ = write!(self.fields, " {}={}", field.name(), value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
        } else {
            let _ = write!(self.fields, " {}={:?}", field.name(), value);
        }
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` wins over `settings.level`.  Returns the file writer's guard
/// when a log file is configured.
///
/// # Errors
///
/// Returns an error if `diagnostic_level` is not a level name, the log file
/// path has no file name or its directory cannot be created, or a global
/// subscriber is already installed.
pub fn init_logging(
    settings: &LoggingSection,
    sink: Arc<dyn FrameSink>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let diagnostic_level: Level = settings
        .diagnostic_level
        .parse()
        .with_context(|| format!("invalid diagnostic_level '{}'", settings.diagnostic_level))?;

    let (file_layer, guard) = match &settings.file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .with(DiagnosticLayer::new(sink, diagnostic_level))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

fn file_writer(
    path: &Path,
) -> anyhow::Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let Some(file_name) = path.file_name() else {
        bail!("log file path '{}' has no file name", path.display());
    };
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;

    let appender = tracing_appender::rolling::never(directory, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
