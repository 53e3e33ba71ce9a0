//! Logging setup
//!
//! Everything goes to stderr so stdout stays free for console, probe and
//! send output. An optional rolling file receives the same events.

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::{LogRotation, LoggingSettings};
use crate::error::{Error, Result};

/// Flushes the log file when dropped; hold it until exit
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Level chosen by `-q` and `-v`, otherwise the configured one
pub fn effective_level(configured: &str, verbose: u8, quiet: bool) -> Level {
    match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => configured.parse().unwrap_or(Level::INFO),
        (false, 1) => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber
pub fn init_logging(settings: &LoggingSettings, level: Level) -> Result<LogGuard> {
    let filter = build_filter(level)?;
    let ansi = std::io::stderr().is_terminal();

    let (file_layer, guard) = match settings.file.as_deref() {
        Some(path) => {
            let (writer, guard) = open_log_file(Path::new(path), settings.rotation, settings.max_files)?;
            (Some(format_layer(writer, settings.json_format, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(std::io::stderr, settings.json_format, ansi))
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(level = %level, file = ?settings.file, json = settings.json_format, "Logging initialized");
    Ok(LogGuard { _file: guard })
}

/// Console-only logging at a fixed level, for commands that never connect
pub fn init_simple(level: Level) -> Result<()> {
    init_logging(&LoggingSettings::default(), level).map(|_| ())
}

/// `RUST_LOG` wins when set; otherwise this crate logs at `level` and
/// dependencies only at warn
fn build_filter(level: Level) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let directives = format!("warn,ws_session={}", level.to_string().to_lowercase());
    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn format_layer<S, W>(writer: W, json: bool, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_ansi(ansi).with_target(true);
    if json {
        Box::new(layer.json())
    } else {
        Box::new(layer.compact())
    }
}

fn open_log_file(path: &Path, rotation: LogRotation, max_files: u32) -> Result<(NonBlocking, WorkerGuard)> {
    let (directory, prefix, suffix) = log_target(path);
    fs::create_dir_all(&directory).map_err(|source| Error::IoWrite {
        path: directory.clone(),
        source,
    })?;

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation_of(rotation))
        .filename_prefix(prefix);
    if let Some(suffix) = suffix {
        builder = builder.filename_suffix(suffix);
    }
    if max_files > 0 {
        builder = builder.max_log_files(max_files as usize);
    }

    let appender = builder
        .build(&directory)
        .map_err(|e| Error::Config(format!("Cannot open log file {}: {}", path.display(), e)))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Split `dir/session.log` into the directory, `session` and `log`
///
/// Rolled files keep the extension last: `session.2024-05-01.log`.
fn log_target(path: &Path) -> (PathBuf, String, Option<String>) {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ws-session".to_string());
    let suffix = path.extension().map(|ext| ext.to_string_lossy().into_owned());
    (directory, prefix, suffix)
}

fn rotation_of(rotation: LogRotation) -> Rotation {
    match rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}
