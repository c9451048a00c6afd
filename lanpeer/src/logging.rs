//! Logging for the lanpeer binary
//!
//! Console output goes to stderr; stdout is reserved for command results.
//! A long-running `respond` logs to the console at the configured level,
//! while the one-shot `request` and `peers` commands keep the console at
//! WARN unless `-v` is given. An optional rolling file always records at the
//! configured (or `-v`) level.
//!
//! Work done on behalf of a node runs inside [`node_span`], so every event
//! from its loops and handler tasks carries the node id and role.

use std::fs;
use std::path::Path;

use tracing::{Level, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};
use crate::peer::Role;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Command the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Session {
    Respond,
    Request,
    Peers,
}

impl Session {
    /// Loudest console level used without `-v`
    fn console_ceiling(&self) -> Level {
        match self {
            Session::Respond => Level::TRACE,
            Session::Request | Session::Peers => Level::WARN,
        }
    }
}

/// Keeps the file writer alive; dropping it flushes pending lines
pub struct LogGuards {
    _file: Option<WorkerGuard>,
}

/// Console and file levels after applying CLI flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Levels {
    console: Level,
    file: Level,
}

impl Levels {
    fn resolve(settings: &LoggingSettings, session: Session, verbose: u8, quiet: bool) -> Self {
        let file = match verbose {
            0 => parse_level(&settings.level),
            1 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let console = if quiet {
            Level::ERROR
        } else if verbose > 0 {
            file
        } else {
            file.min(session.console_ceiling())
        };

        Self { console, file }
    }

    fn loudest(&self) -> Level {
        self.console.max(self.file)
    }
}

/// Install the global subscriber for `session`
pub fn init_logging(
    settings: &LoggingSettings,
    session: Session,
    verbose: u8,
    quiet: bool,
) -> Result<LogGuards> {
    let levels = Levels::resolve(settings, session, verbose, quiet);
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = crate_filter(levels.loudest(), rust_log.as_deref())?;

    let (file, guard) = match settings.file.as_deref() {
        Some(path) => {
            let (layer, guard) = file_layer(path, settings, levels.file)?;
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer(settings.json_format, levels.console))
        .with(file)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(
        session = ?session,
        console = %levels.console,
        file = ?settings.file,
        "Logging initialized"
    );

    Ok(LogGuards { _file: guard })
}

/// Console-only logging at `level`, for commands that never join the network
pub fn init_simple(level: Level) -> Result<()> {
    tracing_subscriber::registry()
        .with(crate_filter(level, None)?)
        .with(console_layer(false, level))
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// Span tagging everything a node does with its id and role
pub fn node_span(node_id: &str, role: Role) -> Span {
    tracing::info_span!("node", id = %node_id, role = role.as_str())
}

fn parse_level(level: &str) -> Level {
    level.parse().unwrap_or(Level::INFO)
}

/// RUST_LOG wins outright; otherwise dependencies stay at WARN and this
/// crate logs at `level`
fn crate_filter(level: Level, rust_log: Option<&str>) -> Result<EnvFilter> {
    let directives = match rust_log {
        Some(directives) if !directives.trim().is_empty() => directives.to_string(),
        _ => format!("warn,lanpeer={}", level.as_str().to_lowercase()),
    };
    EnvFilter::try_new(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn console_layer<S>(json: bool, level: Level) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let writer = std::io::stderr.with_max_level(level);
    if json {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_writer(writer).with_target(false).compact().boxed()
    }
}

fn file_layer<S>(
    path: &str,
    settings: &LoggingSettings,
    level: Level,
) -> Result<(BoxedLayer<S>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let path = Path::new(path);
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(directory).map_err(|e| {
        Error::Config(format!(
            "Failed to create log directory '{}': {}",
            directory.display(),
            e
        ))
    })?;

    let prefix = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("lanpeer");
    let appender = RollingFileAppender::builder()
        .rotation(rotation(settings.max_file_size_mb))
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(settings.max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| Error::Config(format!("Failed to open log file: {}", e)))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let writer = writer.with_max_level(level);

    let layer = if settings.json_format {
        fmt::layer()
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .with_thread_names(true)
            .boxed()
    };
    Ok((layer, guard))
}

/// The appender rotates on time only; a small size budget rotates hourly
fn rotation(max_file_size_mb: u64) -> Rotation {
    if (1..10).contains(&max_file_size_mb) {
        Rotation::HOURLY
    } else {
        Rotation::DAILY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(level: &str) -> LoggingSettings {
        LoggingSettings {
            level: level.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_respond_console_follows_config() {
        let levels = Levels::resolve(&settings("debug"), Session::Respond, 0, false);
        assert_eq!(levels.console, Level::DEBUG);
        assert_eq!(levels.file, Level::DEBUG);
    }

    #[test]
    fn test_one_shot_commands_keep_console_quiet() {
        for session in [Session::Request, Session::Peers] {
            let levels = Levels::resolve(&settings("info"), session, 0, false);
            assert_eq!(levels.console, Level::WARN, "{:?}", session);
            assert_eq!(levels.file, Level::INFO);
            assert_eq!(levels.loudest(), Level::INFO);
        }

        // A quieter configured level is not raised
        let levels = Levels::resolve(&settings("error"), Session::Request, 0, false);
        assert_eq!(levels.console, Level::ERROR);
    }

    #[test]
    fn test_verbose_and_quiet_flags() {
        let levels = Levels::resolve(&settings("info"), Session::Request, 1, false);
        assert_eq!(levels.console, Level::DEBUG);

        let levels = Levels::resolve(&settings("info"), Session::Respond, 2, false);
        assert_eq!(levels.console, Level::TRACE);

        let levels = Levels::resolve(&settings("debug"), Session::Respond, 0, true);
        assert_eq!(levels.console, Level::ERROR);
        assert_eq!(levels.file, Level::DEBUG);
    }

    #[test]
    fn test_unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("chatty"), Level::INFO);
        assert_eq!(parse_level("WARN"), Level::WARN);
    }

    #[test]
    fn test_crate_filter() {
        let filter = crate_filter(Level::DEBUG, None).unwrap();
        assert!(filter.to_string().contains("lanpeer=debug"));

        let filter = crate_filter(Level::DEBUG, Some("lanpeer::peer=trace")).unwrap();
        assert!(filter.to_string().contains("lanpeer::peer=trace"));

        assert!(crate_filter(Level::INFO, Some("lanpeer=loud")).is_err());
    }

    #[test]
    fn test_rotation_from_size_budget() {
        assert_eq!(rotation(5), Rotation::HOURLY);
        assert_eq!(rotation(0), Rotation::DAILY);
        assert_eq!(rotation(100), Rotation::DAILY);
    }

    #[test]
    fn test_file_layer_creates_directory() {
        let temp_dir = TempDir::new().unwrap();
        let log_path = temp_dir.path().join("logs").join("node.log");

        let result = file_layer::<tracing_subscriber::Registry>(
            log_path.to_str().unwrap(),
            &LoggingSettings::default(),
            Level::INFO,
        );

        assert!(result.is_ok());
        assert!(temp_dir.path().join("logs").is_dir());
    }
}
