//! # Logging
//!
//! Subscriber setup for hosts of the bridge.
//!
//! The core crate only emits events; hosts pick how they are rendered by
//! initializing a subscriber here:
//! - Pretty (development) or JSON (production) output on stderr
//! - Optional copy to a daily-rolled file
//! - `RUST_LOG`-style filtering
//! - RFC 3339 timestamps
//!
//! Output goes to stderr so it never mixes with command output on stdout.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shmbridge_utils::init_logging;
//!
//! // Reads RUST_LOG, SHMBRIDGE_LOG_FORMAT and SHMBRIDGE_LOG_FILE
//! let _guard = init_logging().expect("logging");
//! tracing::info!("agent host up");
//! ```
//!
//! ## Environment
//!
//! `RUST_LOG` filters (e.g. `shmbridge_core=trace`) unless a level is forced.
//! Format and file come from the variables documented in [`crate::config`].

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Utc;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LOG_FILE_ENV, LOG_FORMAT_ENV};

/// Rendering of each event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Human-readable lines, colored on the console
    #[default]
    Pretty,
    /// One JSON object per line, with the span list
    Json,
}

impl FromStr for LogFormat
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        if s.eq_ignore_ascii_case("pretty") {
            Ok(LogFormat::Pretty)
        } else if s.eq_ignore_ascii_case("json") {
            Ok(LogFormat::Json)
        } else {
            Err(format!("expected `pretty` or `json`, got `{s}`"))
        }
    }
}

/// Verbosity threshold, mirroring [`tracing::Level`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel
{
    const ALL: [(LogLevel, Level); 5] = [
        (LogLevel::Error, Level::ERROR),
        (LogLevel::Warn, Level::WARN),
        (LogLevel::Info, Level::INFO),
        (LogLevel::Debug, Level::DEBUG),
        (LogLevel::Trace, Level::TRACE),
    ];
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = String;

    /// Accepts the `tracing` level names, in any case.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        LogLevel::ALL
            .iter()
            .find(|(_, tracing_level)| tracing_level.as_str().eq_ignore_ascii_case(s))
            .map(|(level, _)| *level)
            .ok_or_else(|| format!("expected one of error, warn, info, debug, trace; got `{s}`"))
    }
}

/// How to set up the global subscriber
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogConfig
{
    /// Fixed level; `None` defers to `RUST_LOG`, then `info`
    pub level: Option<LogLevel>,
    pub format: LogFormat,
    /// Also write to this file, rolled daily
    pub file: Option<PathBuf>,
}

impl LogConfig
{
    /// Format and file from `SHMBRIDGE_LOG_FORMAT` / `SHMBRIDGE_LOG_FILE`.
    ///
    /// ## Errors
    ///
    /// - `InvalidFormat`: `SHMBRIDGE_LOG_FORMAT` is set to an unknown format
    pub fn from_env() -> Result<Self, LoggingError>
    {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LogConfig::from_env`], reading variables through `lookup`.
    ///
    /// ## Errors
    ///
    /// - `InvalidFormat`: unknown format value
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LoggingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = match lookup(LOG_FORMAT_ENV) {
            Some(raw) => raw.parse().map_err(LoggingError::InvalidFormat)?,
            None => LogFormat::default(),
        };
        Ok(Self {
            level: None,
            format,
            file: lookup(LOG_FILE_ENV).filter(|path| !path.is_empty()).map(PathBuf::from),
        })
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self
    {
        self.level = Some(level);
        self
    }

    fn filter(&self) -> EnvFilter
    {
        match self.level {
            Some(level) => EnvFilter::new(Level::from(level).to_string()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string())),
        }
    }
}

/// Keeps the background file writer alive; drop it only at exit.
#[derive(Debug)]
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard
{
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber as configured by the environment.
///
/// ## Errors
///
/// - `InvalidFormat`: `SHMBRIDGE_LOG_FORMAT` holds an unknown format
/// - `FileError`: the log file directory cannot be created
/// - `InitializationFailed`: a subscriber is already installed
pub fn init_logging() -> Result<LoggingGuard, LoggingError>
{
    init_logging_with(&LogConfig::from_env()?)
}

/// Stderr only, at a fixed level.
///
/// ## Errors
///
/// `InitializationFailed` if a subscriber is already installed.
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<LoggingGuard, LoggingError>
{
    let config = LogConfig {
        level: Some(level),
        format,
        file: None,
    };
    init_logging_with(&config)
}

/// Install the global subscriber described by `config`.
///
/// ## Errors
///
/// Same as [`init_logging`], minus format parsing.
pub fn init_logging_with(config: &LogConfig) -> Result<LoggingGuard, LoggingError>
{
    let console = format_layer(config.format, io::stderr, true).with_filter(config.filter());

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (directory, file_name) = split_log_path(path)?;
            std::fs::create_dir_all(&directory)?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = format_layer(config.format, writer, false).with_filter(config.filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    Registry::default()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    tracing::debug!(
        format = ?config.format,
        file = ?config.file,
        started_at = %Utc::now().to_rfc3339(),
        "logging initialized"
    );
    Ok(LoggingGuard { _file: guard })
}

/// One fmt layer in the requested format, boxed so both formats share a type.
fn format_layer<S, W>(format: LogFormat, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span> + 'static,
    W: for<'writer> fmt::MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_writer(writer)
        .with_timer(ChronoUtc::rfc_3339())
        .with_thread_names(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Pretty => layer.with_ansi(ansi).boxed(),
        LogFormat::Json => layer.json().with_current_span(true).with_span_list(true).boxed(),
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf), LoggingError>
{
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.display().to_string()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((directory, PathBuf::from(file_name)))
}

/// Why the subscriber could not be installed
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    #[error("Bad SHMBRIDGE_LOG_FORMAT: {0}")]
    InvalidFormat(String),

    /// The log file path has no file name
    #[error("Log file path {0:?} does not name a file")]
    InvalidPath(String),

    /// Usually a subscriber was already installed
    #[error("Cannot install the tracing subscriber: {0}")]
    InitializationFailed(String),

    #[error("Cannot prepare the log file: {0}")]
    FileError(#[from] io::Error),
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_parse_format_and_level()
    {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("prod".parse::<LogFormat>().is_err());

        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("TRACE".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("verbose".parse::<LogLevel>().unwrap_err().contains("verbose"));
    }

    #[test]
    fn test_level_maps_onto_tracing()
    {
        for (level, expected) in LogLevel::ALL {
            assert_eq!(Level::from(level), expected);
        }
    }

    #[test]
    fn test_config_from_lookup()
    {
        let config = LogConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LogConfig::default());

        let config =
            LogConfig::from_lookup(lookup(&[(LOG_FORMAT_ENV, "json"), (LOG_FILE_ENV, "/var/log/bridge.log")])).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/var/log/bridge.log")));

        assert!(matches!(
            LogConfig::from_lookup(lookup(&[(LOG_FORMAT_ENV, "xml")])),
            Err(LoggingError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_split_log_path()
    {
        let (directory, file) = split_log_path(Path::new("logs/agent.log")).unwrap();
        assert_eq!(directory, PathBuf::from("logs"));
        assert_eq!(file, PathBuf::from("agent.log"));

        let (directory, _) = split_log_path(Path::new("agent.log")).unwrap();
        assert_eq!(directory, PathBuf::from("."));

        assert!(split_log_path(Path::new("/")).is_err());
    }
}
