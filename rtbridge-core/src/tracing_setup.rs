//! Tracing setup for the bridge binaries.
//!
//! Console output follows the user's chosen level; the full trace of every
//! run, including per-datagram queue mechanics, goes to a log file that is
//! overwritten on each start.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the per-run trace log inside the logs directory.
pub const LOG_FILE_NAME: &str = "rtbridge-last-run.log";

/// Initialize tracing with console output at `console_level` plus a full
/// trace log under `logs_dir` (default `./logs`).
///
/// `RUST_LOG` overrides the console level when set. Returns the path of the
/// trace log.
///
/// # Errors
///
/// - `Box<dyn std::error::Error>` - Logs directory or file not writable, or a
///   global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let logs_path = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_path)?;

    let log_file_path = logs_path.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_names(false)
        .with_filter(console_filter);

    // Reactor and scheduler run on one thread; its name is enough to correlate
    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new("trace"));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!(
        "Tracing initialized: console={}, trace_file={}",
        console_level,
        log_file_path.display()
    );

    Ok(log_file_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only fatal link errors
    Error,
    /// Dropped and malformed datagrams
    Warn,
    /// Run lifecycle and accepted datagrams
    #[default]
    Info,
    /// Queue mechanics
    Debug,
    /// Everything, including per-receive details
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::str::FromStr for CliLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(CliLogLevel::Error),
            "warn" | "warning" => Ok(CliLogLevel::Warn),
            "info" => Ok(CliLogLevel::Info),
            "debug" => Ok(CliLogLevel::Debug),
            "trace" => Ok(CliLogLevel::Trace),
            _ => Err(format!("Invalid log level: {s}")),
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("WARNING".parse::<CliLogLevel>().unwrap(), CliLogLevel::Warn);
        assert_eq!("trace".parse::<CliLogLevel>().unwrap(), CliLogLevel::Trace);
        assert!("verbose".parse::<CliLogLevel>().is_err());
        assert_eq!(CliLogLevel::Debug.to_string(), "debug");
        assert_eq!(CliLogLevel::default().as_tracing_level(), Level::INFO);
    }

    #[test]
    fn test_init_writes_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("nested").join("logs");

        let path = init_tracing(Level::WARN, Some(&logs)).unwrap();

        assert_eq!(path, logs.join(LOG_FILE_NAME));
        assert!(path.exists());
        // A second global subscriber is refused instead of panicking
        assert!(init_tracing(Level::WARN, Some(&logs)).is_err());
    }
}
