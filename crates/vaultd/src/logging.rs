//! Logging setup.
//!
//! Builds a tracing subscriber from the daemon's log configuration: an
//! optional stdout layer and an optional file layer, each with its own
//! level and format. File writes go through a non-blocking appender whose
//! guard must be kept alive for the life of the process.

use std::path::Path;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config;

/// Errors produced while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The log file could not be opened.
    #[error("failed to open log file: {0}")]
    File(#[from] std::io::Error),

    /// An unknown log level was configured.
    #[error("unknown log level {0:?}")]
    Level(String),

    /// The global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Keeps the non-blocking file writer alive; drop it only at shutdown.
#[derive(Debug)]
pub struct LogGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

fn parse_level(level: &str) -> Result<LevelFilter, LogError> {
    match level {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "" | "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(LogError::Level(other.to_string())),
    }
}

/// Initializes the global subscriber from the log configuration. The log
/// file path defaults to `vaultd.log` in the data directory.
///
/// # Errors
///
/// Returns [`LogError`] if a level is invalid, the log file cannot be
/// opened, or a subscriber is already installed.
pub fn init(cfg: &config::Log, data_dir: &Path) -> Result<LogGuard, LogError> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if cfg.stdout.enabled {
        let level = parse_level(&cfg.stdout.level)?;
        let layer = match cfg.stdout.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_target(true)
                .with_filter(level)
                .boxed(),
            // stdout defaults to human
            _ => fmt::layer()
                .with_ansi(cfg.stdout.enable_ansi)
                .with_target(true)
                .with_filter(level)
                .boxed(),
        };
        layers.push(layer);
    }

    let mut file_guard = None;
    if cfg.file.enabled {
        let level = parse_level(&cfg.file.level)?;
        let path = if cfg.file.path.is_empty() {
            data_dir.join("vaultd.log")
        } else {
            cfg.file.path.clone().into()
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        file_guard = Some(guard);

        let layer = match cfg.file.format.as_str() {
            "human" => fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_filter(level)
                .boxed(),
            // the log file defaults to JSON
            _ => fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_filter(level)
                .boxed(),
        };
        layers.push(layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;
    Ok(LogGuard { _file: file_guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug").expect("level"), LevelFilter::DEBUG);
        assert_eq!(parse_level("").expect("level"), LevelFilter::INFO);
        assert!(matches!(parse_level("loud"), Err(LogError::Level(_))));
    }
}
