//! Logging setup for smoke-test runs.
//!
//! Three sinks, each with its own filter:
//! - stdout: INFO (DEBUG with `--verbose`), nothing at WARN or above; moved to
//!   stderr when stdout carries a machine-readable report
//! - stderr: WARN and ERROR
//! - per-test log file: everything at the configured file level (DEBUG by default)
//!
//! The entry point owns the returned [`LoggingGuards`]; dropping them flushes the
//! non-blocking writers.

use crate::config::LogSettings;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, filter_fn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid log filter '{0}'")]
    Filter(String),

    #[error("failed to install log subscriber: {0}")]
    Init(String),
}

/// Logging configuration for one smoke-test process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Emit DEBUG lines on stdout.
    pub verbose: bool,
    /// Write the INFO/DEBUG console lines to stderr instead of stdout.
    pub console_on_stderr: bool,
    /// Filter directive for the log file (`debug`, `info`, ...).
    pub file_level: String,
    /// Per-test log file. `None` disables file logging.
    pub log_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            console_on_stderr: false,
            file_level: "debug".to_string(),
            log_file: None,
        }
    }
}

impl LogConfig {
    /// Configuration for the smoke test of `component`, logging to
    /// `smoketest-<component>.log` under the configured directory.
    pub fn for_component(component: &str, settings: &LogSettings) -> Self {
        Self {
            verbose: false,
            console_on_stderr: false,
            file_level: settings.file_level.clone(),
            log_file: Some(default_log_path(component, settings.log_dir.as_deref())),
        }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_console_on_stderr(mut self, on_stderr: bool) -> Self {
        self.console_on_stderr = on_stderr;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }

    pub fn without_log_file(mut self) -> Self {
        self.log_file = None;
        self
    }
}

/// Keeps the non-blocking writers alive.
#[must_use = "dropping the guards stops log output"]
pub struct LoggingGuards {
    _guards: Vec<WorkerGuard>,
}

/// `smoketest-<component>.log`, inside `dir` when given.
pub fn default_log_path(component: &str, dir: Option<&Path>) -> PathBuf {
    let name = format!("smoketest-{}.log", component);
    match dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Whether an event at `level` goes to stdout.
pub fn routes_to_stdout(level: &Level, verbose: bool) -> bool {
    let max = if verbose { Level::DEBUG } else { Level::INFO };
    *level > Level::WARN && *level <= max
}

/// Whether an event at `level` goes to stderr.
pub fn routes_to_stderr(level: &Level) -> bool {
    *level <= Level::WARN
}

/// Install the global subscriber.
pub fn init_logging(config: &LogConfig) -> Result<LoggingGuards, LoggingError> {
    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console: Box<dyn Write + Send> = if config.console_on_stderr {
        Box::new(std::io::stderr())
    } else {
        Box::new(std::io::stdout())
    };
    let (console, guard) = tracing_appender::non_blocking(console);
    guards.push(guard);
    let verbose = config.verbose;
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(console)
            .with_target(false)
            .with_filter(filter_fn(move |meta| routes_to_stdout(meta.level(), verbose)))
            .boxed(),
    );

    let (stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(stderr)
            .with_target(false)
            .with_filter(filter_fn(|meta| routes_to_stderr(meta.level())))
            .boxed(),
    );

    if let Some(path) = &config.log_file {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| LoggingError::LogFile {
                path: path.clone(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| LoggingError::LogFile {
                path: path.clone(),
                source,
            })?;
        let filter = EnvFilter::try_new(&config.file_level)
            .map_err(|_| LoggingError::Filter(config.file_level.clone()))?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))?;

    Ok(LoggingGuards { _guards: guards })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_path() {
        assert_eq!(
            default_log_path("namenode", None),
            PathBuf::from("smoketest-namenode.log")
        );
        assert_eq!(
            default_log_path("datanode", Some(Path::new("/var/log/smokey"))),
            PathBuf::from("/var/log/smokey/smoketest-datanode.log")
        );
    }

    #[test]
    fn test_stdout_routing() {
        assert!(routes_to_stdout(&Level::INFO, false));
        assert!(!routes_to_stdout(&Level::DEBUG, false));
        assert!(routes_to_stdout(&Level::DEBUG, true));
        assert!(!routes_to_stdout(&Level::TRACE, true));
        assert!(!routes_to_stdout(&Level::WARN, false));
        assert!(!routes_to_stdout(&Level::ERROR, true));
    }

    #[test]
    fn test_stderr_routing() {
        assert!(routes_to_stderr(&Level::WARN));
        assert!(routes_to_stderr(&Level::ERROR));
        assert!(!routes_to_stderr(&Level::INFO));
    }

    #[test]
    fn test_for_component_uses_settings() {
        let settings = LogSettings {
            file_level: "info".to_string(),
            log_dir: Some(PathBuf::from("/tmp/logs")),
        };
        let config = LogConfig::for_component("zookeeper", &settings).with_verbose(true);
        assert!(config.verbose);
        assert_eq!(config.file_level, "info");
        assert_eq!(
            config.log_file,
            Some(PathBuf::from("/tmp/logs/smoketest-zookeeper.log"))
        );
        assert!(!config.console_on_stderr);
        assert!(config.clone().with_console_on_stderr(true).console_on_stderr);
        assert!(config.without_log_file().log_file.is_none());
    }

    #[test]
    fn test_unwritable_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let config = LogConfig::default().with_log_file(blocker.join("smoketest-zkfc.log"));
        let err = init_logging(&config).err().unwrap();
        assert!(matches!(err, LoggingError::LogFile { .. }));
    }

    #[test]
    fn test_invalid_file_level() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            file_level: "smokey=loud".to_string(),
            ..LogConfig::default()
        }
        .with_log_file(dir.path().join("smoketest-zkfc.log"));
        let err = init_logging(&config).err().unwrap();
        assert!(matches!(err, LoggingError::Filter(level) if level == "smokey=loud"));
    }
}
