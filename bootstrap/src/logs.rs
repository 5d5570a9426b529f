//! Logging configuration

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
    Layer,
    Registry,
};

use crate::errors::BootstrapError;

/// Log level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl serde::Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_filter_string())
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level
    pub log_level: LogLevel,

    /// Also write logs to stdout
    pub stdout: bool,

    /// Append-only log file. The file is never rotated here; the log
    /// shipping agent tails it.
    pub log_file: Option<PathBuf>,

    /// Enable JSON format
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stdout: true,
            log_file: None,
            json_format: false,
        }
    }
}

/// Initialize logging.
///
/// Returns the guard of the non-blocking file writer when a log file is
/// configured. It must be held until the process exits, otherwise buffered
/// lines are lost.
pub fn init_logging(options: LogOptions) -> Result<Option<WorkerGuard>, BootstrapError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_level.to_filter_string()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut guard = None;

    if let Some(path) = options.log_file.as_deref() {
        let (dir, file_name) = split_log_path(path)?;
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        guard = Some(file_guard);

        let layer = fmt::layer().with_writer(writer).with_ansi(false);
        if options.json_format {
            layers.push(layer.json().boxed());
        } else {
            layers.push(layer.boxed());
        }
    }

    if options.stdout {
        if options.json_format {
            layers.push(fmt::layer().json().boxed());
        } else {
            layers.push(fmt::layer().boxed());
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| BootstrapError::ConfigError(e.to_string()))?;

    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr), BootstrapError> {
    let file_name = path.file_name().ok_or_else(|| {
        BootstrapError::ConfigError(format!("Log path has no file name: {}", path.display()))
    })?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, file_name))
}
