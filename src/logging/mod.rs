//! Logging configuration and initialization
//!
//! Centralized `tracing` setup for the server and CLI. Output is either
//! human-readable or JSON, with an optional JSON file sink next to the
//! console.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., "info", "debug,tensorserve=trace")
//! - `TENSORSERVE_LOG_LEVEL`: Simple log level (error, warn, info, debug, trace)
//! - `TENSORSERVE_LOG_FORMAT`: Output format ("human" or "json")
//! - `TENSORSERVE_LOG_FILE`: Optional file path for log output (always JSON)

use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

const LOG_LEVEL_ENV: &str = "TENSORSERVE_LOG_LEVEL";
const LOG_FORMAT_ENV: &str = "TENSORSERVE_LOG_FORMAT";
const LOG_FILE_ENV: &str = "TENSORSERVE_LOG_FILE";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("invalid log format: {0}")]
    InvalidLogFormat(String),

    #[error("failed to create log directory: {0}")]
    DirectoryCreationFailed(String),

    #[error("failed to open log file: {0}")]
    FileOpenFailed(String),

    /// Another global subscriber is already installed
    #[error("failed to install subscriber: {0}")]
    SubscriberInstallFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLogLevel(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// JSON structured output
    Json,
}

impl FromStr for LogFormat {
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" | "pretty" | "console" => Ok(LogFormat::Human),
            "json" | "structured" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidLogFormat(s.to_string())),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    /// Include file/line in console output
    pub with_file_info: bool,
    /// Emit an event when spans close (request and graph timings)
    pub with_span_events: bool,
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the `TENSORSERVE_LOG_*` variables.
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(level) = env_parse::<LogLevel>(LOG_LEVEL_ENV) {
            config.level = level;
        }
        if let Some(format) = env_parse::<LogFormat>(LOG_FORMAT_ENV) {
            config.format = format;
        }
        if let Ok(path) = std::env::var(LOG_FILE_ENV) {
            config.log_file = Some(PathBuf::from(path));
        }
        config
    }

    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_file_info(mut self, with_file_info: bool) -> Self {
        self.with_file_info = with_file_info;
        self
    }

    pub fn with_span_events(mut self, with_span_events: bool) -> Self {
        self.with_span_events = with_span_events;
        self
    }

    pub fn with_log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_file = Some(path.into());
        self
    }
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    std::env::var(var).ok().and_then(|s| s.parse().ok())
}

/// Initialize logging from the environment, ignoring failures.
///
/// Idempotent: only the first call installs a subscriber.
pub fn init_logging_default() {
    if let Err(e) = init_logging_from_env() {
        eprintln!("tensorserve: logging disabled: {}", e);
    }
}

/// Initialize logging from the `TENSORSERVE_LOG_*` variables.
pub fn init_logging_from_env() -> Result<(), LoggingError> {
    init_with_config(&LoggingConfig::from_env())
}

/// Initialize logging with a custom configuration.
///
/// Idempotent: once a subscriber has been installed by this module, later
/// calls return `Ok(())` without changing it.
pub fn init_with_config(config: &LoggingConfig) -> Result<(), LoggingError> {
    TRACING_INITIALIZED.get_or_try_init(|| install(config)).map(|_| ())
}

fn install(config: &LoggingConfig) -> Result<(), LoggingError> {
    let env_filter = build_env_filter(config.level)?;

    let mut layers: Vec<BoxedLayer> = vec![console_layer(config)];
    if let Some(path) = &config.log_file {
        layers.push(file_layer(config, path)?);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInstallFailed(e.to_string()))
}

fn console_layer(config: &LoggingConfig) -> BoxedLayer {
    match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(false)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
            .with_span_events(span_events(config.with_span_events))
            .boxed(),
        LogFormat::Human => fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(config.with_file_info)
            .with_line_number(config.with_file_info)
            .with_span_events(span_events(config.with_span_events))
            .boxed(),
    }
}

/// JSON file sink; parent directories are created as needed.
fn file_layer(config: &LoggingConfig, path: &Path) -> Result<BoxedLayer, LoggingError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| LoggingError::DirectoryCreationFailed(e.to_string()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| LoggingError::FileOpenFailed(format!("{}: {}", path.display(), e)))?;

    Ok(fmt::layer()
        .json()
        .with_writer(Mutex::new(file))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_span_events(span_events(config.with_span_events))
        .boxed())
}

fn span_events(enabled: bool) -> FmtSpan {
    if enabled {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

/// RUST_LOG wins over the configured level.
fn build_env_filter(default_level: LogLevel) -> Result<EnvFilter, LoggingError> {
    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        return EnvFilter::try_new(rust_log).map_err(|e| LoggingError::InvalidLogLevel(e.to_string()));
    }
    Ok(EnvFilter::new(default_level.as_filter_str()))
}

pub fn is_initialized() -> bool {
    TRACING_INITIALIZED.get().is_some()
}
