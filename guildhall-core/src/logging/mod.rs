//! Logging subsystem for guildhall
//!
//! Thin setup layer over `tracing-subscriber`. Library code only emits
//! `tracing` events; binaries call [`init_logging_with_config`] once.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod error;
mod level;

pub use error::LoggingError;
pub use level::LogLevel;

/// Configuration for the logging subsystem
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// The minimum log level to display
    pub level: LogLevel,
    /// Whether to include timestamps
    pub with_timestamp: bool,
    /// Whether to include target module information
    pub with_target: bool,
    /// Whether to use JSON formatting
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            with_timestamp: true,
            with_target: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.with_timestamp = enabled;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn json_format(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    /// Build from the `[logging]` section of the application config
    pub fn from_section(section: &crate::config::LoggingConfig) -> Result<Self, LoggingError> {
        let level = LogLevel::from_str(&section.level).ok_or_else(|| {
            LoggingError::InvalidConfiguration(format!("unknown log level '{}'", section.level))
        })?;
        Ok(Self::new(level)
            .with_timestamp(section.with_timestamp)
            .with_target(section.with_target)
            .json_format(section.json_format))
    }
}

/// Initialize the logging subsystem with default configuration
pub fn init_logging() -> Result<(), LoggingError> {
    init_logging_with_config(LogConfig::default())
}

/// Initialize the logging subsystem with custom configuration
///
/// `RUST_LOG`, when set, takes precedence over `config.level`.
///
/// # Example
/// ```
/// use guildhall_core::logging::{init_logging_with_config, LogConfig, LogLevel};
///
/// let config = LogConfig::new(LogLevel::Debug)
///     .with_timestamp(false)
///     .with_target(false);
///
/// init_logging_with_config(config).expect("Failed to initialize logging");
/// ```
pub fn init_logging_with_config(config: LogConfig) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let init_failed = |e: tracing_subscriber::util::TryInitError| {
        LoggingError::InitializationFailed(e.to_string())
    };

    match (config.json_format, config.with_timestamp) {
        (true, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(config.with_target))
            .try_init()
            .map_err(init_failed),
        (true, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(config.with_target).without_time())
            .try_init()
            .map_err(init_failed),
        (false, true) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(config.with_target))
            .try_init()
            .map_err(init_failed),
        (false, false) => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(config.with_target).without_time())
            .try_init()
            .map_err(init_failed),
    }
}
