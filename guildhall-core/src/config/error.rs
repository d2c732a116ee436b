//! Failures while loading, layering or checking guildhall settings

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read settings from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot write settings to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Cannot encode settings: {0}")]
    Encode(#[from] toml::ser::Error),

    /// A `GUILDHALL_*` variable that does not parse as its field's type
    #[error("{key}={value:?} rejected: {reason}")]
    Env {
        key: String,
        value: String,
        reason: String,
    },

    #[error("{0} must be a positive duration")]
    ZeroDuration(&'static str),

    #[error("{0} must be greater than 0")]
    ZeroCount(&'static str),

    #[error("{field} length bounds {min}..={max} are not usable")]
    LengthBounds {
        field: &'static str,
        min: usize,
        max: usize,
    },

    #[error("input_cancel_keyword must not be blank")]
    BlankCancelKeyword,

    #[error("The sqlite store backend needs store.sqlite_path")]
    MissingSqlitePath,

    #[error("Unknown log level '{0}'")]
    UnknownLogLevel(String),
}
