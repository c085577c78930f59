//! Configuration error types

use std::path::PathBuf;

/// Errors raised while loading or saving configuration
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// A configuration file could not be read or written
    #[error("configuration I/O error for {}: {source}", path.display())]
    Io {
        /// File the operation touched
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A configuration source could not be parsed
    #[error("configuration parse error: {message}")]
    Parse {
        /// What failed to parse and why
        message: String,
    },

    /// Configuration serialization failed
    #[error("configuration serialization error: {message}")]
    Serialization {
        /// Underlying cause
        message: String,
    },
}

impl From<config::ConfigError> for ConfigError {
    fn from(error: config::ConfigError) -> Self {
        Self::Parse {
            message: error.to_string(),
        }
    }
}

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
