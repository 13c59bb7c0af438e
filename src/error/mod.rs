//! Error handling module for vidpress

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::errors::CompressionError;

/// Application-level errors: configuration, input discovery and I/O.
///
/// Per-file compression problems stay [`CompressionError`]s on the item; they
/// only become a `VidpressError` when they stop the whole command.
#[derive(Error, Debug)]
pub enum VidpressError {
    /// Config file exists but cannot be read
    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for our schema
    #[error("Invalid config file {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A configuration value is out of range or unknown
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Nothing to compress after expanding the inputs
    #[error("No video files found in: {inputs}")]
    NoInputs { inputs: String },

    /// Compression error that aborts the command
    #[error(transparent)]
    Compression(#[from] CompressionError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VidpressError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        VidpressError::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type alias for vidpress operations
pub type VidpressResult<T> = std::result::Result<T, VidpressError>;
