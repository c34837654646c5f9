//! Error type for configuration and startup code

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while loading configuration or setting up the process
#[derive(Error, Debug)]
pub enum Error {
    /// Config or log file could not be read or opened
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed TOML, or a value that fails validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tracing subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}
