//! Runtime-level errors: configuration and host wiring.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required host bridge was not provided
    #[error("Missing bridge '{bridge}': {message}")]
    CapabilityMissing { bridge: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
