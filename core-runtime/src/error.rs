use thiserror::Error;

/// Errors raised while setting up the runtime.
#[derive(Error, Debug)]
pub enum Error {
    /// A required value is missing or out of range.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The host did not provide a bridge and no platform default exists.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
