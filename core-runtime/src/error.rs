use thiserror::Error;

/// Errors raised while assembling the runtime (configuration, logging).
#[derive(Error, Debug)]
pub enum Error {
    /// A setting is missing or has an invalid value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A bridge has no implementation and no platform default exists.
    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
