//! Errors raised while loading configuration or decoding wire payloads

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Config file unreadable, unparsable or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Wire payload could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
