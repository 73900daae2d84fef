//! Error types for cryptographic operations

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Usage violation: {0}")]
    UsageViolation(String),

    #[error("Key is not extractable: {0}")]
    NotExtractable(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Decoding error: {0}")]
    Decoding(String),

    #[error("Provider backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
