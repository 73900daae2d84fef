//! Error types for key storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Invalid key id: {0}")]
    InvalidKeyId(String),

    #[error("Key store lock poisoned: {0}")]
    Poisoned(String),

    #[error("Crypto error: {0}")]
    Crypto(#[from] meridian_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, KeyStoreError>;
