//! Error types shared across the SDK crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] meridian_crypto::CryptoError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] meridian_keystore::KeyStoreError),

    #[error("Could not resolve key: {0}")]
    UnresolvedKey(String),

    #[error("DID resolution failed: {0}")]
    DidResolution(String),

    #[error("Timed out: {0}")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, CommonError>;
