//! Error types for JWS handling

use thiserror::Error;

#[derive(Error, Debug)]
pub enum JwsError {
    #[error("Unparseable token: {0}")]
    UnparseableToken(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Could not resolve key: {0}")]
    UnresolvedKey(String),

    #[error("Common error: {0}")]
    Common(#[from] meridian_common::CommonError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] meridian_crypto::CryptoError),

    #[error("Key store error: {0}")]
    KeyStore(#[from] meridian_keystore::KeyStoreError),
}

pub type Result<T> = std::result::Result<T, JwsError>;
