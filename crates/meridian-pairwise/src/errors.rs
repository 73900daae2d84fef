//! Error types for pairwise derivation

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PairwiseError {
    #[error("Derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Derivation cancelled: {0}")]
    Cancelled(String),

    #[error("Common error: {0}")]
    Common(#[from] meridian_common::CommonError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] meridian_crypto::CryptoError),
}

pub type Result<T> = std::result::Result<T, PairwiseError>;
