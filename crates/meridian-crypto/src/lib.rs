//! Cryptographic core for Meridian SDK
//!
//! This crate provides:
//! - Algorithm descriptors and JOSE (JWA) name translation
//! - JWK key material types per RFC 7517 (RSA, EC, symmetric)
//! - A capability-checked [`CryptoProvider`] contract with software backends
//! - A scope-aware [`ProviderFactory`] that routes operations to providers

mod algorithm;
mod error;
mod factory;
mod key_material;
mod provider;

pub mod jwa;
pub mod providers;

pub use algorithm::{Algorithm, HashAlg, KeyClass, KeyScope, KeyUsage};
pub use error::{CryptoError, Result};
pub use factory::{ProviderFactory, WILDCARD};
pub use key_material::{
    EcPrivateMaterial, EcPublicMaterial, Jwk, KeyAttributes, KeyMaterial, RsaPrivateMaterial,
    RsaPublicMaterial, SymmetricMaterial, b64url_decode, b64url_encode,
};
pub use provider::{CryptoKeyHandle, CryptoProvider, KeyData, KeyFormat};
