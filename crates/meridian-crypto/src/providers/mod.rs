//! Software provider backends built on the RustCrypto crates
//!
//! Each provider executes exactly one algorithm name. Shared JWK decoding
//! helpers live here so the backends stay focused on the primitives.

mod aes;
mod hmac;
mod rsa;
mod secp256k1;
mod sha2;

pub use aes::AesGcmProvider;
pub use hmac::HmacProvider;
pub use rsa::{RsaOaepProvider, RsaSsaProvider};
pub use secp256k1::Secp256k1Provider;
pub use sha2::Sha2Provider;

use crate::{
    Algorithm, CryptoError, CryptoKeyHandle, KeyAttributes, KeyClass, KeyMaterial, KeyUsage,
    SymmetricMaterial, b64url_decode, b64url_encode, error::Result,
    provider::{KeyData, jwk_key_handle},
};

/// Raw secret bytes of a symmetric key handle
pub(crate) fn secret_bytes(key: &CryptoKeyHandle) -> Result<Vec<u8>> {
    match &key.material {
        KeyMaterial::Symmetric { key, .. } => b64url_decode("k", &key.k),
        _ => Err(CryptoError::KeyError(
            "Expected a symmetric key".to_string(),
        )),
    }
}

/// Decode a base64url field into exactly `len` bytes, left-padding with
/// zeroes. JWK encoders are allowed to strip leading zero octets.
pub(crate) fn fixed_bytes(field: &str, value: &str, len: usize) -> Result<Vec<u8>> {
    let raw = b64url_decode(field, value)?;
    if raw.len() > len {
        return Err(CryptoError::KeyError(format!(
            "Field '{field}' is {} bytes, expected at most {len}",
            raw.len()
        )));
    }
    let mut out = vec![0u8; len - raw.len()];
    out.extend_from_slice(&raw);
    Ok(out)
}

/// Import hook body shared by the symmetric providers: raw bytes become
/// symmetric material tagged with the provider's algorithm name, JWKs take
/// the common decoding path.
pub(crate) fn import_symmetric_key(
    alg_name: &str,
    data: &KeyData,
    algorithm: &Algorithm,
    extractable: bool,
    usages: &[KeyUsage],
) -> Result<CryptoKeyHandle> {
    match data {
        KeyData::Raw(bytes) => {
            let material = KeyMaterial::Symmetric {
                attrs: KeyAttributes {
                    alg: Some(alg_name.to_string()),
                    key_ops: usages.to_vec(),
                    ..Default::default()
                },
                key: SymmetricMaterial {
                    k: b64url_encode(bytes),
                },
            };
            Ok(CryptoKeyHandle {
                class: KeyClass::Secret,
                extractable,
                algorithm: algorithm.clone(),
                usages: usages.to_vec(),
                material,
            })
        }
        KeyData::Jwk(jwk) => jwk_key_handle(jwk, algorithm, extractable, usages),
    }
}
