//! AES-GCM content encryption providers

use aes_gcm::{
    Aes128Gcm, Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};

use crate::{
    Algorithm, CryptoError, CryptoKeyHandle, CryptoProvider, KeyAttributes, KeyClass, KeyMaterial,
    KeyUsage, SymmetricMaterial, b64url_encode, error::Result,
};

use super::{import_symmetric_key, secret_bytes};
use crate::provider::KeyData;

const NONCE_LEN: usize = 12;

/// Software provider for the JOSE `A128GCM` / `A256GCM` algorithms.
///
/// Encryption emits `ciphertext || tag`; the caller supplies the 96-bit IV
/// through the algorithm descriptor.
pub struct AesGcmProvider {
    name: &'static str,
    key_len: usize,
}

impl AesGcmProvider {
    pub fn a128gcm() -> Self {
        AesGcmProvider {
            name: "A128GCM",
            key_len: 16,
        }
    }

    pub fn a256gcm() -> Self {
        AesGcmProvider {
            name: "A256GCM",
            key_len: 32,
        }
    }

    fn key_bytes(&self, key: &CryptoKeyHandle) -> Result<Vec<u8>> {
        let bytes = secret_bytes(key)?;
        if bytes.len() != self.key_len {
            return Err(CryptoError::KeyError(format!(
                "{} requires a {}-byte key, got {}",
                self.name,
                self.key_len,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    fn iv<'a>(&self, algorithm: &'a Algorithm) -> Result<&'a [u8]> {
        match &algorithm.iv {
            Some(iv) if iv.len() == NONCE_LEN => Ok(iv),
            Some(iv) => Err(CryptoError::InvalidParameter(format!(
                "AES-GCM IV must be {NONCE_LEN} bytes, got {}",
                iv.len()
            ))),
            None => Err(CryptoError::InvalidParameter(
                "AES-GCM requires an IV".to_string(),
            )),
        }
    }
}

impl CryptoProvider for AesGcmProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn symmetric_key_usages(&self) -> &[KeyUsage] {
        &[
            KeyUsage::Encrypt,
            KeyUsage::Decrypt,
            KeyUsage::WrapKey,
            KeyUsage::UnwrapKey,
        ]
    }

    fn on_generate_key(
        &self,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        let mut bytes = vec![0u8; self.key_len];
        OsRng.fill_bytes(&mut bytes);

        let material = KeyMaterial::Symmetric {
            attrs: KeyAttributes {
                alg: Some(self.name.to_string()),
                key_ops: usages.to_vec(),
                ..Default::default()
            },
            key: SymmetricMaterial {
                k: b64url_encode(&bytes),
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

    fn on_import_key(
        &self,
        data: &KeyData,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        if let KeyData::Raw(bytes) = data
            && bytes.len() != self.key_len
        {
            return Err(CryptoError::KeyError(format!(
                "{} requires a {}-byte key, got {}",
                self.name,
                self.key_len,
                bytes.len()
            )));
        }
        import_symmetric_key(self.name, data, algorithm, extractable, usages)
    }

    fn on_encrypt(&self, algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        let iv = self.iv(algorithm)?;
        let key = self.key_bytes(key)?;
        let failed = |_| CryptoError::Backend("AES-GCM encryption failed".to_string());

        if self.key_len == 16 {
            Aes128Gcm::new_from_slice(&key)
                .map_err(|e| CryptoError::KeyError(format!("Bad AES key: {e}")))?
                .encrypt(Nonce::from_slice(iv), data)
                .map_err(failed)
        } else {
            Aes256Gcm::new_from_slice(&key)
                .map_err(|e| CryptoError::KeyError(format!("Bad AES key: {e}")))?
                .encrypt(Nonce::from_slice(iv), data)
                .map_err(failed)
        }
    }

    fn on_decrypt(&self, algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        let iv = self.iv(algorithm)?;
        let key = self.key_bytes(key)?;
        // Tag mismatch and truncation both surface as an opaque AEAD error.
        let failed = |_| CryptoError::Backend("AES-GCM decryption failed".to_string());

        if self.key_len == 16 {
            Aes128Gcm::new_from_slice(&key)
                .map_err(|e| CryptoError::KeyError(format!("Bad AES key: {e}")))?
                .decrypt(Nonce::from_slice(iv), data)
                .map_err(failed)
        } else {
            Aes256Gcm::new_from_slice(&key)
                .map_err(|e| CryptoError::KeyError(format!("Bad AES key: {e}")))?
                .decrypt(Nonce::from_slice(iv), data)
                .map_err(failed)
        }
    }
}
