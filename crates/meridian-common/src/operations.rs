//! High-level crypto operations over a key store
//!
//! [`CryptoOperations`] ties a [`ProviderFactory`] to a [`KeyStore`]: callers
//! work with key references and JOSE algorithm names, never with raw key
//! handles. Private keys are created non-extractable and leave the store only
//! as opaque material passed straight to a provider.

use std::sync::Arc;

use tracing::debug;

use meridian_crypto::{
    Algorithm, CryptoKeyHandle, KeyAttributes, KeyMaterial, KeyScope, KeyUsage, ProviderFactory,
    SymmetricMaterial, b64url_encode, jwa,
};
use meridian_keystore::KeyStore;

use crate::errors::{CommonError, Result};

pub struct CryptoOperations<S: KeyStore> {
    factory: Arc<ProviderFactory>,
    key_store: S,
}

impl<S: KeyStore> CryptoOperations<S> {
    pub fn new(factory: Arc<ProviderFactory>, key_store: S) -> Self {
        CryptoOperations { factory, key_store }
    }

    pub fn factory(&self) -> &ProviderFactory {
        &self.factory
    }

    pub fn key_store(&self) -> &S {
        &self.key_store
    }

    /// Generates a key pair for a JOSE algorithm, stores the private key
    /// under `reference` and returns the public half. Both halves carry the
    /// assigned key id.
    pub async fn generate_key_pair(&self, alg: &str, reference: &str) -> Result<KeyMaterial> {
        let algorithm = jwa::from_jwa(alg)?;
        let (provider, usages): (_, &[KeyUsage]) = if algorithm.name().starts_with("RSA-OAEP") {
            (
                self.factory
                    .key_encrypter(algorithm.name(), KeyScope::Private)?,
                &[
                    KeyUsage::Decrypt,
                    KeyUsage::UnwrapKey,
                    KeyUsage::Encrypt,
                    KeyUsage::WrapKey,
                ],
            )
        } else {
            (
                self.factory
                    .message_signer(algorithm.name(), KeyScope::Private)?,
                &[KeyUsage::Sign, KeyUsage::Verify],
            )
        };

        let (private, public) = provider.generate_key_pair(&algorithm, false, usages)?;
        let kid = self
            .key_store
            .check_or_create_key_id(reference, None)
            .await?;
        debug!("Generated {} key pair {kid} under {reference}", alg);

        let mut private_material = private.material;
        private_material.set_kid(&kid);
        self.key_store.save(reference, private_material).await?;

        let mut public_material = public.material;
        public_material.set_kid(&kid);
        Ok(public_material)
    }

    /// Signs with the latest private key stored under `reference`
    pub async fn sign_with_key(&self, reference: &str, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.key_store.get_private_key(reference).await?;
        self.sign_with_material(&key, None, data)
    }

    /// Signs with explicit private key material. `alg` overrides the key's
    /// own `alg` attribute when given.
    pub fn sign_with_material(
        &self,
        key: &KeyMaterial,
        alg: Option<&str>,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let algorithm = match alg {
            Some(alg) => jwa::from_jwa(alg)?,
            None => self.key_algorithm(key)?,
        };
        let provider = self
            .factory
            .message_signer(algorithm.name(), KeyScope::Private)?;
        let handle = CryptoKeyHandle::from_material(key.clone(), algorithm.clone(), false);
        Ok(provider.sign(&algorithm, &handle, data)?)
    }

    /// Verifies a signature against public key material. `alg` overrides the
    /// key's own `alg` attribute when given.
    pub fn verify_with_key(
        &self,
        key: &KeyMaterial,
        alg: Option<&str>,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let algorithm = match alg {
            Some(alg) => jwa::from_jwa(alg)?,
            None => self.key_algorithm(key)?,
        };
        let provider = self
            .factory
            .message_signer(algorithm.name(), KeyScope::Public)?;
        let handle = CryptoKeyHandle::from_material(key.clone(), algorithm.clone(), false);
        Ok(provider.verify(&algorithm, &handle, data, signature)?)
    }

    /// One-shot digest, e.g. `digest("SHA-256", data)`
    pub fn digest(&self, name: &str, data: &[u8]) -> Result<Vec<u8>> {
        let provider = self.factory.message_digest(name, KeyScope::All)?;
        let algorithm = Algorithm::new(provider.name());
        Ok(provider.digest(&algorithm, data)?)
    }

    /// One-shot MAC over `data` keyed with `secret`, e.g. `hmac_sign("HS512", ...)`
    pub fn hmac_sign(&self, name: &str, secret: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let provider = self.factory.mac_signer(name, KeyScope::Secret)?;
        let algorithm = Algorithm::new(provider.name());
        let handle = mac_handle(secret, &algorithm);
        Ok(provider.sign(&algorithm, &handle, data)?)
    }

    /// Verifies a MAC produced by [`Self::hmac_sign`]
    pub fn hmac_verify(
        &self,
        name: &str,
        secret: &[u8],
        data: &[u8],
        mac: &[u8],
    ) -> Result<bool> {
        let provider = self.factory.mac_signer(name, KeyScope::Secret)?;
        let algorithm = Algorithm::new(provider.name());
        let handle = mac_handle(secret, &algorithm);
        Ok(provider.verify(&algorithm, &handle, data, mac)?)
    }

    fn key_algorithm(&self, key: &KeyMaterial) -> Result<Algorithm> {
        let alg = key.attributes().alg.as_deref().ok_or_else(|| {
            CommonError::UnresolvedKey(format!(
                "Key {} declares no algorithm",
                key.kid().unwrap_or("<unnamed>")
            ))
        })?;
        Ok(jwa::from_jwa(alg)?)
    }
}

fn mac_handle(secret: &[u8], algorithm: &Algorithm) -> CryptoKeyHandle {
    let material = KeyMaterial::Symmetric {
        attrs: KeyAttributes {
            key_ops: vec![KeyUsage::Sign, KeyUsage::Verify],
            ..Default::default()
        },
        key: SymmetricMaterial {
            k: b64url_encode(secret),
        },
    };
    CryptoKeyHandle::from_material(material, algorithm.clone(), false)
}
