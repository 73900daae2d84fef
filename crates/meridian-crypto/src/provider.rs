//! Capability-checked crypto provider contract
//!
//! A [`CryptoProvider`] executes one family of primitives for exactly one
//! algorithm name. Every public entry point runs the validation pipeline
//! (name → parameters → usage → extractable/format) before the backend hook
//! is reached; a failed check returns immediately and the hook is never
//! called. The check ordering is load-bearing: later checks assume earlier
//! ones passed.

use crate::{Algorithm, CryptoError, Jwk, KeyClass, KeyMaterial, KeyUsage, error::Result};

/// Key import wire formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Raw,
    Jwk,
}

/// Key data supplied to an import call
#[derive(Debug, Clone)]
pub enum KeyData {
    Raw(Vec<u8>),
    Jwk(Jwk),
}

impl KeyData {
    fn format(&self) -> KeyFormat {
        match self {
            KeyData::Raw(_) => KeyFormat::Raw,
            KeyData::Jwk(_) => KeyFormat::Jwk,
        }
    }
}

/// An opaque, provider-produced key handle scoped to one operation call
#[derive(Debug, Clone)]
pub struct CryptoKeyHandle {
    pub class: KeyClass,
    pub extractable: bool,
    pub algorithm: Algorithm,
    pub usages: Vec<KeyUsage>,
    pub material: KeyMaterial,
}

impl CryptoKeyHandle {
    /// Wraps stored key material for one operation call. The handle's usage
    /// set is the material's declared `key_ops`.
    pub fn from_material(material: KeyMaterial, algorithm: Algorithm, extractable: bool) -> Self {
        CryptoKeyHandle {
            class: material.key_class(),
            extractable,
            algorithm,
            usages: material.attributes().key_ops.clone(),
            material,
        }
    }

    /// True if this handle's usage set permits `usage`.
    /// An empty set declares no restriction.
    pub fn allows(&self, usage: KeyUsage) -> bool {
        self.usages.is_empty() || self.usages.contains(&usage)
    }
}

/// One family of cryptographic primitives bound to a single algorithm name.
///
/// Implementors provide the `on_*` backend hooks and the declared usage sets;
/// the public methods (provided below) are the only supported entry points.
pub trait CryptoProvider: Send + Sync {
    /// The single algorithm name this provider executes (e.g. `"ES256K"`)
    fn name(&self) -> &str;

    fn private_key_usages(&self) -> &[KeyUsage] {
        &[]
    }

    fn public_key_usages(&self) -> &[KeyUsage] {
        &[]
    }

    fn symmetric_key_usages(&self) -> &[KeyUsage] {
        &[]
    }

    // ---- Backend hooks. Implementations may assume validation passed. ----

    fn on_digest(&self, _algorithm: &Algorithm, _data: &[u8]) -> Result<Vec<u8>> {
        Err(self.unsupported("digest"))
    }

    fn on_generate_key(
        &self,
        _algorithm: &Algorithm,
        _extractable: bool,
        _usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        Err(self.unsupported("generateKey"))
    }

    fn on_generate_key_pair(
        &self,
        _algorithm: &Algorithm,
        _extractable: bool,
        _usages: &[KeyUsage],
    ) -> Result<(CryptoKeyHandle, CryptoKeyHandle)> {
        Err(self.unsupported("generateKeyPair"))
    }

    fn on_sign(&self, _algorithm: &Algorithm, _key: &CryptoKeyHandle, _data: &[u8]) -> Result<Vec<u8>> {
        Err(self.unsupported("sign"))
    }

    fn on_verify(
        &self,
        _algorithm: &Algorithm,
        _key: &CryptoKeyHandle,
        _data: &[u8],
        _signature: &[u8],
    ) -> Result<bool> {
        Err(self.unsupported("verify"))
    }

    fn on_encrypt(&self, _algorithm: &Algorithm, _key: &CryptoKeyHandle, _data: &[u8]) -> Result<Vec<u8>> {
        Err(self.unsupported("encrypt"))
    }

    fn on_decrypt(&self, _algorithm: &Algorithm, _key: &CryptoKeyHandle, _data: &[u8]) -> Result<Vec<u8>> {
        Err(self.unsupported("decrypt"))
    }

    fn on_derive_bits(
        &self,
        _algorithm: &Algorithm,
        _key: &CryptoKeyHandle,
        _peer: Option<&KeyMaterial>,
        _length_bits: usize,
    ) -> Result<Vec<u8>> {
        Err(self.unsupported("deriveBits"))
    }

    fn on_import_key(
        &self,
        data: &KeyData,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        match data {
            KeyData::Jwk(jwk) => jwk_key_handle(jwk, algorithm, extractable, usages),
            KeyData::Raw(_) => Err(self.unsupported("importKey(raw)")),
        }
    }

    fn on_export_key(&self, key: &CryptoKeyHandle) -> Result<KeyMaterial> {
        Ok(key.material.clone())
    }

    // ---- Public entry points. Do not override; these run the pipeline. ----

    fn digest(&self, algorithm: &Algorithm, data: &[u8]) -> Result<Vec<u8>> {
        self.check_name(algorithm)?;
        self.on_digest(algorithm, data)
    }

    fn generate_key(
        &self,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        self.check_name(algorithm)?;
        self.check_requested_usages(usages, self.symmetric_key_usages())?;
        self.on_generate_key(algorithm, extractable, usages)
    }

    fn generate_key_pair(
        &self,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<(CryptoKeyHandle, CryptoKeyHandle)> {
        self.check_name(algorithm)?;
        let mut allowed = self.private_key_usages().to_vec();
        allowed.extend_from_slice(self.public_key_usages());
        self.check_requested_usages(usages, &allowed)?;
        self.on_generate_key_pair(algorithm, extractable, usages)
    }

    fn sign(&self, algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        self.check_name(algorithm)?;
        self.check_key_usage(key, KeyUsage::Sign)?;
        self.on_sign(algorithm, key, data)
    }

    fn verify(
        &self,
        algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        self.check_name(algorithm)?;
        self.check_key_usage(key, KeyUsage::Verify)?;
        self.on_verify(algorithm, key, data, signature)
    }

    fn encrypt(&self, algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        self.check_name(algorithm)?;
        self.check_key_usage(key, KeyUsage::Encrypt)?;
        self.on_encrypt(algorithm, key, data)
    }

    fn decrypt(&self, algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        self.check_name(algorithm)?;
        self.check_key_usage(key, KeyUsage::Decrypt)?;
        self.on_decrypt(algorithm, key, data)
    }

    fn derive_bits(
        &self,
        algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        peer: Option<&KeyMaterial>,
        length_bits: usize,
    ) -> Result<Vec<u8>> {
        self.check_name(algorithm)?;
        if length_bits == 0 || length_bits % 8 != 0 {
            return Err(CryptoError::InvalidParameter(format!(
                "deriveBits length must be a non-zero multiple of 8, got {length_bits}"
            )));
        }
        self.check_key_usage(key, KeyUsage::DeriveBits)?;
        self.on_derive_bits(algorithm, key, peer, length_bits)
    }

    fn import_key(
        &self,
        format: KeyFormat,
        data: &KeyData,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        self.check_name(algorithm)?;
        if format != data.format() {
            return Err(CryptoError::InvalidParameter(
                "Import format does not match the supplied key data".to_string(),
            ));
        }
        let mut allowed = self.private_key_usages().to_vec();
        allowed.extend_from_slice(self.public_key_usages());
        allowed.extend_from_slice(self.symmetric_key_usages());
        self.check_requested_usages(usages, &allowed)?;
        self.on_import_key(data, algorithm, extractable, usages)
    }

    fn export_key(&self, key: &CryptoKeyHandle) -> Result<KeyMaterial> {
        if !key.extractable {
            return Err(CryptoError::NotExtractable(format!(
                "Key for algorithm {} cannot be exported",
                key.algorithm.name()
            )));
        }
        self.on_export_key(key)
    }

    fn export_key_jwk(&self, key: &CryptoKeyHandle) -> Result<Jwk> {
        Ok(Jwk::from(self.export_key(key)?))
    }

    // ---- Validation pipeline helpers ----

    fn check_name(&self, algorithm: &Algorithm) -> Result<()> {
        if algorithm.matches_name(self.name()) {
            Ok(())
        } else {
            Err(CryptoError::UnknownAlgorithm(format!(
                "Provider {} cannot execute algorithm {}",
                self.name(),
                algorithm.name()
            )))
        }
    }

    fn check_requested_usages(&self, requested: &[KeyUsage], allowed: &[KeyUsage]) -> Result<()> {
        if requested.is_empty() {
            return Err(CryptoError::UsageViolation(
                "Requested usage set must not be empty".to_string(),
            ));
        }
        for usage in requested {
            if !allowed.contains(usage) {
                return Err(CryptoError::UsageViolation(format!(
                    "Usage {usage:?} is not allowed by provider {}",
                    self.name()
                )));
            }
        }
        Ok(())
    }

    fn check_key_usage(&self, key: &CryptoKeyHandle, usage: KeyUsage) -> Result<()> {
        if key.allows(usage) {
            Ok(())
        } else {
            Err(CryptoError::UsageViolation(format!(
                "Key does not permit usage {usage:?}"
            )))
        }
    }
}

/// Decodes a JWK into a key handle carrying the requested usages
pub(crate) fn jwk_key_handle(
    jwk: &Jwk,
    algorithm: &Algorithm,
    extractable: bool,
    usages: &[KeyUsage],
) -> Result<CryptoKeyHandle> {
    let material = KeyMaterial::try_from(jwk.clone())?;
    let mut handle = CryptoKeyHandle::from_material(material, algorithm.clone(), extractable);
    handle.usages = usages.to_vec();
    Ok(handle)
}

trait UnsupportedOp {
    fn unsupported(&self, op: &str) -> CryptoError;
}

impl<T: CryptoProvider + ?Sized> UnsupportedOp for T {
    fn unsupported(&self, op: &str) -> CryptoError {
        CryptoError::Backend(format!("Provider {} does not implement {op}", self.name()))
    }
}
