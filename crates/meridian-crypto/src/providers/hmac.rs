//! HMAC (HS256/HS384/HS512) providers

use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use sha2::{Sha256, Sha384, Sha512};

use crate::{
    Algorithm, CryptoError, CryptoKeyHandle, CryptoProvider, HashAlg, KeyAttributes, KeyClass,
    KeyMaterial, KeyUsage, SymmetricMaterial, b64url_encode, error::Result,
};

use super::{import_symmetric_key, secret_bytes};
use crate::provider::KeyData;

/// Software HMAC provider for one JOSE `HS*` algorithm
pub struct HmacProvider {
    name: &'static str,
    hash: HashAlg,
}

impl HmacProvider {
    pub fn hs256() -> Self {
        HmacProvider {
            name: "HS256",
            hash: HashAlg::Sha256,
        }
    }

    pub fn hs384() -> Self {
        HmacProvider {
            name: "HS384",
            hash: HashAlg::Sha384,
        }
    }

    pub fn hs512() -> Self {
        HmacProvider {
            name: "HS512",
            hash: HashAlg::Sha512,
        }
    }

    fn mac_bytes(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let invalid =
            |e: hmac::digest::InvalidLength| CryptoError::KeyError(format!("Bad HMAC key: {e}"));
        let mac = match self.hash {
            HashAlg::Sha256 => Hmac::<Sha256>::new_from_slice(key)
                .map_err(invalid)?
                .chain_update(data)
                .finalize()
                .into_bytes()
                .to_vec(),
            HashAlg::Sha384 => Hmac::<Sha384>::new_from_slice(key)
                .map_err(invalid)?
                .chain_update(data)
                .finalize()
                .into_bytes()
                .to_vec(),
            _ => Hmac::<Sha512>::new_from_slice(key)
                .map_err(invalid)?
                .chain_update(data)
                .finalize()
                .into_bytes()
                .to_vec(),
        };
        Ok(mac)
    }

    fn key_length(&self) -> usize {
        match self.hash {
            HashAlg::Sha256 => 32,
            HashAlg::Sha384 => 48,
            _ => 64,
        }
    }
}

impl CryptoProvider for HmacProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn symmetric_key_usages(&self) -> &[KeyUsage] {
        &[KeyUsage::Sign, KeyUsage::Verify, KeyUsage::DeriveBits]
    }

    fn on_generate_key(
        &self,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<CryptoKeyHandle> {
        let mut bytes = vec![0u8; self.key_length()];
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
        import_symmetric_key(self.name, data, algorithm, extractable, usages)
    }

    fn on_sign(&self, _algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        self.mac_bytes(&secret_bytes(key)?, data)
    }

    /// Deterministic entropy expansion: block 1 is a MAC over a fixed
    /// one-byte label, each following block a MAC over its predecessor.
    fn on_derive_bits(
        &self,
        _algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        peer: Option<&KeyMaterial>,
        length_bits: usize,
    ) -> Result<Vec<u8>> {
        if peer.is_some() {
            return Err(CryptoError::InvalidParameter(
                "HMAC deriveBits takes no peer key".to_string(),
            ));
        }
        let secret = secret_bytes(key)?;
        let wanted = length_bits / 8;

        let mut out = Vec::with_capacity(wanted + self.key_length());
        let mut block = self.mac_bytes(&secret, &[0x01])?;
        loop {
            out.extend_from_slice(&block);
            if out.len() >= wanted {
                out.truncate(wanted);
                return Ok(out);
            }
            block = self.mac_bytes(&secret, &block)?;
        }
    }

    fn on_verify(
        &self,
        _algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        // Constant-time comparison happens inside the MAC crate.
        let invalid =
            |e: hmac::digest::InvalidLength| CryptoError::KeyError(format!("Bad HMAC key: {e}"));
        let key = secret_bytes(key)?;
        let ok = match self.hash {
            HashAlg::Sha256 => Hmac::<Sha256>::new_from_slice(&key)
                .map_err(invalid)?
                .chain_update(data)
                .verify_slice(signature)
                .is_ok(),
            HashAlg::Sha384 => Hmac::<Sha384>::new_from_slice(&key)
                .map_err(invalid)?
                .chain_update(data)
                .verify_slice(signature)
                .is_ok(),
            _ => Hmac::<Sha512>::new_from_slice(&key)
                .map_err(invalid)?
                .chain_update(data)
                .verify_slice(signature)
                .is_ok(),
        };
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(provider: &HmacProvider) -> CryptoKeyHandle {
        provider
            .generate_key(
                &Algorithm::new(provider.name()),
                true,
                &[KeyUsage::Sign, KeyUsage::Verify],
            )
            .unwrap()
    }

    #[test]
    fn sign_verify_round_trip() {
        let provider = HmacProvider::hs512();
        let key = handle(&provider);
        let alg = Algorithm::new("HS512");

        let mac = provider.sign(&alg, &key, b"message").unwrap();
        assert_eq!(mac.len(), 64);
        assert!(provider.verify(&alg, &key, b"message", &mac).unwrap());
        assert!(!provider.verify(&alg, &key, b"other", &mac).unwrap());
    }

    #[test]
    fn tampered_mac_fails() {
        let provider = HmacProvider::hs256();
        let key = handle(&provider);
        let alg = Algorithm::new("HS256");

        let mut mac = provider.sign(&alg, &key, b"message").unwrap();
        mac[0] ^= 0x01;
        assert!(!provider.verify(&alg, &key, b"message", &mac).unwrap());
    }

    #[test]
    fn deterministic_for_same_key() {
        let provider = HmacProvider::hs384();
        let key = handle(&provider);
        let alg = Algorithm::new("HS384");

        let a = provider.sign(&alg, &key, b"message").unwrap();
        let b = provider.sign(&alg, &key, b"message").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derive_bits_expands_deterministically() {
        let provider = HmacProvider::hs256();
        let alg = Algorithm::new("HS256");
        let key = provider
            .generate_key(&alg, true, &[KeyUsage::DeriveBits])
            .unwrap();

        let a = provider.derive_bits(&alg, &key, None, 640).unwrap();
        let b = provider.derive_bits(&alg, &key, None, 640).unwrap();
        assert_eq!(a.len(), 80);
        assert_eq!(a, b);
        // A shorter request is a prefix of a longer one.
        let short = provider.derive_bits(&alg, &key, None, 128).unwrap();
        assert_eq!(short, a[..16]);

        let other = provider
            .generate_key(&alg, true, &[KeyUsage::DeriveBits])
            .unwrap();
        assert_ne!(provider.derive_bits(&alg, &other, None, 640).unwrap(), a);
    }

    #[test]
    fn derive_bits_rejects_a_peer_key() {
        let provider = HmacProvider::hs256();
        let alg = Algorithm::new("HS256");
        let key = provider
            .generate_key(&alg, true, &[KeyUsage::DeriveBits])
            .unwrap();
        let result = provider.derive_bits(&alg, &key, Some(&key.material), 128);
        assert!(matches!(result, Err(CryptoError::InvalidParameter(_))));
    }

    #[test]
    fn raw_import_signs_like_the_original_secret() {
        use crate::provider::{KeyData, KeyFormat};

        let provider = HmacProvider::hs256();
        let alg = Algorithm::new("HS256");
        let key = provider
            .import_key(
                KeyFormat::Raw,
                &KeyData::Raw(b"shared secret".to_vec()),
                &alg,
                true,
                &[KeyUsage::Sign, KeyUsage::Verify],
            )
            .unwrap();

        let mac = provider.sign(&alg, &key, b"message").unwrap();
        assert!(provider.verify(&alg, &key, b"message", &mac).unwrap());
        // The same secret imported again produces the same MAC.
        let again = provider
            .import_key(
                KeyFormat::Raw,
                &KeyData::Raw(b"shared secret".to_vec()),
                &alg,
                true,
                &[KeyUsage::Sign],
            )
            .unwrap();
        assert_eq!(provider.sign(&alg, &again, b"message").unwrap(), mac);
    }

    #[test]
    fn rejects_non_symmetric_key() {
        let provider = HmacProvider::hs256();
        let raw = r#"{
            "kty": "EC",
            "crv": "secp256k1",
            "x": "S_caroUAnHCypb9QTfWkCpB2Yx792O3uw_6eDNbGQLo",
            "y": "k-FA2c2UBoH4D_PWZ7LPiRDr5WPbahMi8duNOU1Lcdc",
            "d": "mD9ssK9cdYw7hW9cT6rSSi67urjBz-7fce3Q6bAka-E"
        }"#;
        let material: KeyMaterial = serde_json::from_str(raw).unwrap();
        let key = CryptoKeyHandle::from_material(material, Algorithm::new("HS256"), true);
        assert!(provider.sign(&Algorithm::new("HS256"), &key, b"x").is_err());
    }
}
