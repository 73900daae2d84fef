//! RSASSA-PKCS1-v1_5 signing and RSA-OAEP encryption providers

use num_bigint_dig::ModInverse;
use rand::rngs::OsRng;
use rsa::{
    BigUint, Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey,
    traits::{PrivateKeyParts, PublicKeyParts},
};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{
    Algorithm, CryptoError, CryptoKeyHandle, CryptoProvider, HashAlg, KeyAttributes, KeyClass,
    KeyMaterial, KeyUsage, RsaPrivateMaterial, b64url_decode, b64url_encode, error::Result,
};

const DEFAULT_MODULUS_BITS: usize = 2048;
const F4: u32 = 65537;

fn biguint(field: &str, value: &str) -> Result<BigUint> {
    Ok(BigUint::from_bytes_be(&b64url_decode(field, value)?))
}

fn b64(value: &BigUint) -> String {
    b64url_encode(&value.to_bytes_be())
}

fn private_key(key: &CryptoKeyHandle) -> Result<RsaPrivateKey> {
    match &key.material {
        KeyMaterial::RsaPrivate { key, .. } => RsaPrivateKey::from_components(
            biguint("n", &key.n)?,
            biguint("e", &key.e)?,
            biguint("d", &key.d)?,
            vec![biguint("p", &key.p)?, biguint("q", &key.q)?],
        )
        .map_err(|e| CryptoError::KeyError(format!("Invalid RSA private key: {e}"))),
        _ => Err(CryptoError::KeyError(
            "Expected an RSA private key".to_string(),
        )),
    }
}

fn public_key(key: &CryptoKeyHandle) -> Result<RsaPublicKey> {
    match &key.material {
        KeyMaterial::RsaPublic { key, .. } => {
            RsaPublicKey::new(biguint("n", &key.n)?, biguint("e", &key.e)?)
                .map_err(|e| CryptoError::KeyError(format!("Invalid RSA public key: {e}")))
        }
        _ => Err(CryptoError::KeyError(
            "Expected an RSA public key".to_string(),
        )),
    }
}

/// Private-key JWK material including the CRT fields. The `rsa` crate does
/// not expose its precomputed CRT values, so they are recomputed here.
pub(crate) fn private_material(
    alg_name: &str,
    key: &RsaPrivateKey,
    key_ops: Vec<KeyUsage>,
) -> Result<KeyMaterial> {
    let primes = key.primes();
    let [p, q] = primes else {
        return Err(CryptoError::KeyError(format!(
            "Expected a two-prime RSA key, got {} primes",
            primes.len()
        )));
    };
    let d = key.d();
    let dp = d % (p - 1u32);
    let dq = d % (q - 1u32);
    let qi = q
        .mod_inverse(p)
        .and_then(|v| v.to_biguint())
        .ok_or_else(|| CryptoError::KeyError("RSA primes are not coprime".to_string()))?;

    Ok(KeyMaterial::RsaPrivate {
        attrs: KeyAttributes {
            alg: Some(alg_name.to_string()),
            key_ops,
            ..Default::default()
        },
        key: RsaPrivateMaterial {
            n: b64(key.n()),
            e: b64(key.e()),
            d: b64(d),
            p: b64(p),
            q: b64(q),
            dp: b64(&dp),
            dq: b64(&dq),
            qi: b64(&qi),
        },
    })
}

fn generate_pair(
    provider: &dyn CryptoProvider,
    algorithm: &Algorithm,
    extractable: bool,
    usages: &[KeyUsage],
) -> Result<(CryptoKeyHandle, CryptoKeyHandle)> {
    let bits = algorithm.modulus_length.unwrap_or(DEFAULT_MODULUS_BITS);
    if let Some(e) = &algorithm.public_exponent {
        if BigUint::from_bytes_be(e) != BigUint::from(F4) {
            return Err(CryptoError::InvalidParameter(
                "Only public exponent 65537 is supported".to_string(),
            ));
        }
    }

    let key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|e| CryptoError::Backend(format!("RSA key generation failed: {e}")))?;

    let private_usages: Vec<KeyUsage> = usages
        .iter()
        .copied()
        .filter(|u| provider.private_key_usages().contains(u))
        .collect();
    let private = private_material(provider.name(), &key, private_usages.clone())?;
    let public = private
        .public_half()
        .ok_or_else(|| CryptoError::Backend("RSA key has no public half".to_string()))?;
    let public_usages = public.attributes().key_ops.clone();

    Ok((
        CryptoKeyHandle {
            class: KeyClass::Private,
            extractable,
            algorithm: algorithm.clone(),
            usages: private_usages,
            material: private,
        },
        CryptoKeyHandle {
            class: KeyClass::Public,
            extractable: true,
            algorithm: algorithm.clone(),
            usages: public_usages,
            material: public,
        },
    ))
}

/// Software provider for the JOSE `RS*` signature algorithms
pub struct RsaSsaProvider {
    name: &'static str,
    hash: HashAlg,
}

impl RsaSsaProvider {
    pub fn rs256() -> Self {
        RsaSsaProvider {
            name: "RS256",
            hash: HashAlg::Sha256,
        }
    }

    pub fn rs384() -> Self {
        RsaSsaProvider {
            name: "RS384",
            hash: HashAlg::Sha384,
        }
    }

    pub fn rs512() -> Self {
        RsaSsaProvider {
            name: "RS512",
            hash: HashAlg::Sha512,
        }
    }

    fn hashed(&self, data: &[u8]) -> (Vec<u8>, Pkcs1v15Sign) {
        match self.hash {
            HashAlg::Sha256 => (Sha256::digest(data).to_vec(), Pkcs1v15Sign::new::<Sha256>()),
            HashAlg::Sha384 => (Sha384::digest(data).to_vec(), Pkcs1v15Sign::new::<Sha384>()),
            _ => (Sha512::digest(data).to_vec(), Pkcs1v15Sign::new::<Sha512>()),
        }
    }
}

impl CryptoProvider for RsaSsaProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn private_key_usages(&self) -> &[KeyUsage] {
        &[KeyUsage::Sign]
    }

    fn public_key_usages(&self) -> &[KeyUsage] {
        &[KeyUsage::Verify]
    }

    fn on_generate_key_pair(
        &self,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<(CryptoKeyHandle, CryptoKeyHandle)> {
        generate_pair(self, algorithm, extractable, usages)
    }

    fn on_sign(&self, _algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        let private = private_key(key)?;
        let (hashed, padding) = self.hashed(data);
        private
            .sign(padding, &hashed)
            .map_err(|e| CryptoError::Backend(format!("RSA signing failed: {e}")))
    }

    fn on_verify(
        &self,
        _algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let public = public_key(key)?;
        let (hashed, padding) = self.hashed(data);
        Ok(public.verify(padding, &hashed, signature).is_ok())
    }
}

/// Software provider for `RSA-OAEP` (SHA-1) and `RSA-OAEP-256`
pub struct RsaOaepProvider {
    name: &'static str,
    hash: HashAlg,
}

impl RsaOaepProvider {
    pub fn oaep() -> Self {
        RsaOaepProvider {
            name: "RSA-OAEP",
            hash: HashAlg::Sha1,
        }
    }

    pub fn oaep_256() -> Self {
        RsaOaepProvider {
            name: "RSA-OAEP-256",
            hash: HashAlg::Sha256,
        }
    }

    fn padding(&self) -> Oaep {
        match self.hash {
            HashAlg::Sha1 => Oaep::new::<Sha1>(),
            _ => Oaep::new::<Sha256>(),
        }
    }
}

impl CryptoProvider for RsaOaepProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn private_key_usages(&self) -> &[KeyUsage] {
        &[KeyUsage::Decrypt, KeyUsage::UnwrapKey]
    }

    fn public_key_usages(&self) -> &[KeyUsage] {
        &[KeyUsage::Encrypt, KeyUsage::WrapKey]
    }

    fn on_generate_key_pair(
        &self,
        algorithm: &Algorithm,
        extractable: bool,
        usages: &[KeyUsage],
    ) -> Result<(CryptoKeyHandle, CryptoKeyHandle)> {
        generate_pair(self, algorithm, extractable, usages)
    }

    fn on_encrypt(&self, _algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        let public = public_key(key)?;
        public
            .encrypt(&mut OsRng, self.padding(), data)
            .map_err(|e| CryptoError::Backend(format!("RSA-OAEP encryption failed: {e}")))
    }

    fn on_decrypt(&self, _algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        let private = private_key(key)?;
        private
            .decrypt(self.padding(), data)
            .map_err(|e| CryptoError::Backend(format!("RSA-OAEP decryption failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Small modulus keeps key generation fast in tests.
    fn test_algorithm(name: &str) -> Algorithm {
        Algorithm::new(name).with_modulus_length(1024)
    }

    #[test]
    fn rs256_sign_verify_round_trip() {
        let provider = RsaSsaProvider::rs256();
        let alg = test_algorithm("RS256");
        let (private, public) = provider
            .generate_key_pair(&alg, true, &[KeyUsage::Sign, KeyUsage::Verify])
            .unwrap();

        let signature = provider.sign(&alg, &private, b"payload").unwrap();
        assert_eq!(signature.len(), 128);
        assert!(provider.verify(&alg, &public, b"payload", &signature).unwrap());

        let mut bad = signature.clone();
        bad[5] ^= 0x01;
        assert!(!provider.verify(&alg, &public, b"payload", &bad).unwrap());
    }

    #[test]
    fn generated_key_carries_crt_fields() {
        let provider = RsaSsaProvider::rs256();
        let (private, _) = provider
            .generate_key_pair(&test_algorithm("RS256"), true, &[KeyUsage::Sign])
            .unwrap();

        let KeyMaterial::RsaPrivate { key, .. } = &private.material else {
            panic!("expected RSA private material");
        };
        for field in [&key.dp, &key.dq, &key.qi] {
            assert!(!field.is_empty());
        }
        // Reconstructing the key from components must succeed.
        assert!(private_key(&private).is_ok());
    }

    #[test]
    fn oaep_round_trip() {
        let provider = RsaOaepProvider::oaep_256();
        let alg = test_algorithm("RSA-OAEP-256");
        let (private, public) = provider
            .generate_key_pair(&alg, true, &[KeyUsage::Encrypt, KeyUsage::Decrypt])
            .unwrap();

        let ciphertext = provider.encrypt(&alg, &public, b"shared secret").unwrap();
        assert_ne!(ciphertext, b"shared secret");
        let plaintext = provider.decrypt(&alg, &private, &ciphertext).unwrap();
        assert_eq!(plaintext, b"shared secret");
    }

    #[test]
    fn oaep_wrong_key_fails() {
        let provider = RsaOaepProvider::oaep();
        let alg = test_algorithm("RSA-OAEP");
        let (_, public) = provider
            .generate_key_pair(&alg, true, &[KeyUsage::Encrypt, KeyUsage::Decrypt])
            .unwrap();
        let (other_private, _) = provider
            .generate_key_pair(&alg, true, &[KeyUsage::Encrypt, KeyUsage::Decrypt])
            .unwrap();

        let ciphertext = provider.encrypt(&alg, &public, b"shared secret").unwrap();
        assert!(provider.decrypt(&alg, &other_private, &ciphertext).is_err());
    }

    #[test]
    fn non_standard_exponent_rejected() {
        let provider = RsaSsaProvider::rs256();
        let alg = Algorithm::new("RS256")
            .with_modulus_length(1024)
            .with_public_exponent(&[0x03]);
        let result = provider.generate_key_pair(&alg, true, &[KeyUsage::Sign]);
        assert!(matches!(result, Err(CryptoError::InvalidParameter(_))));
    }
}
