//! ES256K signing, verification and ECDH on secp256k1

use k256::{
    EncodedPoint, FieldBytes, PublicKey,
    ecdh::diffie_hellman,
    ecdsa::{
        Signature, SigningKey, VerifyingKey,
        signature::{Signer, Verifier},
    },
    elliptic_curve::sec1::FromEncodedPoint,
};
use rand::rngs::OsRng;

use crate::{
    Algorithm, CryptoError, CryptoKeyHandle, CryptoProvider, EcPrivateMaterial, EcPublicMaterial,
    KeyAttributes, KeyClass, KeyMaterial, KeyUsage, b64url_encode, error::Result,
};

use super::fixed_bytes;

const CURVE: &str = "secp256k1";

/// Software provider for the JOSE `ES256K` algorithm.
///
/// Signing hashes the input with SHA-256 and produces a 64-byte `r || s`
/// signature. `deriveBits` performs ECDH against a peer public key and
/// returns a prefix of the shared x-coordinate.
pub struct Secp256k1Provider;

fn check_curve(crv: &str) -> Result<()> {
    if crv == CURVE {
        Ok(())
    } else {
        Err(CryptoError::KeyError(format!(
            "Expected a {CURVE} key, got curve {crv}"
        )))
    }
}

fn signing_key(key: &CryptoKeyHandle) -> Result<SigningKey> {
    match &key.material {
        KeyMaterial::EcPrivate { key, .. } => {
            check_curve(&key.crv)?;
            let d = fixed_bytes("d", &key.d, 32)?;
            SigningKey::from_slice(&d).map_err(|e| {
                CryptoError::KeyError(format!("Invalid {CURVE} private key: {e}"))
            })
        }
        _ => Err(CryptoError::KeyError(
            "Expected an EC private key".to_string(),
        )),
    }
}

fn public_point(crv: &str, x: &str, y: &str) -> Result<EncodedPoint> {
    check_curve(crv)?;
    let x = fixed_bytes("x", x, 32)?;
    let y = fixed_bytes("y", y, 32)?;
    Ok(EncodedPoint::from_affine_coordinates(
        FieldBytes::from_slice(&x),
        FieldBytes::from_slice(&y),
        false,
    ))
}

fn verifying_key(key: &CryptoKeyHandle) -> Result<VerifyingKey> {
    match &key.material {
        KeyMaterial::EcPublic { key, .. } => {
            let point = public_point(&key.crv, &key.x, &key.y)?;
            VerifyingKey::from_encoded_point(&point).map_err(|e| {
                CryptoError::KeyError(format!("Invalid {CURVE} public key: {e}"))
            })
        }
        _ => Err(CryptoError::KeyError(
            "Expected an EC public key".to_string(),
        )),
    }
}

impl CryptoProvider for Secp256k1Provider {
    fn name(&self) -> &str {
        "ES256K"
    }

    fn private_key_usages(&self) -> &[KeyUsage] {
        &[KeyUsage::Sign, KeyUsage::DeriveBits]
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
        let secret = SigningKey::random(&mut OsRng);
        let point = secret.verifying_key().to_encoded_point(false);
        let (x, y) = match (point.x(), point.y()) {
            (Some(x), Some(y)) => (b64url_encode(x), b64url_encode(y)),
            _ => {
                return Err(CryptoError::Backend(
                    "Generated point has no affine coordinates".to_string(),
                ));
            }
        };

        let private_usages: Vec<KeyUsage> = usages
            .iter()
            .copied()
            .filter(|u| self.private_key_usages().contains(u))
            .collect();
        let public_usages: Vec<KeyUsage> = usages
            .iter()
            .copied()
            .filter(|u| self.public_key_usages().contains(u))
            .collect();

        let private = KeyMaterial::EcPrivate {
            attrs: KeyAttributes {
                alg: Some("ES256K".to_string()),
                key_ops: private_usages.clone(),
                ..Default::default()
            },
            key: EcPrivateMaterial {
                crv: CURVE.to_string(),
                x: x.clone(),
                y: y.clone(),
                d: b64url_encode(&secret.to_bytes()),
            },
        };
        let public = KeyMaterial::EcPublic {
            attrs: KeyAttributes {
                alg: Some("ES256K".to_string()),
                key_ops: public_usages.clone(),
                ..Default::default()
            },
            key: EcPublicMaterial {
                crv: CURVE.to_string(),
                x,
                y,
            },
        };

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
                // Public halves are always exportable.
                extractable: true,
                algorithm: algorithm.clone(),
                usages: public_usages,
                material: public,
            },
        ))
    }

    fn on_sign(&self, _algorithm: &Algorithm, key: &CryptoKeyHandle, data: &[u8]) -> Result<Vec<u8>> {
        let secret = signing_key(key)?;
        let signature: Signature = secret.sign(data);
        Ok(signature.to_bytes().to_vec())
    }

    fn on_verify(
        &self,
        _algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        data: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        let public = verifying_key(key)?;
        // A malformed signature is a verification failure, not an error.
        let Ok(signature) = Signature::from_slice(signature) else {
            return Ok(false);
        };
        Ok(public.verify(data, &signature).is_ok())
    }

    fn on_derive_bits(
        &self,
        _algorithm: &Algorithm,
        key: &CryptoKeyHandle,
        peer: Option<&KeyMaterial>,
        length_bits: usize,
    ) -> Result<Vec<u8>> {
        let secret = signing_key(key)?;
        let peer = match peer {
            Some(KeyMaterial::EcPublic { key, .. }) => {
                let point = public_point(&key.crv, &key.x, &key.y)?;
                Option::<PublicKey>::from(PublicKey::from_encoded_point(&point)).ok_or_else(
                    || CryptoError::KeyError("Peer point is not on the curve".to_string()),
                )?
            }
            _ => {
                return Err(CryptoError::InvalidParameter(
                    "ECDH requires a peer EC public key".to_string(),
                ));
            }
        };

        let shared = diffie_hellman(secret.as_nonzero_scalar(), peer.as_affine());
        let bytes = shared.raw_secret_bytes();
        let wanted = length_bits / 8;
        if wanted > bytes.len() {
            return Err(CryptoError::InvalidParameter(format!(
                "Cannot derive {length_bits} bits from a {}-bit shared secret",
                bytes.len() * 8
            )));
        }
        Ok(bytes[..wanted].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_USAGES: &[KeyUsage] = &[KeyUsage::Sign, KeyUsage::Verify, KeyUsage::DeriveBits];

    fn key_pair() -> (CryptoKeyHandle, CryptoKeyHandle) {
        Secp256k1Provider
            .generate_key_pair(&Algorithm::new("ES256K"), true, ALL_USAGES)
            .unwrap()
    }

    #[test]
    fn sign_verify_round_trip() {
        let alg = Algorithm::new("ES256K");
        let (private, public) = key_pair();

        let signature = Secp256k1Provider.sign(&alg, &private, b"payload").unwrap();
        assert_eq!(signature.len(), 64);
        assert!(
            Secp256k1Provider
                .verify(&alg, &public, b"payload", &signature)
                .unwrap()
        );
    }

    #[test]
    fn bit_flip_fails_verification() {
        let alg = Algorithm::new("ES256K");
        let (private, public) = key_pair();

        let mut signature = Secp256k1Provider.sign(&alg, &private, b"payload").unwrap();
        signature[10] ^= 0x01;
        assert!(
            !Secp256k1Provider
                .verify(&alg, &public, b"payload", &signature)
                .unwrap()
        );
    }

    #[test]
    fn unrelated_key_fails_verification() {
        let alg = Algorithm::new("ES256K");
        let (private, _) = key_pair();
        let (_, other_public) = key_pair();

        let signature = Secp256k1Provider.sign(&alg, &private, b"payload").unwrap();
        assert!(
            !Secp256k1Provider
                .verify(&alg, &other_public, b"payload", &signature)
                .unwrap()
        );
    }

    #[test]
    fn ecdh_agrees_for_both_parties() {
        let alg = Algorithm::new("ES256K");
        let (a_private, a_public) = key_pair();
        let (b_private, b_public) = key_pair();

        let ab = Secp256k1Provider
            .derive_bits(&alg, &a_private, Some(&b_public.material), 256)
            .unwrap();
        let ba = Secp256k1Provider
            .derive_bits(&alg, &b_private, Some(&a_public.material), 256)
            .unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.len(), 32);
    }

    #[test]
    fn ecdh_without_peer_is_an_error() {
        let alg = Algorithm::new("ES256K");
        let (private, _) = key_pair();
        let result = Secp256k1Provider.derive_bits(&alg, &private, None, 256);
        assert!(matches!(result, Err(CryptoError::InvalidParameter(_))));
    }

    #[test]
    fn garbage_signature_is_false_not_error() {
        let alg = Algorithm::new("ES256K");
        let (_, public) = key_pair();
        let ok = Secp256k1Provider
            .verify(&alg, &public, b"payload", &[0u8; 64])
            .unwrap();
        assert!(!ok);
    }
}
