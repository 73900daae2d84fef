//! Deterministic pairwise secp256k1 keys
//!
//! The private scalar is derived with a two-level keyed MAC: the seed keys a
//! per-identity master MAC over the owner DID, and the master keys a MAC over
//! the peer DID. The same (seed, did, peer) triple always yields the same
//! key; distinct peers yield unlinkable keys.

use k256::ecdsa::SigningKey;
use num_bigint_dig::BigUint;
use num_traits::Zero;
use tracing::debug;

use meridian_common::CryptoOperations;
use meridian_crypto::{
    EcPrivateMaterial, KeyAttributes, KeyMaterial, KeyUsage, b64url_encode,
};
use meridian_keystore::KeyStore;

use crate::errors::{PairwiseError, Result};

/// secp256k1 group order
const ORDER_HEX: &[u8] = b"FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141";

fn curve_order() -> BigUint {
    // The constant is well-formed hex, parse cannot fail.
    BigUint::parse_bytes(ORDER_HEX, 16).unwrap_or_default()
}

/// Derives the pairwise secp256k1 private key for (`seed`, `did`, `peer_did`).
///
/// A MAC output that reduces to the zero scalar is retried with a round
/// counter appended to the peer data; after 255 retries the derivation fails.
pub fn derive_ec_key<S: KeyStore>(
    ops: &CryptoOperations<S>,
    seed: &[u8],
    did: &str,
    peer_did: &str,
) -> Result<KeyMaterial> {
    let order = curve_order();
    let master = ops.hmac_sign("HS512", seed, did.as_bytes())?;

    for round in 0u8..=255 {
        let mut data = peer_did.as_bytes().to_vec();
        if round > 0 {
            data.push(round);
        }
        let mac = ops.hmac_sign("HS512", &master, &data)?;
        let scalar = BigUint::from_bytes_be(&mac) % &order;
        if scalar.is_zero() {
            debug!("Derived scalar for {peer_did} was zero, retrying round {round}");
            continue;
        }
        return key_from_scalar(&scalar);
    }

    Err(PairwiseError::DerivationFailed(format!(
        "Could not derive a non-zero scalar for peer {peer_did}"
    )))
}

fn key_from_scalar(scalar: &BigUint) -> Result<KeyMaterial> {
    let raw = scalar.to_bytes_be();
    let mut d = vec![0u8; 32 - raw.len()];
    d.extend_from_slice(&raw);

    let secret = SigningKey::from_slice(&d)
        .map_err(|e| PairwiseError::DerivationFailed(format!("Invalid derived scalar: {e}")))?;
    let point = secret.verifying_key().to_encoded_point(false);
    let (Some(x), Some(y)) = (point.x(), point.y()) else {
        return Err(PairwiseError::DerivationFailed(
            "Derived point has no affine coordinates".to_string(),
        ));
    };

    Ok(KeyMaterial::EcPrivate {
        attrs: KeyAttributes {
            alg: Some("ES256K".to_string()),
            key_ops: vec![KeyUsage::Sign],
            ..Default::default()
        },
        key: EcPrivateMaterial {
            crv: "secp256k1".to_string(),
            x: b64url_encode(x),
            y: b64url_encode(y),
            d: b64url_encode(&d),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meridian_crypto::ProviderFactory;
    use meridian_keystore::InMemoryKeyStore;

    fn ops() -> CryptoOperations<InMemoryKeyStore> {
        CryptoOperations::new(
            Arc::new(ProviderFactory::with_software_providers()),
            InMemoryKeyStore::new(),
        )
    }

    const SEED: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn derivation_is_deterministic() {
        let ops = ops();
        let a = derive_ec_key(&ops, SEED, "did:example:me", "did:example:peer").unwrap();
        let b = derive_ec_key(&ops, SEED, "did:example:me", "did:example:peer").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_peers_are_unlinkable() {
        let ops = ops();
        let a = derive_ec_key(&ops, SEED, "did:example:me", "did:example:peer-a").unwrap();
        let b = derive_ec_key(&ops, SEED, "did:example:me", "did:example:peer-b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn distinct_seeds_are_unlinkable() {
        let ops = ops();
        let a = derive_ec_key(&ops, SEED, "did:example:me", "did:example:peer").unwrap();
        let b = derive_ec_key(
            &ops,
            b"ffffffffffffffffffffffffffffffff",
            "did:example:me",
            "did:example:peer",
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn derived_key_signs_and_verifies() {
        let ops = ops();
        let key = derive_ec_key(&ops, SEED, "did:example:me", "did:example:peer").unwrap();
        let public = key.public_half().unwrap();

        let signature = ops.sign_with_material(&key, None, b"payload").unwrap();
        assert!(
            ops.verify_with_key(&public, None, b"payload", &signature)
                .unwrap()
        );
    }
}
