//! Deterministic pairwise RSA keys
//!
//! Prime candidates are expanded from the (seed, did, peer) triple with a
//! chained keyed MAC, then advanced to the next probable prime. The search is
//! CPU bound and unbounded in principle, so callers pass a cancellation
//! token; run it on a blocking thread when inside an async runtime.

use num_bigint_dig::{BigUint, ModInverse, prime::probably_prime};
use num_traits::One;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use meridian_common::CryptoOperations;
use meridian_crypto::{
    KeyAttributes, KeyMaterial, KeyUsage, RsaPrivateMaterial, b64url_encode,
};
use meridian_keystore::KeyStore;

use crate::errors::{PairwiseError, Result};

/// Miller-Rabin rounds used during the search
const PRIMALITY_ROUNDS: usize = 64;

const PUBLIC_EXPONENT: u32 = 65537;

/// How many candidates each prime search walked before settling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimeSearchReport {
    pub p_iterations: u64,
    pub q_iterations: u64,
}

/// Derives the pairwise RSA private key for (`seed`, `did`, `peer_did`).
///
/// `modulus_bits` must be at least 512 and a multiple of 256. The same
/// inputs always produce the same key; the report exposes how far each prime
/// search walked, which is stable for fixed inputs.
pub fn derive_rsa_key<S: KeyStore>(
    ops: &CryptoOperations<S>,
    seed: &[u8],
    did: &str,
    peer_did: &str,
    modulus_bits: usize,
    cancel: &CancellationToken,
) -> Result<(KeyMaterial, PrimeSearchReport)> {
    if modulus_bits < 512 || modulus_bits % 256 != 0 {
        return Err(PairwiseError::DerivationFailed(format!(
            "Modulus must be at least 512 bits and a multiple of 256, got {modulus_bits}"
        )));
    }
    let prime_bits = modulus_bits / 2;
    let prime_bytes = prime_bits / 8;

    let master = ops.hmac_sign("HS512", seed, did.as_bytes())?;

    // q's base is keyed by p's base rather than the master MAC, so the two
    // searches are chained and a verifier can only reproduce q through p.
    let p_base = expand(ops, &master, peer_did.as_bytes(), prime_bytes)?;
    let q_base = expand(ops, &p_base, peer_did.as_bytes(), prime_bytes)?;

    let (p, p_iterations) = find_prime(&p_base, prime_bits, cancel)?;
    debug!("Pairwise p settled after {p_iterations} candidates");

    // q additionally has to differ from p and leave the public exponent
    // invertible mod phi, so its loop re-checks both before settling.
    let e = BigUint::from(PUBLIC_EXPONENT);
    let mut candidate = initial_candidate(&q_base, prime_bits);
    let mut q_iterations = 0u64;
    let (q, d) = loop {
        if cancel.is_cancelled() {
            return Err(PairwiseError::Cancelled(
                "Prime search for q was cancelled".to_string(),
            ));
        }
        q_iterations += 1;
        if probably_prime(&candidate, PRIMALITY_ROUNDS) && candidate != p {
            let phi = (&p - 1u32) * (&candidate - 1u32);
            if let Some(d) = (&e).mod_inverse(&phi).and_then(|i| i.to_biguint()) {
                break (candidate, d);
            }
        }
        candidate += 2u32;
    };
    debug!("Pairwise q settled after {q_iterations} candidates");

    let n = &p * &q;
    let dp = &d % (&p - 1u32);
    let dq = &d % (&q - 1u32);
    let qi = (&q)
        .mod_inverse(&p)
        .and_then(|i| i.to_biguint())
        .ok_or_else(|| {
            PairwiseError::DerivationFailed("Derived primes are not coprime".to_string())
        })?;

    let material = KeyMaterial::RsaPrivate {
        attrs: KeyAttributes {
            alg: Some("RS256".to_string()),
            key_ops: vec![KeyUsage::Sign],
            ..Default::default()
        },
        key: RsaPrivateMaterial {
            n: b64(&n),
            e: b64(&e),
            d: b64(&d),
            p: b64(&p),
            q: b64(&q),
            dp: b64(&dp),
            dq: b64(&dq),
            qi: b64(&qi),
        },
    };

    Ok((
        material,
        PrimeSearchReport {
            p_iterations,
            q_iterations,
        },
    ))
}

fn b64(value: &BigUint) -> String {
    b64url_encode(&value.to_bytes_be())
}

/// Deterministically stretches `label` to `len` bytes of MAC output
fn expand<S: KeyStore>(
    ops: &CryptoOperations<S>,
    key: &[u8],
    label: &[u8],
    len: usize,
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(len + 64);
    let mut block = ops.hmac_sign("HS512", key, label)?;
    loop {
        out.extend_from_slice(&block);
        if out.len() >= len {
            out.truncate(len);
            return Ok(out);
        }
        block = ops.hmac_sign("HS512", key, &block)?;
    }
}

/// Candidate seed: odd, with the top two bits set so the product of two
/// primes always reaches the full modulus width.
fn initial_candidate(base: &[u8], prime_bits: usize) -> BigUint {
    BigUint::from_bytes_be(base)
        | BigUint::one()
        | (BigUint::one() << (prime_bits - 1))
        | (BigUint::one() << (prime_bits - 2))
}

fn find_prime(
    base: &[u8],
    prime_bits: usize,
    cancel: &CancellationToken,
) -> Result<(BigUint, u64)> {
    let mut candidate = initial_candidate(base, prime_bits);
    let mut iterations = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Err(PairwiseError::Cancelled(
                "Prime search for p was cancelled".to_string(),
            ));
        }
        iterations += 1;
        if probably_prime(&candidate, PRIMALITY_ROUNDS) {
            return Ok((candidate, iterations));
        }
        candidate += 2u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use meridian_crypto::{ProviderFactory, b64url_decode};
    use meridian_keystore::InMemoryKeyStore;

    fn ops() -> CryptoOperations<InMemoryKeyStore> {
        CryptoOperations::new(
            Arc::new(ProviderFactory::with_software_providers()),
            InMemoryKeyStore::new(),
        )
    }

    const SEED: &[u8] = b"0123456789abcdef0123456789abcdef";
    // Small modulus keeps the prime search fast in tests.
    const TEST_BITS: usize = 512;

    #[test]
    fn derivation_is_deterministic() {
        let ops = ops();
        let token = CancellationToken::new();
        let (a, report_a) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", TEST_BITS, &token)
                .unwrap();
        let (b, report_b) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", TEST_BITS, &token)
                .unwrap();
        assert_eq!(a, b);
        assert_eq!(report_a, report_b);
        assert!(report_a.p_iterations >= 1);
        assert!(report_a.q_iterations >= 1);
    }

    #[test]
    fn distinct_peers_are_unlinkable() {
        let ops = ops();
        let token = CancellationToken::new();
        let (a, _) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer-a", TEST_BITS, &token)
                .unwrap();
        let (b, _) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer-b", TEST_BITS, &token)
                .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn derived_primes_are_probable_primes() {
        let ops = ops();
        let token = CancellationToken::new();
        let (key, _) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", TEST_BITS, &token)
                .unwrap();

        let KeyMaterial::RsaPrivate { key, .. } = &key else {
            panic!("expected RSA private material");
        };
        let p = BigUint::from_bytes_be(&b64url_decode("p", &key.p).unwrap());
        let q = BigUint::from_bytes_be(&b64url_decode("q", &key.q).unwrap());
        assert!(probably_prime(&p, PRIMALITY_ROUNDS));
        assert!(probably_prime(&q, PRIMALITY_ROUNDS));
        assert_ne!(p, q);

        let n = BigUint::from_bytes_be(&b64url_decode("n", &key.n).unwrap());
        assert_eq!(n, &p * &q);
        assert_eq!(n.bits(), TEST_BITS);
    }

    #[test]
    fn q_search_base_is_keyed_by_p_base() {
        let ops = ops();
        let token = CancellationToken::new();
        let (key, _) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", TEST_BITS, &token)
                .unwrap();
        let KeyMaterial::RsaPrivate { key, .. } = &key else {
            panic!("expected RSA private material");
        };
        let p = BigUint::from_bytes_be(&b64url_decode("p", &key.p).unwrap());
        let q = BigUint::from_bytes_be(&b64url_decode("q", &key.q).unwrap());

        let master = ops.hmac_sign("HS512", SEED, b"did:example:me").unwrap();
        let prime_bytes = TEST_BITS / 16;
        let p_base = expand(&ops, &master, b"did:example:peer", prime_bytes).unwrap();
        assert_eq!(find_prime(&p_base, TEST_BITS / 2, &token).unwrap().0, p);

        // q is only reachable through p's base; rekeying with the master MAC
        // lands back on p, never on q.
        let chained = expand(&ops, &p_base, b"did:example:peer", prime_bytes).unwrap();
        assert_eq!(find_prime(&chained, TEST_BITS / 2, &token).unwrap().0, q);
        let unchained = expand(&ops, &master, b"did:example:peer", prime_bytes).unwrap();
        assert_ne!(find_prime(&unchained, TEST_BITS / 2, &token).unwrap().0, q);
    }

    #[test]
    fn derived_key_signs_and_verifies() {
        let ops = ops();
        let token = CancellationToken::new();
        let (key, _) =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", TEST_BITS, &token)
                .unwrap();
        let public = key.public_half().unwrap();

        let signature = ops.sign_with_material(&key, None, b"payload").unwrap();
        assert!(
            ops.verify_with_key(&public, None, b"payload", &signature)
                .unwrap()
        );
    }

    #[test]
    fn cancelled_token_aborts_the_search() {
        let ops = ops();
        let token = CancellationToken::new();
        token.cancel();
        let result =
            derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", TEST_BITS, &token);
        assert!(matches!(result, Err(PairwiseError::Cancelled(_))));
    }

    #[test]
    fn undersized_modulus_rejected() {
        let ops = ops();
        let token = CancellationToken::new();
        let result = derive_rsa_key(&ops, SEED, "did:example:me", "did:example:peer", 256, &token);
        assert!(matches!(result, Err(PairwiseError::DerivationFailed(_))));
    }
}
