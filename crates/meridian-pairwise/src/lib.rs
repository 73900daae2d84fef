/*!
 * Deterministic pairwise keys for Meridian SDK.
 *
 * A pairwise key is derived from a master seed, the owner's DID and the peer
 * DID, so each relationship gets its own key without anything extra to back
 * up. Two curves of support:
 *
 * - [`derive_ec_key`]: secp256k1, instant
 * - [`derive_rsa_key`]: RSA via deterministic prime search, cancellable
 */

pub mod ec;
pub mod errors;
pub mod rsa;

pub use ec::derive_ec_key;
pub use errors::{PairwiseError, Result};
pub use rsa::{PrimeSearchReport, derive_rsa_key};
