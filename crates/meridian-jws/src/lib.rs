/*!
 * JWS tokens for Meridian SDK.
 *
 * [`JwsToken`] carries a base64url payload and one or more signature entries
 * (RFC 7515). Signing pulls keys from a [`meridian_keystore::KeyStore`]
 * through [`meridian_common::CryptoOperations`]; verification can use the
 * local store, an explicit key set, or a DID resolver.
 *
 * All three wire shapes are supported: compact, flattened JSON and general
 * JSON, with shape auto-detection on parse.
 */

pub mod errors;
pub mod serialization;
pub mod token;

pub use errors::{JwsError, Result};
pub use token::{JwsHeader, JwsSignature, JwsToken};
