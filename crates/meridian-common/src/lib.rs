/*!
 * Shared building blocks for Meridian SDK.
 *
 * - [`CryptoOperations`]: key-store-backed signing, verification, digests
 *   and MACs addressed by key reference and JOSE algorithm name
 * - [`DidResolver`] and [`DidDocument`]: the pluggable DID resolution seam
 */

pub mod errors;
pub mod operations;
pub mod resolver;

pub use errors::{CommonError, Result};
pub use operations::CryptoOperations;
pub use resolver::{DidDocument, DidResolver, resolve_with_timeout};
