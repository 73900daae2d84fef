//! DID resolution contract
//!
//! The SDK never ships a network resolver; callers plug one in through
//! [`DidResolver`]. The trait is dyn-compatible so resolvers can be stored
//! behind `Arc<dyn DidResolver>` and shared across tasks.

use std::{future::Future, pin::Pin, time::Duration};

use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_crypto::KeyMaterial;

use crate::errors::{CommonError, Result};

/// The subset of a DID document the crypto layer needs: the subject id and
/// its public keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DidDocument {
    pub id: String,
    pub public_keys: Vec<KeyMaterial>,
}

impl DidDocument {
    /// Finds a public key by key id. Accepts either the full id
    /// (`did:example:123#signing_1`) or just the fragment (`#signing_1`).
    pub fn key_by_id(&self, kid: &str) -> Option<&KeyMaterial> {
        let fragment = kid.find('#').map(|i| &kid[i..]);
        self.public_keys.iter().find(|key| {
            key.kid()
                .is_some_and(|own| own == kid || Some(own) == fragment)
        })
    }
}

/// Resolves a DID to its document
pub trait DidResolver: Send + Sync {
    fn resolve(&self, did: &str) -> Pin<Box<dyn Future<Output = Result<DidDocument>> + Send + '_>>;
}

/// Resolves `did`, failing with [`CommonError::Timeout`] if the resolver does
/// not answer within `timeout`.
pub async fn resolve_with_timeout(
    resolver: &dyn DidResolver,
    did: &str,
    timeout: Duration,
) -> Result<DidDocument> {
    debug!("Resolving {did} with a {timeout:?} deadline");
    tokio::time::timeout(timeout, resolver.resolve(did))
        .await
        .map_err(|_| CommonError::Timeout(format!("Resolution of {did} took over {timeout:?}")))?
}
