//! JWS token construction, signing and verification
//!
//! A token holds a base64url payload and any number of signature entries per
//! RFC 7515. Signing appends an entry; it never mutates existing ones, so a
//! token can accumulate signatures from several keys. Verification succeeds
//! only when every entry verifies.

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use meridian_common::{CryptoOperations, DidResolver, resolve_with_timeout};
use meridian_crypto::{KeyMaterial, b64url_decode, b64url_encode};
use meridian_keystore::KeyStore;

use crate::errors::{JwsError, Result};

/// Protected header of one signature entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// One signature entry: the base64url protected header, an optional
/// unprotected header, and the base64url signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsSignature {
    pub protected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<BTreeMap<String, Value>>,
    pub signature: String,
}

/// A JWS token in its general (multi-signature) shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsToken {
    pub(crate) payload: String,
    #[serde(default)]
    pub(crate) signatures: Vec<JwsSignature>,
}

impl JwsToken {
    /// An unsigned token over raw content
    pub fn new(content: &[u8]) -> Self {
        JwsToken {
            payload: b64url_encode(content),
            signatures: Vec::new(),
        }
    }

    /// The base64url payload as carried on the wire
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The decoded payload bytes
    pub fn content(&self) -> Result<Vec<u8>> {
        Ok(b64url_decode("payload", &self.payload)?)
    }

    pub fn signatures(&self) -> &[JwsSignature] {
        &self.signatures
    }

    /// Signs with the latest private key under `reference` and appends the
    /// resulting entry. The protected header carries the key's algorithm and
    /// key id plus any `extra` claims; `alg` and `kid` entries in `extra`
    /// override the key's own values, and an overridden `alg` also selects
    /// the signing provider.
    pub async fn sign<S: KeyStore>(
        &mut self,
        ops: &CryptoOperations<S>,
        reference: &str,
        extra: Option<&BTreeMap<String, Value>>,
    ) -> Result<()> {
        let key = ops.key_store().get_private_key(reference).await?;
        let mut extra = extra.cloned().unwrap_or_default();
        let alg = match extra.remove("alg") {
            Some(Value::String(alg)) => alg,
            Some(other) => {
                return Err(JwsError::Serialization(format!(
                    "Header alg must be a string, got {other}"
                )));
            }
            None => key.attributes().alg.clone().ok_or_else(|| {
                JwsError::UnresolvedKey(format!(
                    "Key under {reference} declares no signing algorithm"
                ))
            })?,
        };
        let kid = match extra.remove("kid") {
            Some(Value::String(kid)) => Some(kid),
            Some(other) => {
                return Err(JwsError::Serialization(format!(
                    "Header kid must be a string, got {other}"
                )));
            }
            None => key.kid().map(str::to_string),
        };

        let header = JwsHeader { alg, kid, extra };
        let protected_json = serde_json::to_string(&header)
            .map_err(|e| JwsError::Serialization(format!("Bad protected header: {e}")))?;
        let protected = b64url_encode(protected_json.as_bytes());

        let input = signing_input(&protected, &self.payload);
        let signature = ops.sign_with_material(&key, Some(&header.alg), input.as_bytes())?;
        debug!(
            "Signed payload with {} as signature entry {}",
            header.kid.as_deref().unwrap_or("<unnamed>"),
            self.signatures.len()
        );

        self.signatures.push(JwsSignature {
            protected,
            header: None,
            signature: b64url_encode(&signature),
        });
        Ok(())
    }

    /// Verifies every signature entry against keys held in the local store,
    /// addressed by the `kid` in each protected header. A token without
    /// signatures is an error, not a `false`.
    pub async fn verify<S: KeyStore>(&self, ops: &CryptoOperations<S>) -> Result<bool> {
        self.require_signatures()?;
        for entry in &self.signatures {
            let header = decode_header(&entry.protected)?;
            let kid = required_kid(&header)?;
            let key = local_public_key(ops, kid).await?;
            if !self.verify_entry(ops, entry, &header, &key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Verifies every signature entry against a caller-supplied candidate
    /// set. An entry with a `kid` is checked against matching candidates
    /// only; an entry without one is checked against all of them.
    pub fn verify_with_keys<S: KeyStore>(
        &self,
        ops: &CryptoOperations<S>,
        candidates: &[KeyMaterial],
    ) -> Result<bool> {
        self.require_signatures()?;
        for entry in &self.signatures {
            let header = decode_header(&entry.protected)?;
            let matching: Vec<&KeyMaterial> = match &header.kid {
                Some(kid) => candidates.iter().filter(|k| kid_matches(k, kid)).collect(),
                None => candidates.iter().collect(),
            };
            if matching.is_empty() {
                return Err(JwsError::UnresolvedKey(format!(
                    "No candidate key for {}",
                    header.kid.as_deref().unwrap_or("<no kid>")
                )));
            }
            let mut verified = false;
            for key in matching {
                if self.verify_entry(ops, entry, &header, key)? {
                    verified = true;
                    break;
                }
            }
            if !verified {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Verifies every signature entry by resolving each `kid`'s DID through
    /// `resolver`. The `kid` must be a full DID URL such as
    /// `did:example:123#signing_1`.
    pub async fn verify_with_resolver<S: KeyStore>(
        &self,
        ops: &CryptoOperations<S>,
        resolver: &dyn DidResolver,
        timeout: Duration,
    ) -> Result<bool> {
        self.require_signatures()?;
        for entry in &self.signatures {
            let header = decode_header(&entry.protected)?;
            let kid = required_kid(&header)?;
            let did = kid.split('#').next().filter(|d| d.starts_with("did:")).ok_or_else(
                || JwsError::UnresolvedKey(format!("Key id {kid} does not name a DID")),
            )?;

            let document = resolve_with_timeout(resolver, did, timeout).await?;
            let key = document.key_by_id(kid).ok_or_else(|| {
                JwsError::UnresolvedKey(format!("DID document for {did} has no key {kid}"))
            })?;
            if !self.verify_entry(ops, entry, &header, key)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn verify_entry<S: KeyStore>(
        &self,
        ops: &CryptoOperations<S>,
        entry: &JwsSignature,
        header: &JwsHeader,
        key: &KeyMaterial,
    ) -> Result<bool> {
        let input = signing_input(&entry.protected, &self.payload);
        let signature = b64url_decode("signature", &entry.signature)?;
        Ok(ops.verify_with_key(key, Some(&header.alg), input.as_bytes(), &signature)?)
    }

    fn require_signatures(&self) -> Result<()> {
        if self.signatures.is_empty() {
            Err(JwsError::VerificationFailed(
                "Token has no signatures".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn signing_input(protected: &str, payload: &str) -> String {
    format!("{protected}.{payload}")
}

pub(crate) fn decode_header(protected: &str) -> Result<JwsHeader> {
    let raw = b64url_decode("protected", protected)?;
    serde_json::from_slice(&raw)
        .map_err(|e| JwsError::UnparseableToken(format!("Bad protected header: {e}")))
}

fn required_kid(header: &JwsHeader) -> Result<&str> {
    header.kid.as_deref().ok_or_else(|| {
        JwsError::UnresolvedKey("Protected header carries no kid".to_string())
    })
}

/// True if `key`'s id equals `kid` or its fragment part
fn kid_matches(key: &KeyMaterial, kid: &str) -> bool {
    let fragment = kid.find('#').map(|i| &kid[i..]);
    key.kid()
        .is_some_and(|own| own == kid || Some(own) == fragment)
}

async fn local_public_key<S: KeyStore>(
    ops: &CryptoOperations<S>,
    kid: &str,
) -> Result<KeyMaterial> {
    let store = ops.key_store();
    match store.get_public_key_by_id(kid).await {
        Ok(key) => Ok(key),
        Err(_) => {
            // A full DID URL may be stored under just its fragment.
            if let Some(i) = kid.find('#').filter(|i| *i > 0) {
                if let Ok(key) = store.get_public_key_by_id(&kid[i..]).await {
                    return Ok(key);
                }
            }
            Err(JwsError::UnresolvedKey(format!("No local key for {kid}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{future::Future, pin::Pin, sync::Arc};

    use meridian_common::{CommonError, DidDocument};
    use meridian_crypto::ProviderFactory;
    use meridian_keystore::InMemoryKeyStore;

    fn make_ops() -> CryptoOperations<InMemoryKeyStore> {
        CryptoOperations::new(
            Arc::new(ProviderFactory::with_software_providers()),
            InMemoryKeyStore::new(),
        )
    }

    #[tokio::test]
    async fn sign_and_verify_locally() {
        let ops = make_ops();
        ops.generate_key_pair("ES256K", "signing").await.unwrap();

        let mut token = JwsToken::new(b"{\"hello\":\"world\"}");
        token.sign(&ops, "signing", None).await.unwrap();
        assert_eq!(token.signatures().len(), 1);
        assert!(token.verify(&ops).await.unwrap());
        assert_eq!(token.content().unwrap(), b"{\"hello\":\"world\"}");
    }

    #[tokio::test]
    async fn tampered_payload_fails() {
        let ops = make_ops();
        ops.generate_key_pair("ES256K", "signing").await.unwrap();

        let mut token = JwsToken::new(b"original");
        token.sign(&ops, "signing", None).await.unwrap();
        token.payload = b64url_encode(b"tampered");
        assert!(!token.verify(&ops).await.unwrap());
    }

    #[tokio::test]
    async fn unsigned_token_is_an_error() {
        let ops = make_ops();
        let token = JwsToken::new(b"payload");
        let result = token.verify(&ops).await;
        assert!(matches!(result, Err(JwsError::VerificationFailed(_))));
    }

    #[tokio::test]
    async fn unknown_kid_is_unresolved() {
        let ops = make_ops();
        ops.generate_key_pair("ES256K", "signing").await.unwrap();

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "signing", None).await.unwrap();

        let other = make_ops();
        let result = token.verify(&other).await;
        assert!(matches!(result, Err(JwsError::UnresolvedKey(_))));
    }

    #[tokio::test]
    async fn multiple_signatures_all_must_verify() {
        let ops = make_ops();
        ops.generate_key_pair("ES256K", "alpha").await.unwrap();
        ops.generate_key_pair("RS256", "beta").await.unwrap();

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "alpha", None).await.unwrap();
        token.sign(&ops, "beta", None).await.unwrap();
        assert_eq!(token.signatures().len(), 2);
        assert!(token.verify(&ops).await.unwrap());

        // Corrupt the second entry only.
        let mut broken = token.clone();
        let mut sig = b64url_decode("signature", &broken.signatures[1].signature).unwrap();
        sig[0] ^= 0x01;
        broken.signatures[1].signature = b64url_encode(&sig);
        assert!(!broken.verify(&ops).await.unwrap());
    }

    #[tokio::test]
    async fn extra_protected_claims_survive() {
        let ops = make_ops();
        ops.generate_key_pair("ES256K", "signing").await.unwrap();

        let mut extra = BTreeMap::new();
        extra.insert("typ".to_string(), Value::String("JWT".to_string()));

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "signing", Some(&extra)).await.unwrap();

        let header = decode_header(&token.signatures[0].protected).unwrap();
        assert_eq!(header.extra.get("typ"), Some(&Value::String("JWT".into())));
        assert!(token.verify(&ops).await.unwrap());
    }

    #[tokio::test]
    async fn header_overrides_take_effect() {
        let ops = make_ops();
        // The stored key declares RS256; the override signs and verifies
        // under RS384 with the same key.
        ops.generate_key_pair("RS256", "signing").await.unwrap();

        let mut extra = BTreeMap::new();
        extra.insert("alg".to_string(), Value::String("RS384".to_string()));
        extra.insert(
            "kid".to_string(),
            Value::String("did:example:123#signing_1".to_string()),
        );

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "signing", Some(&extra)).await.unwrap();

        let header = decode_header(&token.signatures[0].protected).unwrap();
        assert_eq!(header.alg, "RS384");
        assert_eq!(header.kid.as_deref(), Some("did:example:123#signing_1"));
        // The overrides must not leak into the flattened extras.
        assert!(header.extra.is_empty());
        assert!(token.verify(&ops).await.unwrap());
    }

    #[tokio::test]
    async fn verify_with_explicit_keys() {
        let ops = make_ops();
        let public = ops.generate_key_pair("ES256K", "signing").await.unwrap();

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "signing", None).await.unwrap();

        let verifier = make_ops();
        assert!(
            token
                .verify_with_keys(&verifier, std::slice::from_ref(&public))
                .unwrap()
        );

        let result = token.verify_with_keys(&verifier, &[]);
        assert!(matches!(result, Err(JwsError::UnresolvedKey(_))));
    }

    struct FixedResolver(DidDocument);

    impl DidResolver for FixedResolver {
        fn resolve(
            &self,
            did: &str,
        ) -> Pin<Box<dyn Future<Output = meridian_common::Result<DidDocument>> + Send + '_>>
        {
            let doc = self.0.clone();
            let did = did.to_string();
            Box::pin(async move {
                if doc.id == did {
                    Ok(doc)
                } else {
                    Err(CommonError::DidResolution(format!("Unknown DID {did}")))
                }
            })
        }
    }

    #[tokio::test]
    async fn verify_through_a_resolver() {
        let ops = make_ops();
        let did = "did:example:123";

        // Sign with a key whose id is a full DID URL.
        let mut public = ops.generate_key_pair("ES256K", "unused").await.unwrap();
        let mut private = ops.key_store().get_private_key("unused").await.unwrap();
        private.set_kid(&format!("{did}#signing_1"));
        public.set_kid(&format!("{did}#signing_1"));
        ops.key_store().save("signing", private).await.unwrap();

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "signing", None).await.unwrap();

        let resolver = FixedResolver(DidDocument {
            id: did.to_string(),
            public_keys: vec![public],
        });

        let verifier = make_ops();
        assert!(
            token
                .verify_with_resolver(&verifier, &resolver, Duration::from_secs(5))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn resolver_requires_a_did_kid() {
        let ops = make_ops();
        ops.generate_key_pair("ES256K", "signing").await.unwrap();

        let mut token = JwsToken::new(b"payload");
        token.sign(&ops, "signing", None).await.unwrap();

        let resolver = FixedResolver(DidDocument {
            id: "did:example:123".to_string(),
            public_keys: vec![],
        });
        let result = token
            .verify_with_resolver(&ops, &resolver, Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(JwsError::UnresolvedKey(_))));
    }
}
