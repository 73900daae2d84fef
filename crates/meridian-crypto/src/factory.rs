//! Scope-aware provider dispatch
//!
//! Providers are registered per operation family under a lowercase algorithm
//! name and a [`KeyScope`]. Lookups prefer an exact name over the wildcard,
//! and an exact scope over an `All` registration, so a caller can pin a
//! hardware-backed provider for private keys while keeping software fallbacks
//! for everything else.

use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::{
    CryptoError, CryptoProvider, KeyScope,
    error::Result,
    providers::{
        AesGcmProvider, HmacProvider, RsaOaepProvider, RsaSsaProvider, Secp256k1Provider,
        Sha2Provider,
    },
};

/// Registration name matching any algorithm within an operation family
pub const WILDCARD: &str = "*";

type Registry = AHashMap<String, Vec<(KeyScope, Arc<dyn CryptoProvider>)>>;

/// Routes each operation family to a registered [`CryptoProvider`]
#[derive(Default)]
pub struct ProviderFactory {
    message_signers: Registry,
    mac_signers: Registry,
    key_encrypters: Registry,
    shared_key_encrypters: Registry,
    symmetric_encrypters: Registry,
    message_digests: Registry,
}

fn insert(registry: &mut Registry, name: &str, scope: KeyScope, provider: Arc<dyn CryptoProvider>) {
    let key = if name == WILDCARD {
        WILDCARD.to_string()
    } else {
        name.to_lowercase()
    };
    registry.entry(key).or_default().push((scope, provider));
}

fn best_match(
    entries: Option<&Vec<(KeyScope, Arc<dyn CryptoProvider>)>>,
    scope: KeyScope,
) -> Option<Arc<dyn CryptoProvider>> {
    let entries = entries?;
    entries
        .iter()
        .find(|(s, _)| *s == scope)
        .or_else(|| entries.iter().find(|(s, _)| s.matches(scope)))
        .map(|(_, p)| p.clone())
}

fn lookup(
    registry: &Registry,
    family: &str,
    name: &str,
    scope: KeyScope,
) -> Result<Arc<dyn CryptoProvider>> {
    if let Some(provider) = best_match(registry.get(&name.to_lowercase()), scope) {
        return Ok(provider);
    }
    if let Some(provider) = best_match(registry.get(WILDCARD), scope) {
        debug!("No {family} registered for {name}, using the wildcard provider");
        return Ok(provider);
    }
    Err(CryptoError::UnknownAlgorithm(format!(
        "No {family} registered for algorithm {name}"
    )))
}

impl ProviderFactory {
    /// A factory holding only wildcard defaults: SHA-256 digests, HS512 MACs,
    /// ES256K signatures, RSA-OAEP-256 key transport and A256GCM content
    /// encryption.
    pub fn new() -> Self {
        let mut factory = ProviderFactory::default();
        factory.register_message_digest(WILDCARD, KeyScope::All, Arc::new(Sha2Provider::sha256()));
        factory.register_mac_signer(WILDCARD, KeyScope::All, Arc::new(HmacProvider::hs512()));
        factory.register_message_signer(WILDCARD, KeyScope::All, Arc::new(Secp256k1Provider));
        factory.register_key_encrypter(WILDCARD, KeyScope::All, Arc::new(RsaOaepProvider::oaep_256()));
        factory.register_shared_key_encrypter(
            WILDCARD,
            KeyScope::All,
            Arc::new(RsaOaepProvider::oaep_256()),
        );
        factory.register_symmetric_encrypter(
            WILDCARD,
            KeyScope::All,
            Arc::new(AesGcmProvider::a256gcm()),
        );
        factory
    }

    /// A factory with every software provider registered under its own name
    /// for all key scopes, plus the wildcard defaults of [`Self::new`].
    pub fn with_software_providers() -> Self {
        let mut factory = ProviderFactory::new();

        factory.register_message_digest("SHA-256", KeyScope::All, Arc::new(Sha2Provider::sha256()));
        factory.register_message_digest("SHA-384", KeyScope::All, Arc::new(Sha2Provider::sha384()));
        factory.register_message_digest("SHA-512", KeyScope::All, Arc::new(Sha2Provider::sha512()));

        factory.register_mac_signer("HS256", KeyScope::All, Arc::new(HmacProvider::hs256()));
        factory.register_mac_signer("HS384", KeyScope::All, Arc::new(HmacProvider::hs384()));
        factory.register_mac_signer("HS512", KeyScope::All, Arc::new(HmacProvider::hs512()));

        factory.register_message_signer("ES256K", KeyScope::All, Arc::new(Secp256k1Provider));
        factory.register_message_signer("RS256", KeyScope::All, Arc::new(RsaSsaProvider::rs256()));
        factory.register_message_signer("RS384", KeyScope::All, Arc::new(RsaSsaProvider::rs384()));
        factory.register_message_signer("RS512", KeyScope::All, Arc::new(RsaSsaProvider::rs512()));

        let oaep = Arc::new(RsaOaepProvider::oaep());
        let oaep_256 = Arc::new(RsaOaepProvider::oaep_256());
        factory.register_key_encrypter("RSA-OAEP", KeyScope::All, oaep.clone());
        factory.register_key_encrypter("RSA-OAEP-256", KeyScope::All, oaep_256.clone());
        factory.register_shared_key_encrypter("RSA-OAEP", KeyScope::All, oaep);
        factory.register_shared_key_encrypter("RSA-OAEP-256", KeyScope::All, oaep_256);

        factory.register_symmetric_encrypter(
            "A128GCM",
            KeyScope::All,
            Arc::new(AesGcmProvider::a128gcm()),
        );
        factory.register_symmetric_encrypter(
            "A256GCM",
            KeyScope::All,
            Arc::new(AesGcmProvider::a256gcm()),
        );

        factory
    }

    // ---- Registration ----

    pub fn register_message_signer(
        &mut self,
        name: &str,
        scope: KeyScope,
        provider: Arc<dyn CryptoProvider>,
    ) {
        insert(&mut self.message_signers, name, scope, provider);
    }

    pub fn register_mac_signer(
        &mut self,
        name: &str,
        scope: KeyScope,
        provider: Arc<dyn CryptoProvider>,
    ) {
        insert(&mut self.mac_signers, name, scope, provider);
    }

    pub fn register_key_encrypter(
        &mut self,
        name: &str,
        scope: KeyScope,
        provider: Arc<dyn CryptoProvider>,
    ) {
        insert(&mut self.key_encrypters, name, scope, provider);
    }

    pub fn register_shared_key_encrypter(
        &mut self,
        name: &str,
        scope: KeyScope,
        provider: Arc<dyn CryptoProvider>,
    ) {
        insert(&mut self.shared_key_encrypters, name, scope, provider);
    }

    pub fn register_symmetric_encrypter(
        &mut self,
        name: &str,
        scope: KeyScope,
        provider: Arc<dyn CryptoProvider>,
    ) {
        insert(&mut self.symmetric_encrypters, name, scope, provider);
    }

    pub fn register_message_digest(
        &mut self,
        name: &str,
        scope: KeyScope,
        provider: Arc<dyn CryptoProvider>,
    ) {
        insert(&mut self.message_digests, name, scope, provider);
    }

    // ---- Lookup ----

    pub fn message_signer(&self, name: &str, scope: KeyScope) -> Result<Arc<dyn CryptoProvider>> {
        lookup(&self.message_signers, "message signer", name, scope)
    }

    pub fn mac_signer(&self, name: &str, scope: KeyScope) -> Result<Arc<dyn CryptoProvider>> {
        lookup(&self.mac_signers, "MAC signer", name, scope)
    }

    pub fn key_encrypter(&self, name: &str, scope: KeyScope) -> Result<Arc<dyn CryptoProvider>> {
        lookup(&self.key_encrypters, "key encrypter", name, scope)
    }

    pub fn shared_key_encrypter(
        &self,
        name: &str,
        scope: KeyScope,
    ) -> Result<Arc<dyn CryptoProvider>> {
        lookup(
            &self.shared_key_encrypters,
            "shared key encrypter",
            name,
            scope,
        )
    }

    pub fn symmetric_encrypter(
        &self,
        name: &str,
        scope: KeyScope,
    ) -> Result<Arc<dyn CryptoProvider>> {
        lookup(
            &self.symmetric_encrypters,
            "symmetric encrypter",
            name,
            scope,
        )
    }

    pub fn message_digest(&self, name: &str, scope: KeyScope) -> Result<Arc<dyn CryptoProvider>> {
        lookup(&self.message_digests, "message digest", name, scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_lookup_is_case_insensitive() {
        let factory = ProviderFactory::with_software_providers();
        let provider = factory.message_signer("es256k", KeyScope::Private).unwrap();
        assert_eq!(provider.name(), "ES256K");
    }

    #[test]
    fn unknown_name_falls_back_to_wildcard() {
        let factory = ProviderFactory::new();
        let provider = factory
            .message_digest("SHA-3-512", KeyScope::All)
            .unwrap();
        assert_eq!(provider.name(), "SHA-256");
    }

    #[test]
    fn empty_family_is_unknown_algorithm() {
        let factory = ProviderFactory::default();
        let Err(err) = factory.mac_signer("HS256", KeyScope::Secret) else {
            panic!("lookup against an empty registry must fail");
        };
        assert_eq!(
            err.to_string(),
            "Unknown algorithm: No MAC signer registered for algorithm HS256"
        );
    }

    #[test]
    fn exact_scope_beats_all_scope() {
        struct Named(&'static str);
        impl CryptoProvider for Named {
            fn name(&self) -> &str {
                self.0
            }
        }

        let mut factory = ProviderFactory::default();
        factory.register_message_signer("ES256K", KeyScope::All, Arc::new(Named("software")));
        factory.register_message_signer("ES256K", KeyScope::Private, Arc::new(Named("hardware")));

        let private = factory.message_signer("ES256K", KeyScope::Private).unwrap();
        assert_eq!(private.name(), "hardware");
        let public = factory.message_signer("ES256K", KeyScope::Public).unwrap();
        assert_eq!(public.name(), "software");
    }

    #[test]
    fn exact_name_beats_wildcard() {
        let factory = ProviderFactory::with_software_providers();
        let provider = factory.mac_signer("HS256", KeyScope::Secret).unwrap();
        assert_eq!(provider.name(), "HS256");
    }
}
