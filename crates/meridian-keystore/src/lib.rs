/*!
 * Key storage for Meridian SDK.
 *
 * A [`KeyStore`] groups keys into named containers. The container name is a
 * stable reference such as `signing` or `recovery`; each key inside carries a
 * key id of the form `#<reference>_<n>` with `n` starting at 1, so rotation
 * appends rather than replaces.
 *
 * [`InMemoryKeyStore`] is the bundled implementation. Persistent stores
 * implement the same trait.
 */

use std::sync::RwLock;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use meridian_crypto::{KeyClass, KeyMaterial};

pub mod errors;

pub use errors::{KeyStoreError, Result};

/// An ordered set of keys sharing one reference name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyContainer {
    pub keys: Vec<KeyMaterial>,
}

impl KeyContainer {
    /// Key ids of every key in insertion order
    pub fn kids(&self) -> Vec<String> {
        self.keys
            .iter()
            .filter_map(|k| k.kid().map(str::to_string))
            .collect()
    }

    /// Most recently added key
    pub fn latest(&self) -> Option<&KeyMaterial> {
        self.keys.last()
    }

    /// Most recently added key of the given class
    pub fn latest_of_class(&self, class: KeyClass) -> Option<&KeyMaterial> {
        self.keys.iter().rev().find(|k| k.key_class() == class)
    }

    pub fn by_id(&self, kid: &str) -> Option<&KeyMaterial> {
        self.keys.iter().find(|k| k.kid() == Some(kid))
    }

    /// Next key id for this container, `#<reference>_<n>`
    pub fn next_key_id(&self, reference: &str) -> String {
        let prefix = format!("#{reference}_");
        let next = self
            .kids()
            .iter()
            .filter_map(|kid| kid.strip_prefix(&prefix)?.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        format!("{prefix}{next}")
    }
}

/// Storage contract for key material.
///
/// Getters by reference return the latest key of the requested class;
/// getters by id search every container for an exact key id match.
#[allow(async_fn_in_trait)]
pub trait KeyStore {
    /// Stores a key under `reference`, assigning a key id if it has none.
    /// Key ids are unique across the whole store. Returns the key id.
    async fn save(&self, reference: &str, key: KeyMaterial) -> Result<String>;

    /// All container references with their key ids in insertion order
    async fn list(&self) -> Result<Vec<(String, Vec<String>)>>;

    /// Every key stored under `reference`
    async fn get_container(&self, reference: &str) -> Result<KeyContainer>;

    /// Latest public key under `reference`. Falls back to the public half of
    /// the latest private key.
    async fn get_public_key(&self, reference: &str) -> Result<KeyMaterial>;

    /// Latest private key under `reference`
    async fn get_private_key(&self, reference: &str) -> Result<KeyMaterial>;

    /// Latest symmetric key under `reference`
    async fn get_secret_key(&self, reference: &str) -> Result<KeyMaterial>;

    /// Public key (or public half of a private key) with the given key id
    async fn get_public_key_by_id(&self, kid: &str) -> Result<KeyMaterial>;

    /// Private key with the given key id
    async fn get_private_key_by_id(&self, kid: &str) -> Result<KeyMaterial>;

    /// Symmetric key with the given key id
    async fn get_secret_key_by_id(&self, kid: &str) -> Result<KeyMaterial>;

    /// The key id the next key saved under `reference` will receive. An
    /// `explicit` id is returned as-is after checking it is not already taken.
    async fn check_or_create_key_id(
        &self,
        reference: &str,
        explicit: Option<&str>,
    ) -> Result<String>;
}

/// Non-persistent key store backed by a hash map
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    containers: RwLock<AHashMap<String, KeyContainer>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        InMemoryKeyStore::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, AHashMap<String, KeyContainer>>> {
        self.containers
            .read()
            .map_err(|e| KeyStoreError::Poisoned(e.to_string()))
    }

    fn find_by_id(&self, kid: &str) -> Result<KeyMaterial> {
        let containers = self.read()?;
        containers
            .values()
            .find_map(|c| c.by_id(kid))
            .cloned()
            .ok_or_else(|| KeyStoreError::KeyNotFound(format!("No key with id {kid}")))
    }
}

impl KeyStore for InMemoryKeyStore {
    async fn save(&self, reference: &str, mut key: KeyMaterial) -> Result<String> {
        let mut containers = self
            .containers
            .write()
            .map_err(|e| KeyStoreError::Poisoned(e.to_string()))?;

        // Id lookups span every container, so a kid taken anywhere is taken.
        let kid = match key.kid() {
            Some(kid) => {
                if containers.values().any(|c| c.by_id(kid).is_some()) {
                    return Err(KeyStoreError::InvalidKeyId(format!(
                        "Key id {kid} already exists"
                    )));
                }
                kid.to_string()
            }
            None => {
                let kid = containers
                    .get(reference)
                    .map(|c| c.next_key_id(reference))
                    .unwrap_or_else(|| format!("#{reference}_1"));
                key.set_kid(&kid);
                kid
            }
        };

        debug!("Saving key {kid} under {reference}");
        containers
            .entry(reference.to_string())
            .or_default()
            .keys
            .push(key);
        Ok(kid)
    }

    async fn list(&self) -> Result<Vec<(String, Vec<String>)>> {
        let containers = self.read()?;
        let mut references: Vec<(String, Vec<String>)> = containers
            .iter()
            .map(|(reference, container)| (reference.clone(), container.kids()))
            .collect();
        references.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(references)
    }

    async fn get_container(&self, reference: &str) -> Result<KeyContainer> {
        let containers = self.read()?;
        containers
            .get(reference)
            .cloned()
            .ok_or_else(|| KeyStoreError::KeyNotFound(format!("No keys under {reference}")))
    }

    async fn get_public_key(&self, reference: &str) -> Result<KeyMaterial> {
        let containers = self.read()?;
        let container = containers
            .get(reference)
            .ok_or_else(|| KeyStoreError::KeyNotFound(format!("No keys under {reference}")))?;

        container
            .latest_of_class(KeyClass::Public)
            .cloned()
            .or_else(|| {
                container
                    .latest_of_class(KeyClass::Private)
                    .and_then(KeyMaterial::public_half)
            })
            .ok_or_else(|| {
                KeyStoreError::KeyNotFound(format!("No public key under {reference}"))
            })
    }

    async fn get_private_key(&self, reference: &str) -> Result<KeyMaterial> {
        let containers = self.read()?;
        containers
            .get(reference)
            .and_then(|c| c.latest_of_class(KeyClass::Private))
            .cloned()
            .ok_or_else(|| {
                KeyStoreError::KeyNotFound(format!("No private key under {reference}"))
            })
    }

    async fn get_secret_key(&self, reference: &str) -> Result<KeyMaterial> {
        let containers = self.read()?;
        containers
            .get(reference)
            .and_then(|c| c.latest_of_class(KeyClass::Secret))
            .cloned()
            .ok_or_else(|| {
                KeyStoreError::KeyNotFound(format!("No symmetric key under {reference}"))
            })
    }

    async fn get_public_key_by_id(&self, kid: &str) -> Result<KeyMaterial> {
        let key = self.find_by_id(kid)?;
        match key.key_class() {
            KeyClass::Public => Ok(key),
            KeyClass::Private => key.public_half().ok_or_else(|| {
                KeyStoreError::KeyNotFound(format!("Key {kid} has no public half"))
            }),
            KeyClass::Secret => Err(KeyStoreError::KeyNotFound(format!(
                "Key {kid} is not an asymmetric key"
            ))),
        }
    }

    async fn get_private_key_by_id(&self, kid: &str) -> Result<KeyMaterial> {
        let key = self.find_by_id(kid)?;
        if key.key_class() == KeyClass::Private {
            Ok(key)
        } else {
            Err(KeyStoreError::KeyNotFound(format!(
                "Key {kid} is not a private key"
            )))
        }
    }

    async fn get_secret_key_by_id(&self, kid: &str) -> Result<KeyMaterial> {
        let key = self.find_by_id(kid)?;
        if key.key_class() == KeyClass::Secret {
            Ok(key)
        } else {
            Err(KeyStoreError::KeyNotFound(format!(
                "Key {kid} is not a symmetric key"
            )))
        }
    }

    async fn check_or_create_key_id(
        &self,
        reference: &str,
        explicit: Option<&str>,
    ) -> Result<String> {
        let containers = self.read()?;
        if let Some(kid) = explicit {
            if containers.values().any(|c| c.by_id(kid).is_some()) {
                return Err(KeyStoreError::InvalidKeyId(format!(
                    "Key id {kid} already exists"
                )));
            }
            return Ok(kid.to_string());
        }
        Ok(containers
            .get(reference)
            .map(|c| c.next_key_id(reference))
            .unwrap_or_else(|| format!("#{reference}_1")))
    }
}
