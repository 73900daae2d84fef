//! Algorithm descriptors and key capability tags

use serde::{Deserialize, Serialize};

use crate::CryptoError;

/// Hash functions referenced by algorithm descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashAlg {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlg {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlg::Sha1 => "SHA-1",
            HashAlg::Sha256 => "SHA-256",
            HashAlg::Sha384 => "SHA-384",
            HashAlg::Sha512 => "SHA-512",
        }
    }
}

impl TryFrom<&str> for HashAlg {
    type Error = CryptoError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "SHA-1" => Ok(HashAlg::Sha1),
            "SHA-256" => Ok(HashAlg::Sha256),
            "SHA-384" => Ok(HashAlg::Sha384),
            "SHA-512" => Ok(HashAlg::Sha512),
            _ => Err(CryptoError::UnknownAlgorithm(format!(
                "Unknown hash algorithm: {value}"
            ))),
        }
    }
}

/// Class of a concrete key instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyClass {
    Public,
    Private,
    Secret,
}

/// Key class scope a provider registration applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyScope {
    Public,
    Private,
    Secret,
    All,
}

impl KeyScope {
    /// True if a registration under `self` serves a lookup for `requested`.
    /// `All` matches in either position.
    pub fn matches(&self, requested: KeyScope) -> bool {
        matches!(
            (self, requested),
            (KeyScope::All, _) | (_, KeyScope::All)
        ) || *self == requested
    }
}

/// Allowed operations for a key (JWK `key_ops` values)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyUsage {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    DeriveBits,
    WrapKey,
    UnwrapKey,
}

/// An immutable, named bag of parameters identifying a cryptographic
/// operation. The canonical uppercase name is the discriminator; an unknown
/// name resolves to no provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Algorithm {
    name: String,
    pub hash: Option<HashAlg>,
    pub curve: Option<String>,
    pub modulus_length: Option<usize>,
    pub public_exponent: Option<Vec<u8>>,
    pub iv: Option<Vec<u8>>,
    pub tag_length: Option<usize>,
}

impl Algorithm {
    pub fn new(name: &str) -> Self {
        Algorithm {
            name: name.to_uppercase(),
            hash: None,
            curve: None,
            modulus_length: None,
            public_exponent: None,
            iv: None,
            tag_length: None,
        }
    }

    /// Canonical (uppercase) algorithm name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison
    pub fn matches_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }

    pub fn with_hash(mut self, hash: HashAlg) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_curve(mut self, curve: &str) -> Self {
        self.curve = Some(curve.to_string());
        self
    }

    pub fn with_modulus_length(mut self, bits: usize) -> Self {
        self.modulus_length = Some(bits);
        self
    }

    pub fn with_public_exponent(mut self, e: &[u8]) -> Self {
        self.public_exponent = Some(e.to_vec());
        self
    }

    pub fn with_iv(mut self, iv: &[u8]) -> Self {
        self.iv = Some(iv.to_vec());
        self
    }

    pub fn with_tag_length(mut self, bits: usize) -> Self {
        self.tag_length = Some(bits);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_is_canonicalized() {
        let alg = Algorithm::new("es256k");
        assert_eq!(alg.name(), "ES256K");
        assert!(alg.matches_name("Es256K"));
    }

    #[test]
    fn scope_matching() {
        assert!(KeyScope::All.matches(KeyScope::Private));
        assert!(KeyScope::Private.matches(KeyScope::All));
        assert!(KeyScope::Private.matches(KeyScope::Private));
        assert!(!KeyScope::Private.matches(KeyScope::Public));
    }

    #[test]
    fn key_ops_wire_names() {
        let ops = vec![KeyUsage::Sign, KeyUsage::DeriveBits, KeyUsage::WrapKey];
        let json = serde_json::to_string(&ops).unwrap();
        assert_eq!(json, r#"["sign","deriveBits","wrapKey"]"#);
    }
}
