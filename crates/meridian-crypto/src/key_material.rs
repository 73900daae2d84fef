//! JWK key material per RFC 7517, modeled as a tagged union
//!
//! Keys are carried as base64url strings exactly as they appear on the wire;
//! raw bytes are decoded at the provider boundary. Private variants are a
//! strict superset of the corresponding public fields.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, KeyClass, KeyUsage, error::Result};

/// Encode bytes as unpadded base64url
pub fn b64url_encode(data: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(data)
}

/// Decode an unpadded base64url field, naming it in the error
pub fn b64url_decode(field: &str, value: &str) -> Result<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|e| CryptoError::Decoding(format!("Invalid base64url in '{field}': {e}")))
}

/// Capability record shared by every key variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyAttributes {
    pub kid: Option<String>,
    pub alg: Option<String>,
    /// JWK `use` value ("sig" or "enc")
    pub key_use: Option<String>,
    /// Allowed operations. Empty means the key declares no restriction.
    pub key_ops: Vec<KeyUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsaPublicMaterial {
    pub n: String,
    pub e: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct RsaPrivateMaterial {
    pub n: String,
    pub e: String,
    pub d: String,
    pub p: String,
    pub q: String,
    pub dp: String,
    pub dq: String,
    pub qi: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcPublicMaterial {
    pub crv: String,
    pub x: String,
    pub y: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct EcPrivateMaterial {
    pub crv: String,
    pub x: String,
    pub y: String,
    pub d: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricMaterial {
    pub k: String,
}

/// A concrete key's cryptographic bytes plus its capability record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Jwk", into = "Jwk")]
pub enum KeyMaterial {
    RsaPublic {
        attrs: KeyAttributes,
        key: RsaPublicMaterial,
    },
    RsaPrivate {
        attrs: KeyAttributes,
        key: RsaPrivateMaterial,
    },
    EcPublic {
        attrs: KeyAttributes,
        key: EcPublicMaterial,
    },
    EcPrivate {
        attrs: KeyAttributes,
        key: EcPrivateMaterial,
    },
    Symmetric {
        attrs: KeyAttributes,
        key: SymmetricMaterial,
    },
}

impl KeyMaterial {
    pub fn attributes(&self) -> &KeyAttributes {
        match self {
            KeyMaterial::RsaPublic { attrs, .. }
            | KeyMaterial::RsaPrivate { attrs, .. }
            | KeyMaterial::EcPublic { attrs, .. }
            | KeyMaterial::EcPrivate { attrs, .. }
            | KeyMaterial::Symmetric { attrs, .. } => attrs,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut KeyAttributes {
        match self {
            KeyMaterial::RsaPublic { attrs, .. }
            | KeyMaterial::RsaPrivate { attrs, .. }
            | KeyMaterial::EcPublic { attrs, .. }
            | KeyMaterial::EcPrivate { attrs, .. }
            | KeyMaterial::Symmetric { attrs, .. } => attrs,
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.attributes().kid.as_deref()
    }

    pub fn set_kid(&mut self, kid: &str) {
        self.attributes_mut().kid = Some(kid.to_string());
    }

    pub fn key_class(&self) -> KeyClass {
        match self {
            KeyMaterial::RsaPublic { .. } | KeyMaterial::EcPublic { .. } => KeyClass::Public,
            KeyMaterial::RsaPrivate { .. } | KeyMaterial::EcPrivate { .. } => KeyClass::Private,
            KeyMaterial::Symmetric { .. } => KeyClass::Secret,
        }
    }

    /// True if the key's declared usage set permits `usage`.
    /// A key with no declared `key_ops` is unrestricted.
    pub fn allows(&self, usage: KeyUsage) -> bool {
        let ops = &self.attributes().key_ops;
        ops.is_empty() || ops.contains(&usage)
    }

    /// The public counterpart of a private key, with usages mapped to the
    /// public side (sign → verify, decrypt → encrypt, unwrapKey → wrapKey).
    /// `None` for public and symmetric keys.
    pub fn public_half(&self) -> Option<KeyMaterial> {
        let mut attrs = self.attributes().clone();
        attrs.key_ops = attrs
            .key_ops
            .iter()
            .map(|u| match u {
                KeyUsage::Sign => KeyUsage::Verify,
                KeyUsage::Decrypt => KeyUsage::Encrypt,
                KeyUsage::UnwrapKey => KeyUsage::WrapKey,
                other => *other,
            })
            .collect();

        match self {
            KeyMaterial::RsaPrivate { key, .. } => Some(KeyMaterial::RsaPublic {
                attrs,
                key: RsaPublicMaterial {
                    n: key.n.clone(),
                    e: key.e.clone(),
                },
            }),
            KeyMaterial::EcPrivate { key, .. } => Some(KeyMaterial::EcPublic {
                attrs,
                key: EcPublicMaterial {
                    crv: key.crv.clone(),
                    x: key.x.clone(),
                    y: key.y.clone(),
                },
            }),
            _ => None,
        }
    }
}

/// Wire-level JWK with every field optional. Deserialization goes through
/// this shadow struct and is classified into [`KeyMaterial`] in `TryFrom`,
/// so malformed combinations are rejected in one place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_ops: Vec<KeyUsage>,

    // RSA
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,

    // EC
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    // Shared by RSA and EC private keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,

    // Symmetric
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
}

fn require(field: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| CryptoError::KeyError(format!("JWK is missing required field '{field}'")))
}

impl TryFrom<Jwk> for KeyMaterial {
    type Error = CryptoError;

    fn try_from(jwk: Jwk) -> Result<Self> {
        let attrs = KeyAttributes {
            kid: jwk.kid,
            alg: jwk.alg,
            key_use: jwk.key_use,
            key_ops: jwk.key_ops,
        };

        match jwk.kty.as_str() {
            "RSA" => {
                let n = require("n", jwk.n)?;
                let e = require("e", jwk.e)?;
                if let Some(d) = jwk.d {
                    Ok(KeyMaterial::RsaPrivate {
                        attrs,
                        key: RsaPrivateMaterial {
                            n,
                            e,
                            d,
                            p: require("p", jwk.p)?,
                            q: require("q", jwk.q)?,
                            dp: require("dp", jwk.dp)?,
                            dq: require("dq", jwk.dq)?,
                            qi: require("qi", jwk.qi)?,
                        },
                    })
                } else {
                    Ok(KeyMaterial::RsaPublic {
                        attrs,
                        key: RsaPublicMaterial { n, e },
                    })
                }
            }
            "EC" => {
                let crv = require("crv", jwk.crv)?;
                let x = require("x", jwk.x)?;
                let y = require("y", jwk.y)?;
                if let Some(d) = jwk.d {
                    Ok(KeyMaterial::EcPrivate {
                        attrs,
                        key: EcPrivateMaterial { crv, x, y, d },
                    })
                } else {
                    Ok(KeyMaterial::EcPublic {
                        attrs,
                        key: EcPublicMaterial { crv, x, y },
                    })
                }
            }
            "oct" => Ok(KeyMaterial::Symmetric {
                attrs,
                key: SymmetricMaterial {
                    k: require("k", jwk.k)?,
                },
            }),
            other => Err(CryptoError::KeyError(format!(
                "Unsupported JWK key type: {other}"
            ))),
        }
    }
}

impl From<KeyMaterial> for Jwk {
    fn from(material: KeyMaterial) -> Self {
        let attrs = material.attributes().clone();
        let mut jwk = Jwk {
            kid: attrs.kid,
            alg: attrs.alg,
            key_use: attrs.key_use,
            key_ops: attrs.key_ops,
            ..Default::default()
        };

        match material {
            KeyMaterial::RsaPublic { key, .. } => {
                jwk.kty = "RSA".to_string();
                jwk.n = Some(key.n);
                jwk.e = Some(key.e);
            }
            KeyMaterial::RsaPrivate { key, .. } => {
                jwk.kty = "RSA".to_string();
                jwk.n = Some(key.n.clone());
                jwk.e = Some(key.e.clone());
                jwk.d = Some(key.d.clone());
                jwk.p = Some(key.p.clone());
                jwk.q = Some(key.q.clone());
                jwk.dp = Some(key.dp.clone());
                jwk.dq = Some(key.dq.clone());
                jwk.qi = Some(key.qi.clone());
            }
            KeyMaterial::EcPublic { key, .. } => {
                jwk.kty = "EC".to_string();
                jwk.crv = Some(key.crv);
                jwk.x = Some(key.x);
                jwk.y = Some(key.y);
            }
            KeyMaterial::EcPrivate { key, .. } => {
                jwk.kty = "EC".to_string();
                jwk.crv = Some(key.crv.clone());
                jwk.x = Some(key.x.clone());
                jwk.y = Some(key.y.clone());
                jwk.d = Some(key.d.clone());
            }
            KeyMaterial::Symmetric { key, .. } => {
                jwk.kty = "oct".to_string();
                jwk.k = Some(key.k.clone());
            }
        }

        jwk
    }
}
