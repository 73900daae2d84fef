//! JWS wire serializations per RFC 7515 section 7
//!
//! Three shapes: compact (`a.b.c`), flattened JSON (one signature) and
//! general JSON (any number). [`JwsToken::deserialize`] detects the shape
//! from the input itself.

use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::{JwsError, Result},
    token::{JwsSignature, JwsToken, decode_header},
};

static COMPACT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)\.([A-Za-z0-9_-]*)\.([A-Za-z0-9_-]+)$").expect("valid regex")
});

#[derive(Serialize, Deserialize)]
struct FlattenedJws {
    payload: String,
    protected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    header: Option<BTreeMap<String, Value>>,
    signature: String,
}

impl JwsToken {
    /// Compact serialization, `protected.payload.signature`. Requires exactly
    /// one signature entry with no unprotected header.
    pub fn serialize_compact(&self) -> Result<String> {
        let entry = self.single_signature()?;
        if entry.header.is_some() {
            return Err(JwsError::Serialization(
                "Compact serialization cannot carry an unprotected header".to_string(),
            ));
        }
        Ok(format!(
            "{}.{}.{}",
            entry.protected, self.payload, entry.signature
        ))
    }

    /// Flattened JSON serialization. Requires exactly one signature entry.
    pub fn serialize_flattened(&self) -> Result<String> {
        let entry = self.single_signature()?;
        let flat = FlattenedJws {
            payload: self.payload.clone(),
            protected: entry.protected.clone(),
            header: entry.header.clone(),
            signature: entry.signature.clone(),
        };
        serde_json::to_string(&flat).map_err(|e| JwsError::Serialization(e.to_string()))
    }

    /// General JSON serialization, valid for any number of signatures
    pub fn serialize_general(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| JwsError::Serialization(e.to_string()))
    }

    /// Parses a token from any of the three serializations
    pub fn deserialize(input: &str) -> Result<JwsToken> {
        let input = input.trim();

        if let Some(caps) = COMPACT.captures(input) {
            let (protected, payload, signature) = (&caps[1], &caps[2], &caps[3]);
            // Fail now if the header is not base64url JSON.
            decode_header(protected)?;
            return Ok(JwsToken {
                payload: payload.to_string(),
                signatures: vec![JwsSignature {
                    protected: protected.to_string(),
                    header: None,
                    signature: signature.to_string(),
                }],
            });
        }

        let value: Value = serde_json::from_str(input)
            .map_err(|e| JwsError::UnparseableToken(format!("Not compact and not JSON: {e}")))?;
        let object = value
            .as_object()
            .ok_or_else(|| JwsError::UnparseableToken("Expected a JSON object".to_string()))?;

        if object.contains_key("signatures") {
            serde_json::from_value(value)
                .map_err(|e| JwsError::UnparseableToken(format!("Bad general JWS: {e}")))
        } else if object.contains_key("signature") {
            let flat: FlattenedJws = serde_json::from_value(value)
                .map_err(|e| JwsError::UnparseableToken(format!("Bad flattened JWS: {e}")))?;
            Ok(JwsToken {
                payload: flat.payload,
                signatures: vec![JwsSignature {
                    protected: flat.protected,
                    header: flat.header,
                    signature: flat.signature,
                }],
            })
        } else {
            Err(JwsError::UnparseableToken(
                "JSON object is neither a general nor a flattened JWS".to_string(),
            ))
        }
    }

    fn single_signature(&self) -> Result<&JwsSignature> {
        match self.signatures.as_slice() {
            [entry] => Ok(entry),
            [] => Err(JwsError::Serialization(
                "Token has no signatures".to_string(),
            )),
            entries => Err(JwsError::Serialization(format!(
                "This serialization carries exactly one signature, token has {}",
                entries.len()
            ))),
        }
    }
}
