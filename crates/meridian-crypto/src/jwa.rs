//! JOSE algorithm (JWA, RFC 7518) name translation
//!
//! Converts between JOSE identifiers and [`Algorithm`] descriptors. The
//! mapping is deliberately closed: an identifier outside the supported set is
//! an error rather than a passthrough.

use crate::{Algorithm, CryptoError, HashAlg, error::Result};

/// Parse a JOSE algorithm identifier into an [`Algorithm`] descriptor
pub fn from_jwa(name: &str) -> Result<Algorithm> {
    let alg = match name.to_uppercase().as_str() {
        "RS256" => Algorithm::new("RS256").with_hash(HashAlg::Sha256),
        "RS384" => Algorithm::new("RS384").with_hash(HashAlg::Sha384),
        "RS512" => Algorithm::new("RS512").with_hash(HashAlg::Sha512),
        "HS256" => Algorithm::new("HS256").with_hash(HashAlg::Sha256),
        "HS384" => Algorithm::new("HS384").with_hash(HashAlg::Sha384),
        "HS512" => Algorithm::new("HS512").with_hash(HashAlg::Sha512),
        "ES256K" => Algorithm::new("ES256K")
            .with_hash(HashAlg::Sha256)
            .with_curve("secp256k1"),
        "RSA-OAEP" => Algorithm::new("RSA-OAEP").with_hash(HashAlg::Sha1),
        "RSA-OAEP-256" => Algorithm::new("RSA-OAEP-256").with_hash(HashAlg::Sha256),
        "A128GCM" => Algorithm::new("A128GCM").with_tag_length(128),
        "A256GCM" => Algorithm::new("A256GCM").with_tag_length(128),
        other => {
            return Err(CryptoError::UnknownAlgorithm(format!(
                "Unsupported JWA identifier: {other}"
            )));
        }
    };
    Ok(alg)
}

/// The JOSE identifier for an [`Algorithm`] descriptor
pub fn to_jwa(algorithm: &Algorithm) -> Result<String> {
    match algorithm.name() {
        name @ ("RS256" | "RS384" | "RS512" | "HS256" | "HS384" | "HS512" | "ES256K"
        | "RSA-OAEP" | "RSA-OAEP-256" | "A128GCM" | "A256GCM") => Ok(name.to_string()),
        other => Err(CryptoError::UnknownAlgorithm(format!(
            "No JWA identifier for algorithm {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn es256k_carries_curve_and_hash() {
        let alg = from_jwa("ES256K").unwrap();
        assert_eq!(alg.name(), "ES256K");
        assert_eq!(alg.hash, Some(HashAlg::Sha256));
        assert_eq!(alg.curve.as_deref(), Some("secp256k1"));
    }

    #[test]
    fn round_trips_for_supported_names() {
        for name in [
            "RS256", "RS384", "RS512", "HS256", "HS384", "HS512", "ES256K", "RSA-OAEP",
            "RSA-OAEP-256", "A128GCM", "A256GCM",
        ] {
            let alg = from_jwa(name).unwrap();
            assert_eq!(to_jwa(&alg).unwrap(), name);
        }
    }

    #[test]
    fn lowercase_input_accepted() {
        assert!(from_jwa("hs256").is_ok());
    }

    #[test]
    fn eddsa_is_unsupported() {
        assert!(matches!(
            from_jwa("EdDSA"),
            Err(CryptoError::UnknownAlgorithm(_))
        ));
    }
}
