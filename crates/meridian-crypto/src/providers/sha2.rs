//! SHA-2 digest providers

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::{Algorithm, CryptoProvider, HashAlg, error::Result};

/// Software digest provider for one SHA-2 variant
pub struct Sha2Provider {
    name: &'static str,
    hash: HashAlg,
}

impl Sha2Provider {
    pub fn sha256() -> Self {
        Sha2Provider {
            name: "SHA-256",
            hash: HashAlg::Sha256,
        }
    }

    pub fn sha384() -> Self {
        Sha2Provider {
            name: "SHA-384",
            hash: HashAlg::Sha384,
        }
    }

    pub fn sha512() -> Self {
        Sha2Provider {
            name: "SHA-512",
            hash: HashAlg::Sha512,
        }
    }
}

impl CryptoProvider for Sha2Provider {
    fn name(&self) -> &str {
        self.name
    }

    fn on_digest(&self, _algorithm: &Algorithm, data: &[u8]) -> Result<Vec<u8>> {
        let digest = match self.hash {
            HashAlg::Sha256 => Sha256::digest(data).to_vec(),
            HashAlg::Sha384 => Sha384::digest(data).to_vec(),
            _ => Sha512::digest(data).to_vec(),
        };
        Ok(digest)
    }
}
