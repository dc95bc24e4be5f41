//! Integrity hashing
//!
//! Audit hashes are SHA-256 over the RFC 8785 canonical JSON form of a value,
//! hex-encoded. Canonicalization makes the digest independent of field order, so
//! an entry read back from storage hashes to the same value it was written with.

use crate::error::{Result, StrataError};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256 over JCS canonical JSON, lowercase hex.
    Sha256Jcs,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256Jcs => "sha256-jcs-v1",
        }
    }
}

/// Algorithm used for every audit integrity hash.
pub const AUDIT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha256Jcs;

pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_jcs::to_vec(value).map_err(|e| StrataError::Hashing(e.to_string()))
}

/// Compute SHA256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

pub fn hash_canonical_json<T: Serialize + ?Sized>(
    algorithm: HashAlgorithm,
    value: &T,
) -> Result<String> {
    match algorithm {
        HashAlgorithm::Sha256Jcs => {
            let bytes = canonical_json_bytes(value)?;
            Ok(compute_hash(&bytes))
        }
    }
}
