//! Content fingerprints for emitted assets.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("Fingerprint mismatch: expected {expected}, actual {actual}")]
    Mismatch { expected: String, actual: String },

    #[error("Invalid fingerprint format: {0}")]
    InvalidFormat(String),
}

/// Lowercase hex SHA-256 of an asset's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprints the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parses a hex fingerprint, normalizing it to lowercase.
    pub fn parse(hex: &str) -> Result<Self, IntegrityError> {
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IntegrityError::InvalidFormat(hex.to_string()));
        }
        Ok(Self(hex.to_ascii_lowercase()))
    }

    /// Returns the full hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `len` hex characters (the `[contenthash:N]` form).
    pub fn short(&self, len: usize) -> &str {
        &self.0[..len.min(self.0.len())]
    }

    /// Checks that `bytes` hash to this fingerprint.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), IntegrityError> {
        let actual = Self::of(bytes);
        if actual == *self {
            Ok(())
        } else {
            Err(IntegrityError::Mismatch {
                expected: self.0.clone(),
                actual: actual.0,
            })
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
