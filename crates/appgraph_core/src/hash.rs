//! Fingerprints of emitted declarations.
//!
//! Uses BLAKE3 over the canonical declaration bytes. Two emissions of the
//! same graph must yield the same fingerprint.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 fingerprint (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// The number of bytes in a fingerprint
    pub const LEN: usize = 32;

    /// Compute the fingerprint of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    ///
    /// Returns error if hex is invalid or not 32 bytes
    pub fn from_hex(hex: &str) -> Result<Self, FingerprintError> {
        let bytes = hex::decode(hex).map_err(|_| FingerprintError::InvalidHex)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| FingerprintError::InvalidLength(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Check if the fingerprint matches data
    #[must_use]
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute(data) == *self
    }

    /// Short form used in logs
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Fingerprint {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.to_hex()
    }
}

/// Fingerprint parsing errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintError {
    /// Invalid hex encoding
    InvalidHex,
    /// Invalid length (not 32 bytes)
    InvalidLength(usize),
}

impl std::error::Error for FingerprintError {}

impl fmt::Display for FingerprintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidHex => write!(f, "Invalid hex encoding"),
            Self::InvalidLength(len) => {
                write!(f, "Invalid fingerprint length: {} (expected 32)", len)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fingerprint_compute() {
        let a = Fingerprint::compute(b"declaration");
        let b = Fingerprint::compute(b"declaration");
        assert_eq!(a, b);
        assert_ne!(a, Fingerprint::compute(b"declaration "));
        assert!(a.verify(b"declaration"));
    }

    #[test]
    fn test_fingerprint_hex() {
        let fp = Fingerprint::compute(b"orders");
        let hex = fp.to_hex();
        assert_eq!(hex.len(), 64);
        assert_eq!(Fingerprint::from_hex(&hex).unwrap(), fp);
        assert!(hex.starts_with(&fp.short()));
    }

    #[test]
    fn test_fingerprint_bad_hex() {
        assert_eq!(Fingerprint::from_hex("zz"), Err(FingerprintError::InvalidHex));
        assert_eq!(
            Fingerprint::from_hex("abcd"),
            Err(FingerprintError::InvalidLength(2))
        );
    }

    #[test]
    fn test_fingerprint_serde_as_hex() {
        let fp = Fingerprint::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", "07".repeat(32)));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    proptest! {
        #[test]
        fn prop_fingerprint_deterministic(data: Vec<u8>) {
            prop_assert_eq!(Fingerprint::compute(&data), Fingerprint::compute(&data));
        }
    }
}
