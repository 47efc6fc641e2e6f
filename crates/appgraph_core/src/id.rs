//! Identifiers for APPGRAPH entities.
//!
//! Identifiers are logical names chosen by the author of a graph. They are
//! stable across runs, so the same declaration calls always produce the same
//! identifiers and the same emitted bytes.

use crate::error::{CoreError, CoreResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum identifier length in bytes
pub const MAX_ID_LEN: usize = 128;

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").expect("identifier pattern is valid"));

fn check_identifier(value: &str) -> CoreResult<()> {
    let reason = if value.is_empty() {
        "must not be empty"
    } else if value.len() > MAX_ID_LEN {
        "longer than 128 bytes"
    } else if !ID_PATTERN.is_match(value) {
        "must start with a letter and contain only letters, digits, '-' or '_'"
    } else {
        return Ok(());
    };
    Err(CoreError::InvalidId {
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

/// Resource identifier - names a bucket or table in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceId(String);

impl ResourceId {
    /// Create a resource identifier
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty, too long or contains invalid characters
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        check_identifier(&name)?;
        Ok(Self(name))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ResourceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourceId> for String {
    fn from(id: ResourceId) -> Self {
        id.0
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Compute unit identifier - names a request handler in the graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

impl UnitId {
    /// Create a compute unit identifier
    ///
    /// # Errors
    ///
    /// Returns error if the name is empty, too long or contains invalid characters
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        check_identifier(&name)?;
        Ok(Self(name))
    }

    /// Get as string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UnitId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UnitId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

impl AsRef<str> for UnitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_creation() {
        let id = ResourceId::new("SaladBucket").unwrap();
        assert_eq!(id.as_str(), "SaladBucket");
        assert_eq!(format!("{}", id), "SaladBucket");

        let unit: UnitId = "Create-Order_1".parse().unwrap();
        assert_eq!(unit.as_str(), "Create-Order_1");
    }

    #[test]
    fn test_id_rejects_invalid() {
        assert!(ResourceId::new("").is_err());
        assert!(ResourceId::new("1bucket").is_err());
        assert!(UnitId::new("has space").is_err());
        assert!(UnitId::new("a/b").is_err());
        assert!(UnitId::new("x".repeat(MAX_ID_LEN + 1)).is_err());
        assert!(UnitId::new("x".repeat(MAX_ID_LEN)).is_ok());
    }

    #[test]
    fn test_id_serde_validates() {
        let id: ResourceId = serde_json::from_str("\"Orders\"").unwrap();
        assert_eq!(id.as_str(), "Orders");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"Orders\"");

        let bad = serde_json::from_str::<UnitId>("\"not valid\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_id_ord() {
        let a = UnitId::new("Alpha").unwrap();
        let b = UnitId::new("Beta").unwrap();
        // IDs are comparable for deterministic ordering
        assert!(a < b);
    }
}
