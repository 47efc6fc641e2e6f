//! Capability types for least-privilege grants.
//!
//! A grant names a single [`Capability`] on a resource. [`Access`] is the
//! author-facing form, where `read-write` expands to both capabilities.
//! Each capability lowers to a fixed list of concrete actions per
//! [`ResourceKind`], which is the minimal grant handed to the executor.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Kind of a declared resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    /// Object store (bucket of keyed blobs)
    ObjectStore,
    /// Key-value table with a partition key
    KeyedTable,
}

impl ResourceKind {
    /// All resource kinds, in canonical order
    pub const ALL: [ResourceKind; 2] = [ResourceKind::ObjectStore, ResourceKind::KeyedTable];

    /// Get the canonical name of the kind
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ObjectStore => "object-store",
            Self::KeyedTable => "keyed-table",
        }
    }

    /// Concrete actions implied by a capability on this kind
    #[must_use]
    pub fn actions(&self, capability: Capability) -> &'static [&'static str] {
        match (self, capability) {
            (Self::ObjectStore, Capability::Read) => &[
                "object:GetBucket*",
                "object:GetObject*",
                "object:List*",
            ],
            (Self::ObjectStore, Capability::Write) => &[
                "object:Abort*",
                "object:DeleteObject*",
                "object:PutObject",
                "object:PutObjectLegalHold",
                "object:PutObjectRetention",
                "object:PutObjectTagging",
                "object:PutObjectVersionTagging",
            ],
            (Self::KeyedTable, Capability::Read) => &[
                "table:BatchGetItem",
                "table:ConditionCheckItem",
                "table:DescribeTable",
                "table:GetItem",
                "table:GetRecords",
                "table:GetShardIterator",
                "table:Query",
                "table:Scan",
            ],
            (Self::KeyedTable, Capability::Write) => &[
                "table:BatchWriteItem",
                "table:DeleteItem",
                "table:DescribeTable",
                "table:PutItem",
                "table:UpdateItem",
            ],
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "object-store" => Ok(Self::ObjectStore),
            "keyed-table" => Ok(Self::KeyedTable),
            other => Err(CoreError::InvalidKind {
                value: other.to_string(),
            }),
        }
    }
}

/// A single access right on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Read data from the resource
    Read,
    /// Write or delete data in the resource
    Write,
}

impl Capability {
    /// Get the canonical name of the capability
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Requested access, as written by the author of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
    /// Read only
    Read,
    /// Write only
    Write,
    /// Read and write, issued as two grants
    ReadWrite,
}

impl Access {
    /// Expand into the capabilities it stands for
    #[must_use]
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Read => &[Capability::Read],
            Self::Write => &[Capability::Write],
            Self::ReadWrite => &[Capability::Read, Capability::Write],
        }
    }
}

impl From<Capability> for Access {
    fn from(capability: Capability) -> Self {
        match capability {
            Capability::Read => Self::Read,
            Capability::Write => Self::Write,
        }
    }
}

impl FromStr for Access {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "read-write" => Ok(Self::ReadWrite),
            other => Err(CoreError::InvalidCapability {
                value: other.to_string(),
            }),
        }
    }
}

/// Which capabilities each resource kind accepts.
///
/// The default matrix accepts every capability on every kind. Deployments
/// that forbid, say, reading from a write-only audit table restrict it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSupport {
    supported: BTreeMap<ResourceKind, BTreeSet<Capability>>,
}

impl KindSupport {
    /// Matrix that accepts every capability on every kind
    #[must_use]
    pub fn permissive() -> Self {
        let all: BTreeSet<Capability> = [Capability::Read, Capability::Write].into();
        Self {
            supported: ResourceKind::ALL
                .iter()
                .map(|kind| (*kind, all.clone()))
                .collect(),
        }
    }

    /// Replace the capabilities accepted by one kind
    #[must_use]
    pub fn with_kind(mut self, kind: ResourceKind, capabilities: &[Capability]) -> Self {
        self.supported
            .insert(kind, capabilities.iter().copied().collect());
        self
    }

    /// Check whether a kind accepts a capability
    #[must_use]
    pub fn supports(&self, kind: ResourceKind, capability: Capability) -> bool {
        self.supported
            .get(&kind)
            .is_some_and(|caps| caps.contains(&capability))
    }
}

impl Default for KindSupport {
    fn default() -> Self {
        Self::permissive()
    }
}
