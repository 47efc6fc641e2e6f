//! Assembly errors.
//!
//! Every builder call fails fast with one of these. The validator collects
//! the same variants into a [`ValidationReport`](crate::ValidationReport).

use crate::route::Method;
use appgraph_core::{Capability, CoreError, ResourceId, ResourceKind, UnitId};
use std::fmt;

/// Result type for graph assembly
pub type GraphResult<T> = Result<T, GraphError>;

/// Which registry an identifier lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A storage resource
    Resource,
    /// A compute unit
    ComputeUnit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "resource"),
            Self::ComputeUnit => write!(f, "compute unit"),
        }
    }
}

/// Graph assembly error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Identifier already used by a resource or compute unit
    #[error("duplicate identifier '{id}': already declared as a {existing}")]
    DuplicateIdentifier { id: String, existing: EntityKind },

    /// Environment value references a resource that is not declared
    #[error("compute unit '{unit}' env '{key}' references undeclared resource '{resource}'")]
    UnresolvedResourceReference {
        unit: UnitId,
        key: String,
        resource: ResourceId,
    },

    /// Environment key is not a valid variable name
    #[error("compute unit '{unit}' has invalid environment key '{key}'")]
    InvalidEnvironmentKey { unit: UnitId, key: String },

    /// Kind-specific properties given for a resource of another kind
    #[error("{kind} '{resource}' cannot carry {properties} properties")]
    MismatchedProperties {
        resource: ResourceId,
        kind: ResourceKind,
        properties: &'static str,
    },

    /// Grant subject is not a declared compute unit
    #[error("grant subject '{unit}' is not a declared compute unit")]
    UnknownSubject { unit: UnitId },

    /// Grant object is not a declared resource
    #[error("grant object '{resource}' is not a declared resource")]
    UnknownObject { resource: ResourceId },

    /// Memory budget is not positive or outside the configured bounds
    #[error("compute unit '{unit}' has invalid memory budget {budget} MiB: {reason}")]
    InvalidMemoryBudget {
        unit: UnitId,
        budget: i64,
        reason: String,
    },

    /// The (path, method) pair is already bound
    #[error("{method} {path} is already bound to '{existing}'")]
    DuplicateBinding {
        path: String,
        method: Method,
        existing: UnitId,
    },

    /// Route binding targets a compute unit that is not declared
    #[error("{method} {path} targets undeclared compute unit '{unit}'")]
    UnknownComputeUnit {
        path: String,
        method: Method,
        unit: UnitId,
    },

    /// Capability not accepted by the resource kind
    #[error("{kind} '{resource}' does not support {capability} (granted to '{unit}')")]
    UnsupportedCapability {
        unit: UnitId,
        resource: ResourceId,
        kind: ResourceKind,
        capability: Capability,
    },

    /// Path segment is malformed
    #[error("invalid path segment '{segment}': {reason}")]
    InvalidPathSegment { segment: String, reason: String },

    /// Two different parameter names at the same level of the route tree
    #[error("parameter '{{{new}}}' under '{path}' conflicts with existing '{{{existing}}}'")]
    ConflictingParameter {
        path: String,
        existing: String,
        new: String,
    },

    /// Route node handle does not belong to this table
    #[error("route node #{0} does not exist")]
    UnknownRouteNode(usize),

    /// Identifier or capability failed to parse
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GraphError {
    /// Validation stage that reports this error: declarations, links,
    /// routes, then kind support
    #[must_use]
    pub fn stage(&self) -> u8 {
        match self {
            Self::DuplicateIdentifier { .. }
            | Self::InvalidEnvironmentKey { .. }
            | Self::MismatchedProperties { .. }
            | Self::InvalidMemoryBudget { .. }
            | Self::Core(_) => 0,
            Self::UnresolvedResourceReference { .. }
            | Self::UnknownSubject { .. }
            | Self::UnknownObject { .. } => 1,
            Self::DuplicateBinding { .. }
            | Self::UnknownComputeUnit { .. }
            | Self::InvalidPathSegment { .. }
            | Self::ConflictingParameter { .. }
            | Self::UnknownRouteNode(_) => 2,
            Self::UnsupportedCapability { .. } => 3,
        }
    }

    /// Short name of the violated invariant, stable for tooling
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateIdentifier { .. } => "DuplicateIdentifier",
            Self::UnresolvedResourceReference { .. } => "UnresolvedResourceReference",
            Self::InvalidEnvironmentKey { .. } => "InvalidEnvironmentKey",
            Self::UnknownSubject { .. } => "UnknownSubject",
            Self::UnknownObject { .. } => "UnknownObject",
            Self::InvalidMemoryBudget { .. } => "InvalidMemoryBudget",
            Self::MismatchedProperties { .. } => "MismatchedProperties",
            Self::DuplicateBinding { .. } => "DuplicateBinding",
            Self::UnknownComputeUnit { .. } => "UnknownComputeUnit",
            Self::UnsupportedCapability { .. } => "UnsupportedCapability",
            Self::InvalidPathSegment { .. } => "InvalidPathSegment",
            Self::ConflictingParameter { .. } => "ConflictingParameter",
            Self::UnknownRouteNode(_) => "UnknownRouteNode",
            Self::Core(CoreError::InvalidId { .. }) => "InvalidIdentifier",
            Self::Core(CoreError::InvalidCapability { .. }) => "InvalidAccess",
            Self::Core(CoreError::InvalidKind { .. }) => "InvalidKind",
            Self::Core(_) => "InvalidValue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_identifier() {
        let err = GraphError::UnresolvedResourceReference {
            unit: UnitId::new("GetOrder").unwrap(),
            key: "TABLE_NAME".to_string(),
            resource: ResourceId::new("Missing").unwrap(),
        };
        let s = err.to_string();
        assert!(s.contains("GetOrder"));
        assert!(s.contains("TABLE_NAME"));
        assert!(s.contains("Missing"));
        assert_eq!(err.code(), "UnresolvedResourceReference");
    }

    #[test]
    fn test_stage_follows_check_order() {
        let duplicate = GraphError::DuplicateIdentifier {
            id: "Table".to_string(),
            existing: EntityKind::Resource,
        };
        let object = GraphError::UnknownObject {
            resource: ResourceId::new("Gone").unwrap(),
        };
        let route = GraphError::UnknownRouteNode(7);
        let mismatched = GraphError::MismatchedProperties {
            resource: ResourceId::new("Bucket").unwrap(),
            kind: ResourceKind::ObjectStore,
            properties: "table",
        };
        assert!(duplicate.stage() < object.stage());
        assert!(object.stage() < route.stage());
        assert_eq!(mismatched.stage(), duplicate.stage());
        assert_eq!(
            mismatched.to_string(),
            "object-store 'Bucket' cannot carry table properties"
        );
        assert_eq!(mismatched.code(), "MismatchedProperties");
    }

    #[test]
    fn test_conflicting_parameter_display() {
        let err = GraphError::ConflictingParameter {
            path: "/orders".to_string(),
            existing: "id".to_string(),
            new: "orderId".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "parameter '{orderId}' under '/orders' conflicts with existing '{id}'"
        );
    }

    #[test]
    fn test_duplicate_display() {
        let err = GraphError::DuplicateIdentifier {
            id: "Orders".to_string(),
            existing: EntityKind::Resource,
        };
        assert_eq!(
            err.to_string(),
            "duplicate identifier 'Orders': already declared as a resource"
        );
    }
}
