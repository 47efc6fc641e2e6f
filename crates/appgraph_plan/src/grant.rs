//! Permission grants.
//!
//! Grants are plain `(subject, object, capability)` triples. Nothing is
//! inferred: a unit holds exactly the capabilities it was granted, and
//! granting the same triple twice is a no-op.

use crate::compute::ComputeRegistry;
use crate::error::{GraphError, GraphResult};
use crate::resource::ResourceRegistry;
use appgraph_core::{Access, Capability, ResourceId, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::debug;

/// A unit may exercise a capability on a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Grant {
    /// Compute unit receiving the capability
    pub subject: UnitId,
    /// Resource the capability applies to
    pub object: ResourceId,
    /// Granted capability
    pub capability: Capability,
}

impl Grant {
    /// Create a grant
    #[must_use]
    pub fn new(subject: UnitId, object: ResourceId, capability: Capability) -> Self {
        Self {
            subject,
            object,
            capability,
        }
    }
}

/// Set of grants, ordered by subject, object, capability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantEngine {
    grants: BTreeSet<Grant>,
}

impl GrantEngine {
    /// Create an empty engine
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant access, returning how many new triples were recorded
    ///
    /// `ReadWrite` records both capabilities or neither.
    ///
    /// # Errors
    ///
    /// Returns `UnknownSubject` or `UnknownObject` if either side is undeclared
    pub fn grant(
        &mut self,
        subject: &UnitId,
        object: &ResourceId,
        access: Access,
        units: &ComputeRegistry,
        resources: &ResourceRegistry,
    ) -> GraphResult<usize> {
        if !units.contains(subject) {
            return Err(GraphError::UnknownSubject {
                unit: subject.clone(),
            });
        }
        if !resources.contains(object) {
            return Err(GraphError::UnknownObject {
                resource: object.clone(),
            });
        }

        let added = access
            .capabilities()
            .iter()
            .filter(|cap| {
                self.grants
                    .insert(Grant::new(subject.clone(), object.clone(), **cap))
            })
            .count();
        debug!(%subject, %object, ?access, added, "granted access");
        Ok(added)
    }

    /// Insert a triple without checking either side
    pub(crate) fn insert_unchecked(&mut self, grant: Grant) -> bool {
        self.grants.insert(grant)
    }

    /// Check whether a triple is granted
    #[must_use]
    pub fn has(&self, subject: &UnitId, object: &ResourceId, capability: Capability) -> bool {
        self.grants
            .contains(&Grant::new(subject.clone(), object.clone(), capability))
    }

    /// Grants held by one unit
    pub fn for_subject<'a>(&'a self, subject: &'a UnitId) -> impl Iterator<Item = &'a Grant> + 'a {
        self.grants.iter().filter(move |g| &g.subject == subject)
    }

    /// Iterate in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    /// Number of grants
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}
