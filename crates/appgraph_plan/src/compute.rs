//! Compute units and their registry.
//!
//! A compute unit names one external handler and carries the environment
//! through which it discovers the resources it was granted. Environment
//! values that point at resources stay references until emission, so the
//! executor can fill in names it generates at deploy time.

use crate::error::{EntityKind, GraphError, GraphResult};
use crate::resource::ResourceRegistry;
use appgraph_core::{ResourceId, UnitId};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

static ENV_KEY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("env key pattern is valid"));

/// Runtime used when none is given
pub const DEFAULT_RUNTIME: &str = "nodejs16.x";

/// Exported handler symbol used when none is given
pub const DEFAULT_EXPORT: &str = "handler";

/// Attribute of a resource that can flow into an environment variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceAttribute {
    /// Provider-side name (generated unless fixed at declaration)
    #[default]
    Name,
    /// Provider locator of the resource
    Uri,
}

impl fmt::Display for ResourceAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Uri => write!(f, "uri"),
        }
    }
}

/// Environment value of a compute unit
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EnvValue {
    /// Literal string baked into the declaration
    Literal(String),
    /// Attribute of a declared resource, resolved at emission
    Reference {
        /// Referenced resource
        resource: ResourceId,
        /// Referenced attribute
        attribute: ResourceAttribute,
    },
}

impl EnvValue {
    /// Literal value
    #[must_use]
    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }

    /// Reference to the name of a resource
    #[must_use]
    pub fn name_of(resource: ResourceId) -> Self {
        Self::Reference {
            resource,
            attribute: ResourceAttribute::Name,
        }
    }

    /// Referenced resource, if this is a reference
    #[must_use]
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            Self::Reference { resource, .. } => Some(resource),
            Self::Literal(_) => None,
        }
    }
}

/// Location of the handler code for a compute unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerRef {
    /// Source entry point
    pub entry: String,
    /// Exported handler symbol
    pub export: String,
}

impl HandlerRef {
    /// Handler at `entry` exporting the default symbol
    #[must_use]
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
            export: DEFAULT_EXPORT.to_string(),
        }
    }

    /// Use a different exported symbol
    #[must_use]
    pub fn with_export(mut self, export: impl Into<String>) -> Self {
        self.export = export.into();
        self
    }
}

/// Bundling options passed through to the packager
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bundling {
    /// Minify the bundle
    #[serde(default)]
    pub minify: bool,
    /// Modules left out of the bundle
    #[serde(default)]
    pub external_modules: Vec<String>,
}

/// Memory budget bounds in MiB (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBounds {
    /// Minimum budget
    pub min: u32,
    /// Maximum budget
    pub max: Option<u32>,
}

impl MemoryBounds {
    /// Any positive budget
    #[must_use]
    pub fn new() -> Self {
        Self { min: 1, max: None }
    }

    /// Set minimum (never below 1)
    #[must_use]
    pub fn with_min(mut self, min: u32) -> Self {
        self.min = min.max(1);
        self
    }

    /// Set maximum
    #[must_use]
    pub fn with_max(mut self, max: u32) -> Self {
        self.max = Some(max);
        self
    }

    /// Check a budget, returning the reason it is rejected
    ///
    /// # Errors
    ///
    /// Returns a description of the violated bound
    pub fn check(&self, budget: u32) -> Result<(), String> {
        if budget == 0 {
            return Err("must be positive".to_string());
        }
        if budget < self.min {
            return Err(format!("below minimum of {} MiB", self.min));
        }
        if let Some(max) = self.max {
            if budget > max {
                return Err(format!("above maximum of {} MiB", max));
            }
        }
        Ok(())
    }
}

impl Default for MemoryBounds {
    fn default() -> Self {
        Self::new()
    }
}

/// A declared compute unit. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ComputeUnit {
    id: UnitId,
    handler: HandlerRef,
    runtime: String,
    memory_mb: u32,
    environment: BTreeMap<String, EnvValue>,
    bundling: Bundling,
}

impl ComputeUnit {
    /// Create a unit with an empty environment
    #[must_use]
    pub fn new(id: UnitId, handler: HandlerRef, memory_mb: u32) -> Self {
        Self {
            id,
            handler,
            runtime: DEFAULT_RUNTIME.to_string(),
            memory_mb,
            environment: BTreeMap::new(),
            bundling: Bundling::default(),
        }
    }

    /// Add an environment variable
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.environment.insert(key.into(), value);
        self
    }

    /// Set the runtime
    #[must_use]
    pub fn with_runtime(mut self, runtime: impl Into<String>) -> Self {
        self.runtime = runtime.into();
        self
    }

    /// Set bundling options
    #[must_use]
    pub fn with_bundling(mut self, bundling: Bundling) -> Self {
        self.bundling = bundling;
        self
    }

    /// Unit identifier
    #[must_use]
    pub fn id(&self) -> &UnitId {
        &self.id
    }

    /// Handler reference
    #[must_use]
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    /// Runtime
    #[must_use]
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Memory budget in MiB
    #[must_use]
    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    /// Environment, sorted by key
    #[must_use]
    pub fn environment(&self) -> &BTreeMap<String, EnvValue> {
        &self.environment
    }

    /// Bundling options
    #[must_use]
    pub fn bundling(&self) -> &Bundling {
        &self.bundling
    }

    /// Resources referenced from the environment, with the referencing key
    pub fn references(&self) -> impl Iterator<Item = (&str, &ResourceId)> {
        self.environment
            .iter()
            .filter_map(|(key, value)| value.resource().map(|r| (key.as_str(), r)))
    }
}

/// Check that environment keys are valid variable names
pub(crate) fn check_env_keys(unit: &ComputeUnit) -> Vec<GraphError> {
    unit.environment
        .keys()
        .filter(|key| !ENV_KEY_PATTERN.is_match(key))
        .map(|key| GraphError::InvalidEnvironmentKey {
            unit: unit.id.clone(),
            key: key.clone(),
        })
        .collect()
}

/// Check that every environment reference names a declared resource
pub(crate) fn check_references(unit: &ComputeUnit, resources: &ResourceRegistry) -> Vec<GraphError> {
    unit.references()
        .filter(|(_, resource)| !resources.contains(resource))
        .map(|(key, resource)| GraphError::UnresolvedResourceReference {
            unit: unit.id.clone(),
            key: key.to_string(),
            resource: resource.clone(),
        })
        .collect()
}

/// Registry of declared compute units, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputeRegistry {
    units: IndexMap<UnitId, ComputeUnit>,
    bounds: MemoryBounds,
}

impl ComputeRegistry {
    /// Create an empty registry accepting any positive memory budget
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict accepted memory budgets
    #[must_use]
    pub fn with_memory_bounds(mut self, bounds: MemoryBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Configured memory bounds
    #[must_use]
    pub fn memory_bounds(&self) -> MemoryBounds {
        self.bounds
    }

    /// Declare a compute unit
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentifier`, `InvalidMemoryBudget`,
    /// `InvalidEnvironmentKey` or `UnresolvedResourceReference`.
    /// The registry is unchanged on error.
    pub fn declare(
        &mut self,
        unit: ComputeUnit,
        resources: &ResourceRegistry,
    ) -> GraphResult<&ComputeUnit> {
        if self.units.contains_key(unit.id()) {
            return Err(GraphError::DuplicateIdentifier {
                id: unit.id().to_string(),
                existing: EntityKind::ComputeUnit,
            });
        }
        self.bounds
            .check(unit.memory_mb)
            .map_err(|reason| GraphError::InvalidMemoryBudget {
                unit: unit.id.clone(),
                budget: unit.memory_mb.into(),
                reason,
            })?;
        if let Some(err) = check_env_keys(&unit).into_iter().next() {
            return Err(err);
        }
        if let Some(err) = check_references(&unit, resources).into_iter().next() {
            return Err(err);
        }

        debug!(
            unit = %unit.id(),
            memory_mb = unit.memory_mb,
            env = unit.environment.len(),
            "declared compute unit"
        );
        let (index, _) = self.units.insert_full(unit.id().clone(), unit);
        Ok(&self.units[index])
    }

    /// Insert without checks, handing back a displaced unit
    pub(crate) fn insert_unchecked(&mut self, unit: ComputeUnit) -> Option<ComputeUnit> {
        if self.units.contains_key(unit.id()) {
            return Some(unit);
        }
        self.units.insert(unit.id().clone(), unit);
        None
    }

    /// Look up a unit
    #[must_use]
    pub fn get(&self, id: &UnitId) -> Option<&ComputeUnit> {
        self.units.get(id)
    }

    /// Check whether a unit is declared
    #[must_use]
    pub fn contains(&self, id: &UnitId) -> bool {
        self.units.contains_key(id)
    }

    /// Check whether any unit uses this name
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.units.keys().any(|id| id.as_str() == name)
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &ComputeUnit> {
        self.units.values()
    }

    /// Number of declared units
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
