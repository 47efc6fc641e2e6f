//! Application manifests.
//!
//! A manifest describes a whole application in TOML (or JSON):
//!
//! ```toml
//! [app]
//! name = "orders"
//!
//! [[resources]]
//! id = "Table"
//! kind = "keyed-table"
//!
//! [[units]]
//! id = "GetOrder"
//! entry = "src/get-order.ts"
//! memory_mb = 1024
//! environment = { TABLE_NAME = { resource = "Table" } }
//!
//! [[grants]]
//! unit = "GetOrder"
//! resource = "Table"
//! access = "read"
//!
//! [[routes]]
//! method = "GET"
//! path = "/orders/{id}"
//! unit = "GetOrder"
//! ```
//!
//! Entries are replayed through the same builder calls a program would
//! make. Every failure is kept, and the validator's findings are added on
//! top, so one run shows every problem in the file.

use crate::api::ApiSettings;
use crate::compute::{Bundling, ComputeUnit, EnvValue, HandlerRef, MemoryBounds, ResourceAttribute};
use crate::error::{GraphError, GraphResult};
use crate::graph::{ApplicationGraph, ValidatedGraph};
use crate::resource::{Resource, RetentionPolicy, TableProperties};
use crate::route::Method;
use crate::validate::{ValidationReport, Validator};
use appgraph_core::{Access, ResourceId, ResourceKind, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Manifest loading failure
#[derive(Debug, Error)]
pub enum ManifestError {
    /// File could not be read
    #[error("failed to read manifest: {0}")]
    Io(#[from] std::io::Error),

    /// TOML syntax or shape error
    #[error("invalid TOML manifest: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or shape error
    #[error("invalid JSON manifest: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is neither `toml` nor `json`
    #[error("unsupported manifest format '{0}' (expected .toml or .json)")]
    UnsupportedFormat(String),

    /// The described graph is invalid
    #[error("manifest describes an invalid graph: {0}")]
    Invalid(ValidationReport),
}

/// `[app]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSection {
    /// Application name
    pub name: String,
    /// Smallest accepted memory budget in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_memory_mb: Option<u32>,
    /// Largest accepted memory budget in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory_mb: Option<u32>,
}

/// `[[resources]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEntry {
    /// Identifier
    pub id: String,
    /// `object-store` or `keyed-table`
    pub kind: String,
    /// Retention policy
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Fixed provider-side name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_name: Option<String>,
    /// Table properties, for keyed tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableProperties>,
}

/// Environment value in a manifest: a plain string or a resource reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvEntry {
    /// Literal string
    Literal(String),
    /// `{ resource = "...", attribute = "name" }`
    Reference {
        /// Referenced resource
        resource: String,
        /// Referenced attribute
        #[serde(default)]
        attribute: ResourceAttribute,
    },
}

/// `[[units]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitEntry {
    /// Identifier
    pub id: String,
    /// Handler source entry point
    pub entry: String,
    /// Exported handler symbol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<String>,
    /// Runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    /// Memory budget in MiB; signed so a bad value reaches validation
    pub memory_mb: i64,
    /// Environment
    #[serde(default)]
    pub environment: BTreeMap<String, EnvEntry>,
    /// Bundling options
    #[serde(default)]
    pub bundling: Bundling,
}

/// `[[grants]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEntry {
    /// Subject unit
    pub unit: String,
    /// Object resource
    pub resource: String,
    /// `read`, `write` or `read-write`
    pub access: String,
}

fn default_proxy() -> bool {
    true
}

/// `[[routes]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// HTTP method
    pub method: String,
    /// Route path, e.g. `/orders/{id}`
    pub path: String,
    /// Target unit
    pub unit: String,
    /// Proxy integration
    #[serde(default = "default_proxy")]
    pub proxy: bool,
}

/// Parsed manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Application section
    pub app: AppSection,
    /// API settings
    #[serde(default)]
    pub api: ApiSettings,
    /// Resources
    #[serde(default)]
    pub resources: Vec<ResourceEntry>,
    /// Compute units
    #[serde(default)]
    pub units: Vec<UnitEntry>,
    /// Grants
    #[serde(default)]
    pub grants: Vec<GrantEntry>,
    /// Routes
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl Manifest {
    /// Parse a TOML manifest
    ///
    /// # Errors
    ///
    /// Returns `Toml` for malformed input
    pub fn from_toml_str(input: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(input)?)
    }

    /// Parse a JSON manifest
    ///
    /// # Errors
    ///
    /// Returns `Json` for malformed input
    pub fn from_json_str(input: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Load a manifest, picking the format from the file extension
    ///
    /// # Errors
    ///
    /// Returns `Io`, `UnsupportedFormat` or a parse error
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let manifest = match extension.as_str() {
            "toml" => Self::from_toml_str(&std::fs::read_to_string(path)?)?,
            "json" => Self::from_json_str(&std::fs::read_to_string(path)?)?,
            other => return Err(ManifestError::UnsupportedFormat(other.to_string())),
        };
        info!(path = %path.display(), app = %manifest.app.name, "loaded manifest");
        Ok(manifest)
    }

    /// Memory bounds from the `[app]` section
    #[must_use]
    pub fn memory_bounds(&self) -> MemoryBounds {
        let bounds = MemoryBounds::new().with_min(self.app.min_memory_mb.unwrap_or(1));
        match self.app.max_memory_mb {
            Some(max) => bounds.with_max(max),
            None => bounds,
        }
    }

    /// Replay every entry through the builder, keeping every failure
    ///
    /// Resources are declared first, then units, grants and routes, so
    /// entries may appear in any order within the file.
    #[must_use]
    pub fn assemble(&self) -> (ApplicationGraph, Vec<GraphError>) {
        let mut graph = ApplicationGraph::new(self.app.name.clone())
            .with_api(self.api.clone())
            .with_memory_bounds(self.memory_bounds());
        let mut errors = Vec::new();

        for entry in &self.resources {
            if let Err(err) = declare_resource(&mut graph, entry) {
                errors.push(err);
            }
        }
        for entry in &self.units {
            if let Err(err) = declare_unit(&mut graph, entry) {
                errors.push(err);
            }
        }
        for entry in &self.grants {
            if let Err(err) = grant(&mut graph, entry) {
                errors.push(err);
            }
        }
        for entry in &self.routes {
            if let Err(err) = route(&mut graph, entry) {
                errors.push(err);
            }
        }

        debug!(app = %self.app.name, errors = errors.len(), "assembled manifest");
        (graph, errors)
    }

    /// Assemble and validate
    ///
    /// # Errors
    ///
    /// Returns `Invalid` with every assembly and validation failure
    pub fn build(&self, validator: &Validator) -> Result<ValidatedGraph, ManifestError> {
        let (graph, mut errors) = self.assemble();
        if errors.is_empty() {
            return validator.validate(graph).map_err(ManifestError::Invalid);
        }
        let (found, warnings) = validator.check(&graph);
        errors.extend(found);
        Err(ManifestError::Invalid(ValidationReport::new(errors, warnings)))
    }
}

fn declare_resource(graph: &mut ApplicationGraph, entry: &ResourceEntry) -> GraphResult<()> {
    let id = ResourceId::new(entry.id.as_str())?;
    let kind: ResourceKind = entry.kind.parse()?;
    let resource = match (kind, &entry.table) {
        (ResourceKind::KeyedTable, Some(props)) => {
            Resource::keyed_table(id, props.clone()).with_retention(entry.retention)
        }
        (ResourceKind::ObjectStore, Some(_)) => {
            return Err(GraphError::MismatchedProperties {
                resource: id,
                kind,
                properties: "table",
            });
        }
        (kind, None) => Resource::new(id, kind, entry.retention),
    };
    let resource = match &entry.physical_name {
        Some(name) => resource.with_physical_name(name.clone()),
        None => resource,
    };
    graph.declare_resource(resource)?;
    Ok(())
}

fn declare_unit(graph: &mut ApplicationGraph, entry: &UnitEntry) -> GraphResult<()> {
    let handler = match &entry.export {
        Some(export) => HandlerRef::new(entry.entry.clone()).with_export(export.clone()),
        None => HandlerRef::new(entry.entry.clone()),
    };
    let id = UnitId::new(entry.id.as_str())?;
    let memory_mb = memory_budget(&id, entry.memory_mb)?;
    let mut unit = ComputeUnit::new(id, handler, memory_mb).with_bundling(entry.bundling.clone());
    if let Some(runtime) = &entry.runtime {
        unit = unit.with_runtime(runtime.clone());
    }
    for (key, value) in &entry.environment {
        let value = match value {
            EnvEntry::Literal(text) => EnvValue::literal(text.clone()),
            EnvEntry::Reference {
                resource,
                attribute,
            } => EnvValue::Reference {
                resource: ResourceId::new(resource.as_str())?,
                attribute: *attribute,
            },
        };
        unit = unit.with_env(key.clone(), value);
    }
    graph.declare_unit(unit)?;
    Ok(())
}

fn memory_budget(unit: &UnitId, budget: i64) -> GraphResult<u32> {
    let invalid = |reason: String| GraphError::InvalidMemoryBudget {
        unit: unit.clone(),
        budget,
        reason,
    };
    if budget <= 0 {
        return Err(invalid("must be positive".to_string()));
    }
    u32::try_from(budget).map_err(|_| invalid(format!("above maximum of {} MiB", u32::MAX)))
}

fn grant(graph: &mut ApplicationGraph, entry: &GrantEntry) -> GraphResult<()> {
    let unit = UnitId::new(entry.unit.as_str())?;
    let resource = ResourceId::new(entry.resource.as_str())?;
    let access: Access = entry.access.parse()?;
    graph.grant(&unit, &resource, access)?;
    Ok(())
}

fn route(graph: &mut ApplicationGraph, entry: &RouteEntry) -> GraphResult<()> {
    let method: Method = entry.method.parse()?;
    let unit = UnitId::new(entry.unit.as_str())?;
    graph.add_route_with(method, &entry.path, &unit, entry.proxy)?;
    Ok(())
}
