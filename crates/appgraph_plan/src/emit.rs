//! Declaration emission.
//!
//! A [`Declaration`] is the provider-agnostic description an executor turns
//! into real infrastructure. Its JSON encoding is canonical: resources and
//! units keep declaration order, grants are sorted, routes follow the route
//! tree depth first and maps are keyed in sorted order. Equal graphs always
//! produce equal bytes, so the blake3 fingerprint of those bytes identifies
//! the declaration.

use crate::api::ApiSettings;
use crate::compute::{Bundling, EnvValue, HandlerRef, ResourceAttribute};
use crate::graph::ApplicationGraph;
use crate::resource::{RetentionPolicy, TableProperties};
use crate::route::Method;
use appgraph_core::{Capability, CoreResult, Fingerprint, ResourceId, ResourceKind, UnitId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the declaration format
pub const FORMAT_VERSION: u32 = 1;

/// Emitted application declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Format version
    pub format_version: u32,
    /// Application name
    pub app: String,
    /// HTTP API settings
    pub api: ApiSettings,
    /// Resources in declaration order
    pub resources: Vec<ResourceDecl>,
    /// Compute units in declaration order
    pub units: Vec<UnitDecl>,
    /// Grants sorted by subject, object, capability
    pub grants: Vec<GrantDecl>,
    /// Route bindings in route tree order
    pub routes: Vec<RouteDecl>,
}

/// Emitted resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDecl {
    /// Identifier
    pub id: ResourceId,
    /// Kind
    pub kind: ResourceKind,
    /// Retention policy
    pub retention: RetentionPolicy,
    /// Fixed provider-side name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_name: Option<String>,
    /// Table properties, for keyed tables
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableProperties>,
}

/// Environment value after emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum ResolvedValue {
    /// Literal string
    Literal {
        /// Value
        value: String,
    },
    /// Resource attribute, filled in by the executor unless already known
    Resource {
        /// Referenced resource
        resource: ResourceId,
        /// Referenced attribute
        attribute: ResourceAttribute,
        /// Value when it is known at emission
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
    },
}

impl ResolvedValue {
    /// Turn back into a builder-side environment value
    #[must_use]
    pub fn to_env_value(&self) -> EnvValue {
        match self {
            Self::Literal { value } => EnvValue::Literal(value.clone()),
            Self::Resource {
                resource, attribute, ..
            } => EnvValue::Reference {
                resource: resource.clone(),
                attribute: *attribute,
            },
        }
    }
}

/// Emitted compute unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitDecl {
    /// Identifier
    pub id: UnitId,
    /// Handler location
    pub handler: HandlerRef,
    /// Runtime
    pub runtime: String,
    /// Memory budget in MiB
    pub memory_mb: u32,
    /// Environment sorted by key
    pub environment: BTreeMap<String, ResolvedValue>,
    /// Bundling options
    pub bundling: Bundling,
}

/// Emitted grant with the concrete actions it implies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantDecl {
    /// Compute unit
    pub subject: UnitId,
    /// Resource
    pub object: ResourceId,
    /// Capability
    pub capability: Capability,
    /// Provider actions, sorted
    pub actions: Vec<String>,
}

/// Emitted route binding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecl {
    /// Route path
    pub path: String,
    /// HTTP method
    pub method: Method,
    /// Target compute unit
    pub unit: UnitId,
    /// Path parameter names, outermost first
    pub parameters: Vec<String>,
    /// Proxy integration
    pub proxy: bool,
}

impl Declaration {
    /// Canonical JSON bytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if serialization fails
    pub fn to_canonical_bytes(&self) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Indented JSON for people to read. Not canonical.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if serialization fails
    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` for malformed input
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Fingerprint of the canonical bytes
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if serialization fails
    pub fn fingerprint(&self) -> CoreResult<Fingerprint> {
        Ok(Fingerprint::compute(&self.to_canonical_bytes()?))
    }

    /// Pair the declaration with its fingerprint
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if serialization fails
    pub fn seal(self) -> CoreResult<DeclarationBundle> {
        let fingerprint = self.fingerprint()?;
        Ok(DeclarationBundle {
            fingerprint,
            declaration: self,
        })
    }
}

/// Declaration together with the fingerprint it was sealed with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclarationBundle {
    /// Fingerprint of the canonical declaration bytes
    pub fingerprint: Fingerprint,
    /// The declaration
    pub declaration: Declaration,
}

impl DeclarationBundle {
    /// Indented JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` if serialization fails
    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Decode from JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` for malformed input
    pub fn from_json(bytes: &[u8]) -> CoreResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn emit(graph: &ApplicationGraph) -> Declaration {
    let resources = graph
        .resources()
        .iter()
        .map(|r| ResourceDecl {
            id: r.id().clone(),
            kind: r.kind(),
            retention: r.retention(),
            physical_name: r.physical_name().map(str::to_string),
            table: r.table().cloned(),
        })
        .collect();

    let units = graph
        .units()
        .iter()
        .map(|u| UnitDecl {
            id: u.id().clone(),
            handler: u.handler().clone(),
            runtime: u.runtime().to_string(),
            memory_mb: u.memory_mb(),
            environment: u
                .environment()
                .iter()
                .map(|(key, value)| (key.clone(), resolve(graph, value)))
                .collect(),
            bundling: u.bundling().clone(),
        })
        .collect();

    let grants = graph
        .grants()
        .iter()
        .map(|g| GrantDecl {
            subject: g.subject.clone(),
            object: g.object.clone(),
            capability: g.capability,
            actions: graph
                .resources()
                .get(&g.object)
                .map(|r| r.kind().actions(g.capability))
                .unwrap_or_default()
                .iter()
                .map(|a| (*a).to_string())
                .collect(),
        })
        .collect();

    let routes = graph
        .routes()
        .bindings()
        .into_iter()
        .map(|b| RouteDecl {
            path: b.path,
            method: b.method,
            unit: b.unit,
            parameters: b.parameters,
            proxy: b.proxy,
        })
        .collect();

    Declaration {
        format_version: FORMAT_VERSION,
        app: graph.name().to_string(),
        api: graph.api().clone(),
        resources,
        units,
        grants,
        routes,
    }
}

fn resolve(graph: &ApplicationGraph, value: &EnvValue) -> ResolvedValue {
    match value {
        EnvValue::Literal(value) => ResolvedValue::Literal {
            value: value.clone(),
        },
        EnvValue::Reference {
            resource,
            attribute,
        } => ResolvedValue::Resource {
            resource: resource.clone(),
            attribute: *attribute,
            value: match attribute {
                ResourceAttribute::Name => graph
                    .resources()
                    .get(resource)
                    .and_then(|r| r.physical_name())
                    .map(str::to_string),
                ResourceAttribute::Uri => None,
            },
        },
    }
}
