//! APPGRAPH Planner
//!
//! Assembles resources, compute units, permission grants and HTTP routes
//! into an application graph, validates it as a whole and emits a
//! provider-agnostic declaration for an external executor.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod compute;
pub mod emit;
pub mod error;
pub mod grant;
pub mod graph;
pub mod handler;
pub mod manifest;
pub mod resource;
pub mod route;
pub mod validate;
pub mod verify;

pub use api::{ApiSettings, LoggingLevel};
pub use compute::{Bundling, ComputeRegistry, ComputeUnit, EnvValue, HandlerRef, MemoryBounds, ResourceAttribute};
pub use emit::{Declaration, DeclarationBundle, FORMAT_VERSION};
pub use error::{EntityKind, GraphError, GraphResult};
pub use grant::{Grant, GrantEngine};
pub use graph::{ApplicationGraph, Phase, ValidatedGraph};
pub use handler::{Handler, HandlerError, HandlerRequest, HandlerResponse};
pub use manifest::{Manifest, ManifestError};
pub use resource::{
    AttributeType, BillingMode, KeyAttribute, Resource, ResourceProperties, ResourceRegistry,
    RetentionPolicy, TableEncryption, TableProperties,
};
pub use route::{
    Method, MethodBinding, NodeHandle, PathSegment, RouteBinding, RouteMatch, RouteNode, RouteTable,
};
pub use validate::{ValidationReport, ValidationWarning, Validator};
pub use verify::{verify, verify_declaration, VerifyError};
