//! Verification of emitted declarations.
//!
//! A declaration read back from disk is untrusted. Verification checks the
//! fingerprint, rebuilds the graph it describes, runs the validator over it
//! and confirms that emitting the rebuilt graph reproduces the same bytes.

use crate::compute::ComputeUnit;
use crate::emit::{self, Declaration, DeclarationBundle, FORMAT_VERSION};
use crate::error::{EntityKind, GraphError};
use crate::grant::Grant;
use crate::graph::ApplicationGraph;
use crate::resource::Resource;
use crate::route::MethodBinding;
use crate::validate::{ValidationReport, Validator};
use appgraph_core::{CoreError, Fingerprint, ResourceKind};
use thiserror::Error;
use tracing::{debug, info};

/// Reasons a declaration bundle is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// The declaration does not hash to the recorded fingerprint
    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch {
        /// Recorded fingerprint
        expected: Fingerprint,
        /// Fingerprint of the declaration as found
        actual: Fingerprint,
    },

    /// Declaration written by an unknown format version
    #[error("unsupported format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found
        found: u32,
        /// Version this build reads
        expected: u32,
    },

    /// The described graph violates graph rules
    #[error("declaration describes an invalid graph: {0}")]
    Invalid(ValidationReport),

    /// The declaration is valid but not in canonical form
    #[error("declaration is not canonical")]
    NonCanonical,

    /// Encoding failure
    #[error(transparent)]
    Encoding(#[from] CoreError),
}

/// Verify a bundle, returning its fingerprint
///
/// # Errors
///
/// Returns the first failing stage: fingerprint, version, graph rules, canonical form
pub fn verify(bundle: &DeclarationBundle, validator: &Validator) -> Result<Fingerprint, VerifyError> {
    let actual = bundle.declaration.fingerprint()?;
    if actual != bundle.fingerprint {
        return Err(VerifyError::FingerprintMismatch {
            expected: bundle.fingerprint,
            actual,
        });
    }
    verify_declaration(&bundle.declaration, validator)?;
    info!(fingerprint = %actual.short(), app = %bundle.declaration.app, "declaration verified");
    Ok(actual)
}

/// Verify an unsealed declaration
///
/// Structural errors found while rebuilding are merged with the validator's
/// findings and reported in check-stage order.
///
/// # Errors
///
/// Returns `UnsupportedVersion`, `Invalid` or `NonCanonical`
pub fn verify_declaration(declaration: &Declaration, validator: &Validator) -> Result<(), VerifyError> {
    if declaration.format_version != FORMAT_VERSION {
        return Err(VerifyError::UnsupportedVersion {
            found: declaration.format_version,
            expected: FORMAT_VERSION,
        });
    }

    let (graph, mut errors) = rebuild(declaration);
    let (found, warnings) = validator.check(&graph);
    errors.extend(found);
    errors.sort_by_key(GraphError::stage);
    if !errors.is_empty() {
        return Err(VerifyError::Invalid(ValidationReport::new(errors, warnings)));
    }

    let reemitted = emit::emit(&graph);
    if reemitted.to_canonical_bytes()? != declaration.to_canonical_bytes()? {
        debug!(app = %declaration.app, "re-emitted declaration differs");
        return Err(VerifyError::NonCanonical);
    }
    Ok(())
}

/// Rebuild the graph a declaration describes, collecting structural errors
/// that the builder would have rejected
pub(crate) fn rebuild(declaration: &Declaration) -> (ApplicationGraph, Vec<GraphError>) {
    let mut graph = ApplicationGraph::new(declaration.app.clone()).with_api(declaration.api.clone());
    let mut errors = Vec::new();

    for decl in &declaration.resources {
        let resource = match (decl.kind, &decl.table) {
            (ResourceKind::KeyedTable, Some(props)) => {
                Resource::keyed_table(decl.id.clone(), props.clone()).with_retention(decl.retention)
            }
            (ResourceKind::ObjectStore, Some(_)) => {
                errors.push(GraphError::MismatchedProperties {
                    resource: decl.id.clone(),
                    kind: decl.kind,
                    properties: "table",
                });
                continue;
            }
            (kind, None) => Resource::new(decl.id.clone(), kind, decl.retention),
        };
        let resource = match &decl.physical_name {
            Some(name) => resource.with_physical_name(name.clone()),
            None => resource,
        };
        if let Some(rejected) = graph.resources_mut().insert_unchecked(resource) {
            errors.push(GraphError::DuplicateIdentifier {
                id: rejected.id().to_string(),
                existing: EntityKind::Resource,
            });
        }
    }

    for decl in &declaration.units {
        let unit = decl.environment.iter().fold(
            ComputeUnit::new(decl.id.clone(), decl.handler.clone(), decl.memory_mb)
                .with_runtime(decl.runtime.clone())
                .with_bundling(decl.bundling.clone()),
            |unit, (key, value)| unit.with_env(key.clone(), value.to_env_value()),
        );
        if let Some(rejected) = graph.units_mut().insert_unchecked(unit) {
            errors.push(GraphError::DuplicateIdentifier {
                id: rejected.id().to_string(),
                existing: EntityKind::ComputeUnit,
            });
        }
    }

    for decl in &declaration.grants {
        graph.grants_mut().insert_unchecked(Grant::new(
            decl.subject.clone(),
            decl.object.clone(),
            decl.capability,
        ));
    }

    for decl in &declaration.routes {
        let binding = MethodBinding {
            unit: decl.unit.clone(),
            proxy: decl.proxy,
        };
        let added = graph
            .routes_mut()
            .resource_at_path(&decl.path)
            .and_then(|node| graph.routes_mut().add_method(node, decl.method, binding));
        if let Err(err) = added {
            errors.push(err);
        }
    }

    (graph, errors)
}
