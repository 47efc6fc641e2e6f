//! Whole-graph validation.
//!
//! Builder calls reject bad input one call at a time. The validator looks at
//! the finished graph and reports every violation in one pass, so a caller
//! can fix a broken declaration in a single round trip.

use crate::compute::{check_env_keys, check_references};
use crate::error::{EntityKind, GraphError};
use crate::graph::{ApplicationGraph, ValidatedGraph};
use appgraph_core::{KindSupport, ResourceId, UnitId};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

/// Non-fatal finding of validation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValidationWarning {
    /// Environment points at a resource the unit holds no grant on
    UngrantedReference {
        /// Unit carrying the reference
        unit: UnitId,
        /// Referenced resource
        resource: ResourceId,
    },
    /// No route reaches the unit
    UnboundUnit {
        /// Unreachable unit
        unit: UnitId,
    },
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UngrantedReference { unit, resource } => write!(
                f,
                "compute unit '{}' references resource '{}' without any grant on it",
                unit, resource
            ),
            Self::UnboundUnit { unit } => {
                write!(f, "compute unit '{}' is not bound to any route", unit)
            }
        }
    }
}

/// Every violation found in one validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    errors: Vec<GraphError>,
    warnings: Vec<ValidationWarning>,
}

impl ValidationReport {
    /// Build a report from collected findings
    #[must_use]
    pub fn new(errors: Vec<GraphError>, warnings: Vec<ValidationWarning>) -> Self {
        Self { errors, warnings }
    }

    /// Violations, in check order
    #[must_use]
    pub fn errors(&self) -> &[GraphError] {
        &self.errors
    }

    /// Warnings found alongside the violations
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Error codes, in check order
    #[must_use]
    pub fn codes(&self) -> Vec<&'static str> {
        self.errors.iter().map(GraphError::code).collect()
    }

    /// Number of violations
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Check if there are no violations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Take the violations
    #[must_use]
    pub fn into_errors(self) -> Vec<GraphError> {
        self.errors
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  [{}] {}", err.code(), err)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationReport {}

/// Graph validator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    /// Capabilities each resource kind accepts
    pub support: KindSupport,
}

impl Validator {
    /// Validator that accepts every capability on every kind
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict capabilities per resource kind
    #[must_use]
    pub fn with_support(mut self, support: KindSupport) -> Self {
        self.support = support;
        self
    }

    /// Validate and seal a graph
    ///
    /// # Errors
    ///
    /// Returns a report with every violation when any check fails
    pub fn validate(&self, graph: ApplicationGraph) -> Result<ValidatedGraph, ValidationReport> {
        let (errors, warnings) = self.check(&graph);
        for warning in &warnings {
            warn!(app = %graph.name(), "{}", warning);
        }
        if !errors.is_empty() {
            warn!(app = %graph.name(), violations = errors.len(), "graph failed validation");
            return Err(ValidationReport::new(errors, warnings));
        }
        info!(
            app = %graph.name(),
            resources = graph.resources().len(),
            units = graph.units().len(),
            grants = graph.grants().len(),
            bindings = graph.routes().binding_count(),
            "graph validated"
        );
        Ok(ValidatedGraph::new(graph, warnings))
    }

    /// Run every check without consuming the graph
    #[must_use]
    pub fn check(&self, graph: &ApplicationGraph) -> (Vec<GraphError>, Vec<ValidationWarning>) {
        let mut errors = Vec::new();
        self.check_declarations(graph, &mut errors);
        self.check_links(graph, &mut errors);
        self.check_routes(graph, &mut errors);
        self.check_support(graph, &mut errors);
        (errors, self.collect_warnings(graph))
    }

    /// Identifiers are unique across kinds and unit settings are sane
    fn check_declarations(&self, graph: &ApplicationGraph, errors: &mut Vec<GraphError>) {
        let bounds = graph.units().memory_bounds();
        for unit in graph.units().iter() {
            if graph.resources().contains_name(unit.id().as_str()) {
                errors.push(GraphError::DuplicateIdentifier {
                    id: unit.id().to_string(),
                    existing: EntityKind::Resource,
                });
            }
            if let Err(reason) = bounds.check(unit.memory_mb()) {
                errors.push(GraphError::InvalidMemoryBudget {
                    unit: unit.id().clone(),
                    budget: unit.memory_mb().into(),
                    reason,
                });
            }
            errors.extend(check_env_keys(unit));
        }
    }

    /// Environment references and grants point at declared entities
    fn check_links(&self, graph: &ApplicationGraph, errors: &mut Vec<GraphError>) {
        for unit in graph.units().iter() {
            errors.extend(check_references(unit, graph.resources()));
        }
        for grant in graph.grants().iter() {
            if !graph.units().contains(&grant.subject) {
                errors.push(GraphError::UnknownSubject {
                    unit: grant.subject.clone(),
                });
            }
            if !graph.resources().contains(&grant.object) {
                errors.push(GraphError::UnknownObject {
                    resource: grant.object.clone(),
                });
            }
        }
    }

    /// Route bindings target declared units
    fn check_routes(&self, graph: &ApplicationGraph, errors: &mut Vec<GraphError>) {
        for binding in graph.routes().bindings() {
            if !graph.units().contains(&binding.unit) {
                errors.push(GraphError::UnknownComputeUnit {
                    path: binding.path,
                    method: binding.method,
                    unit: binding.unit,
                });
            }
        }
    }

    /// Granted capabilities are accepted by the resource kind
    fn check_support(&self, graph: &ApplicationGraph, errors: &mut Vec<GraphError>) {
        for grant in graph.grants().iter() {
            let Some(resource) = graph.resources().get(&grant.object) else {
                continue;
            };
            if !self.support.supports(resource.kind(), grant.capability) {
                errors.push(GraphError::UnsupportedCapability {
                    unit: grant.subject.clone(),
                    resource: grant.object.clone(),
                    kind: resource.kind(),
                    capability: grant.capability,
                });
            }
        }
    }

    fn collect_warnings(&self, graph: &ApplicationGraph) -> Vec<ValidationWarning> {
        let mut warnings = BTreeSet::new();
        for unit in graph.units().iter() {
            for (_, resource) in unit.references() {
                let granted = graph
                    .grants()
                    .for_subject(unit.id())
                    .any(|g| &g.object == resource);
                if graph.resources().contains(resource) && !granted {
                    warnings.insert(ValidationWarning::UngrantedReference {
                        unit: unit.id().clone(),
                        resource: resource.clone(),
                    });
                }
            }
        }

        let bound: BTreeSet<UnitId> = graph
            .routes()
            .bindings()
            .into_iter()
            .map(|b| b.unit)
            .collect();
        for unit in graph.units().iter() {
            if !bound.contains(unit.id()) {
                warnings.insert(ValidationWarning::UnboundUnit {
                    unit: unit.id().clone(),
                });
            }
        }
        warnings.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputeUnit, EnvValue, HandlerRef};
    use crate::graph::tests::orders_graph;
    use crate::grant::Grant;
    use crate::resource::Resource;
    use crate::route::{Method, MethodBinding};
    use appgraph_core::{Access, Capability, ResourceKind};

    fn rid(name: &str) -> ResourceId {
        ResourceId::new(name).unwrap()
    }

    fn uid(name: &str) -> UnitId {
        UnitId::new(name).unwrap()
    }

    #[test]
    fn test_orders_graph_is_valid() {
        let validated = Validator::new().validate(orders_graph()).unwrap();
        assert!(validated.warnings().is_empty());
    }

    #[test]
    fn test_unsupported_capability() {
        let support = KindSupport::permissive().with_kind(ResourceKind::KeyedTable, &[Capability::Write]);
        let report = Validator::new()
            .with_support(support)
            .validate(orders_graph())
            .unwrap_err();
        assert_eq!(
            report.errors(),
            &[GraphError::UnsupportedCapability {
                unit: uid("Get"),
                resource: rid("T"),
                kind: ResourceKind::KeyedTable,
                capability: Capability::Read,
            }]
        );
    }

    #[test]
    fn test_warnings() {
        let mut graph = ApplicationGraph::new("app");
        graph.declare_resource(Resource::object_store(rid("B"))).unwrap();
        graph
            .declare_unit(
                ComputeUnit::new(uid("Worker"), HandlerRef::new("w.ts"), 128)
                    .with_env("BUCKET", EnvValue::name_of(rid("B"))),
            )
            .unwrap();

        let validated = Validator::new().validate(graph).unwrap();
        assert_eq!(
            validated.warnings(),
            &[
                ValidationWarning::UngrantedReference {
                    unit: uid("Worker"),
                    resource: rid("B"),
                },
                ValidationWarning::UnboundUnit { unit: uid("Worker") },
            ]
        );
    }

    #[test]
    fn test_report_aggregates_violations() {
        let mut graph = orders_graph();
        graph
            .grants_mut()
            .insert_unchecked(Grant::new(uid("Ghost"), rid("Nowhere"), Capability::Read));
        let root = graph.root_route();
        graph
            .routes_mut()
            .add_method(
                root,
                Method::Get,
                MethodBinding {
                    unit: uid("Missing"),
                    proxy: true,
                },
            )
            .unwrap();

        let report = Validator::new().validate(graph).unwrap_err();
        assert_eq!(
            report.codes(),
            vec!["UnknownSubject", "UnknownObject", "UnknownComputeUnit"]
        );
        let text = report.to_string();
        assert!(text.starts_with("3 violation(s)"));
        assert!(text.contains("[UnknownComputeUnit]"));
    }

    #[test]
    fn test_duplicate_across_kinds_found() {
        let mut graph = orders_graph();
        graph
            .units_mut()
            .insert_unchecked(ComputeUnit::new(uid("B"), HandlerRef::new("b.ts"), 128));
        graph.grant(&uid("B"), &rid("T"), Access::Read).unwrap();

        let report = Validator::new().validate(graph).unwrap_err();
        assert_eq!(report.codes(), vec!["DuplicateIdentifier"]);
    }
}
