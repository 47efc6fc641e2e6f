//! Application graph assembly.
//!
//! The graph moves strictly forward:
//! `Empty -> Declaring / Granting / Routing -> Validated -> Emitted`.
//! Declaring, granting and routing interleave freely as long as everything
//! is declared before it is referenced. [`ApplicationGraph::validate`]
//! consumes the builder and [`ValidatedGraph::emit`] consumes the validated
//! graph, so nothing can be edited after validation or emitted twice.

use crate::api::ApiSettings;
use crate::compute::{ComputeRegistry, ComputeUnit, MemoryBounds};
use crate::emit::{self, Declaration};
use crate::error::{EntityKind, GraphError, GraphResult};
use crate::grant::GrantEngine;
use crate::resource::{Resource, ResourceRegistry};
use crate::route::{Method, MethodBinding, NodeHandle, RouteTable};
use crate::validate::{ValidationReport, ValidationWarning, Validator};
use appgraph_core::{Access, ResourceId, UnitId};
use tracing::info;

/// Assembly phase of a graph under construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Nothing declared yet
    Empty,
    /// Last call declared a resource or compute unit
    Declaring,
    /// Last call granted a capability
    Granting,
    /// Last call touched the route table
    Routing,
}

/// Graph under construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationGraph {
    name: String,
    api: ApiSettings,
    resources: ResourceRegistry,
    units: ComputeRegistry,
    grants: GrantEngine,
    routes: RouteTable,
    phase: Phase,
}

impl ApplicationGraph {
    /// Create an empty graph
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            api: ApiSettings::default(),
            resources: ResourceRegistry::new(),
            units: ComputeRegistry::new(),
            grants: GrantEngine::new(),
            routes: RouteTable::new(),
            phase: Phase::Empty,
        }
    }

    /// Set the HTTP API settings
    #[must_use]
    pub fn with_api(mut self, api: ApiSettings) -> Self {
        self.api = api;
        self
    }

    /// Restrict accepted memory budgets
    #[must_use]
    pub fn with_memory_bounds(mut self, bounds: MemoryBounds) -> Self {
        self.units = self.units.with_memory_bounds(bounds);
        self
    }

    /// Declare a resource
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentifier` if a resource or compute unit already
    /// uses the identifier
    pub fn declare_resource(&mut self, resource: Resource) -> GraphResult<&Resource> {
        if self.units.contains_name(resource.id().as_str()) {
            return Err(GraphError::DuplicateIdentifier {
                id: resource.id().to_string(),
                existing: EntityKind::ComputeUnit,
            });
        }
        let declared = self.resources.declare(resource)?;
        self.phase = Phase::Declaring;
        Ok(declared)
    }

    /// Declare a compute unit
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentifier`, `InvalidMemoryBudget`,
    /// `InvalidEnvironmentKey` or `UnresolvedResourceReference`
    pub fn declare_unit(&mut self, unit: ComputeUnit) -> GraphResult<&ComputeUnit> {
        if self.resources.contains_name(unit.id().as_str()) {
            return Err(GraphError::DuplicateIdentifier {
                id: unit.id().to_string(),
                existing: EntityKind::Resource,
            });
        }
        let declared = self.units.declare(unit, &self.resources)?;
        self.phase = Phase::Declaring;
        Ok(declared)
    }

    /// Grant a unit access to a resource, returning how many new grants
    /// were recorded
    ///
    /// # Errors
    ///
    /// Returns `UnknownSubject` or `UnknownObject`
    pub fn grant(&mut self, unit: &UnitId, resource: &ResourceId, access: Access) -> GraphResult<usize> {
        let added = self
            .grants
            .grant(unit, resource, access, &self.units, &self.resources)?;
        self.phase = Phase::Granting;
        Ok(added)
    }

    /// Root of the route tree
    #[must_use]
    pub fn root_route(&self) -> NodeHandle {
        self.routes.root()
    }

    /// Add a path segment under a route node
    ///
    /// # Errors
    ///
    /// Returns `UnknownRouteNode`, `InvalidPathSegment` or `ConflictingParameter`
    pub fn add_resource(&mut self, parent: NodeHandle, segment: &str) -> GraphResult<NodeHandle> {
        let node = self.routes.add_resource(parent, segment)?;
        self.phase = Phase::Routing;
        Ok(node)
    }

    /// Bind a method at a route node with proxy integration
    ///
    /// # Errors
    ///
    /// Returns `UnknownRouteNode`, `UnknownComputeUnit` or `DuplicateBinding`
    pub fn add_method(&mut self, node: NodeHandle, method: Method, unit: &UnitId) -> GraphResult<()> {
        self.add_method_with(node, method, unit, true)
    }

    /// Bind a method at a route node, choosing the integration mode
    ///
    /// # Errors
    ///
    /// Returns `UnknownRouteNode`, `UnknownComputeUnit` or `DuplicateBinding`
    pub fn add_method_with(
        &mut self,
        node: NodeHandle,
        method: Method,
        unit: &UnitId,
        proxy: bool,
    ) -> GraphResult<()> {
        if self.routes.node(node).is_none() {
            return Err(GraphError::UnknownRouteNode(node.index()));
        }
        if !self.units.contains(unit) {
            return Err(GraphError::UnknownComputeUnit {
                path: self.routes.path_of(node),
                method,
                unit: unit.clone(),
            });
        }
        self.routes.add_method(
            node,
            method,
            MethodBinding {
                unit: unit.clone(),
                proxy,
            },
        )?;
        self.phase = Phase::Routing;
        Ok(())
    }

    /// Bind `method path` to a unit with proxy integration, creating path
    /// nodes as needed
    ///
    /// # Errors
    ///
    /// Returns any error of [`ApplicationGraph::add_route_with`]
    pub fn add_route(&mut self, method: Method, path: &str, unit: &UnitId) -> GraphResult<NodeHandle> {
        self.add_route_with(method, path, unit, true)
    }

    /// Bind `method path` to a unit, choosing the integration mode
    ///
    /// The unit is checked before any node is created.
    ///
    /// # Errors
    ///
    /// Returns any error of [`ApplicationGraph::add_resource`] or
    /// [`ApplicationGraph::add_method_with`]
    pub fn add_route_with(
        &mut self,
        method: Method,
        path: &str,
        unit: &UnitId,
        proxy: bool,
    ) -> GraphResult<NodeHandle> {
        if !self.units.contains(unit) {
            return Err(GraphError::UnknownComputeUnit {
                path: path.to_string(),
                method,
                unit: unit.clone(),
            });
        }
        let node = self.routes.resource_at_path(path)?;
        self.add_method_with(node, method, unit, proxy)?;
        Ok(node)
    }

    /// Validate the whole graph, reporting every violation at once
    ///
    /// # Errors
    ///
    /// Returns a report listing all violations
    pub fn validate(self, validator: &Validator) -> Result<ValidatedGraph, ValidationReport> {
        validator.validate(self)
    }

    /// Application name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// API settings
    #[must_use]
    pub fn api(&self) -> &ApiSettings {
        &self.api
    }

    /// Declared resources
    #[must_use]
    pub fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Declared compute units
    #[must_use]
    pub fn units(&self) -> &ComputeRegistry {
        &self.units
    }

    /// Recorded grants
    #[must_use]
    pub fn grants(&self) -> &GrantEngine {
        &self.grants
    }

    /// Route tree
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Current assembly phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    pub(crate) fn units_mut(&mut self) -> &mut ComputeRegistry {
        &mut self.units
    }

    pub(crate) fn grants_mut(&mut self) -> &mut GrantEngine {
        &mut self.grants
    }

    pub(crate) fn routes_mut(&mut self) -> &mut RouteTable {
        &mut self.routes
    }
}

/// A graph that passed validation. Can only be emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedGraph {
    graph: ApplicationGraph,
    warnings: Vec<ValidationWarning>,
}

impl ValidatedGraph {
    pub(crate) fn new(graph: ApplicationGraph, warnings: Vec<ValidationWarning>) -> Self {
        Self { graph, warnings }
    }

    /// The validated graph
    #[must_use]
    pub fn graph(&self) -> &ApplicationGraph {
        &self.graph
    }

    /// Non-fatal findings of the validation pass
    #[must_use]
    pub fn warnings(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Emit the declaration, ending the graph's life
    #[must_use]
    pub fn emit(self) -> Declaration {
        let declaration = emit::emit(&self.graph);
        info!(
            app = %declaration.app,
            resources = declaration.resources.len(),
            units = declaration.units.len(),
            grants = declaration.grants.len(),
            routes = declaration.routes.len(),
            "emitted declaration"
        );
        declaration
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::compute::{EnvValue, HandlerRef};
    use crate::resource::TableProperties;
    use appgraph_core::Capability;

    fn rid(name: &str) -> ResourceId {
        ResourceId::new(name).unwrap()
    }

    fn uid(name: &str) -> UnitId {
        UnitId::new(name).unwrap()
    }

    /// Bucket `B`, table `T`, units `Create` and `Get`, grants and routes
    /// as in the orders application.
    pub(crate) fn orders_graph() -> ApplicationGraph {
        let mut graph = ApplicationGraph::new("orders");
        graph.declare_resource(Resource::object_store(rid("B"))).unwrap();
        graph
            .declare_resource(Resource::keyed_table(rid("T"), TableProperties::default()))
            .unwrap();
        graph
            .declare_unit(
                ComputeUnit::new(uid("Create"), HandlerRef::new("create-order.ts"), 1024)
                    .with_env("TABLE_NAME", EnvValue::name_of(rid("T")))
                    .with_env("BUCKET_NAME", EnvValue::name_of(rid("B"))),
            )
            .unwrap();
        graph
            .declare_unit(
                ComputeUnit::new(uid("Get"), HandlerRef::new("get-order.ts"), 1024)
                    .with_env("TABLE_NAME", EnvValue::name_of(rid("T"))),
            )
            .unwrap();
        graph.grant(&uid("Create"), &rid("T"), Access::Write).unwrap();
        graph.grant(&uid("Create"), &rid("B"), Access::Write).unwrap();
        graph.grant(&uid("Get"), &rid("T"), Access::Read).unwrap();

        let orders = graph.add_resource(graph.root_route(), "orders").unwrap();
        let order = graph.add_resource(orders, "{id}").unwrap();
        graph.add_method(orders, Method::Post, &uid("Create")).unwrap();
        graph.add_method(order, Method::Get, &uid("Get")).unwrap();
        graph
    }

    #[test]
    fn test_phase_progression() {
        let mut graph = ApplicationGraph::new("app");
        assert_eq!(graph.phase(), Phase::Empty);
        graph.declare_resource(Resource::object_store(rid("B"))).unwrap();
        assert_eq!(graph.phase(), Phase::Declaring);
        graph
            .declare_unit(ComputeUnit::new(uid("U"), HandlerRef::new("u.ts"), 128))
            .unwrap();
        graph.grant(&uid("U"), &rid("B"), Access::Read).unwrap();
        assert_eq!(graph.phase(), Phase::Granting);
        graph.add_route(Method::Get, "/files", &uid("U")).unwrap();
        assert_eq!(graph.phase(), Phase::Routing);
        // Interleaving back to declarations is allowed
        graph.declare_resource(Resource::object_store(rid("C"))).unwrap();
        assert_eq!(graph.phase(), Phase::Declaring);
    }

    #[test]
    fn test_duplicate_across_kinds() {
        let mut graph = ApplicationGraph::new("app");
        graph.declare_resource(Resource::object_store(rid("Orders"))).unwrap();
        let err = graph
            .declare_unit(ComputeUnit::new(uid("Orders"), HandlerRef::new("o.ts"), 128))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateIdentifier {
                id: "Orders".to_string(),
                existing: EntityKind::Resource,
            }
        );
        assert!(graph.units().is_empty());

        graph
            .declare_unit(ComputeUnit::new(uid("Worker"), HandlerRef::new("w.ts"), 128))
            .unwrap();
        let err = graph
            .declare_resource(Resource::object_store(rid("Worker")))
            .unwrap_err();
        assert_eq!(err.code(), "DuplicateIdentifier");
        assert_eq!(graph.resources().len(), 1);
    }

    #[test]
    fn test_route_to_unknown_unit() {
        let mut graph = orders_graph();
        let orders = graph.routes().find("/orders").unwrap();
        let err = graph
            .add_method(orders, Method::Delete, &uid("Missing"))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::UnknownComputeUnit {
                path: "/orders".to_string(),
                method: Method::Delete,
                unit: uid("Missing"),
            }
        );
    }

    #[test]
    fn test_add_route_checks_unit_first() {
        let mut graph = ApplicationGraph::new("app");
        let before = graph.routes().node_count();
        let err = graph
            .add_route(Method::Get, "/a/b/c", &uid("Nobody"))
            .unwrap_err();
        assert_eq!(err.code(), "UnknownComputeUnit");
        assert_eq!(graph.routes().node_count(), before);
    }

    #[test]
    fn test_orders_graph_contents() {
        let graph = orders_graph();
        assert_eq!(graph.resources().len(), 2);
        assert_eq!(graph.units().len(), 2);
        assert_eq!(graph.grants().len(), 3);
        assert_eq!(graph.routes().binding_count(), 2);
        assert!(graph.grants().has(&uid("Get"), &rid("T"), Capability::Read));
        assert!(!graph.grants().has(&uid("Get"), &rid("T"), Capability::Write));
    }

    #[test]
    fn test_validate_then_emit() {
        let validated = orders_graph().validate(&Validator::new()).unwrap();
        assert!(validated.warnings().is_empty());
        let declaration = validated.emit();
        assert_eq!(declaration.resources.len(), 2);
        assert_eq!(declaration.routes.len(), 2);
    }
}
