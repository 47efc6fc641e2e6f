//! HTTP route tree.
//!
//! Routes form a tree of path segments rooted at `/`. Each node may bind
//! HTTP methods to compute units. The tree is static data for an external
//! router; [`RouteTable::match_route`] states the matching rule so it can be
//! checked in isolation.

use crate::error::{GraphError, GraphResult};
use appgraph_core::{CoreError, UnitId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

static LITERAL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._~-]+$").expect("literal pattern is valid"));

static PARAMETER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{([A-Za-z_][A-Za-z0-9_]*)\}$").expect("parameter pattern is valid"));

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
    /// HEAD
    Head,
    /// OPTIONS
    Options,
    /// Any method not bound explicitly
    Any,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
            Self::Any => "ANY",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            "ANY" | "*" => Ok(Self::Any),
            _ => Err(CoreError::ParseError {
                message: format!("unknown HTTP method '{}'", s),
            }),
        }
    }
}

/// One segment of a route path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PathSegment {
    /// Matches exactly this text
    Literal(String),
    /// Captures one path token under this name
    Parameter(String),
}

impl PathSegment {
    /// Parse a segment; `{name}` is a parameter, anything else a literal
    ///
    /// # Errors
    ///
    /// Returns `InvalidPathSegment` for empty, slash-containing or malformed segments
    pub fn parse(segment: &str) -> GraphResult<Self> {
        let invalid = |reason: &str| GraphError::InvalidPathSegment {
            segment: segment.to_string(),
            reason: reason.to_string(),
        };

        if segment.is_empty() {
            return Err(invalid("empty segment"));
        }
        if segment.contains('/') {
            return Err(invalid("segments may not contain '/'"));
        }
        if segment.starts_with('{') || segment.ends_with('}') {
            return PARAMETER_PATTERN
                .captures(segment)
                .and_then(|caps| caps.get(1))
                .map(|name| Self::Parameter(name.as_str().to_string()))
                .ok_or_else(|| invalid("parameter must look like '{name}'"));
        }
        if !LITERAL_PATTERN.is_match(segment) {
            return Err(invalid("literal contains characters outside [A-Za-z0-9._~-]"));
        }
        Ok(Self::Literal(segment.to_string()))
    }

    /// Parameter name, if this is a parameter
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::Parameter(name) => Some(name),
            Self::Literal(_) => None,
        }
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(text) => f.write_str(text),
            Self::Parameter(name) => write!(f, "{{{}}}", name),
        }
    }
}

/// Handle to a node in a [`RouteTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    /// Index into the table
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Method binding at a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodBinding {
    /// Target compute unit
    pub unit: UnitId,
    /// Forward the whole request to the unit
    pub proxy: bool,
}

/// A node of the route tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteNode {
    segment: Option<PathSegment>,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    methods: BTreeMap<Method, MethodBinding>,
}

impl RouteNode {
    /// Segment of this node (`None` for the root)
    #[must_use]
    pub fn segment(&self) -> Option<&PathSegment> {
        self.segment.as_ref()
    }

    /// Parent node (`None` for the root)
    #[must_use]
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Children in insertion order
    #[must_use]
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Method bindings, sorted by method
    #[must_use]
    pub fn methods(&self) -> &BTreeMap<Method, MethodBinding> {
        &self.methods
    }
}

/// Flattened view of one binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteBinding {
    /// Full path, e.g. `/orders/{id}`
    pub path: String,
    /// Bound method
    pub method: Method,
    /// Target compute unit
    pub unit: UnitId,
    /// Parameter names along the path, outermost first
    pub parameters: Vec<String>,
    /// Proxy integration
    pub proxy: bool,
}

/// Result of matching a concrete request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    /// Node that matched
    pub node: NodeHandle,
    /// Method binding that matched (may be `Any`)
    pub method: Method,
    /// Target compute unit
    pub unit: UnitId,
    /// Captured parameters by name
    pub parameters: BTreeMap<String, String>,
}

/// Tree of routes rooted at `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    nodes: Vec<RouteNode>,
}

impl RouteTable {
    /// Create a table holding only the root
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![RouteNode {
                segment: None,
                parent: None,
                children: Vec::new(),
                methods: BTreeMap::new(),
            }],
        }
    }

    /// Root node
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        NodeHandle(0)
    }

    /// Get a node
    #[must_use]
    pub fn node(&self, handle: NodeHandle) -> Option<&RouteNode> {
        self.nodes.get(handle.0)
    }

    fn node_checked(&self, handle: NodeHandle) -> GraphResult<&RouteNode> {
        self.nodes
            .get(handle.0)
            .ok_or(GraphError::UnknownRouteNode(handle.0))
    }

    /// Add a child segment under `parent`
    ///
    /// Adding a segment that already exists under the parent returns the
    /// existing node.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRouteNode`, `InvalidPathSegment`, or
    /// `ConflictingParameter` when the parent already has a parameter child
    /// with a different name
    pub fn add_resource(&mut self, parent: NodeHandle, segment: &str) -> GraphResult<NodeHandle> {
        let segment = PathSegment::parse(segment)?;
        let parent_node = self.node_checked(parent)?;

        for &child in &parent_node.children {
            let existing = self.nodes[child.0].segment.as_ref();
            if existing == Some(&segment) {
                return Ok(child);
            }
            if let (Some(PathSegment::Parameter(old)), PathSegment::Parameter(new)) =
                (existing, &segment)
            {
                return Err(GraphError::ConflictingParameter {
                    path: self.path_of(parent),
                    existing: old.clone(),
                    new: new.clone(),
                });
            }
        }

        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(RouteNode {
            segment: Some(segment),
            parent: Some(parent),
            children: Vec::new(),
            methods: BTreeMap::new(),
        });
        self.nodes[parent.0].children.push(handle);
        debug!(path = %self.path_of(handle), "added route resource");
        Ok(handle)
    }

    /// Walk `path` from the root, creating missing nodes
    ///
    /// # Errors
    ///
    /// Returns the first error from [`RouteTable::add_resource`]
    pub fn resource_at_path(&mut self, path: &str) -> GraphResult<NodeHandle> {
        split_path(path)
            .try_fold(self.root(), |node, segment| self.add_resource(node, segment))
    }

    /// Find the node for an exact route path such as `/orders/{id}`
    #[must_use]
    pub fn find(&self, path: &str) -> Option<NodeHandle> {
        let mut current = self.root();
        for raw in split_path(path) {
            let segment = PathSegment::parse(raw).ok()?;
            current = *self.nodes[current.0]
                .children
                .iter()
                .find(|c| self.nodes[c.0].segment.as_ref() == Some(&segment))?;
        }
        Some(current)
    }

    /// Bind a method at a node
    ///
    /// # Errors
    ///
    /// Returns `UnknownRouteNode` or `DuplicateBinding`
    pub fn add_method(
        &mut self,
        node: NodeHandle,
        method: Method,
        binding: MethodBinding,
    ) -> GraphResult<()> {
        let existing = self.node_checked(node)?.methods.get(&method);
        if let Some(existing) = existing {
            return Err(GraphError::DuplicateBinding {
                path: self.path_of(node),
                method,
                existing: existing.unit.clone(),
            });
        }
        debug!(path = %self.path_of(node), %method, unit = %binding.unit, "bound method");
        self.nodes[node.0].methods.insert(method, binding);
        Ok(())
    }

    /// Full path of a node
    #[must_use]
    pub fn path_of(&self, handle: NodeHandle) -> String {
        let mut segments = Vec::new();
        let mut current = self.nodes.get(handle.0);
        while let Some(node) = current {
            if let Some(segment) = &node.segment {
                segments.push(segment.to_string());
            }
            current = node.parent.and_then(|p| self.nodes.get(p.0));
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }

    /// Parameter names along the path to a node, outermost first
    #[must_use]
    pub fn parameters_of(&self, handle: NodeHandle) -> Vec<String> {
        let mut params = Vec::new();
        let mut current = self.nodes.get(handle.0);
        while let Some(node) = current {
            if let Some(name) = node.segment.as_ref().and_then(PathSegment::parameter) {
                params.push(name.to_string());
            }
            current = node.parent.and_then(|p| self.nodes.get(p.0));
        }
        params.reverse();
        params
    }

    /// All bindings in depth-first order, children in insertion order and
    /// methods sorted within a node
    #[must_use]
    pub fn bindings(&self) -> Vec<RouteBinding> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(handle) = stack.pop() {
            let node = &self.nodes[handle.0];
            for (method, binding) in &node.methods {
                out.push(RouteBinding {
                    path: self.path_of(handle),
                    method: *method,
                    unit: binding.unit.clone(),
                    parameters: self.parameters_of(handle),
                    proxy: binding.proxy,
                });
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Number of method bindings
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.nodes.iter().map(|n| n.methods.len()).sum()
    }

    /// Number of nodes, root included
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resolve a concrete request to its bound unit.
    ///
    /// Literal children are tried before the parameter child. A parameter
    /// captures exactly one non-empty token. A node matches only when it binds
    /// the requested method or `Any`, otherwise matching backtracks to the
    /// parameter branch. An explicit method binding wins over `Any`.
    #[must_use]
    pub fn match_route(&self, method: Method, path: &str) -> Option<RouteMatch> {
        let tokens: Vec<&str> = split_path(path).collect();
        let mut captures = Vec::new();
        let (node, bound, binding) = self.descend(self.root(), method, &tokens, &mut captures)?;
        Some(RouteMatch {
            node,
            method: bound,
            unit: binding.unit.clone(),
            parameters: captures.into_iter().collect(),
        })
    }

    fn descend(
        &self,
        node: NodeHandle,
        method: Method,
        tokens: &[&str],
        captures: &mut Vec<(String, String)>,
    ) -> Option<(NodeHandle, Method, &MethodBinding)> {
        let Some((token, rest)) = tokens.split_first() else {
            let methods = &self.nodes[node.0].methods;
            return methods
                .get_key_value(&method)
                .or_else(|| methods.get_key_value(&Method::Any))
                .map(|(bound, binding)| (node, *bound, binding));
        };
        let children = &self.nodes[node.0].children;

        let literal = children.iter().find(|c| {
            matches!(&self.nodes[c.0].segment, Some(PathSegment::Literal(text)) if text == token)
        });
        if let Some(&child) = literal {
            if let Some(found) = self.descend(child, method, rest, captures) {
                return Some(found);
            }
        }

        for &child in children {
            if let Some(PathSegment::Parameter(name)) = &self.nodes[child.0].segment {
                captures.push((name.clone(), (*token).to_string()));
                if let Some(found) = self.descend(child, method, rest, captures) {
                    return Some(found);
                }
                captures.pop();
            }
        }
        None
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bind(unit: &str) -> MethodBinding {
        MethodBinding {
            unit: UnitId::new(unit).unwrap(),
            proxy: true,
        }
    }

    fn orders_table() -> RouteTable {
        let mut table = RouteTable::new();
        let orders = table.add_resource(table.root(), "orders").unwrap();
        let order = table.add_resource(orders, "{id}").unwrap();
        table.add_method(orders, Method::Post, bind("Create")).unwrap();
        table.add_method(order, Method::Get, bind("Get")).unwrap();
        table
    }

    #[test]
    fn test_segment_parse() {
        assert_eq!(
            PathSegment::parse("orders").unwrap(),
            PathSegment::Literal("orders".to_string())
        );
        assert_eq!(
            PathSegment::parse("{id}").unwrap(),
            PathSegment::Parameter("id".to_string())
        );
        assert!(PathSegment::parse("").is_err());
        assert!(PathSegment::parse("a/b").is_err());
        assert!(PathSegment::parse("{id").is_err());
        assert!(PathSegment::parse("{}").is_err());
        assert!(PathSegment::parse("{1x}").is_err());
        assert!(PathSegment::parse("or ders").is_err());
    }

    #[test]
    fn test_segment_display() {
        assert_eq!(PathSegment::Parameter("id".to_string()).to_string(), "{id}");
        assert_eq!(PathSegment::Literal("v1".to_string()).to_string(), "v1");
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
        assert_eq!("*".parse::<Method>().unwrap(), Method::Any);
        assert!("FETCH".parse::<Method>().is_err());
        assert_eq!(serde_json::to_string(&Method::Delete).unwrap(), "\"DELETE\"");
    }

    #[test]
    fn test_add_resource_reuses_existing() {
        let mut table = RouteTable::new();
        let a = table.add_resource(table.root(), "orders").unwrap();
        let b = table.add_resource(table.root(), "orders").unwrap();
        assert_eq!(a, b);
        assert_eq!(table.node_count(), 2);
    }

    #[test]
    fn test_conflicting_parameter() {
        let mut table = RouteTable::new();
        let orders = table.add_resource(table.root(), "orders").unwrap();
        table.add_resource(orders, "{id}").unwrap();
        let err = table.add_resource(orders, "{orderId}").unwrap_err();
        assert!(matches!(err, GraphError::ConflictingParameter { .. }));
    }

    #[test]
    fn test_unknown_node() {
        let mut table = RouteTable::new();
        let err = table.add_resource(NodeHandle(9), "x").unwrap_err();
        assert_eq!(err, GraphError::UnknownRouteNode(9));
    }

    #[test]
    fn test_two_verbs_one_node() {
        let mut table = orders_table();
        let orders = table.find("/orders").unwrap();
        assert!(table.add_method(orders, Method::Get, bind("List")).is_ok());
        assert_eq!(table.binding_count(), 3);
    }

    #[test]
    fn test_duplicate_binding() {
        let mut table = orders_table();
        let orders = table.find("/orders").unwrap();
        let err = table
            .add_method(orders, Method::Post, bind("Other"))
            .unwrap_err();
        assert_eq!(
            err,
            GraphError::DuplicateBinding {
                path: "/orders".to_string(),
                method: Method::Post,
                existing: UnitId::new("Create").unwrap(),
            }
        );
    }

    #[test]
    fn test_paths_and_parameters() {
        let mut table = RouteTable::new();
        let item = table.resource_at_path("/orders/{id}/items/{itemId}").unwrap();
        assert_eq!(table.path_of(item), "/orders/{id}/items/{itemId}");
        assert_eq!(table.parameters_of(item), vec!["id", "itemId"]);
        assert_eq!(table.path_of(table.root()), "/");
        assert_eq!(table.find("/orders/{id}/items/{itemId}"), Some(item));
        assert_eq!(table.find("/orders/{other}"), None);
    }

    #[test]
    fn test_bindings_order() {
        let table = orders_table();
        let bindings = table.bindings();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].path, "/orders");
        assert_eq!(bindings[0].method, Method::Post);
        assert!(bindings[0].parameters.is_empty());
        assert_eq!(bindings[1].path, "/orders/{id}");
        assert_eq!(bindings[1].parameters, vec!["id"]);
    }

    #[test]
    fn test_match_route_captures_parameter() {
        let table = orders_table();
        let m = table.match_route(Method::Get, "/orders/abc-123").unwrap();
        assert_eq!(m.unit.as_str(), "Get");
        assert_eq!(m.parameters.get("id").map(String::as_str), Some("abc-123"));

        assert!(table.match_route(Method::Delete, "/orders/abc").is_none());
        assert!(table.match_route(Method::Get, "/orders/a/b").is_none());
        assert!(table.match_route(Method::Get, "/orders").is_none());
    }

    #[test]
    fn test_literal_beats_parameter() {
        let mut table = orders_table();
        let recent = table.resource_at_path("/orders/recent").unwrap();
        table.add_method(recent, Method::Get, bind("Recent")).unwrap();

        let m = table.match_route(Method::Get, "/orders/recent").unwrap();
        assert_eq!(m.unit.as_str(), "Recent");
        assert!(m.parameters.is_empty());

        let m = table.match_route(Method::Get, "/orders/other").unwrap();
        assert_eq!(m.unit.as_str(), "Get");
    }

    #[test]
    fn test_match_backtracks_from_literal() {
        let mut table = RouteTable::new();
        let deep = table.resource_at_path("/a/{x}/c").unwrap();
        table.resource_at_path("/a/b").unwrap();
        table.add_method(deep, Method::Get, bind("Deep")).unwrap();

        let m = table.match_route(Method::Get, "/a/b/c").unwrap();
        assert_eq!(m.unit.as_str(), "Deep");
        assert_eq!(m.parameters.get("x").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_match_backtracks_when_literal_lacks_method() {
        let mut table = orders_table();
        let order = table.find("/orders/{id}").unwrap();
        table.add_method(order, Method::Delete, bind("Delete")).unwrap();
        let recent = table.resource_at_path("/orders/recent").unwrap();
        table.add_method(recent, Method::Get, bind("Recent")).unwrap();

        let m = table.match_route(Method::Delete, "/orders/recent").unwrap();
        assert_eq!(m.unit.as_str(), "Delete");
        assert_eq!(m.parameters.get("id").map(String::as_str), Some("recent"));

        let m = table.match_route(Method::Get, "/orders/recent").unwrap();
        assert_eq!(m.unit.as_str(), "Recent");
    }

    #[test]
    fn test_any_fallback() {
        let mut table = RouteTable::new();
        let node = table.resource_at_path("/health").unwrap();
        table.add_method(node, Method::Any, bind("Health")).unwrap();
        let m = table.match_route(Method::Head, "/health").unwrap();
        assert_eq!(m.method, Method::Any);
    }

    proptest! {
        #[test]
        fn prop_parameter_captures_single_token(token in "[A-Za-z0-9_-]{1,16}") {
            let table = orders_table();
            let path = format!("/orders/{}", token);
            let m = table.match_route(Method::Get, &path).unwrap();
            prop_assert_eq!(m.parameters.len(), 1);
            prop_assert_eq!(m.parameters.get("id"), Some(&token));
        }
    }
}
