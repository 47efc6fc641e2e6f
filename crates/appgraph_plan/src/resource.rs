//! Storage resources and their registry.

use crate::error::{EntityKind, GraphError, GraphResult};
use appgraph_core::{ResourceId, ResourceKind};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What happens to a resource when the application is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetentionPolicy {
    /// Delete the resource and its data
    Destroy,
    /// Keep the resource after teardown
    #[default]
    Retain,
}

/// Type of a table key attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttributeType {
    /// UTF-8 string
    #[default]
    String,
    /// Number
    Number,
    /// Raw bytes
    Binary,
}

/// Named key attribute of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute type
    #[serde(rename = "type", default)]
    pub attribute_type: AttributeType,
}

impl KeyAttribute {
    /// String-typed key attribute
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attribute_type: AttributeType::String,
        }
    }
}

/// Capacity billing for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum BillingMode {
    /// Billed per request, no capacity planning
    #[default]
    PayPerRequest,
    /// Fixed read and write capacity units
    Provisioned {
        /// Read capacity units
        read_units: u32,
        /// Write capacity units
        write_units: u32,
    },
}

/// Encryption at rest for a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TableEncryption {
    /// Provider default encryption
    #[default]
    Default,
    /// Provider-managed key
    ProviderManaged,
}

/// Properties specific to keyed tables
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableProperties {
    /// Partition key
    pub partition_key: KeyAttribute,
    /// Billing mode
    #[serde(default)]
    pub billing: BillingMode,
    /// Encryption at rest
    #[serde(default)]
    pub encryption: TableEncryption,
    /// Point-in-time recovery
    #[serde(default)]
    pub point_in_time_recovery: bool,
    /// Per-key access statistics
    #[serde(default)]
    pub contributor_insights: bool,
}

impl TableProperties {
    /// Table keyed by the given partition key, other settings defaulted
    #[must_use]
    pub fn new(partition_key: KeyAttribute) -> Self {
        Self {
            partition_key,
            billing: BillingMode::default(),
            encryption: TableEncryption::default(),
            point_in_time_recovery: false,
            contributor_insights: false,
        }
    }
}

impl Default for TableProperties {
    fn default() -> Self {
        Self::new(KeyAttribute::string("id"))
    }
}

/// Kind-specific properties. The variant fixes the resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceProperties {
    /// Object store
    ObjectStore,
    /// Keyed table
    KeyedTable(TableProperties),
}

impl ResourceProperties {
    /// Default properties for a kind
    #[must_use]
    pub fn default_for(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::ObjectStore => Self::ObjectStore,
            ResourceKind::KeyedTable => Self::KeyedTable(TableProperties::default()),
        }
    }

    /// Kind implied by these properties
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::ObjectStore => ResourceKind::ObjectStore,
            Self::KeyedTable(_) => ResourceKind::KeyedTable,
        }
    }
}

/// A declared storage resource. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource {
    id: ResourceId,
    retention: RetentionPolicy,
    physical_name: Option<String>,
    properties: ResourceProperties,
}

impl Resource {
    /// Create a resource of the given kind with default properties
    #[must_use]
    pub fn new(id: ResourceId, kind: ResourceKind, retention: RetentionPolicy) -> Self {
        Self {
            id,
            retention,
            physical_name: None,
            properties: ResourceProperties::default_for(kind),
        }
    }

    /// Object store with the default retention
    #[must_use]
    pub fn object_store(id: ResourceId) -> Self {
        Self::new(id, ResourceKind::ObjectStore, RetentionPolicy::default())
    }

    /// Keyed table with the given properties and the default retention
    #[must_use]
    pub fn keyed_table(id: ResourceId, properties: TableProperties) -> Self {
        Self {
            id,
            retention: RetentionPolicy::default(),
            physical_name: None,
            properties: ResourceProperties::KeyedTable(properties),
        }
    }

    /// Set the retention policy
    #[must_use]
    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Fix the provider-side name instead of letting the executor generate one
    #[must_use]
    pub fn with_physical_name(mut self, name: impl Into<String>) -> Self {
        self.physical_name = Some(name.into());
        self
    }

    /// Resource identifier
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Resource kind
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        self.properties.kind()
    }

    /// Retention policy
    #[must_use]
    pub fn retention(&self) -> RetentionPolicy {
        self.retention
    }

    /// Fixed provider-side name, if any
    #[must_use]
    pub fn physical_name(&self) -> Option<&str> {
        self.physical_name.as_deref()
    }

    /// Kind-specific properties
    #[must_use]
    pub fn properties(&self) -> &ResourceProperties {
        &self.properties
    }

    /// Table properties, for keyed tables
    #[must_use]
    pub fn table(&self) -> Option<&TableProperties> {
        match &self.properties {
            ResourceProperties::KeyedTable(props) => Some(props),
            ResourceProperties::ObjectStore => None,
        }
    }
}

/// Registry of declared resources, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRegistry {
    resources: IndexMap<ResourceId, Resource>,
}

impl ResourceRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a resource
    ///
    /// # Errors
    ///
    /// Returns `DuplicateIdentifier` if the identifier is already declared.
    /// The registry is unchanged on error.
    pub fn declare(&mut self, resource: Resource) -> GraphResult<&Resource> {
        if self.resources.contains_key(resource.id()) {
            return Err(GraphError::DuplicateIdentifier {
                id: resource.id().to_string(),
                existing: EntityKind::Resource,
            });
        }
        debug!(resource = %resource.id(), kind = %resource.kind(), "declared resource");
        let (index, _) = self.resources.insert_full(resource.id().clone(), resource);
        Ok(&self.resources[index])
    }

    /// Insert without the duplicate check, handing back a displaced resource
    pub(crate) fn insert_unchecked(&mut self, resource: Resource) -> Option<Resource> {
        if self.resources.contains_key(resource.id()) {
            return Some(resource);
        }
        self.resources.insert(resource.id().clone(), resource);
        None
    }

    /// Look up a resource
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Check whether a resource is declared
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.resources.contains_key(id)
    }

    /// Check whether any resource uses this name
    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.resources.keys().any(|id| id.as_str() == name)
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Number of declared resources
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(name: &str) -> ResourceId {
        ResourceId::new(name).unwrap()
    }

    #[test]
    fn test_resource_new_defaults() {
        let bucket = Resource::object_store(rid("SaladBucket"));
        assert_eq!(bucket.kind(), ResourceKind::ObjectStore);
        assert_eq!(bucket.retention(), RetentionPolicy::Retain);
        assert!(bucket.physical_name().is_none());
        assert!(bucket.table().is_none());
    }

    #[test]
    fn test_keyed_table_properties() {
        let mut props = TableProperties::new(KeyAttribute::string("id"));
        props.contributor_insights = true;
        let table = Resource::keyed_table(rid("SaladAppDB"), props)
            .with_retention(RetentionPolicy::Destroy)
            .with_physical_name("salad-app-db");

        assert_eq!(table.kind(), ResourceKind::KeyedTable);
        assert_eq!(table.physical_name(), Some("salad-app-db"));
        let props = table.table().unwrap();
        assert_eq!(props.partition_key.name, "id");
        assert_eq!(props.billing, BillingMode::PayPerRequest);
        assert!(props.contributor_insights);
    }

    #[test]
    fn test_registry_declare() {
        let mut registry = ResourceRegistry::new();
        let declared = registry
            .declare(Resource::object_store(rid("Bucket")))
            .unwrap();
        assert_eq!(declared.id().as_str(), "Bucket");
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&rid("Bucket")));
        assert!(registry.contains_name("Bucket"));
    }

    #[test]
    fn test_registry_duplicate_leaves_state_unchanged() {
        let mut registry = ResourceRegistry::new();
        registry
            .declare(Resource::object_store(rid("Store")))
            .unwrap();
        let before = registry.clone();

        let result = registry.declare(Resource::new(
            rid("Store"),
            ResourceKind::KeyedTable,
            RetentionPolicy::Destroy,
        ));

        assert!(matches!(
            result,
            Err(GraphError::DuplicateIdentifier {
                existing: EntityKind::Resource,
                ..
            })
        ));
        assert_eq!(registry, before);
        assert_eq!(
            registry.get(&rid("Store")).unwrap().kind(),
            ResourceKind::ObjectStore
        );
    }

    #[test]
    fn test_registry_preserves_order() {
        let mut registry = ResourceRegistry::new();
        for name in ["Zeta", "Alpha", "Mid"] {
            registry.declare(Resource::object_store(rid(name))).unwrap();
        }
        let names: Vec<_> = registry.iter().map(|r| r.id().as_str()).collect();
        assert_eq!(names, vec!["Zeta", "Alpha", "Mid"]);
    }

    #[test]
    fn test_billing_mode_serde() {
        let json = serde_json::to_string(&BillingMode::Provisioned {
            read_units: 5,
            write_units: 2,
        })
        .unwrap();
        assert_eq!(json, r#"{"mode":"provisioned","read_units":5,"write_units":2}"#);
        let back: BillingMode = serde_json::from_str(r#"{"mode":"pay-per-request"}"#).unwrap();
        assert_eq!(back, BillingMode::PayPerRequest);
    }
}
