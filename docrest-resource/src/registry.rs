use std::{collections::BTreeMap, sync::Arc};

use tracing::debug;

use crate::{
    error::{ResourceError, ResourceResult},
    resource::ResourceSpec,
};

/// Resources known to an application, by name.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Default, Clone)]
pub struct ResourceRegistry {
    resources: BTreeMap<String, Arc<ResourceSpec>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a built resource. Names must be unique.
    pub fn register(&mut self, resource: ResourceSpec) -> ResourceResult<Arc<ResourceSpec>> {
        self.register_shared(Arc::new(resource))
    }

    /// Registers a resource that is already shared, e.g. as another resource's child.
    pub fn register_shared(&mut self, resource: Arc<ResourceSpec>) -> ResourceResult<Arc<ResourceSpec>> {
        if self.resources.contains_key(resource.name()) {
            return Err(ResourceError::Configuration(format!(
                "resource \"{}\" is already registered",
                resource.name()
            )));
        }

        debug!(
            resource = resource.name(),
            doc_type = resource.schema().doc_type(),
            collection = resource.schema().collection(),
            "registered resource"
        );
        self.resources.insert(resource.name().to_string(), resource.clone());
        Ok(resource)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ResourceSpec>> {
        self.resources.get(name)
    }

    /// The resource bound to the given document type, if one is registered.
    pub fn for_document_type(&self, doc_type: &str) -> Option<&Arc<ResourceSpec>> {
        self.resources
            .values()
            .find(|resource| resource.schema().doc_type() == doc_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<ResourceSpec>)> {
        self.resources.iter().map(|(name, resource)| (name.as_str(), resource))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DocumentSchema, ScalarType};

    fn resource(name: &str, doc_type: &str) -> ResourceSpec {
        let schema = DocumentSchema::builder(doc_type, "users")
            .scalar("nick", ScalarType::String)
            .build();
        ResourceSpec::builder(name, schema).build().unwrap()
    }

    #[test]
    fn registers_and_finds_by_name_and_type() {
        let mut registry = ResourceRegistry::new();
        registry.register(resource("users", "User")).unwrap();
        registry.register(resource("admins", "Admin")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("users").unwrap().schema().doc_type(), "User");
        assert_eq!(registry.for_document_type("Admin").unwrap().name(), "admins");
        assert!(registry.for_document_type("Guest").is_none());
        assert_eq!(registry.iter().map(|(name, _)| name).collect::<Vec<_>>(), vec!["admins", "users"]);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ResourceRegistry::new();
        registry.register(resource("users", "User")).unwrap();

        let err = registry.register(resource("users", "Admin")).unwrap_err();
        assert!(matches!(err, ResourceError::Configuration(_)));
        assert_eq!(registry.len(), 1);
    }
}
