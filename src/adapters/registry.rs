//! Adapter registry
//!
//! Maps integration type tags to adapter instances and their metadata. Built
//! once at startup and shared by `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::graphql::GraphqlAdapter;
use super::http::{HttpError, HttpSource};
use super::manual::ManualAdapter;
use super::rest::RestAdapter;
use super::trait_::Adapter;
use crate::config::HttpConfig;
use crate::models::IntegrationType;

/// Error type for registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no adapter registered for type {tag}")]
    AdapterNotFound { tag: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] HttpError),
}

/// Metadata about an adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdapterMetadata {
    /// Type tag stored on integrations
    pub tag: String,
    pub display_name: String,
    /// Whether the scheduler may pick up integrations of this type
    pub sync_capable: bool,
}

impl AdapterMetadata {
    pub fn new(tag: impl Into<String>, display_name: impl Into<String>, sync_capable: bool) -> Self {
        Self {
            tag: tag.into(),
            display_name: display_name.into(),
            sync_capable,
        }
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
    metadata: HashMap<String, AdapterMetadata>,
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_ascii_uppercase()
}

impl Registry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the REST, GraphQL, and manual adapters.
    pub fn with_builtin_adapters(http: &HttpConfig) -> Result<Self, RegistryError> {
        let source = HttpSource::new(http)?;
        let mut registry = Self::new();

        registry.register(
            Arc::new(RestAdapter::new(source.clone())),
            AdapterMetadata::new(IntegrationType::Api.as_str(), "REST API", true),
        );
        registry.register(
            Arc::new(GraphqlAdapter::new(source)),
            AdapterMetadata::new(IntegrationType::Graphql.as_str(), "GraphQL API", true),
        );
        registry.register(
            Arc::new(ManualAdapter),
            AdapterMetadata::new(IntegrationType::Manual.as_str(), "Manual entry", false),
        );

        Ok(registry)
    }

    /// Register an adapter, replacing any previous one with the same tag
    pub fn register(&mut self, adapter: Arc<dyn Adapter>, mut metadata: AdapterMetadata) {
        let tag = normalize_tag(&metadata.tag);
        metadata.tag = tag.clone();
        debug!(tag = %tag, sync_capable = metadata.sync_capable, "Registering adapter");
        self.adapters.insert(tag.clone(), adapter);
        self.metadata.insert(tag, metadata);
    }

    /// Get the adapter for a type tag
    pub fn get(&self, tag: &str) -> Result<Arc<dyn Adapter>, RegistryError> {
        self.adapters
            .get(&normalize_tag(tag))
            .cloned()
            .ok_or_else(|| RegistryError::AdapterNotFound {
                tag: tag.to_string(),
            })
    }

    pub fn has(&self, tag: &str) -> bool {
        self.adapters.contains_key(&normalize_tag(tag))
    }

    pub fn get_metadata(&self, tag: &str) -> Result<&AdapterMetadata, RegistryError> {
        self.metadata
            .get(&normalize_tag(tag))
            .ok_or_else(|| RegistryError::AdapterNotFound {
                tag: tag.to_string(),
            })
    }

    /// Metadata for all adapters, sorted by tag for stable ordering
    pub fn list_metadata(&self) -> Vec<AdapterMetadata> {
        let mut metadata: Vec<_> = self.metadata.values().cloned().collect();
        metadata.sort_by(|a, b| a.tag.cmp(&b.tag));
        metadata
    }

    /// Tags of adapters the scheduler may run, as stored on integrations
    pub fn sync_capable_tags(&self) -> Vec<String> {
        self.list_metadata()
            .into_iter()
            .filter(|m| m.sync_capable)
            .map(|m| m.tag)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> Registry {
        Registry::with_builtin_adapters(&HttpConfig::default()).unwrap()
    }

    #[test]
    fn builtin_registry_resolves_each_type() {
        let registry = builtin();
        for kind in IntegrationType::ALL {
            assert!(registry.has(kind.as_str()));
            assert!(registry.get(kind.as_str()).is_ok());
        }
        assert!(registry.has("graphql"));
    }

    #[test]
    fn unknown_type_fails_with_descriptive_error() {
        let err = builtin().get("SOAP").err().unwrap();
        assert_eq!(err.to_string(), "no adapter registered for type SOAP");
        assert!(!builtin().has("SOAP"));
    }

    #[test]
    fn manual_is_not_sync_capable() {
        let registry = builtin();
        assert_eq!(registry.sync_capable_tags(), vec!["API", "GRAPHQL"]);
        assert!(!registry.get_metadata("MANUAL").unwrap().sync_capable);
    }

    #[test]
    fn register_replaces_existing_tag() {
        let mut registry = Registry::new();
        registry.register(
            Arc::new(ManualAdapter),
            AdapterMetadata::new("CSV", "CSV upload", false),
        );
        registry.register(
            Arc::new(ManualAdapter),
            AdapterMetadata::new("csv", "CSV upload v2", true),
        );
        assert_eq!(registry.list_metadata().len(), 1);
        assert_eq!(registry.sync_capable_tags(), vec!["CSV"]);
        assert_eq!(registry.get_metadata("Csv").unwrap().display_name, "CSV upload v2");
    }
}
