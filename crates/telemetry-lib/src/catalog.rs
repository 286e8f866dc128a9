//! Entity catalog providers
//!
//! A catalog answers one question: which entities exist for a category.
//! Lookups run per category so one failing category never hides the others.

use crate::error::CatalogError;
use crate::models::{Entity, EntityCategory};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of the entities a run generates telemetry for
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// List every entity of one category
    async fn list_category(&self, category: EntityCategory) -> Result<Vec<Entity>, CatalogError>;

    /// Human-readable origin, for logs
    fn source(&self) -> String;
}

/// Configuration for the entity catalog
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Graph export JSON file
    pub path: Option<PathBuf>,
}

/// Result of loading several categories
#[derive(Debug, Default)]
pub struct CatalogLoad {
    pub entities: Vec<Entity>,
    /// Categories whose lookup failed, with the reason
    pub failures: Vec<(EntityCategory, CatalogError)>,
}

impl CatalogLoad {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Load entities for `categories`, collecting per-category failures
pub async fn list_entities(
    catalog: &dyn EntityCatalog,
    categories: &[EntityCategory],
) -> CatalogLoad {
    let mut load = CatalogLoad::default();

    for category in categories {
        match catalog.list_category(*category).await {
            Ok(entities) => {
                debug!(category = %category, count = entities.len(), "Loaded entities");
                load.entities.extend(entities);
            }
            Err(e) => {
                warn!(
                    category = %category,
                    source = %catalog.source(),
                    error = %e,
                    "Entity lookup failed"
                );
                load.failures.push((*category, e));
            }
        }
    }

    load
}

#[derive(Debug, Deserialize)]
struct GraphExport {
    nodes: Vec<GraphNode>,
}

#[derive(Debug, Deserialize)]
struct GraphNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    properties: Option<NodeProperties>,
}

#[derive(Debug, Default, Deserialize)]
struct NodeProperties {
    #[serde(default)]
    name: Option<String>,
}

/// Catalog backed by a topology graph export
///
/// Expects `{"nodes": [{"id", "type", "name"?, "properties"?: {"name"?}}], ...}`.
/// Other top-level keys such as `edges` are ignored. Nodes with an
/// unrecognised type are skipped.
#[derive(Debug, Clone)]
pub struct JsonGraphCatalog {
    path: PathBuf,
    entities: Vec<Entity>,
}

impl JsonGraphCatalog {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref().to_path_buf();
        let raw = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CatalogError::Io {
                path: path.display().to_string(),
                source,
            })?;

        let catalog = Self::from_json(&raw, path)?;
        info!(
            path = %catalog.path.display(),
            entities = catalog.entities.len(),
            "Loaded graph catalog"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str, path: PathBuf) -> Result<Self, CatalogError> {
        let export: GraphExport = serde_json::from_str(raw)?;

        let mut seen = HashSet::new();
        let mut entities = Vec::with_capacity(export.nodes.len());

        for node in export.nodes {
            let category = match node.node_type.parse::<EntityCategory>() {
                Ok(category) => category,
                Err(e) => {
                    debug!(id = %node.id, error = %e, "Skipping node of unknown type");
                    continue;
                }
            };
            if !seen.insert(node.id.clone()) {
                debug!(id = %node.id, "Skipping duplicate node");
                continue;
            }

            let name = node
                .name
                .or_else(|| node.properties.and_then(|p| p.name))
                .unwrap_or_else(|| node.id.clone());
            entities.push(Entity::new(node.id, category, name));
        }

        Ok(Self { path, entities })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[async_trait]
impl EntityCatalog for JsonGraphCatalog {
    async fn list_category(&self, category: EntityCategory) -> Result<Vec<Entity>, CatalogError> {
        Ok(self
            .entities
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect())
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const GRAPH: &str = r#"{
        "nodes": [
            {"id": "DC_1", "type": "DC", "properties": {"name": "dc-one"}},
            {"id": "VM_1", "type": "VM", "properties": {"name": "web-01"}},
            {"id": "VM_2", "type": "VM"},
            {"id": "HOST_1", "type": "HOST", "name": "rack-a"},
            {"id": "TRU_1", "type": "TRU"},
            {"id": "VM_1", "type": "VM"},
            {"id": "X_1", "type": "SWITCH"}
        ],
        "edges": [{"source": "HOST_1", "target": "VM_1"}]
    }"#;

    #[tokio::test]
    async fn test_load_graph_export() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.json");
        tokio::fs::write(&path, GRAPH).await.unwrap();

        let catalog = JsonGraphCatalog::load(&path).await.unwrap();
        assert_eq!(catalog.len(), 5);

        let vms = catalog.list_category(EntityCategory::Vm).await.unwrap();
        assert_eq!(vms.len(), 2);
        assert_eq!(vms[0].name, "web-01");
        // Name falls back to the id
        assert_eq!(vms[1].name, "VM_2");

        let pools = catalog
            .list_category(EntityCategory::StoragePool)
            .await
            .unwrap();
        assert_eq!(pools[0].id, "TRU_1");

        let hosts = catalog.list_category(EntityCategory::Host).await.unwrap();
        assert_eq!(hosts[0].name, "rack-a");
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = JsonGraphCatalog::load("/nonexistent/graph.json")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Io { .. }));
    }

    #[test]
    fn test_malformed_json() {
        let err = JsonGraphCatalog::from_json("{\"nodes\": 3}", PathBuf::from("x")).unwrap_err();
        assert!(matches!(err, CatalogError::Parse(_)));
    }

    /// Catalog whose HOST lookup always fails
    struct FlakyCatalog {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EntityCatalog for FlakyCatalog {
        async fn list_category(
            &self,
            category: EntityCategory,
        ) -> Result<Vec<Entity>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match category {
                EntityCategory::Host => {
                    Err(CatalogError::Unavailable("graph store timeout".into()))
                }
                other => Ok(vec![Entity::new(format!("{other}_1"), other, "x")]),
            }
        }

        fn source(&self) -> String {
            "flaky".into()
        }
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_abort() {
        let catalog = FlakyCatalog {
            calls: AtomicUsize::new(0),
        };

        let load = list_entities(
            &catalog,
            &[EntityCategory::Vm, EntityCategory::Host, EntityCategory::Ne],
        )
        .await;

        assert_eq!(catalog.calls.load(Ordering::SeqCst), 3);
        assert_eq!(load.entities.len(), 2);
        assert!(load.is_partial());
        assert_eq!(load.failures[0].0, EntityCategory::Host);
    }
}
