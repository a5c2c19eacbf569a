use anyhow::Result;
use async_trait::async_trait;
use extract::EntityType;
use ingest::SourceType;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

pub const DEFAULT_RELATED_DEPTH: usize = 2;
pub const DEFAULT_RELATED_LIMIT: usize = 20;
pub const DEFAULT_PATH_DEPTH: usize = 5;
pub const DEFAULT_DOCUMENT_LIMIT: usize = 10;
pub const DEFAULT_SEARCH_LIMIT: usize = 20;
/// Traversal depths are interpolated into queries, so they are bounded.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub source: String,
    pub source_type: SourceType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedEntity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub connections: usize,
}

/// Storage engine behind [`KnowledgeGraph`].
///
/// Every write is an upsert keyed on entity name or document source.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    async fn connect(&self) -> Result<()>;

    /// On create all fields are set; on match only a non-empty description
    /// replaces the stored one.
    async fn upsert_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        description: &str,
        source: &str,
    ) -> Result<()>;

    /// Fields are written on create only.
    async fn upsert_document(
        &self,
        source: &str,
        source_type: SourceType,
        timestamp: i64,
    ) -> Result<()>;

    /// `Ok(false)` when either endpoint does not exist.
    async fn merge_mention(&self, doc_source: &str, entity_name: &str) -> Result<bool>;

    /// `Ok(false)` when either endpoint does not exist.
    async fn merge_relation(&self, from: &str, to: &str, relation: &str) -> Result<bool>;

    async fn related_entities(
        &self,
        name: &str,
        depth: usize,
        limit: usize,
    ) -> Result<Vec<EntitySummary>>;

    async fn shortest_path(&self, from: &str, to: &str, max_depth: usize) -> Result<Vec<String>>;

    async fn documents_for_entity(&self, name: &str, limit: usize) -> Result<Vec<DocumentRef>>;

    async fn most_connected(&self, limit: usize) -> Result<Vec<ConnectedEntity>>;

    async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntitySummary>>;

    async fn entity_count(&self) -> Result<usize>;

    async fn relation_count(&self) -> Result<usize>;
}

/// Entity/document graph used for enrichment and exploration.
///
/// Backend failures never reach callers: writes report `false`, reads come
/// back empty or zero, and the error is logged.
#[derive(Clone)]
pub struct KnowledgeGraph {
    backend: Arc<dyn GraphBackend>,
}

impl KnowledgeGraph {
    pub fn new(backend: Arc<dyn GraphBackend>) -> Self {
        Self { backend }
    }

    /// The only operation whose failure is returned.
    pub async fn connect(&self) -> Result<()> {
        self.backend.connect().await
    }

    pub async fn add_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        description: &str,
        source: &str,
    ) -> bool {
        match self
            .backend
            .upsert_entity(name, entity_type, description, source)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(entity = %name, error = %e, "Error adding entity");
                false
            }
        }
    }

    pub async fn add_document(
        &self,
        source: &str,
        source_type: SourceType,
        timestamp: i64,
    ) -> bool {
        match self
            .backend
            .upsert_document(source, source_type, timestamp)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                error!(source = %source, error = %e, "Error adding document");
                false
            }
        }
    }

    pub async fn add_mention(&self, doc_source: &str, entity_name: &str) -> bool {
        self.backend
            .merge_mention(doc_source, entity_name)
            .await
            .unwrap_or_else(|e| {
                error!(
                    source = %doc_source,
                    entity = %entity_name,
                    error = %e,
                    "Error adding mention"
                );
                false
            })
    }

    pub async fn add_relation(&self, from: &str, to: &str, relation: &str) -> bool {
        self.backend
            .merge_relation(from, to, relation)
            .await
            .unwrap_or_else(|e| {
                error!(from = %from, to = %to, error = %e, "Error adding relation");
                false
            })
    }

    pub async fn get_related_entities(
        &self,
        name: &str,
        depth: usize,
        limit: usize,
    ) -> Vec<EntitySummary> {
        let depth = depth.clamp(1, MAX_TRAVERSAL_DEPTH);
        self.backend
            .related_entities(name, depth, limit)
            .await
            .unwrap_or_else(|e| {
                error!(entity = %name, error = %e, "Error getting related entities");
                Vec::new()
            })
    }

    /// Entity names from `from` to `to` inclusive, or empty when unreachable.
    pub async fn find_path(&self, from: &str, to: &str, max_depth: usize) -> Vec<String> {
        if from == to {
            return Vec::new();
        }

        let max_depth = max_depth.clamp(1, MAX_TRAVERSAL_DEPTH);
        self.backend
            .shortest_path(from, to, max_depth)
            .await
            .unwrap_or_else(|e| {
                error!(from = %from, to = %to, error = %e, "Error finding path");
                Vec::new()
            })
    }

    pub async fn get_documents_for_entity(&self, name: &str, limit: usize) -> Vec<DocumentRef> {
        self.backend
            .documents_for_entity(name, limit)
            .await
            .unwrap_or_else(|e| {
                error!(entity = %name, error = %e, "Error getting documents");
                Vec::new()
            })
    }

    pub async fn get_most_connected(&self, limit: usize) -> Vec<ConnectedEntity> {
        self.backend.most_connected(limit).await.unwrap_or_else(|e| {
            error!(error = %e, "Error getting most connected entities");
            Vec::new()
        })
    }

    pub async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Vec<EntitySummary> {
        self.backend
            .search_entities(query, entity_type, limit)
            .await
            .unwrap_or_else(|e| {
                error!(query = %query, error = %e, "Error searching entities");
                Vec::new()
            })
    }

    pub async fn get_entity_count(&self) -> usize {
        self.backend.entity_count().await.unwrap_or_else(|e| {
            error!(error = %e, "Error counting entities");
            0
        })
    }

    pub async fn get_relation_count(&self) -> usize {
        self.backend.relation_count().await.unwrap_or_else(|e| {
            error!(error = %e, "Error counting relations");
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Backend where every call fails.
    struct Unreachable;

    #[async_trait]
    impl GraphBackend for Unreachable {
        async fn connect(&self) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn upsert_entity(&self, _: &str, _: EntityType, _: &str, _: &str) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn upsert_document(&self, _: &str, _: SourceType, _: i64) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn merge_mention(&self, _: &str, _: &str) -> Result<bool> {
            anyhow::bail!("connection refused")
        }
        async fn merge_relation(&self, _: &str, _: &str, _: &str) -> Result<bool> {
            anyhow::bail!("connection refused")
        }
        async fn related_entities(
            &self,
            _: &str,
            _: usize,
            _: usize,
        ) -> Result<Vec<EntitySummary>> {
            anyhow::bail!("connection refused")
        }
        async fn shortest_path(&self, _: &str, _: &str, _: usize) -> Result<Vec<String>> {
            anyhow::bail!("connection refused")
        }
        async fn documents_for_entity(&self, _: &str, _: usize) -> Result<Vec<DocumentRef>> {
            anyhow::bail!("connection refused")
        }
        async fn most_connected(&self, _: usize) -> Result<Vec<ConnectedEntity>> {
            anyhow::bail!("connection refused")
        }
        async fn search_entities(
            &self,
            _: &str,
            _: Option<EntityType>,
            _: usize,
        ) -> Result<Vec<EntitySummary>> {
            anyhow::bail!("connection refused")
        }
        async fn entity_count(&self) -> Result<usize> {
            anyhow::bail!("connection refused")
        }
        async fn relation_count(&self) -> Result<usize> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn backend_errors_are_absorbed() {
        let graph = KnowledgeGraph::new(Arc::new(Unreachable));

        assert!(graph.connect().await.is_err());
        assert!(!graph.add_entity("Rust", EntityType::Technology, "", "a.txt").await);
        assert!(!graph.add_document("a.txt", SourceType::Text, 0).await);
        assert!(!graph.add_mention("a.txt", "Rust").await);
        assert!(!graph.add_relation("Rust", "Tokio", "USES").await);
        assert!(graph.get_related_entities("Rust", 2, 10).await.is_empty());
        assert!(graph.find_path("Rust", "Tokio", 5).await.is_empty());
        assert!(graph.get_documents_for_entity("Rust", 5).await.is_empty());
        assert!(graph.get_most_connected(5).await.is_empty());
        assert!(graph.search_entities("Ru", None, 5).await.is_empty());
        assert_eq!(graph.get_entity_count().await, 0);
        assert_eq!(graph.get_relation_count().await, 0);
    }
}
