use anyhow::{Context, Result};
use async_trait::async_trait;
use extract::EntityType;
use ingest::SourceType;
use neo4rs::{Graph, Query};
use tracing::info;

use crate::graph_store::{ConnectedEntity, DocumentRef, EntitySummary, GraphBackend};

/// Graph backend on a Neo4j server.
///
/// Entities and documents are keyed by unique constraints on `name` and
/// `source`; relations are `RELATED_TO` edges carrying a `relation` label.
pub struct Neo4jGraph {
    graph: Graph,
}

impl Neo4jGraph {
    pub fn new(graph: Graph) -> Self {
        Self { graph }
    }

    pub async fn open(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("Failed to connect to Neo4j")?;
        Ok(Self::new(graph))
    }

    /// Run a query that returns a single `count` column.
    async fn count(&self, query: Query) -> Result<usize> {
        let mut result = self.graph.execute(query).await?;
        let count = match result.next().await? {
            Some(row) => row.get::<i64>("count").unwrap_or(0),
            None => 0,
        };
        Ok(count.max(0) as usize)
    }

    /// Run a write that returns a row only when its MATCH succeeded.
    async fn matched(&self, query: Query) -> Result<bool> {
        let mut result = self.graph.execute(query).await?;
        Ok(result.next().await?.is_some())
    }
}

fn summary(row: &neo4rs::Row) -> Result<EntitySummary> {
    let entity_type: String = row.get("type").unwrap_or_default();
    Ok(EntitySummary {
        name: row.get("name")?,
        entity_type: EntityType::from_label(&entity_type),
        description: row.get("description").unwrap_or_default(),
    })
}

#[async_trait]
impl GraphBackend for Neo4jGraph {
    async fn connect(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT entity_name IF NOT EXISTS \
             FOR (e:Entity) REQUIRE e.name IS UNIQUE",
            "CREATE CONSTRAINT document_source IF NOT EXISTS \
             FOR (d:Document) REQUIRE d.source IS UNIQUE",
        ];

        for statement in statements {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .context("Failed to create Neo4j constraint")?;
        }

        info!("Neo4j schema ready");
        Ok(())
    }

    async fn upsert_entity(
        &self,
        name: &str,
        entity_type: EntityType,
        description: &str,
        source: &str,
    ) -> Result<()> {
        let query = Query::new(
            r#"
            MERGE (e:Entity {name: $name})
            ON CREATE SET e.type = $type, e.description = $description, e.source = $source
            ON MATCH SET e.description =
                CASE WHEN $description <> '' THEN $description ELSE e.description END
            "#
            .to_string(),
        )
        .param("name", name.to_string())
        .param("type", entity_type.as_str().to_string())
        .param("description", description.to_string())
        .param("source", source.to_string());

        self.graph.run(query).await.context("Failed to upsert entity")
    }

    async fn upsert_document(
        &self,
        source: &str,
        source_type: SourceType,
        timestamp: i64,
    ) -> Result<()> {
        let query = Query::new(
            r#"
            MERGE (d:Document {source: $source})
            ON CREATE SET d.source_type = $source_type, d.timestamp = $timestamp
            "#
            .to_string(),
        )
        .param("source", source.to_string())
        .param("source_type", source_type.as_str().to_string())
        .param("timestamp", timestamp);

        self.graph.run(query).await.context("Failed to upsert document")
    }

    async fn merge_mention(&self, doc_source: &str, entity_name: &str) -> Result<bool> {
        let query = Query::new(
            r#"
            MATCH (d:Document {source: $source}), (e:Entity {name: $name})
            MERGE (d)-[:MENTIONS]->(e)
            RETURN 1 AS ok
            "#
            .to_string(),
        )
        .param("source", doc_source.to_string())
        .param("name", entity_name.to_string());

        self.matched(query).await.context("Failed to add mention")
    }

    async fn merge_relation(&self, from: &str, to: &str, relation: &str) -> Result<bool> {
        let query = Query::new(
            r#"
            MATCH (a:Entity {name: $from}), (b:Entity {name: $to})
            MERGE (a)-[:RELATED_TO {relation: $relation}]->(b)
            RETURN 1 AS ok
            "#
            .to_string(),
        )
        .param("from", from.to_string())
        .param("to", to.to_string())
        .param("relation", relation.to_string());

        self.matched(query).await.context("Failed to add relation")
    }

    async fn related_entities(
        &self,
        name: &str,
        depth: usize,
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        // Variable-length bounds cannot be parameters
        let query = Query::new(format!(
            r#"
            MATCH (a:Entity {{name: $name}})-[:RELATED_TO*1..{depth}]-(b:Entity)
            WHERE a.name <> b.name
            RETURN DISTINCT b.name AS name, b.type AS type, b.description AS description
            LIMIT $limit
            "#
        ))
        .param("name", name.to_string())
        .param("limit", limit as i64);

        let mut result = self.graph.execute(query).await?;
        let mut entities = Vec::new();
        while let Some(row) = result.next().await? {
            entities.push(summary(&row)?);
        }
        Ok(entities)
    }

    async fn shortest_path(&self, from: &str, to: &str, max_depth: usize) -> Result<Vec<String>> {
        let query = Query::new(format!(
            r#"
            MATCH (a:Entity {{name: $from}}), (b:Entity {{name: $to}})
            MATCH path = shortestPath((a)-[:RELATED_TO*1..{max_depth}]-(b))
            RETURN [n IN nodes(path) | n.name] AS names
            "#
        ))
        .param("from", from.to_string())
        .param("to", to.to_string());

        let mut result = self.graph.execute(query).await?;
        match result.next().await? {
            Some(row) => Ok(row.get::<Vec<String>>("names").unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    async fn documents_for_entity(&self, name: &str, limit: usize) -> Result<Vec<DocumentRef>> {
        let query = Query::new(
            r#"
            MATCH (d:Document)-[:MENTIONS]->(e:Entity {name: $name})
            RETURN d.source AS source, d.source_type AS source_type
            LIMIT $limit
            "#
            .to_string(),
        )
        .param("name", name.to_string())
        .param("limit", limit as i64);

        let mut result = self.graph.execute(query).await?;
        let mut documents = Vec::new();
        while let Some(row) = result.next().await? {
            let source_type: String = row.get("source_type").unwrap_or_default();
            documents.push(DocumentRef {
                source: row.get("source")?,
                source_type: source_type.parse().unwrap_or(SourceType::Text),
            });
        }
        Ok(documents)
    }

    async fn most_connected(&self, limit: usize) -> Result<Vec<ConnectedEntity>> {
        let query = Query::new(
            r#"
            MATCH (e:Entity)-[r]-()
            RETURN e.name AS name, e.type AS type, count(r) AS connections
            ORDER BY connections DESC, name ASC
            LIMIT $limit
            "#
            .to_string(),
        )
        .param("limit", limit as i64);

        let mut result = self.graph.execute(query).await?;
        let mut ranked = Vec::new();
        while let Some(row) = result.next().await? {
            let entity_type: String = row.get("type").unwrap_or_default();
            let connections: i64 = row.get("connections").unwrap_or(0);
            ranked.push(ConnectedEntity {
                name: row.get("name")?,
                entity_type: EntityType::from_label(&entity_type),
                connections: connections.max(0) as usize,
            });
        }
        Ok(ranked)
    }

    async fn search_entities(
        &self,
        query: &str,
        entity_type: Option<EntityType>,
        limit: usize,
    ) -> Result<Vec<EntitySummary>> {
        let type_clause = if entity_type.is_some() {
            "AND e.type = $type"
        } else {
            ""
        };

        let mut cypher = Query::new(format!(
            r#"
            MATCH (e:Entity)
            WHERE e.name CONTAINS $query {type_clause}
            RETURN e.name AS name, e.type AS type, e.description AS description
            LIMIT $limit
            "#
        ))
        .param("query", query.to_string())
        .param("limit", limit as i64);

        if let Some(entity_type) = entity_type {
            cypher = cypher.param("type", entity_type.as_str().to_string());
        }

        let mut result = self.graph.execute(cypher).await?;
        let mut entities = Vec::new();
        while let Some(row) = result.next().await? {
            entities.push(summary(&row)?);
        }
        Ok(entities)
    }

    async fn entity_count(&self) -> Result<usize> {
        self.count(Query::new(
            "MATCH (e:Entity) RETURN count(e) AS count".to_string(),
        ))
        .await
    }

    async fn relation_count(&self) -> Result<usize> {
        self.count(Query::new(
            "MATCH ()-[r:RELATED_TO]->() RETURN count(r) AS count".to_string(),
        ))
        .await
    }
}
