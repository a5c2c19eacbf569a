use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use ingest::{Chunk, Metadata, SourceType};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::embeddings::Embedder;
use crate::vector_store::{SearchFilter, VectorHit, VectorStore};

/// Vector store backed by the Qdrant REST API.
pub struct QdrantStore {
    base_url: String,
    client: reqwest::Client,
    embedder: Arc<dyn Embedder>,
    collection_name: String,
}

#[derive(Serialize)]
struct CreateCollection {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertPoints {
    points: Vec<Point>,
}

#[derive(Serialize)]
struct Point {
    id: String,
    vector: Vec<f32>,
    payload: ChunkPayload,
}

#[derive(Serialize, Deserialize)]
struct ChunkPayload {
    content: String,
    source: String,
    source_type: SourceType,
    chunk_index: usize,
    total_chunks: usize,
    #[serde(default)]
    metadata_json: String,
    #[serde(default)]
    indexed_at: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<ScoredPoint>,
}

#[derive(Deserialize)]
struct ScoredPoint {
    score: f32,
    payload: Option<ChunkPayload>,
}

#[derive(Deserialize)]
struct CountResponse {
    result: CountResult,
}

#[derive(Deserialize)]
struct CountResult {
    count: usize,
}

impl QdrantStore {
    pub fn new(base_url: String, embedder: Arc<dyn Embedder>, collection_name: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            embedder,
            collection_name,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection_name)
    }

    fn match_filter(key: &str, value: &str) -> Value {
        json!({ "must": [{ "key": key, "match": { "value": value } }] })
    }

    async fn create_collection(&self) -> Result<()> {
        let dimension = self
            .embedder
            .dimension()
            .await
            .context("Failed to determine embedding dimension")?;
        info!(collection = %self.collection_name, dimension, "Creating Qdrant collection");

        let create_req = CreateCollection {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine",
            },
        };

        let response = self
            .client
            .put(self.collection_url())
            .json(&create_req)
            .send()
            .await
            .context("Failed to send create collection request")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to create collection: {}", error_text);
        }

        // Keyword indexes keep source filters and deletes cheap
        for field in ["source", "source_type"] {
            let response = self
                .client
                .put(format!("{}/index", self.collection_url()))
                .json(&json!({ "field_name": field, "field_schema": "keyword" }))
                .send()
                .await
                .context("Failed to send payload index request")?;

            if !response.status().is_success() {
                anyhow::bail!("Failed to index payload field {}: {}", field, response.status());
            }
        }

        Ok(())
    }

    async fn count_matching(&self, filter: Option<Value>) -> Result<usize> {
        let mut body = json!({ "exact": true });
        if let Some(filter) = filter {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&body)
            .send()
            .await
            .context("Failed to send count request")?;

        if !response.status().is_success() {
            anyhow::bail!("Count request failed: {}", response.status());
        }

        let count: CountResponse = response
            .json()
            .await
            .context("Failed to parse count response")?;

        Ok(count.result.count)
    }

    async fn delete_matching(&self, source: &str, filter: Value) -> Result<usize> {
        let existing = self.count_matching(Some(filter.clone())).await?;
        if existing == 0 {
            return Ok(0);
        }

        let response = self
            .client
            .post(format!("{}/points/delete?wait=true", self.collection_url()))
            .json(&json!({ "filter": filter }))
            .send()
            .await
            .context("Failed to send delete request")?;

        if !response.status().is_success() {
            anyhow::bail!("Delete request failed: {}", response.status());
        }

        info!(source = %source, chunks = existing, "Deleted chunks for source");
        Ok(existing)
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn connect(&self) -> Result<()> {
        let response = self
            .client
            .get(self.collection_url())
            .send()
            .await
            .context("Failed to reach Qdrant")?;

        if response.status().is_success() {
            debug!(collection = %self.collection_name, "Collection already exists");
            return Ok(());
        }

        if response.status() != reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!("Failed to inspect collection: {}", response.status());
        }

        self.create_collection().await
    }

    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to generate embeddings")?;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let indexed_at = Utc::now().to_rfc3339();
        let mut points = Vec::with_capacity(chunks.len());

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let id = Uuid::parse_str(&chunk.chunk_id()).context("Invalid chunk id")?;

            points.push(Point {
                id: id.to_string(),
                vector,
                payload: ChunkPayload {
                    content: chunk.content.clone(),
                    source: chunk.source.clone(),
                    source_type: chunk.source_type,
                    chunk_index: chunk.index,
                    total_chunks: chunk.total_chunks,
                    metadata_json: serde_json::to_string(&chunk.metadata)?,
                    indexed_at: indexed_at.clone(),
                },
            });
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&UpsertPoints { points })
            .send()
            .await
            .context("Failed to send upsert request")?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to upsert points: {}", error_text);
        }

        debug!(chunks = chunks.len(), collection = %self.collection_name, "Upserted points");
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorHit>> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
        });
        if let Some(source_type) = filter.source_type {
            body["filter"] = Self::match_filter("source_type", source_type.as_str());
        }
        if filter.min_certainty > 0.0 {
            body["score_threshold"] = json!(filter.min_certainty);
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&body)
            .send()
            .await
            .context("Failed to send search request")?;

        if !response.status().is_success() {
            anyhow::bail!("Search request failed: {}", response.status());
        }

        let search: SearchResponse = response
            .json()
            .await
            .context("Failed to parse search response")?;

        let hits = search
            .result
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                let metadata: Metadata =
                    serde_json::from_str(&payload.metadata_json).unwrap_or_default();

                Some(VectorHit {
                    content: payload.content,
                    source: payload.source,
                    source_type: payload.source_type,
                    chunk_index: payload.chunk_index,
                    distance: 1.0 - point.score,
                    metadata,
                })
            })
            .collect();

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        self.count_matching(None).await
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        self.delete_matching(source, Self::match_filter("source", source)).await
    }

    async fn delete_stale(&self, source: &str, keep: &[String]) -> Result<usize> {
        let ids = keep
            .iter()
            .map(|id| Uuid::parse_str(id).map(|u| u.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid chunk id")?;

        let mut filter = Self::match_filter("source", source);
        if !ids.is_empty() {
            filter["must_not"] = json!([{ "has_id": ids }]);
        }

        self.delete_matching(source, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use httpmock::prelude::*;

    fn store(server: &MockServer) -> QdrantStore {
        QdrantStore::new(
            server.base_url(),
            Arc::new(HashingEmbedder::new(16)),
            "knowledge".to_string(),
        )
    }

    #[tokio::test]
    async fn connect_creates_missing_collection() {
        let server = MockServer::start_async().await;
        let inspect = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/knowledge");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/knowledge")
                    .body_contains("\"size\":16")
                    .body_contains("\"distance\":\"Cosine\"");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let index = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/knowledge/index");
                then.status(200).json_body(json!({ "result": {} }));
            })
            .await;

        store(&server).connect().await.unwrap();

        inspect.assert_async().await;
        create.assert_async().await;
        index.assert_hits_async(2).await;
    }

    #[tokio::test]
    async fn search_converts_score_to_distance() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/knowledge/points/search")
                    .body_contains("\"key\":\"source_type\"")
                    .body_contains("\"value\":\"pdf\"");
                then.status(200).json_body(json!({
                    "result": [{
                        "id": "6f1c9a50-0000-0000-0000-000000000000",
                        "score": 0.75,
                        "payload": {
                            "content": "Graphs connect ideas",
                            "source": "paper.pdf",
                            "source_type": "pdf",
                            "chunk_index": 3,
                            "total_chunks": 9,
                            "metadata_json": "{\"pages\":12}",
                            "indexed_at": "2024-01-01T00:00:00Z"
                        }
                    }],
                    "status": "ok"
                }));
            })
            .await;

        let hits = store(&server)
            .search("graphs", 5, &SearchFilter::source_type(SourceType::Pdf))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "paper.pdf");
        assert_eq!(hits[0].chunk_index, 3);
        assert!((hits[0].distance - 0.25).abs() < 1e-6);
        assert_eq!(hits[0].metadata.get("pages"), Some(&json!(12)));
    }

    #[tokio::test]
    async fn upsert_uses_deterministic_ids() {
        let server = MockServer::start_async().await;
        let chunk = Chunk::new(
            "hello world".to_string(),
            0,
            1,
            "notes.md".to_string(),
            SourceType::Text,
            Metadata::new(),
        );
        let expected_id = Uuid::parse_str(&chunk.chunk_id()).unwrap().to_string();

        let expected = expected_id.clone();
        let mock = server
            .mock_async(move |when, then| {
                when.method(PUT)
                    .path("/collections/knowledge/points")
                    .query_param("wait", "true")
                    .body_contains(format!("\"id\":\"{}\"", expected))
                    .body_contains("\"source\":\"notes.md\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let written = store(&server).add_chunks(&[chunk]).await.unwrap();

        assert_eq!(written, 1);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_by_source_skips_when_nothing_matches() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/knowledge/points/count")
                    .body_contains("\"value\":\"old.txt\"");
                then.status(200).json_body(json!({ "result": { "count": 0 } }));
            })
            .await;
        let delete = server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/knowledge/points/delete");
                then.status(200);
            })
            .await;

        let removed = store(&server).delete_by_source("old.txt").await.unwrap();

        assert_eq!(removed, 0);
        delete.assert_hits_async(0).await;
    }

    #[tokio::test]
    async fn search_sends_score_threshold() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/knowledge/points/search")
                    .body_contains("\"score_threshold\":0.5");
                then.status(200).json_body(json!({ "result": [], "status": "ok" }));
            })
            .await;

        let filter = SearchFilter::default().with_min_certainty(0.5);
        let hits = store(&server).search("graphs", 5, &filter).await.unwrap();

        mock.assert_async().await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn delete_stale_excludes_kept_ids() {
        let server = MockServer::start_async().await;
        let kept = Chunk::new(
            "fresh".to_string(),
            0,
            1,
            "notes.md".to_string(),
            SourceType::Text,
            Metadata::new(),
        );
        let kept_id = Uuid::parse_str(&kept.chunk_id()).unwrap().to_string();

        let expected = kept_id.clone();
        let count = server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/collections/knowledge/points/count")
                    .body_contains("\"must_not\"")
                    .body_contains(format!("\"has_id\":[\"{}\"]", expected));
                then.status(200).json_body(json!({ "result": { "count": 2 } }));
            })
            .await;
        let delete = server
            .mock_async(move |when, then| {
                when.method(POST)
                    .path("/collections/knowledge/points/delete")
                    .query_param("wait", "true")
                    .body_contains(format!("\"has_id\":[\"{}\"]", kept_id));
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let removed = store(&server)
            .delete_stale("notes.md", &[kept.chunk_id()])
            .await
            .unwrap();

        assert_eq!(removed, 2);
        count.assert_async().await;
        delete.assert_async().await;
    }
}
