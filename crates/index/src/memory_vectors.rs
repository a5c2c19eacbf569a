use anyhow::{Context, Result};
use async_trait::async_trait;
use ingest::Chunk;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::embeddings::{Embedder, cosine_similarity};
use crate::vector_store::{SearchFilter, VectorHit, VectorStore};

struct StoredChunk {
    id: String,
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Brute-force cosine search over chunks held in memory.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<StoredChunk>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn connect(&self) -> Result<()> {
        Ok(())
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
            .context("Failed to embed chunks")?;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            );
        }

        let mut records = self.records.write().await;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let id = chunk.chunk_id();
            let stored = StoredChunk {
                id: id.clone(),
                chunk: chunk.clone(),
                vector,
            };

            match records.iter_mut().find(|r| r.id == id) {
                Some(existing) => *existing = stored,
                None => records.push(stored),
            }
        }

        debug!(chunks = chunks.len(), total = records.len(), "Stored chunks in memory");
        Ok(chunks.len())
    }

    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorHit>> {
        let query_vector = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let records = self.records.read().await;

        let mut hits: Vec<VectorHit> = records
            .iter()
            .map(|r| VectorHit {
                content: r.chunk.content.clone(),
                source: r.chunk.source.clone(),
                source_type: r.chunk.source_type,
                chunk_index: r.chunk.index,
                distance: 1.0 - cosine_similarity(&query_vector, &r.vector),
                metadata: r.chunk.metadata.clone(),
            })
            .filter(|hit| filter.accepts(hit.source_type, hit.distance))
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);

        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn delete_by_source(&self, source: &str) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.chunk.source != source);
        Ok(before - records.len())
    }

    async fn delete_stale(&self, source: &str, keep: &[String]) -> Result<usize> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|r| r.chunk.source != source || keep.contains(&r.id));
        Ok(before - records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use ingest::{Metadata, SourceType};

    fn chunks(source: &str, source_type: SourceType, texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                Chunk::new(
                    text.to_string(),
                    i,
                    texts.len(),
                    source.to_string(),
                    source_type,
                    Metadata::new(),
                )
            })
            .collect()
    }

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new(Arc::new(HashingEmbedder::default()))
    }

    #[tokio::test]
    async fn search_ranks_by_distance() {
        let store = store();
        store
            .add_chunks(&chunks(
                "notes.md",
                SourceType::Text,
                &["Rust has a borrow checker", "Sourdough needs a starter"],
            ))
            .await
            .unwrap();

        let hits = store
            .search("borrow checker in rust", 5, &SearchFilter::default())
            .await
            .unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "Rust has a borrow checker");
        assert!(hits[0].distance < hits[1].distance);
        assert!(hits[0].distance >= 0.0);
    }

    #[tokio::test]
    async fn filter_applies_before_limit() {
        let store = store();
        store
            .add_chunks(&chunks(
                "a.txt",
                SourceType::Text,
                &["graph theory basics", "graph traversal", "graph coloring"],
            ))
            .await
            .unwrap();
        store
            .add_chunks(&chunks("b.pdf", SourceType::Pdf, &["unrelated cooking notes"]))
            .await
            .unwrap();

        let hits = store
            .search("graph", 1, &SearchFilter::source_type(SourceType::Pdf))
            .await
            .unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "b.pdf");
    }

    #[tokio::test]
    async fn identical_chunks_overwrite() {
        let store = store();
        let batch = chunks("a.txt", SourceType::Text, &["one", "two"]);

        store.add_chunks(&batch).await.unwrap();
        store.add_chunks(&batch).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn delete_by_source_removes_only_that_source() {
        let store = store();
        store
            .add_chunks(&chunks("a.txt", SourceType::Text, &["one", "two"]))
            .await
            .unwrap();
        store
            .add_chunks(&chunks("b.txt", SourceType::Text, &["three"]))
            .await
            .unwrap();

        assert_eq!(store.delete_by_source("a.txt").await.unwrap(), 2);
        assert_eq!(store.delete_by_source("a.txt").await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn min_certainty_drops_weak_hits() {
        let store = store();
        store
            .add_chunks(&chunks(
                "a.txt",
                SourceType::Text,
                &["graph traversal", "graph theory basics", "sourdough starter"],
            ))
            .await
            .unwrap();

        let filter = SearchFilter::default().with_min_certainty(0.9);
        let hits = store.search("graph traversal", 10, &filter).await.unwrap();

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "graph traversal");
    }

    #[tokio::test]
    async fn delete_stale_keeps_listed_ids() {
        let store = store();
        let old = chunks("a.txt", SourceType::Text, &["one", "two", "three"]);
        store.add_chunks(&old).await.unwrap();
        store
            .add_chunks(&chunks("b.txt", SourceType::Text, &["other"]))
            .await
            .unwrap();

        let keep = vec![old[0].chunk_id()];
        assert_eq!(store.delete_stale("a.txt", &keep).await.unwrap(), 2);

        assert_eq!(store.count().await.unwrap(), 2);
        let hits = store.search("one", 5, &SearchFilter::default()).await.unwrap();
        assert!(hits.iter().any(|h| h.content == "one"));
        assert!(hits.iter().any(|h| h.source == "b.txt"));
    }
}
