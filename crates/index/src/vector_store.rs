use anyhow::Result;
use async_trait::async_trait;
use ingest::{Chunk, Metadata, SourceType};
use serde::{Deserialize, Serialize};

/// One nearest-neighbour result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub content: String,
    pub source: String,
    pub source_type: SourceType,
    pub chunk_index: usize,
    /// Cosine distance, `1 - similarity`
    pub distance: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// Narrows a vector search.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchFilter {
    pub source_type: Option<SourceType>,
    /// Hits with `1 - distance` below this are dropped
    pub min_certainty: f32,
}

impl SearchFilter {
    pub fn source_type(source_type: SourceType) -> Self {
        Self {
            source_type: Some(source_type),
            ..Self::default()
        }
    }

    pub fn with_min_certainty(mut self, min_certainty: f32) -> Self {
        self.min_certainty = min_certainty.clamp(0.0, 1.0);
        self
    }

    pub fn accepts(&self, source_type: SourceType, distance: f32) -> bool {
        self.source_type.is_none_or(|t| t == source_type) && 1.0 - distance >= self.min_certainty
    }
}

/// Chunk storage with approximate nearest-neighbour search.
///
/// Implementations embed text themselves; callers only hand over chunks and
/// query strings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Prepare the collection. Safe to call more than once.
    async fn connect(&self) -> Result<()>;

    /// Store chunks, returning how many were written.
    async fn add_chunks(&self, chunks: &[Chunk]) -> Result<usize>;

    /// Closest chunks first. The filter is applied before `limit`.
    async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<VectorHit>>;

    async fn count(&self) -> Result<usize>;

    /// Remove every chunk of `source`, returning how many were removed.
    async fn delete_by_source(&self, source: &str) -> Result<usize>;

    /// Remove chunks of `source` whose id is not in `keep`.
    async fn delete_stale(&self, source: &str, keep: &[String]) -> Result<usize>;
}
