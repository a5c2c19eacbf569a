use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use index::Embedder;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Embedder wrapper that remembers vectors by the SHA-256 of their text.
///
/// When the cache is full a quarter of it is dropped before inserting.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    embeddings: DashMap<String, Vec<f32>>,
    max_entries: usize,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub embeddings_cached: usize,
    pub hits: usize,
    pub misses: usize,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_entries: usize) -> Self {
        Self {
            inner,
            embeddings: DashMap::new(),
            max_entries: max_entries.max(1),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    fn get(&self, key: &str) -> Option<Vec<f32>> {
        self.embeddings.get(key).map(|r| r.value().clone())
    }

    fn set(&self, key: String, embedding: Vec<f32>) {
        if self.embeddings.len() >= self.max_entries {
            let to_remove: Vec<_> = self
                .embeddings
                .iter()
                .take((self.max_entries / 4).max(1))
                .map(|r| r.key().clone())
                .collect();
            for key in to_remove {
                self.embeddings.remove(&key);
            }
        }
        self.embeddings.insert(key, embedding);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            embeddings_cached: self.embeddings.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = hash_text(text);
        if let Some(embedding) = self.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(embedding);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let embedding = self.inner.embed(text).await?;
        self.set(key, embedding.clone());
        Ok(embedding)
    }

    async fn dimension(&self) -> Result<usize> {
        self.inner.dimension().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for Counting {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32])
        }
    }

    fn counting() -> Arc<Counting> {
        Arc::new(Counting {
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn repeated_text_hits_the_cache() {
        let inner = counting();
        let cache = CachedEmbedder::new(inner.clone(), 10);

        assert_eq!(cache.embed("hello").await.unwrap(), vec![5.0]);
        assert_eq!(cache.embed("hello").await.unwrap(), vec![5.0]);
        cache.embed("hi").await.unwrap();

        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.embeddings_cached, 2);
    }

    #[tokio::test]
    async fn full_cache_evicts_a_quarter() {
        let cache = CachedEmbedder::new(counting(), 8);

        for i in 0..8 {
            cache.embed(&format!("text {}", i)).await.unwrap();
        }
        assert_eq!(cache.stats().embeddings_cached, 8);

        cache.embed("one more").await.unwrap();
        assert_eq!(cache.stats().embeddings_cached, 7);
    }

    #[tokio::test]
    async fn batch_embedding_goes_through_the_cache() {
        let inner = counting();
        let cache = CachedEmbedder::new(inner.clone(), 10);

        let texts = vec!["a".to_string(), "a".to_string(), "bb".to_string()];
        let vectors = cache.embed_batch(&texts).await.unwrap();

        assert_eq!(vectors, vec![vec![1.0], vec![1.0], vec![2.0]]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
