use anyhow::{Context, Result};
use extract::{OllamaClient, TextGenerator};
use index::{
    Embedder, EmbeddingClient, HashingEmbedder, InMemoryGraph, InMemoryVectorStore,
    KnowledgeGraph, Neo4jGraph, QdrantStore, VectorStore,
};
use ingest::{TextFileExtractor, WebPageExtractor};
use query::{Brain, IdeaEngine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::CachedEmbedder;
use crate::config::{AppConfig, StorageMode};
use crate::metrics::Metrics;
use crate::retry::RetryPolicy;

#[derive(Clone)]
pub struct AppState {
    pub brain: Arc<Brain>,
    pub ideas: Arc<IdeaEngine>,
    pub files: TextFileExtractor,
    pub web: Arc<WebPageExtractor>,
    /// Directory `/ingest/path` is confined to
    pub ingest_root: PathBuf,
    /// Only set when answers come from a real Ollama server
    pub ollama: Option<Arc<OllamaClient>>,
    pub embedding_cache: Option<Arc<CachedEmbedder>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(brain: Arc<Brain>, web: WebPageExtractor) -> Self {
        let ideas = Arc::new(IdeaEngine::new(brain.graph().clone(), brain.llm()));
        Self {
            brain,
            ideas,
            files: TextFileExtractor::new(),
            web: Arc::new(web),
            ingest_root: PathBuf::from("."),
            ollama: None,
            embedding_cache: None,
            metrics: Metrics::new(),
        }
    }

    pub fn with_ingest_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.ingest_root = root.into();
        self
    }

    /// Wire every collaborator from configuration and connect the stores.
    pub async fn build(config: &AppConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let retry = RetryPolicy::from_config(&config.retry);

        let ollama = Arc::new(OllamaClient::with_timeout(
            config.ollama.host.clone(),
            config.ollama.model.clone(),
            timeout,
        )?);

        let base_embedder: Arc<dyn Embedder> = match config.storage {
            StorageMode::External => Arc::new(EmbeddingClient::with_timeout(
                config.ollama.host.clone(),
                config.ollama.embed_model.clone(),
                timeout,
            )?),
            StorageMode::Memory => Arc::new(HashingEmbedder::default()),
        };

        let embedding_cache = config.cache.enabled.then(|| {
            Arc::new(CachedEmbedder::new(
                base_embedder.clone(),
                config.cache.max_entries,
            ))
        });
        let embedder: Arc<dyn Embedder> = match &embedding_cache {
            Some(cache) => cache.clone(),
            None => base_embedder,
        };

        let (vectors, graph): (Arc<dyn VectorStore>, KnowledgeGraph) = match config.storage {
            StorageMode::External => {
                let vectors = Arc::new(QdrantStore::new(
                    config.qdrant.url.clone(),
                    embedder,
                    config.qdrant.collection.clone(),
                ));

                let neo4j = &config.neo4j;
                let graph = match retry
                    .retry("connect to Neo4j", || {
                        Neo4jGraph::open(&neo4j.uri, &neo4j.user, &neo4j.password)
                    })
                    .await
                {
                    Ok(backend) => KnowledgeGraph::new(Arc::new(backend)),
                    Err(e) => {
                        warn!(error = %e, "Neo4j unreachable, graph will not persist");
                        KnowledgeGraph::new(Arc::new(InMemoryGraph::new()))
                    }
                };

                (vectors, graph)
            }
            StorageMode::Memory => (
                Arc::new(InMemoryVectorStore::new(embedder)),
                KnowledgeGraph::new(Arc::new(InMemoryGraph::new())),
            ),
        };

        let llm: Arc<dyn TextGenerator> = ollama.clone();
        let brain = Arc::new(Brain::new(config.chunker(), vectors, graph, llm));

        retry
            .retry("initialize knowledge base", || brain.initialize())
            .await
            .context("Knowledge base unavailable")?;

        let web = WebPageExtractor::new(timeout)?;

        info!(
            mode = ?config.mode,
            storage = ?config.storage,
            model = %config.ollama.model,
            ingest_root = %config.server.ingest_root.display(),
            "Application state ready"
        );

        Ok(Self {
            ollama: Some(ollama),
            embedding_cache,
            ..Self::new(brain, web).with_ingest_root(config.server.ingest_root.clone())
        })
    }
}
