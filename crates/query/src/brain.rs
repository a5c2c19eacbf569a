use anyhow::{Context, Result};
use chrono::Utc;
use extract::{EntityExtractor, ExtractionResult, GenerateOptions, TextGenerator};
use index::{ConnectedEntity, KnowledgeGraph, SearchFilter, VectorHit, VectorStore};
use ingest::{Chunk, Chunker, Metadata, ProcessedContent, SourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

use crate::prompts;

pub const DEFAULT_TOP_K: usize = 5;
/// More distinct sources than this and the footer is left off.
pub const MAX_FOOTER_SOURCES: usize = 5;
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    pub source: String,
    pub source_type: SourceType,
    /// `1 - distance`, clamped to `0..=1`
    pub relevance: f32,
    pub chunk_index: usize,
    #[serde(default)]
    pub metadata: Metadata,
}

impl From<VectorHit> for SearchResult {
    fn from(hit: VectorHit) -> Self {
        Self {
            relevance: (1.0 - hit.distance).clamp(0.0, 1.0),
            content: hit.content,
            source: hit.source,
            source_type: hit.source_type,
            chunk_index: hit.chunk_index,
            metadata: hit.metadata,
        }
    }
}

/// Best-effort snapshot; `error` is set when some part could not be read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeStats {
    pub total_chunks: usize,
    pub entities: usize,
    pub relations: usize,
    pub most_connected: Vec<ConnectedEntity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ties chunk storage, the entity graph and text generation together.
pub struct Brain {
    chunker: Chunker,
    vectors: Arc<dyn VectorStore>,
    graph: KnowledgeGraph,
    extractor: EntityExtractor,
    llm: Arc<dyn TextGenerator>,
    top_k: usize,
    initialized: OnceCell<()>,
}

impl Brain {
    pub fn new(
        chunker: Chunker,
        vectors: Arc<dyn VectorStore>,
        graph: KnowledgeGraph,
        llm: Arc<dyn TextGenerator>,
    ) -> Self {
        Self {
            chunker,
            vectors,
            graph,
            extractor: EntityExtractor::new(llm.clone()),
            llm,
            top_k: DEFAULT_TOP_K,
            initialized: OnceCell::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn llm(&self) -> Arc<dyn TextGenerator> {
        self.llm.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// Connect the stores once. A failed attempt is retried on the next call.
    ///
    /// The vector store is required; a graph that cannot be reached only
    /// disables enrichment and exploration.
    pub async fn initialize(&self) -> Result<()> {
        self.initialized
            .get_or_try_init(|| async {
                info!("Initializing knowledge base");

                self.vectors
                    .connect()
                    .await
                    .context("Failed to connect to vector store")?;

                if let Err(e) = self.graph.connect().await {
                    warn!(error = %e, "Graph store unavailable, continuing without it");
                }

                info!("Knowledge base initialized");
                Ok::<(), anyhow::Error>(())
            })
            .await?;

        Ok(())
    }

    /// Chunk, embed and store `text`, then enrich the graph from it.
    ///
    /// Returns the number of chunks stored. Only a vector store failure is
    /// returned as an error, and the graph is left untouched when it happens.
    /// Extraction and graph problems are logged.
    pub async fn index_text(
        &self,
        text: &str,
        source: &str,
        source_type: SourceType,
        metadata: &Metadata,
    ) -> Result<usize> {
        self.initialize().await?;

        let chunks = self
            .chunker
            .chunk_with_metadata(text, source, source_type, metadata);
        if chunks.is_empty() {
            debug!(source = %source, "Nothing to index");
            return Ok(0);
        }

        info!(
            source = %source,
            source_type = %source_type,
            chunks = chunks.len(),
            "Indexing content"
        );

        let (stored, extraction) = tokio::join!(
            self.store_chunks(source, &chunks),
            self.extractor.extract(text),
        );
        stored?;

        self.enrich_graph(&extraction, source, source_type).await;

        Ok(chunks.len())
    }

    /// Index the output of a content extractor.
    pub async fn index_processed(&self, content: &ProcessedContent) -> Result<usize> {
        if let Some(error) = &content.error {
            anyhow::bail!("Content extraction failed for {}: {}", content.source, error);
        }

        self.index_text(
            &content.text,
            &content.source,
            content.source_type,
            &content.metadata,
        )
        .await
    }

    /// Write the new chunks, then drop whatever the source held before.
    ///
    /// Old chunks stay searchable until the new ones are stored.
    async fn store_chunks(&self, source: &str, chunks: &[Chunk]) -> Result<()> {
        self.vectors
            .add_chunks(chunks)
            .await
            .context("Failed to store chunks")?;

        let keep: Vec<String> = chunks.iter().map(Chunk::chunk_id).collect();
        let removed = self
            .vectors
            .delete_stale(source, &keep)
            .await
            .context("Failed to remove previous chunks")?;
        if removed > 0 {
            debug!(source = %source, removed, "Replaced previous chunks");
        }

        Ok(())
    }

    async fn enrich_graph(
        &self,
        extraction: &ExtractionResult,
        source: &str,
        source_type: SourceType,
    ) {
        if let Some(error) = &extraction.error {
            warn!(source = %source, error = %error, "Entity extraction failed");
            return;
        }
        if extraction.entities.is_empty() {
            return;
        }

        self.graph
            .add_document(source, source_type, Utc::now().timestamp())
            .await;

        for entity in &extraction.entities {
            if self
                .graph
                .add_entity(&entity.name, entity.entity_type, &entity.description, source)
                .await
            {
                self.graph.add_mention(source, &entity.name).await;
            }
        }

        let mut relations = 0;
        for relation in &extraction.relations {
            if self
                .graph
                .add_relation(&relation.from, &relation.to, &relation.relation)
                .await
            {
                relations += 1;
            }
        }

        info!(
            source = %source,
            entities = extraction.entities.len(),
            relations,
            "Graph enriched"
        );
    }

    /// Answer a question from the knowledge base.
    ///
    /// Never fails: any error becomes [`prompts::GENERATION_FAILED`].
    pub async fn process_query(&self, query: &str) -> String {
        match self.answer(query).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Failed to process query");
                prompts::GENERATION_FAILED.to_string()
            }
        }
    }

    async fn answer(&self, query: &str) -> Result<String> {
        self.initialize().await?;

        let hits = self
            .vectors
            .search(query, self.top_k, &SearchFilter::default())
            .await
            .context("Vector search failed")?;

        let options = GenerateOptions::default().with_system(prompts::SYSTEM_PROMPT);

        if hits.is_empty() {
            debug!("No context found, answering without it");
            let prompt = prompts::build_no_context_prompt(query);
            return self
                .llm
                .generate(&prompt, &options)
                .await
                .context("Generation failed");
        }

        let prompt = prompts::build_rag_prompt(&build_context(&hits), query);
        let response = self
            .llm
            .generate(&prompt, &options)
            .await
            .context("Generation failed")?;

        let sources: BTreeSet<&str> = hits.iter().map(|h| h.source.as_str()).collect();
        debug!(hits = hits.len(), sources = sources.len(), "Answered from context");

        if sources.len() <= MAX_FOOTER_SOURCES {
            let listed: Vec<&str> = sources.into_iter().collect();
            Ok(format!(
                "{}\n\n📚 *Sources:* {}",
                response.trim_end(),
                listed.join(", ")
            ))
        } else {
            Ok(response)
        }
    }

    /// Ranked chunks for `query`, most relevant first.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<SearchResult>> {
        self.initialize().await?;

        let hits = self
            .vectors
            .search(query, limit, filter)
            .await
            .context("Vector search failed")?;

        Ok(hits.into_iter().map(SearchResult::from).collect())
    }

    pub async fn get_stats(&self) -> KnowledgeStats {
        let mut stats = KnowledgeStats::default();

        if let Err(e) = self.initialize().await {
            stats.error = Some(e.to_string());
        } else {
            match self.vectors.count().await {
                Ok(count) => stats.total_chunks = count,
                Err(e) => {
                    warn!(error = %e, "Failed to count chunks");
                    stats.error = Some(e.to_string());
                }
            }
        }

        stats.entities = self.graph.get_entity_count().await;
        stats.relations = self.graph.get_relation_count().await;
        stats.most_connected = self.graph.get_most_connected(5).await;

        stats
    }

    pub fn indexing_confirmation(
        source: &str,
        source_type: SourceType,
        chunk_count: usize,
    ) -> String {
        prompts::build_indexing_confirmation(source, source_type.as_str(), chunk_count)
    }
}

/// Hit contents tagged with their source, most relevant first.
fn build_context(hits: &[VectorHit]) -> String {
    hits.iter()
        .map(|hit| format!("[Source: {}]\n{}", hit.source, hit.content))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
