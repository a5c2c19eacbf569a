#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use extract::{GenerateOptions, TextGenerator};
use index::{
    Embedder, HashingEmbedder, InMemoryGraph, InMemoryVectorStore, KnowledgeGraph, SearchFilter,
    VectorHit, VectorStore,
};
use ingest::{Chunk, Chunker};
use query::{Brain, IdeaEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub const PYTHON_TEXT: &str = "Python is a programming language created by Guido van Rossum.";

pub const PYTHON_EXTRACTION: &str = r#"{
  "entities": [
    {"name": "Python", "type": "TECHNOLOGY", "description": "A programming language"},
    {"name": "Guido van Rossum", "type": "PERSON", "description": "Creator of Python"}
  ],
  "relations": [
    {"from": "Python", "to": "Guido van Rossum", "relation": "CREATED_BY"}
  ]
}"#;

/// Replies chosen by prompt substring, recording every call.
pub struct ScriptedGenerator {
    rules: Vec<(String, String)>,
    fallback: String,
    fail: bool,
    calls: Mutex<Vec<(String, GenerateOptions)>>,
}

impl ScriptedGenerator {
    pub fn new(fallback: &str) -> Self {
        Self {
            rules: Vec::new(),
            fallback: fallback.to_string(),
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new("")
        }
    }

    pub fn on(mut self, needle: &str, reply: &str) -> Self {
        self.rules.push((needle.to_string(), reply.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(prompt, _)| prompt.clone())
            .collect()
    }

    pub fn calls(&self) -> Vec<(String, GenerateOptions)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((prompt.to_string(), options.clone()));

        if self.fail {
            anyhow::bail!("model unavailable");
        }

        let reply = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, reply)| reply.clone())
            .unwrap_or_else(|| self.fallback.clone());

        Ok(reply)
    }
}

/// Generator that extracts the Python fixture and answers everything else.
pub fn python_generator() -> Arc<ScriptedGenerator> {
    Arc::new(
        ScriptedGenerator::new("Python is a programming language.")
            .on("Extract entities and relationships", PYTHON_EXTRACTION),
    )
}

pub struct Fixture {
    pub brain: Brain,
    pub graph: KnowledgeGraph,
    pub llm: Arc<ScriptedGenerator>,
}

pub fn fixture(llm: Arc<ScriptedGenerator>) -> Fixture {
    let vectors = Arc::new(InMemoryVectorStore::new(Arc::new(HashingEmbedder::default())));
    fixture_with_vectors(llm, vectors)
}

pub fn fixture_with_vectors(llm: Arc<ScriptedGenerator>, vectors: Arc<dyn VectorStore>) -> Fixture {
    let graph = KnowledgeGraph::new(Arc::new(InMemoryGraph::new()));
    let brain = Brain::new(Chunker::default(), vectors, graph.clone(), llm.clone());

    Fixture { brain, graph, llm }
}

/// Connects fine, then refuses every read and write.
pub struct FailingVectorStore;

#[async_trait]
impl VectorStore for FailingVectorStore {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn add_chunks(&self, _chunks: &[Chunk]) -> Result<usize> {
        anyhow::bail!("vector store unavailable")
    }

    async fn search(
        &self,
        _query: &str,
        _limit: usize,
        _filter: &SearchFilter,
    ) -> Result<Vec<VectorHit>> {
        anyhow::bail!("vector store unavailable")
    }

    async fn count(&self) -> Result<usize> {
        anyhow::bail!("vector store unavailable")
    }

    async fn delete_by_source(&self, _source: &str) -> Result<usize> {
        Ok(0)
    }

    async fn delete_stale(&self, _source: &str, _keep: &[String]) -> Result<usize> {
        Ok(0)
    }
}

/// Hashing embedder that can be switched to fail.
#[derive(Default)]
pub struct FlakyEmbedder {
    inner: HashingEmbedder,
    failing: AtomicBool,
}

impl FlakyEmbedder {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("embedding model unavailable");
        }
        self.inner.embed(text).await
    }
}

pub fn idea_engine(graph: &KnowledgeGraph, llm: Arc<ScriptedGenerator>) -> IdeaEngine {
    IdeaEngine::with_seed(graph.clone(), llm, 7)
}
