//! Storage for the knowledge base: chunk vectors and the entity graph.

pub mod embeddings;
pub mod graph_store;
pub mod memory_graph;
pub mod memory_vectors;
pub mod neo4j_index;
pub mod qdrant_index;
pub mod vector_store;

pub use embeddings::{EmbeddingClient, Embedder, HashingEmbedder, cosine_similarity};
pub use graph_store::{
    ConnectedEntity, DEFAULT_DOCUMENT_LIMIT, DEFAULT_PATH_DEPTH, DEFAULT_RELATED_DEPTH,
    DEFAULT_RELATED_LIMIT, DEFAULT_SEARCH_LIMIT, DocumentRef, EntitySummary, GraphBackend,
    KnowledgeGraph,
};
pub use memory_graph::InMemoryGraph;
pub use memory_vectors::InMemoryVectorStore;
pub use neo4j_index::Neo4jGraph;
pub use qdrant_index::QdrantStore;
pub use vector_store::{SearchFilter, VectorHit, VectorStore};
