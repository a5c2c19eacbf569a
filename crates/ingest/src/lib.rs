//! Content intake: source typing, recursive chunking, and pluggable
//! extractors that turn raw content into indexable text.

pub mod chunk;
pub mod chunker;
pub mod reader;

pub use chunk::{Chunk, Metadata, SourceType};
pub use chunker::{Chunker, ChunkerConfig, DEFAULT_SEPARATORS};
pub use reader::{ContentExtractor, ProcessedContent, TextFileExtractor, WebPageExtractor};
