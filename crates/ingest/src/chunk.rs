use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Open key-value bag attached to every chunk of a document.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Where a piece of content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Text,
    Pdf,
    Image,
    Audio,
    Url,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Text => "text",
            SourceType::Pdf => "pdf",
            SourceType::Image => "image",
            SourceType::Audio => "audio",
            SourceType::Url => "url",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(SourceType::Text),
            "pdf" => Ok(SourceType::Pdf),
            "image" => Ok(SourceType::Image),
            "audio" => Ok(SourceType::Audio),
            "url" => Ok(SourceType::Url),
            other => anyhow::bail!("Unknown source type: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// 0-based position within the source document
    pub index: usize,
    pub total_chunks: usize,
    pub source: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Chunk {
    pub fn new(
        content: String,
        index: usize,
        total_chunks: usize,
        source: String,
        source_type: SourceType,
        metadata: Metadata,
    ) -> Self {
        Self {
            content,
            index,
            total_chunks,
            source,
            source_type,
            metadata,
        }
    }

    /// Stable identifier derived from source, position and content.
    ///
    /// Re-sending an identical chunk yields the same id, so vector stores
    /// keyed on it overwrite instead of duplicating.
    pub fn chunk_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source.as_bytes());
        hasher.update(self.index.to_string().as_bytes());
        hasher.update(self.content.as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16]) // Use first 16 bytes (32 hex chars)
    }

    /// Length in characters (not bytes)
    pub fn len(&self) -> usize {
        self.content.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
