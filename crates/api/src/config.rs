use anyhow::{Context, Result};
use ingest::Chunker;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub mode: OperationMode,
    pub storage: StorageMode,
    pub ollama: OllamaConfig,
    pub qdrant: QdrantConfig,
    pub neo4j: Neo4jConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum OperationMode {
    Fast,     // Large chunks, short timeouts, big cache
    Accurate, // Small chunks, patient timeouts, no cache
    Balanced, // Default
}

impl FromStr for OperationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(OperationMode::Fast),
            "balanced" => Ok(OperationMode::Balanced),
            "accurate" => Ok(OperationMode::Accurate),
            other => anyhow::bail!("Unknown mode: {}", other),
        }
    }
}

/// Where chunks and the entity graph live.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Qdrant + Neo4j, embeddings from Ollama
    External,
    /// Process memory with the hashing embedder; nothing persists
    Memory,
}

impl FromStr for StorageMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "external" => Ok(StorageMode::External),
            "memory" => Ok(StorageMode::Memory),
            other => anyhow::bail!("Unknown storage: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub host: String,
    pub model: String,
    pub embed_model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// `/ingest/path` only reads below this directory
    pub ingest_root: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: OperationMode::Balanced,
            storage: StorageMode::External,
            ollama: OllamaConfig {
                host: "http://localhost:11434".to_string(),
                model: "gemma3".to_string(),
                embed_model: "nomic-embed-text".to_string(),
                request_timeout_secs: 60,
            },
            qdrant: QdrantConfig {
                url: "http://localhost:6333".to_string(),
                collection: "knowledge".to_string(),
            },
            neo4j: Neo4jConfig {
                uri: "bolt://localhost:7687".to_string(),
                user: "neo4j".to_string(),
                password: "password".to_string(),
            },
            server: ServerConfig {
                bind: "127.0.0.1:3000".to_string(),
                ingest_root: PathBuf::from("notes"),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
            retry: RetryConfig {
                max_retries: 3,
                initial_backoff_ms: 1000,
                max_backoff_ms: 10000,
            },
            cache: CacheConfig {
                enabled: true,
                max_entries: 10000,
            },
        }
    }
}

impl AppConfig {
    pub fn fast_mode() -> Self {
        let mut config = Self::default();
        config.mode = OperationMode::Fast;
        config.ollama.request_timeout_secs = 30;
        config.retry = RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 5000,
        };
        config.cache = CacheConfig {
            enabled: true,
            max_entries: 50000,
        };
        config
    }

    pub fn accurate_mode() -> Self {
        let mut config = Self::default();
        config.mode = OperationMode::Accurate;
        config.ollama.request_timeout_secs = 120;
        config.retry = RetryConfig {
            max_retries: 5,
            initial_backoff_ms: 2000,
            max_backoff_ms: 20000,
        };
        config.cache = CacheConfig {
            enabled: false,
            max_entries: 0,
        };
        config
    }

    pub fn for_mode(mode: OperationMode) -> Self {
        match mode {
            OperationMode::Fast => Self::fast_mode(),
            OperationMode::Balanced => Self::default(),
            OperationMode::Accurate => Self::accurate_mode(),
        }
    }

    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from a variable lookup.
    ///
    /// `KB_MODE` picks the preset first; every other variable overrides a
    /// single field of it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mode = match lookup("KB_MODE") {
            Some(value) => value.parse()?,
            None => OperationMode::Balanced,
        };
        let mut config = Self::for_mode(mode);

        if let Some(value) = lookup("KB_STORAGE") {
            config.storage = value.parse()?;
        }

        let set = |key: &str, field: &mut String| {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        };
        set("OLLAMA_HOST", &mut config.ollama.host);
        set("OLLAMA_MODEL", &mut config.ollama.model);
        set("OLLAMA_EMBED_MODEL", &mut config.ollama.embed_model);
        set("QDRANT_URL", &mut config.qdrant.url);
        set("QDRANT_COLLECTION", &mut config.qdrant.collection);
        set("NEO4J_URI", &mut config.neo4j.uri);
        set("NEO4J_USER", &mut config.neo4j.user);
        set("NEO4J_PASSWORD", &mut config.neo4j.password);
        set("KB_BIND", &mut config.server.bind);
        set("LOG_LEVEL", &mut config.logging.level);

        if let Some(value) = lookup("KB_INGEST_ROOT") {
            config.server.ingest_root = PathBuf::from(value);
        }

        if let Some(value) = lookup("LOG_JSON") {
            config.logging.json = parse_flag(&value)
                .with_context(|| format!("LOG_JSON must be a boolean, got {}", value))?;
        }

        Ok(config)
    }

    /// Chunker preset for the operation mode.
    pub fn chunker(&self) -> Chunker {
        match self.mode {
            OperationMode::Fast => Chunker::context(),
            OperationMode::Balanced => Chunker::default(),
            OperationMode::Accurate => Chunker::precise(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.ollama.request_timeout_secs)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
