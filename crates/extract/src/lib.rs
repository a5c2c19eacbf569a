//! Entity and relation extraction.
//!
//! A [`TextGenerator`] is prompted with a fixed entity taxonomy and its reply
//! is parsed leniently into an [`ExtractionResult`].

pub mod llm;
pub mod normalizer;
pub mod parser;
pub mod prompt;
pub mod schema;

pub use llm::{GenerateOptions, OllamaClient, TextGenerator};
pub use normalizer::{normalize_name, normalize_relation};
pub use parser::{ParseError, parse_extraction};
pub use schema::{EntityType, ExtractedEntity, ExtractedRelation, ExtractionResult};

use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shorter inputs are not worth a model call.
pub const MIN_TEXT_LENGTH: usize = 10;
pub const DEFAULT_MAX_TEXT_LENGTH: usize = 4000;
const EXTRACTION_MAX_TOKENS: u32 = 1500;

pub struct EntityExtractor {
    llm: Arc<dyn TextGenerator>,
    max_text_length: usize,
}

impl EntityExtractor {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self::with_max_text_length(llm, DEFAULT_MAX_TEXT_LENGTH)
    }

    pub fn with_max_text_length(llm: Arc<dyn TextGenerator>, max_text_length: usize) -> Self {
        Self {
            llm,
            max_text_length: max_text_length.max(MIN_TEXT_LENGTH),
        }
    }

    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    /// Extract entities and relations from `text`.
    ///
    /// Never fails: generation or parse errors come back in
    /// [`ExtractionResult::error`] with empty lists.
    pub async fn extract(&self, text: &str) -> ExtractionResult {
        if text.trim().chars().count() < MIN_TEXT_LENGTH {
            return ExtractionResult::default();
        }

        let text = self.truncate(text);
        let prompt = prompt::build_extraction_prompt(&text);
        let options = GenerateOptions::default()
            .with_max_tokens(EXTRACTION_MAX_TOKENS)
            .with_temperature(0.2)
            .json();

        let response = match self.llm.generate(&prompt, &options).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Entity extraction failed");
                return ExtractionResult::failed(e.to_string());
            }
        };

        match parse_extraction(&response) {
            Ok(result) => {
                debug!(
                    entities = result.entities.len(),
                    relations = result.relations.len(),
                    "Extracted"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse extraction response");
                ExtractionResult::failed(e.to_string())
            }
        }
    }

    fn truncate(&self, text: &str) -> String {
        match text.char_indices().nth(self.max_text_length) {
            Some((byte_idx, _)) => {
                debug!(max = self.max_text_length, "Text truncated for extraction");
                format!("{}...", &text[..byte_idx])
            }
            None => text.to_string(),
        }
    }
}
