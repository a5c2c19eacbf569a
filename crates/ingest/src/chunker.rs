use std::collections::VecDeque;

use tracing::debug;

use crate::chunk::{Chunk, Metadata, SourceType};

/// Boundaries tried in order: paragraph, line, sentence, question,
/// exclamation, clause, word, and finally single characters.
pub const DEFAULT_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "; ", ", ", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    /// Upper bound on chunk length, in characters
    pub chunk_size: usize,
    /// Characters of trailing context carried into the next chunk
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self::with_sizes(1000, 200)
    }
}

impl ChunkerConfig {
    pub fn with_sizes(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Smaller chunks for precise search
    pub fn precise() -> Self {
        Self::with_sizes(500, 100)
    }

    /// Larger chunks that keep more surrounding context
    pub fn context() -> Self {
        Self::with_sizes(2000, 400)
    }
}

/// Recursive character splitter.
///
/// Text is split on the highest-priority separator it contains; pieces that
/// still exceed `chunk_size` are split again with the remaining separators.
/// Small pieces are then merged back into chunks of at most `chunk_size`
/// characters, each new chunk starting with up to `chunk_overlap` characters
/// taken from the end of the previous one.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl Chunker {
    pub fn new(mut config: ChunkerConfig) -> Self {
        config.chunk_size = config.chunk_size.max(1);
        config.chunk_overlap = config.chunk_overlap.min(config.chunk_size - 1);
        Self { config }
    }

    pub fn precise() -> Self {
        Self::new(ChunkerConfig::precise())
    }

    pub fn context() -> Self {
        Self::new(ChunkerConfig::context())
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split text into ordered, size-bounded segments.
    ///
    /// Empty or whitespace-only input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        if char_len(trimmed) <= self.config.chunk_size {
            return vec![trimmed.to_string()];
        }

        let chunks = self.split_recursive(text, &self.config.separators);
        debug!(chunks = chunks.len(), "Split text into chunks");
        chunks
    }

    /// Split text and wrap every segment with its position and provenance.
    pub fn chunk_with_metadata(
        &self,
        text: &str,
        source: &str,
        source_type: SourceType,
        metadata: &Metadata,
    ) -> Vec<Chunk> {
        let pieces = self.chunk(text);
        let total = pieces.len();

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, content)| {
                Chunk::new(
                    content,
                    index,
                    total,
                    source.to_string(),
                    source_type,
                    metadata.clone(),
                )
            })
            .collect()
    }

    /// Expected chunk count without splitting.
    ///
    /// Always 1 for text no longer than `chunk_size`.
    pub fn estimate_chunks(&self, text: &str) -> usize {
        let len = char_len(text);
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        if len <= size {
            return 1;
        }

        let step = size - overlap;
        (len - overlap).div_ceil(step).max(1)
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];

        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = "";
                break;
            }
            if text.contains(sep.as_str()) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_pieces(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                let piece = piece.trim();
                if !piece.is_empty() {
                    chunks.push(piece.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_pieces(&pending));
        }

        chunks
    }

    /// Greedily pack pieces into chunks, keeping a tail of at most
    /// `chunk_overlap` characters as the head of the next chunk.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let len = char_len(piece);

            if total + len > size && !window.is_empty() {
                if let Some(doc) = join_trimmed(&window) {
                    merged.push(doc);
                }

                while total > overlap || (total > 0 && total + len > size) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        if let Some(doc) = join_trimmed(&window) {
            merged.push(doc);
        }

        merged
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split on `separator`, keeping it at the start of every following piece.
/// An empty separator splits into single characters.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut starts: Vec<usize> = vec![0];
    starts.extend(text.match_indices(separator).map(|(i, _)| i));
    starts.push(text.len());

    starts
        .windows(2)
        .map(|w| &text[w[0]..w[1]])
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn join_trimmed(window: &VecDeque<&str>) -> Option<String> {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig::with_sizes(size, overlap))
    }

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   ").is_empty());
        assert!(chunker.chunk("\n\t \n").is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = Chunker::default();
        let text = "Python is a programming language created by Guido van Rossum.";

        assert_eq!(chunker.chunk(text), vec![text.to_string()]);
        assert_eq!(chunker.estimate_chunks(text), 1);
    }

    #[test]
    fn text_exactly_chunk_size_is_one_chunk() {
        let chunker = small(10, 2);
        let text = "abcdefghij";
        assert_eq!(chunker.chunk(text), vec![text.to_string()]);
        assert_eq!(chunker.estimate_chunks(text), 1);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let chunker = small(30, 5);
        let text = "First paragraph here.\n\nSecond paragraph is here.";

        let chunks = chunker.chunk(text);
        assert_eq!(
            chunks,
            vec![
                "First paragraph here.".to_string(),
                "Second paragraph is here.".to_string()
            ]
        );
    }

    #[test]
    fn carries_overlap_between_word_chunks() {
        let chunker = small(20, 5);
        let text = "aaaa bbbb cccc dddd eeee ffff gggg";

        let chunks = chunker.chunk(text);
        assert_eq!(
            chunks,
            vec![
                "aaaa bbbb cccc dddd".to_string(),
                "dddd eeee ffff gggg".to_string()
            ]
        );
    }

    #[test]
    fn falls_back_to_characters() {
        let chunker = small(10, 0);
        let text = "abcdefghijklmnopqrstuvwxy";

        let chunks = chunker.chunk(text);
        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxy"]);
    }

    #[test]
    fn no_chunk_exceeds_size() {
        let chunker = small(50, 10);
        let sentence = "The quick brown fox jumps over the lazy dog. ";
        let text = format!(
            "{}\n\n{}\n{}",
            sentence.repeat(7),
            "x".repeat(180),
            "Is this a question? Yes! Maybe; perhaps, indeed.".repeat(3)
        );

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 50, "oversized chunk: {chunk:?}");
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn chunks_cover_text_in_order() {
        let chunker = small(40, 8);
        let words: Vec<String> = (0..60).map(|i| format!("w{i:02}")).collect();
        let text = words.join(" ");

        let chunks = chunker.chunk(&text);

        // Every word appears, and first appearances follow source order.
        let mut last_seen = 0;
        for word in &words {
            let pos = chunks
                .iter()
                .position(|c| c.split(' ').any(|w| w == word))
                .expect("word missing from chunks");
            assert!(pos >= last_seen);
            last_seen = pos;
        }
        assert_eq!(chunks.first().unwrap().split(' ').next(), Some("w00"));
        assert_eq!(chunks.last().unwrap().split(' ').last(), Some("w59"));
    }

    #[test]
    fn handles_multibyte_text() {
        let chunker = small(8, 2);
        let text = "日本語のテキストを分割するテスト";

        let chunks = chunker.chunk(text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
    }

    #[test]
    fn estimate_uses_overlap_step() {
        let chunker = small(100, 20);
        // ceil((250 - 20) / 80) = 3
        assert_eq!(chunker.estimate_chunks(&"a".repeat(250)), 3);
        // ceil((180 - 20) / 80) = 2
        assert_eq!(chunker.estimate_chunks(&"a".repeat(180)), 2);
        assert_eq!(chunker.estimate_chunks(""), 1);
    }

    #[test]
    fn presets_have_expected_sizes() {
        assert_eq!(Chunker::default().config().chunk_size, 1000);
        assert_eq!(Chunker::default().config().chunk_overlap, 200);
        assert_eq!(Chunker::precise().config().chunk_size, 500);
        assert_eq!(Chunker::precise().config().chunk_overlap, 100);
        assert_eq!(Chunker::context().config().chunk_size, 2000);
        assert_eq!(Chunker::context().config().chunk_overlap, 400);
    }

    #[test]
    fn overlap_is_clamped_below_size() {
        let chunker = small(5, 50);
        assert_eq!(chunker.config().chunk_overlap, 4);
        assert!(!chunker.chunk("one two three four five six").is_empty());
    }

    #[test]
    fn attaches_positions_and_provenance() {
        let chunker = small(20, 5);
        let mut metadata = Metadata::new();
        metadata.insert("author".to_string(), serde_json::json!("ada"));

        let chunks = chunker.chunk_with_metadata(
            "aaaa bbbb cccc dddd eeee ffff gggg",
            "notes.txt",
            SourceType::Text,
            &metadata,
        );

        assert_eq!(chunks.len(), 2);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.total_chunks, 2);
            assert_eq!(chunk.source, "notes.txt");
            assert_eq!(chunk.source_type, SourceType::Text);
            assert_eq!(chunk.metadata.get("author"), Some(&serde_json::json!("ada")));
        }
    }
}
