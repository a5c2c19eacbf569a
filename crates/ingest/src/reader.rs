use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::{Metadata, SourceType};

/// Text pulled out of some raw content, ready to be indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedContent {
    pub text: String,
    pub source: String,
    pub source_type: SourceType,
    #[serde(default)]
    pub metadata: Metadata,
    pub error: Option<String>,
}

impl ProcessedContent {
    pub fn failed(source: String, source_type: SourceType, error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            source,
            source_type,
            metadata: Metadata::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && !self.text.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

/// Turns raw bytes of one kind of content into text.
///
/// Failures are reported through [`ProcessedContent::error`] rather than as
/// `Err`, so a front-end can tell the user what went wrong.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn supports(&self, mime_type: &str) -> bool;

    async fn process(&self, content: &[u8], filename: Option<&str>) -> ProcessedContent;
}

/// Plain text and markdown files.
#[derive(Debug, Clone, Default)]
pub struct TextFileExtractor;

impl TextFileExtractor {
    const EXTENSIONS: [&'static str; 2] = ["txt", "md"];

    pub fn new() -> Self {
        Self
    }

    pub fn is_supported_path(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| Self::EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub async fn read_file(&self, path: &Path) -> Result<ProcessedContent> {
        if !Self::is_supported_path(path) {
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            anyhow::bail!("Unsupported file format: {}", extension);
        }

        let bytes = fs::read(path)
            .await
            .context(format!("Failed to read file: {:?}", path))?;

        let name = path.to_string_lossy();
        Ok(self.process(&bytes, Some(name.as_ref())).await)
    }

    /// Read every supported file below `dir`, recursively.
    pub async fn read_directory(&self, dir: &Path) -> Result<Vec<ProcessedContent>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir).follow_links(false) {
            let entry = entry.context(format!("Failed to walk directory: {:?}", dir))?;
            let path = entry.path();

            if entry.file_type().is_file() && Self::is_supported_path(path) {
                files.push(self.read_file(path).await?);
            }
        }

        debug!(dir = %dir.display(), files = files.len(), "Read directory");
        Ok(files)
    }
}

#[async_trait]
impl ContentExtractor for TextFileExtractor {
    fn name(&self) -> &'static str {
        "Text File Extractor"
    }

    fn supports(&self, mime_type: &str) -> bool {
        matches!(mime_type, "text/plain" | "text/markdown")
    }

    async fn process(&self, content: &[u8], filename: Option<&str>) -> ProcessedContent {
        let source = filename.unwrap_or("text").to_string();
        let text = String::from_utf8_lossy(content).trim().to_string();

        if text.is_empty() {
            return ProcessedContent::failed(source, SourceType::Text, "File contains no text");
        }

        let mut metadata = Metadata::new();
        metadata.insert("bytes".to_string(), serde_json::json!(content.len()));
        if let Some(ext) = Path::new(&source).extension().and_then(|e| e.to_str()) {
            metadata.insert("extension".to_string(), serde_json::json!(ext));
        }

        ProcessedContent {
            text,
            source,
            source_type: SourceType::Text,
            metadata,
            error: None,
        }
    }
}

/// Fetches a web page and reduces its markup to readable text.
pub struct WebPageExtractor {
    client: reqwest::Client,
    hidden_blocks: Regex,
    title: Regex,
    block_tags: Regex,
    tags: Regex,
    blank_lines: Regex,
}

impl WebPageExtractor {
    const USER_AGENT: &'static str = "Mozilla/5.0 (compatible; KnowledgeBase/0.1)";

    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(Self::USER_AGENT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            hidden_blocks: Regex::new(concat!(
                r"(?is)<(script|style|noscript|svg)\b[^>]*>",
                r".*?</(script|style|noscript|svg)>"
            ))?,
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>")?,
            block_tags: Regex::new(concat!(
                r"(?i)</?(p|div|br|li|ul|ol|h[1-6]|tr|section|article|header|footer|",
                r"blockquote|pre)\b[^>]*>"
            ))?,
            tags: Regex::new(r"(?s)<[^>]*>")?,
            blank_lines: Regex::new(r"\n{3,}")?,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch URL")?;

        if !response.status().is_success() {
            anyhow::bail!("URL request failed: {}", response.status());
        }

        response.text().await.context("Failed to read page body")
    }

    /// Reduce an HTML document to its title and visible text.
    pub fn html_to_text(&self, html: &str) -> (Option<String>, String) {
        let title = self
            .title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| decode_entities(m.as_str()).trim().to_string())
            .filter(|t| !t.is_empty());

        let text = self.hidden_blocks.replace_all(html, " ");
        let text = self.title.replace_all(&text, " ");
        let text = self.block_tags.replace_all(&text, "\n");
        let text = self.tags.replace_all(&text, " ");
        let text = decode_entities(&text);

        let lines: Vec<String> = text
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .collect();
        let joined = lines.join("\n");
        let text = self.blank_lines.replace_all(&joined, "\n\n");

        (title, text.trim().to_string())
    }
}

#[async_trait]
impl ContentExtractor for WebPageExtractor {
    fn name(&self) -> &'static str {
        "Web Page Extractor"
    }

    fn supports(&self, mime_type: &str) -> bool {
        matches!(mime_type, "text/x-url" | "text/url")
    }

    async fn process(&self, content: &[u8], _filename: Option<&str>) -> ProcessedContent {
        let url = String::from_utf8_lossy(content).trim().to_string();

        let domain = match reqwest::Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                parsed.host_str().unwrap_or_default().to_string()
            }
            _ => return ProcessedContent::failed(url, SourceType::Url, "Invalid URL"),
        };

        let html = match self.fetch(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(url = %url, error = %e, "Failed to fetch web page");
                return ProcessedContent::failed(url, SourceType::Url, e.to_string());
            }
        };

        let (title, text) = self.html_to_text(&html);
        if text.is_empty() {
            return ProcessedContent::failed(url, SourceType::Url, "Page contains no readable text");
        }

        let mut metadata = Metadata::new();
        metadata.insert("url".to_string(), serde_json::json!(url));
        metadata.insert("domain".to_string(), serde_json::json!(domain));
        metadata.insert("title".to_string(), serde_json::json!(title));

        ProcessedContent {
            text,
            source: url,
            source_type: SourceType::Url,
            metadata,
            error: None,
        }
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn text_file_extractor_reads_utf8() {
        let extractor = TextFileExtractor::new();
        let processed = extractor
            .process("  hello notes \n".as_bytes(), Some("notes.md"))
            .await;

        assert!(processed.is_success());
        assert_eq!(processed.text, "hello notes");
        assert_eq!(processed.source, "notes.md");
        assert_eq!(processed.metadata.get("extension"), Some(&serde_json::json!("md")));
    }

    #[tokio::test]
    async fn text_file_extractor_reports_empty_files() {
        let processed = TextFileExtractor::new().process(b"   ", Some("empty.txt")).await;
        assert!(!processed.is_success());
        assert!(processed.error.is_some());
    }

    #[tokio::test]
    async fn reads_supported_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
        std::fs::write(nested.join("b.md"), "# beta").unwrap();
        std::fs::write(dir.path().join("c.pdf"), "ignored").unwrap();

        let mut files = TextFileExtractor::new()
            .read_directory(dir.path())
            .await
            .unwrap();
        files.sort_by(|a, b| a.text.cmp(&b.text));

        assert_eq!(files.len(), 2);
        assert_eq!(files[0].text, "# beta");
        assert_eq!(files[1].text, "alpha");
    }

    #[tokio::test]
    async fn rejects_unsupported_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slides.pdf");
        std::fs::write(&path, "x").unwrap();

        assert!(TextFileExtractor::new().read_file(&path).await.is_err());
    }

    #[test]
    fn html_is_reduced_to_visible_text() {
        let extractor = WebPageExtractor::new(Duration::from_secs(5)).unwrap();
        let html = r#"<html><head><title>Rust &amp; Graphs</title>
            <style>body { color: red; }</style></head>
            <body><h1>Heading</h1><p>First   paragraph.</p>
            <script>var x = "<p>hidden</p>";</script>
            <p>Second &lt;one&gt;</p></body></html>"#;

        let (title, text) = extractor.html_to_text(html);

        assert_eq!(title.as_deref(), Some("Rust & Graphs"));
        assert!(text.contains("Heading"));
        assert!(text.contains("First paragraph."));
        assert!(text.contains("Second <one>"));
        assert!(!text.contains("hidden"));
        assert!(!text.contains("color: red"));
        assert!(!text.contains("Rust & Graphs"));
    }

    #[tokio::test]
    async fn invalid_url_is_reported() {
        let extractor = WebPageExtractor::new(Duration::from_secs(5)).unwrap();
        let processed = extractor.process(b"not a url", None).await;

        assert_eq!(processed.error.as_deref(), Some("Invalid URL"));
        assert_eq!(processed.source_type, SourceType::Url);
    }
}
