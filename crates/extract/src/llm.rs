use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub system: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: f32,
    /// Ask the model for JSON-formatted output
    pub json: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system: None,
            max_tokens: None,
            temperature: 0.7,
            json: false,
        }
    }
}

impl GenerateOptions {
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

#[derive(Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(base_url: String, model: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Ollama HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// True when the server answers and lists the configured model.
    pub async fn check_health(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to reach Ollama")?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama model list")?;

        let wanted = self.model.split(':').next().unwrap_or(&self.model);
        Ok(tags
            .models
            .iter()
            .any(|m| m.name.split(':').next() == Some(wanted)))
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::new("http://localhost:11434".to_string(), "gemma3".to_string())
    }
}

#[async_trait]
impl TextGenerator for OllamaClient {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
            system: options.system.as_deref(),
            format: options.json.then_some("json"),
            options: OllamaOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        debug!(model = %self.model, prompt_chars = prompt.len(), "Generating");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            anyhow::bail!("Ollama request failed: {}", response.status());
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;

        debug!(response_chars = ollama_response.response.len(), "Generated");
        Ok(ollama_response.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[tokio::test]
    async fn generate_sends_system_and_options() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .body_contains("\"model\":\"gemma3\"")
                    .body_contains("\"system\":\"be brief\"")
                    .body_contains("\"num_predict\":300")
                    .body_contains("\"format\":\"json\"");
                then.status(200)
                    .json_body(json!({ "response": "{\"ok\":true}", "done": true }));
            })
            .await;

        let client = OllamaClient::new(server.base_url(), "gemma3".to_string());
        let options = GenerateOptions::default()
            .with_system("be brief")
            .with_max_tokens(300)
            .json();

        let reply = client.generate("hello", &options).await.unwrap();

        assert_eq!(reply, "{\"ok\":true}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generate_omits_unset_fields() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200).json_body(json!({ "response": "plain" }));
            })
            .await;

        let client = OllamaClient::new(format!("{}/", server.base_url()), "gemma3".to_string());
        let reply = client
            .generate("hello", &GenerateOptions::default())
            .await
            .unwrap();

        assert_eq!(reply, "plain");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn generate_reports_server_errors() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("model not loaded");
            })
            .await;

        let client = OllamaClient::new(server.base_url(), "gemma3".to_string());
        let err = client
            .generate("hello", &GenerateOptions::default())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn health_check_matches_model_ignoring_tag() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/tags");
                then.status(200)
                    .json_body(json!({ "models": [{ "name": "gemma3:latest" }] }));
            })
            .await;

        let present = OllamaClient::new(server.base_url(), "gemma3".to_string());
        let missing = OllamaClient::new(server.base_url(), "llama3".to_string());

        assert!(present.check_health().await.unwrap());
        assert!(!missing.check_health().await.unwrap());
    }
}
