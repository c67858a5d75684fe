
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::OllamaConfig;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: Option<String>,
    generation_model: Option<String>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding_model.clone(),
            generation_model: config.generation_model.clone(),
            agent,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        self
    }

    #[inline]
    pub fn embedding_model(&self) -> Option<&str> {
        self.embedding_model.as_deref()
    }

    #[inline]
    pub fn generation_model(&self) -> Option<&str> {
        self.generation_model.as_deref()
    }

    /// Test connection to Ollama server and verify every configured model is available
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for Ollama at {}", self.base_url);

        let models = self.list_models().context("Server ping failed")?;

        for model in [&self.embedding_model, &self.generation_model]
            .into_iter()
            .flatten()
        {
            if !models.iter().any(|m| &m.name == model) {
                let available_models: Vec<&str> =
                    models.iter().map(|m| m.name.as_str()).collect();
                warn!(
                    "Model {} not found. Available models: {:?}",
                    model, available_models
                );
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    model,
                    available_models
                ));
            }
        }

        info!("Health check passed for Ollama server at {}", self.base_url);
        Ok(())
    }

    /// List all available models
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| describe_error(&e))
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self
            .embedding_model
            .as_deref()
            .context("No embedding model configured")?;

        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbedRequest { model, input: text };
        let response_text = self.post_json("/api/embed", &request)?;

        let embed_response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        let embedding = embed_response
            .embeddings
            .into_iter()
            .next()
            .context("Embedding response contained no vectors")?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Run a single non-streaming completion that is asked to answer in JSON
    #[inline]
    pub fn generate(&self, prompt: &str) -> Result<String> {
        let model = self
            .generation_model
            .as_deref()
            .context("No generation model configured")?;

        debug!("Requesting completion from {} ({} chars)", model, prompt.len());

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            format: "json",
        };
        let response_text = self.post_json("/api/generate", &request)?;

        let generate_response: GenerateResponse = serde_json::from_str(&response_text)
            .context("Failed to parse generation response")?;

        Ok(generate_response.response)
    }

    fn post_json<T: Serialize>(&self, path: &str, body: &T) -> Result<String> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {}", path))?;

        let request_json =
            serde_json::to_string(body).context("Failed to serialize request body")?;

        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request_json)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| describe_error(&e))
            .with_context(|| format!("Request to {} failed", url))
    }
}

fn describe_error(error: &ureq::Error) -> anyhow::Error {
    match error {
        ureq::Error::StatusCode(status) if *status >= 500 => {
            anyhow::anyhow!("Server error: HTTP {}", status)
        }
        ureq::Error::StatusCode(status) => anyhow::anyhow!("Client error: HTTP {}", status),
        ureq::Error::ConnectionFailed | ureq::Error::HostNotFound => {
            anyhow::anyhow!("Ollama server unreachable: {}", error)
        }
        ureq::Error::Timeout(_) => anyhow::anyhow!("Request timed out: {}", error),
        _ => anyhow::anyhow!("Request error: {}", error),
    }
}
