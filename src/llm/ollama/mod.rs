#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::{ChatMessage, ChatRole, EmbeddingIntent, EmbeddingProvider, GenerationProvider};
use crate::config::{Config, ConfigError};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Ollama backend serving both embeddings and chat generation
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    embedding_model: String,
    embedding_dimension: usize,
    batch_size: usize,
    document_prefix: String,
    query_prefix: String,
    generation_model: String,
    input_max_characters: usize,
    max_output_tokens: u32,
    temperature: f32,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    /// Build a client from configuration.
    ///
    /// Fails when no embedding or generation model is selected.
    #[inline]
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        if config.embedding.model.trim().is_empty() {
            return Err(ConfigError::MissingEmbeddingModel);
        }
        if config.generation.model.trim().is_empty() {
            return Err(ConfigError::MissingGenerationModel);
        }

        let base_url = config.ollama_url()?;
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.ollama.timeout_seconds)))
            .build()
            .into();

        Ok(Self {
            base_url,
            embedding_model: config.embedding.model.clone(),
            embedding_dimension: config.embedding.dimension as usize,
            batch_size: (config.embedding.batch_size as usize).max(1),
            document_prefix: config.embedding.document_prefix.clone(),
            query_prefix: config.embedding.query_prefix.clone(),
            generation_model: config.generation.model.clone(),
            input_max_characters: config.generation.input_max_characters,
            max_output_tokens: config.generation.max_output_tokens,
            temperature: config.generation.temperature,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
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
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// List all models installed on the server
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .context("Failed to build models URL")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .get(url.as_str())
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models_response: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models_response.models.len());
        Ok(models_response.models)
    }

    /// Check that the server answers and both configured models are installed
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        let models = self.list_models().context("Server ping failed")?;

        for model in [&self.embedding_model, &self.generation_model] {
            if !models.iter().any(|m| &m.name == model) {
                let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
                warn!("Model {} not found. Available models: {:?}", model, available);
                return Err(anyhow::anyhow!(
                    "Model '{}' is not available. Available models: {:?}",
                    model,
                    available
                ));
            }
        }

        info!("Health check passed for Ollama server at {}", self.base_url);
        Ok(())
    }

    fn prefix_for(&self, intent: EmbeddingIntent) -> &str {
        match intent {
            EmbeddingIntent::Document => &self.document_prefix,
            EmbeddingIntent::Query => &self.query_prefix,
        }
    }

    /// Embed texts in server batches of the configured size
    #[inline]
    pub fn embed_blocking(&self, texts: &[String], intent: EmbeddingIntent) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefix = self.prefix_for(intent);
        let inputs: Vec<String> = texts
            .iter()
            .map(|text| format!("{}{}", prefix, text))
            .collect();

        debug!("Generating embeddings for {} texts", inputs.len());

        let mut embeddings = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(self.batch_size) {
            let batch_embeddings = self
                .embed_single_batch(batch)
                .with_context(|| format!("Failed to process batch of {} texts", batch.len()))?;
            embeddings.extend(batch_embeddings);
        }

        Ok(embeddings)
    }

    fn embed_single_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.embedding_model,
            input: inputs,
        };

        let url = self
            .base_url
            .join("/api/embed")
            .context("Failed to build embedding URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate embeddings")?;

        let response: EmbedResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        if response.embeddings.len() != inputs.len() {
            return Err(anyhow::anyhow!(
                "Mismatch between request and response counts: {} vs {}",
                inputs.len(),
                response.embeddings.len()
            ));
        }

        if let Some(bad) = response
            .embeddings
            .iter()
            .find(|embedding| embedding.len() != self.embedding_dimension)
        {
            return Err(anyhow::anyhow!(
                "Model {} returned {} dimensions, expected {}",
                self.embedding_model,
                bad.len(),
                self.embedding_dimension
            ));
        }

        Ok(response.embeddings)
    }

    /// Send a chat request; the prompt is appended to the history as a user turn
    #[inline]
    pub fn chat_blocking(&self, prompt: &str, history: &[ChatMessage]) -> Result<String> {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::new(ChatRole::User, prompt));

        let request = ChatRequest {
            model: &self.generation_model,
            messages: &messages,
            stream: false,
            options: ChatOptions {
                num_predict: self.max_output_tokens,
                temperature: self.temperature,
            },
        };

        let url = self
            .base_url
            .join("/api/chat")
            .context("Failed to build chat URL")?;

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;

        debug!(
            "Sending chat request with {} messages to {}",
            messages.len(),
            self.generation_model
        );

        let response_text = self
            .make_request_with_retry(|| {
                self.agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(&request_json)
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to generate chat response")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        Ok(response.message.content)
    }

    fn make_request_with_retry<F>(&self, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.retry_attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, self.retry_attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.retry_attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.retry_attempts {
                        let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                        let delay = Duration::from_millis(delay_ms);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", self.base_url);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn embedding_dimension(&self) -> usize {
        self.embedding_dimension
    }

    async fn embed(&self, texts: &[String], intent: EmbeddingIntent) -> Option<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Some(Vec::new());
        }

        let client = self.clone();
        let texts = texts.to_vec();
        let result = tokio::task::spawn_blocking(move || client.embed_blocking(&texts, intent))
            .await
            .context("Embedding task panicked");

        match result.and_then(|inner| inner) {
            Ok(embeddings) => Some(embeddings),
            Err(e) => {
                error!("Embedding request failed: {:#}", e);
                None
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaClient {
    fn process_text(&self, text: &str) -> String {
        text.chars()
            .take(self.input_max_characters)
            .collect::<String>()
            .trim()
            .to_string()
    }

    fn construct_message(&self, text: &str, role: ChatRole) -> ChatMessage {
        ChatMessage::new(role, text)
    }

    async fn generate(&self, prompt: &str, history: &[ChatMessage]) -> Option<String> {
        let client = self.clone();
        let prompt = prompt.to_string();
        let history = history.to_vec();
        let result = tokio::task::spawn_blocking(move || client.chat_blocking(&prompt, &history))
            .await
            .context("Generation task panicked");

        match result.and_then(|inner| inner) {
            Ok(text) => Some(text),
            Err(e) => {
                error!("Generation request failed: {:#}", e);
                None
            }
        }
    }
}
