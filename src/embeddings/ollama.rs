use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::error::{GranaryError, Result};

use super::Embedder;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "nomic-embed-text";
const DEFAULT_DIMENSION: usize = 768;
const DEFAULT_BATCH_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default)]
pub struct OllamaEmbedderConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub dimension: Option<usize>,
    pub batch_concurrency: Option<usize>,
}

/// Embedding provider backed by Ollama's `/api/embeddings` endpoint. Batch
/// embedding fans out single-text requests bounded by a semaphore and joins
/// them preserving input order.
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    dimension: usize,
    semaphore: Arc<Semaphore>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    pub fn new(config: OllamaEmbedderConfig) -> Self {
        let batch_concurrency = config
            .batch_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_BATCH_CONCURRENCY);

        Self {
            base_url: config
                .base_url
                .filter(|url| !url.is_empty())
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dimension: config
                .dimension
                .filter(|d| *d > 0)
                .unwrap_or(DEFAULT_DIMENSION),
            semaphore: Arc::new(Semaphore::new(batch_concurrency)),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GranaryError::Embedding(format!(
                "ollama API error (status {status}): {body}"
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| GranaryError::Embedding(format!("failed to decode response: {e}")))?;

        if body.embedding.is_empty() {
            return Err(GranaryError::Embedding(
                "empty embedding returned from ollama".to_string(),
            ));
        }

        Ok(body.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let tasks = texts.iter().enumerate().map(|(idx, text)| {
            let semaphore = Arc::clone(&self.semaphore);
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| GranaryError::Cancelled)?;
                self.embed(text).await.map_err(|e| {
                    GranaryError::Embedding(format!("failed to embed text at index {idx}: {e}"))
                })
            }
        });

        futures::future::try_join_all(tasks).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
