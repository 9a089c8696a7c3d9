use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{GranaryError, Result};

use super::{GenerateOptions, LlmClient, StreamChunk};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

// Blocking generation can legitimately take minutes on local models.
const BLOCKING_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Default)]
pub struct OllamaLlmConfig {
    pub base_url: Option<String>,
    pub model: Option<String>,
}

/// LLM client for Ollama's `/api/generate` endpoint.
pub struct OllamaLlm {
    base_url: String,
    model: String,
    /// Client for blocking calls, with an overall timeout.
    client: reqwest::Client,
    /// Client for streaming calls; cancellation comes from the caller
    /// dropping the receiver, not from a wall-clock timeout.
    stream_client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    options: HashMap<&'static str, serde_json::Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

impl OllamaLlm {
    pub fn new(config: OllamaLlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(BLOCKING_TIMEOUT)
            .build()
            .map_err(|e| GranaryError::Llm(format!("failed to create LLM HTTP client: {e}")))?;

        Ok(Self {
            base_url: config
                .base_url
                .filter(|url| !url.is_empty())
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: config
                .model
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client,
            stream_client: reqwest::Client::new(),
        })
    }

    fn build_request<'a>(&'a self, prompt: &'a str, opts: &'a GenerateOptions, stream: bool) -> GenerateRequest<'a> {
        let model = if opts.model.is_empty() {
            &self.model
        } else {
            &opts.model
        };

        let mut options = HashMap::new();
        if opts.temperature > 0.0 {
            options.insert("temperature", serde_json::json!(opts.temperature));
        }
        if opts.max_tokens > 0 {
            options.insert("num_predict", serde_json::json!(opts.max_tokens));
        }

        GenerateRequest {
            model,
            prompt,
            system: &opts.system_prompt,
            stream,
            options,
        }
    }
}

#[async_trait]
impl LlmClient for OllamaLlm {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = self.build_request(prompt, opts, false);

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GranaryError::Llm(format!(
                "ollama API error (status {status}): {body}"
            )));
        }

        let result: GenerateResponse = response
            .json()
            .await
            .map_err(|e| GranaryError::Llm(format!("failed to decode response: {e}")))?;

        Ok(result.response)
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<mpsc::Receiver<Result<StreamChunk>>> {
        let url = format!("{}/api/generate", self.base_url);
        let request = self.build_request(prompt, opts, true);

        let response = self.stream_client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GranaryError::Llm(format!(
                "ollama API error (status {status}): {body}"
            )));
        }

        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(piece) = body.next().await {
                let bytes = match piece {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx
                            .send(Err(GranaryError::Llm(format!("reading stream: {e}"))))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                // The generate API emits one JSON object per line.
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let frame: GenerateResponse = match serde_json::from_str(line) {
                        Ok(frame) => frame,
                        Err(e) => {
                            let _ = tx
                                .send(Err(GranaryError::Llm(format!(
                                    "parsing stream response: {e}"
                                ))))
                                .await;
                            return;
                        }
                    };

                    let done = frame.done;
                    let sent = tx
                        .send(Ok(StreamChunk {
                            token: frame.response,
                            done,
                        }))
                        .await;

                    // Receiver dropped: stop producing so the connection
                    // is released.
                    if sent.is_err() || done {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}
