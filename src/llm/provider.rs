use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: String,
    pub system_prompt: String,
    /// 0.0 = deterministic; zero is treated as "unset" and left to the
    /// model's own default.
    pub temperature: f32,
    /// 0 = no limit.
    pub max_tokens: u32,
}

/// One fragment of a streamed response.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub token: String,
    pub done: bool,
}

/// Large language model client.
///
/// `generate_stream` yields a finite lazy sequence: the producer stops at
/// the first `done` chunk, on error, or when the receiver is dropped.
/// Dropping the receiver cancels the producer task, which releases the
/// upstream HTTP connection.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Blocking completion; returns the full response text.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String>;

    /// Streaming completion. Errors establishing the stream surface as
    /// `Err`; errors mid-stream arrive as an `Err` item on the channel.
    async fn generate_stream(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
    ) -> Result<mpsc::Receiver<Result<StreamChunk>>>;
}
