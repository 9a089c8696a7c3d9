mod ollama;
mod provider;

pub use ollama::{OllamaLlm, OllamaLlmConfig};
pub use provider::{GenerateOptions, LlmClient, StreamChunk};
