mod models;
mod ollama;
mod provider;

pub use models::ModelConfig;
pub use ollama::{OllamaEmbedder, OllamaEmbedderConfig};
pub use provider::Embedder;
