/// Static facts about an embedding model: vector dimension, context
/// window, and the chunk sizes (in words) that stay safely inside it.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub dimension: usize,
    pub context_length: usize,
    pub max_chunk_words: usize,
    pub target_chunk_words: usize,
}

impl ModelConfig {
    /// Look up a known model, or fall back to conservative defaults so an
    /// unknown model never produces chunks that overflow its context.
    pub fn for_model(model_name: &str) -> Self {
        match model_name {
            "nomic-embed-text" => Self {
                dimension: 768,
                context_length: 8192,
                max_chunk_words: 512,
                target_chunk_words: 256,
            },
            "mxbai-embed-large" => Self {
                dimension: 1024,
                context_length: 512,
                max_chunk_words: 300,
                target_chunk_words: 150,
            },
            "all-minilm" => Self {
                dimension: 384,
                context_length: 256,
                max_chunk_words: 150,
                target_chunk_words: 100,
            },
            "snowflake-arctic-embed" => Self {
                dimension: 1024,
                context_length: 8192,
                max_chunk_words: 512,
                target_chunk_words: 256,
            },
            _ => Self {
                dimension: 768,
                context_length: 2048,
                max_chunk_words: 256,
                target_chunk_words: 128,
            },
        }
    }
}
