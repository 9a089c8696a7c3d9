use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GranaryError, Result};

/// A tenant is the isolation boundary: its documents, vector collection,
/// and configuration are invisible to every other tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub name: String,
    pub api_key: String,
    pub config: TenantConfig,
    pub usage: TenantUsage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub embedding_model: String,
    pub llm_model: String,
    pub chunker: ChunkerConfig,
    pub top_k: u32,
    pub min_score: f32,
    pub system_prompt: String,
    #[serde(default)]
    pub reranker_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub method: ChunkMethod,
    /// Target words per chunk (word count is the token proxy).
    pub target_size: usize,
    /// Hard ceiling in words; atomic blocks may still exceed it.
    pub max_size: usize,
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            method: ChunkMethod::Semantic,
            target_size: 512,
            max_size: 1024,
            overlap: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "String", rename_all = "lowercase")]
pub enum ChunkMethod {
    Fixed,
    Sentence,
    #[default]
    Semantic,
}

// Persisted configs may predate the current method set; unknown values
// degrade to the semantic strategy rather than failing deserialization.
impl From<String> for ChunkMethod {
    fn from(raw: String) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl std::str::FromStr for ChunkMethod {
    type Err = GranaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fixed" => Ok(ChunkMethod::Fixed),
            "sentence" => Ok(ChunkMethod::Sentence),
            "semantic" => Ok(ChunkMethod::Semantic),
            other => Err(GranaryError::InvalidArgument(format!(
                "invalid chunker method: {other} (valid: fixed, semantic, sentence)"
            ))),
        }
    }
}

impl std::fmt::Display for ChunkMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChunkMethod::Fixed => "fixed",
            ChunkMethod::Sentence => "sentence",
            ChunkMethod::Semantic => "semantic",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantUsage {
    pub document_count: i64,
    pub chunk_count: i64,
    pub query_count_month: i64,
}

/// Field-wise partial update for tenant configuration. Absent fields keep
/// their current values; present fields replace them after validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TenantConfigPatch {
    pub embedding_model: Option<String>,
    pub llm_model: Option<String>,
    pub chunker_method: Option<ChunkMethod>,
    pub chunker_target_size: Option<usize>,
    pub chunker_max_size: Option<usize>,
    pub chunker_overlap: Option<usize>,
    pub top_k: Option<u32>,
    pub min_score: Option<f32>,
    pub system_prompt: Option<String>,
    pub reranker_enabled: Option<bool>,
}

impl TenantConfig {
    /// Merge a partial update into this config. Empty strings and zero
    /// numeric values are treated as "not provided", mirroring the wire
    /// contract where unset proto fields arrive as defaults.
    pub fn merge(&mut self, patch: &TenantConfigPatch) {
        if let Some(ref model) = patch.embedding_model {
            if !model.is_empty() {
                self.embedding_model = model.clone();
            }
        }
        if let Some(ref model) = patch.llm_model {
            if !model.is_empty() {
                self.llm_model = model.clone();
            }
        }
        if let Some(method) = patch.chunker_method {
            self.chunker.method = method;
        }
        if let Some(size) = patch.chunker_target_size {
            if size > 0 {
                self.chunker.target_size = size;
            }
        }
        if let Some(size) = patch.chunker_max_size {
            if size > 0 {
                self.chunker.max_size = size;
            }
        }
        if let Some(overlap) = patch.chunker_overlap {
            if overlap > 0 {
                self.chunker.overlap = overlap;
            }
        }
        if let Some(top_k) = patch.top_k {
            if top_k > 0 {
                self.top_k = top_k;
            }
        }
        if let Some(min_score) = patch.min_score {
            if min_score > 0.0 {
                self.min_score = min_score;
            }
        }
        if let Some(ref prompt) = patch.system_prompt {
            if !prompt.is_empty() {
                self.system_prompt = prompt.clone();
            }
        }
        if let Some(enabled) = patch.reranker_enabled {
            self.reranker_enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding_model.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "embedding_model is required".to_string(),
            ));
        }
        if self.llm_model.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "llm_model is required".to_string(),
            ));
        }

        let chunker = &self.chunker;
        if chunker.target_size > 0 && chunker.max_size > 0 && chunker.target_size > chunker.max_size
        {
            return Err(GranaryError::InvalidArgument(format!(
                "chunker target_size ({}) cannot be greater than max_size ({})",
                chunker.target_size, chunker.max_size
            )));
        }
        if chunker.overlap > 0 && chunker.target_size > 0 && chunker.overlap >= chunker.target_size
        {
            return Err(GranaryError::InvalidArgument(format!(
                "chunker overlap ({}) must be less than target_size ({})",
                chunker.overlap, chunker.target_size
            )));
        }

        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(GranaryError::InvalidArgument(
                "min_score must be between 0 and 1".to_string(),
            ));
        }

        Ok(())
    }
}
