//! Cross-encoder re-ranking of retrieval results.
//!
//! Re-ranking scores each query-document pair with a model that sees both
//! inputs together, which separates near-ties that independent vector
//! scores cannot. It is a per-tenant option (`TenantConfig.reranker_enabled`):
//! it adds an extra LLM call per query and roughly doubles token usage, in
//! exchange for noticeably better ordering when the top-k vector scores
//! cluster. Enable it where accuracy beats latency.

mod llm;

pub use llm::LlmReranker;

use async_trait::async_trait;

use crate::error::Result;
use crate::vectorstore::SearchResult;

/// A search result with its re-ranked relevance score.
#[derive(Debug, Clone)]
pub struct ScoredResult {
    pub result: SearchResult,
    pub reranker_score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    /// Re-order `results` by relevance to `query`, returning at most
    /// `top_k` entries with updated scores.
    async fn rerank(
        &self,
        query: &str,
        results: &[SearchResult],
        top_k: usize,
    ) -> Result<Vec<ScoredResult>>;
}
