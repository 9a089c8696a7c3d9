use async_trait::async_trait;

use crate::error::Result;

/// Text embedding service. Implementations must be safe to share across
/// tasks; the ingestion pipeline calls `embed_batch` from detached
/// background work while the query pipeline calls `embed` concurrently.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dense vector for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Dense vectors for many texts, in input order. A failure on any
    /// element fails the whole batch.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors this embedder produces.
    fn dimension(&self) -> usize;

    /// Name of the underlying embedding model.
    fn model_name(&self) -> &str;
}
