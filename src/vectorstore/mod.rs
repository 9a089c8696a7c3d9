mod qdrant;

pub use qdrant::QdrantStore;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

/// Keyword-weight vector as parallel `indices`/`values` arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// A chunk ready for upsert: dense embedding, optional sparse embedding
/// (hybrid collections only), and a string payload mirrored from the
/// chunk's metadata.
#[derive(Debug, Clone)]
pub struct VectorChunk {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub sparse_vector: Option<SparseVector>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub id: String,
    pub document_id: String,
    pub content: String,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

/// Converts query text into a sparse vector for hybrid search.
pub trait SparseVectorizer: Send + Sync {
    fn vectorize(&self, text: &str) -> SparseVector;
}

/// Collection names derive deterministically from the tenant id; tenant
/// isolation in the vector store is collection-per-tenant.
pub fn collection_name(tenant_id: &str) -> String {
    format!("tenant_{tenant_id}")
}

/// Vector similarity engine, one collection per tenant.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a dense-only collection sized to the embedding dimension.
    async fn create_collection(&self, tenant_id: &str, dimension: usize) -> Result<()>;

    /// Create a collection with named dense and sparse vectors.
    async fn create_hybrid_collection(&self, tenant_id: &str, dimension: usize) -> Result<()>;

    async fn delete_collection(&self, tenant_id: &str) -> Result<()>;

    async fn collection_exists(&self, tenant_id: &str) -> Result<bool>;

    async fn upsert(&self, tenant_id: &str, chunks: Vec<VectorChunk>) -> Result<()>;

    /// Dense similarity search, score-descending, thresholded at
    /// `min_score` by the engine.
    async fn search(
        &self,
        tenant_id: &str,
        vector: Vec<f32>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Hybrid search: dense and sparse prefetches of `top_k * 2` each,
    /// fused with Reciprocal Rank Fusion. The fused score scale is
    /// engine-defined, so `min_score` is applied client-side here and
    /// operators must calibrate it per engine.
    async fn hybrid_search(
        &self,
        tenant_id: &str,
        dense_vector: Vec<f32>,
        sparse_vector: Option<&SparseVector>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>>;

    /// Remove all points belonging to a document.
    async fn delete_by_document(&self, tenant_id: &str, document_id: &str) -> Result<()>;

    /// Remove specific points by id.
    async fn delete_by_ids(&self, tenant_id: &str, ids: &[String]) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_is_deterministic() {
        assert_eq!(
            collection_name("0d9f9b74-6a3f-4f3c-8e88-000000000001"),
            "tenant_0d9f9b74-6a3f-4f3c-8e88-000000000001"
        );
    }
}
