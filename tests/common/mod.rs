//! Shared test doubles: a deterministic bag-of-words embedder, an
//! in-memory vector store with real cosine scoring, and a canned LLM that
//! records every prompt it receives.
#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use granary::config::DatabaseConfig;
use granary::db::{Database, LibSqlBackend, MetadataBackend};
use granary::embeddings::Embedder;
use granary::error::{GranaryError, Result};
use granary::llm::{GenerateOptions, LlmClient, StreamChunk};
use granary::vectorstore::{
    collection_name, SearchResult, SparseVector, VectorChunk, VectorStore,
};

pub async fn test_backend() -> Arc<dyn MetadataBackend> {
    let db = Database::new(&DatabaseConfig {
        url: ":memory:".to_string(),
        auth_token: None,
    })
    .await
    .expect("in-memory database");
    Arc::new(LibSqlBackend::new(db))
}

// ----------------------------------------------------------------------
// Embedder
// ----------------------------------------------------------------------

pub const STUB_DIMENSION: usize = 64;

/// Deterministic bag-of-words embedder: each token hashes into one of 64
/// buckets. Texts sharing words get high cosine similarity, which is
/// enough signal for end-to-end retrieval tests.
pub struct StubEmbedder;

impl StubEmbedder {
    fn vectorize(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; STUB_DIMENSION];
        for token in text.to_lowercase().split_whitespace() {
            let token: String = token.chars().filter(|c| c.is_alphanumeric()).collect();
            if token.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % STUB_DIMENSION as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        STUB_DIMENSION
    }

    fn model_name(&self) -> &str {
        "stub-embedder"
    }
}

/// An embedder that always fails, for exercising the FAILED path.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(GranaryError::Embedding("stub embedder offline".to_string()))
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(GranaryError::Embedding("stub embedder offline".to_string()))
    }

    fn dimension(&self) -> usize {
        STUB_DIMENSION
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }
}

// ----------------------------------------------------------------------
// Vector store
// ----------------------------------------------------------------------

/// In-memory vector store with cosine scoring. Hybrid search scores with
/// the dense vectors only, which keeps fused scores on the cosine scale.
#[derive(Default)]
pub struct FakeVectorStore {
    collections: Mutex<HashMap<String, Vec<VectorChunk>>>,
}

impl FakeVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn point_count(&self, tenant_id: &str, document_id: &str) -> usize {
        let collections = self.collections.lock().unwrap();
        collections
            .get(&collection_name(tenant_id))
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.document_id == document_id)
                    .count()
            })
            .unwrap_or(0)
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    fn query(
        &self,
        tenant_id: &str,
        vector: &[f32],
        top_k: usize,
        min_score: f32,
    ) -> Vec<SearchResult> {
        let collections = self.collections.lock().unwrap();
        let Some(points) = collections.get(&collection_name(tenant_id)) else {
            return Vec::new();
        };

        let mut results: Vec<SearchResult> = points
            .iter()
            .map(|point| SearchResult {
                id: point.id.clone(),
                document_id: point.document_id.clone(),
                content: point.content.clone(),
                score: Self::cosine(vector, &point.vector),
                metadata: point.metadata.clone(),
            })
            .filter(|result| result.score >= min_score)
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());
        results.truncate(top_k);
        results
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn create_collection(&self, tenant_id: &str, _dimension: usize) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        collections.entry(collection_name(tenant_id)).or_default();
        Ok(())
    }

    async fn create_hybrid_collection(&self, tenant_id: &str, dimension: usize) -> Result<()> {
        self.create_collection(tenant_id, dimension).await
    }

    async fn delete_collection(&self, tenant_id: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        collections.remove(&collection_name(tenant_id));
        Ok(())
    }

    async fn collection_exists(&self, tenant_id: &str) -> Result<bool> {
        let collections = self.collections.lock().unwrap();
        Ok(collections.contains_key(&collection_name(tenant_id)))
    }

    async fn upsert(&self, tenant_id: &str, chunks: Vec<VectorChunk>) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        let points = collections.entry(collection_name(tenant_id)).or_default();
        for chunk in chunks {
            points.retain(|p| p.id != chunk.id);
            points.push(chunk);
        }
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: &str,
        vector: Vec<f32>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        Ok(self.query(tenant_id, &vector, top_k, min_score))
    }

    async fn hybrid_search(
        &self,
        tenant_id: &str,
        dense_vector: Vec<f32>,
        _sparse_vector: Option<&SparseVector>,
        top_k: usize,
        min_score: f32,
    ) -> Result<Vec<SearchResult>> {
        Ok(self.query(tenant_id, &dense_vector, top_k, min_score))
    }

    async fn delete_by_document(&self, tenant_id: &str, document_id: &str) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(points) = collections.get_mut(&collection_name(tenant_id)) {
            points.retain(|p| p.document_id != document_id);
        }
        Ok(())
    }

    async fn delete_by_ids(&self, tenant_id: &str, ids: &[String]) -> Result<()> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(points) = collections.get_mut(&collection_name(tenant_id)) {
            points.retain(|p| !ids.contains(&p.id));
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------
// LLM
// ----------------------------------------------------------------------

/// Canned LLM: returns a fixed answer and records every prompt so tests
/// can assert on the assembled prompt text.
pub struct StubLlm {
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
    pub fail_stream: bool,
}

impl StubLlm {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
            fail_stream: false,
        }
    }

    pub fn failing_stream(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
            fail_stream: true,
        }
    }

    pub fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for StubLlm {
    async fn generate(&self, prompt: &str, _opts: &GenerateOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.answer.clone())
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        _opts: &GenerateOptions,
    ) -> Result<mpsc::Receiver<Result<StreamChunk>>> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let answer = self.answer.clone();
        let fail = self.fail_stream;
        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let tokens: Vec<String> = answer
                .split_inclusive(' ')
                .map(|t| t.to_string())
                .collect();

            for (i, token) in tokens.iter().enumerate() {
                if fail && i == 1 {
                    let _ = tx
                        .send(Err(GranaryError::Llm("stream interrupted".to_string())))
                        .await;
                    return;
                }
                if tx
                    .send(Ok(StreamChunk {
                        token: token.clone(),
                        done: false,
                    }))
                    .await
                    .is_err()
                {
                    return;
                }
            }

            let _ = tx
                .send(Ok(StreamChunk {
                    token: String::new(),
                    done: true,
                }))
                .await;
        });

        Ok(rx)
    }
}
