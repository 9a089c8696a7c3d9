use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A query against one tenant's corpus. `options` overrides the tenant
/// config for this request only; `session_id` opts into conversation
/// memory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
    pub tenant_id: String,
    pub query: String,
    pub options: Option<QueryOptions>,
    pub session_id: Option<String>,
}

/// Request-level overrides. Zero and empty values mean "use the tenant
/// config", matching the wire contract where unset fields arrive as
/// defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryOptions {
    pub top_k: u32,
    pub min_score: f32,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Restrict retrieval to these documents (Retrieve only).
    pub document_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub document_id: String,
    pub chunk_id: String,
    pub content: String,
    pub score: f32,
    pub source: String,
    pub title: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub retrieval_time_ms: i64,
    pub generation_time_ms: i64,
    pub total_time_ms: i64,
    pub chunks_retrieved: u32,
    pub model: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<RetrievedChunk>,
    pub metadata: QueryMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveMetadata {
    pub retrieval_time_ms: i64,
    pub chunks_retrieved: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieveResponse {
    pub chunks: Vec<RetrievedChunk>,
    pub metadata: RetrieveMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamError {
    pub code: String,
    pub message: String,
}

/// One event on a streaming answer. For a successful stream the sequence
/// is `source* token+ metadata`; a generation failure replaces the tail
/// with a single terminal `error` event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStreamEvent {
    Source(RetrievedChunk),
    Token(String),
    Metadata(QueryMetadata),
    Error(StreamError),
}
