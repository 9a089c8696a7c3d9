use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;

use crate::db::MetadataBackend;
use crate::embeddings::Embedder;
use crate::error::{GranaryError, Result};
use crate::llm::{GenerateOptions, LlmClient};
use crate::memory::{format_for_prompt, ConversationMemory, InMemoryStore, Message};
use crate::models::{
    QueryMetadata, QueryRequest, QueryResponse, QueryStreamEvent, RetrieveMetadata,
    RetrieveResponse, RetrievedChunk, StreamError, Tenant,
};
use crate::reranker::Reranker;
use crate::vectorstore::{SearchResult, SparseVectorizer, VectorStore};

use super::{parse_tenant_id, DEFAULT_SYSTEM_PROMPT};

// Candidates above this Jaccard similarity are near-duplicates; the
// lower-scored one is dropped.
const DEDUP_THRESHOLD: f64 = 0.7;

// Retrieve extra candidates so dedup and reranking have headroom.
const OVERSAMPLE_FACTOR: u32 = 3;

// Last 10 messages = 5 turns of context.
const HISTORY_MESSAGES: usize = 10;

const DEFAULT_TOP_K: u32 = 4;
const DEFAULT_MIN_SCORE: f32 = 0.5;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Answers queries against a tenant's corpus: embed, search (dense or
/// hybrid), dedupe, optionally rerank, assemble a grounded prompt with
/// conversation history, and generate — blocking or streamed.
pub struct RagService {
    db: Arc<dyn MetadataBackend>,
    embedder: Arc<dyn Embedder>,
    vectors: Arc<dyn VectorStore>,
    llm: Arc<dyn LlmClient>,
    memory: Arc<dyn ConversationMemory>,
    reranker: Option<Arc<dyn Reranker>>,
    sparse: Option<Arc<dyn SparseVectorizer>>,
}

#[derive(Debug, Clone)]
struct ResolvedOptions {
    top_k: u32,
    min_score: f32,
    system_prompt: String,
    temperature: f32,
    max_tokens: u32,
    model: String,
}

impl RagService {
    pub fn new(
        db: Arc<dyn MetadataBackend>,
        embedder: Arc<dyn Embedder>,
        vectors: Arc<dyn VectorStore>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            db,
            embedder,
            vectors,
            llm,
            memory: Arc::new(InMemoryStore::with_defaults()),
            reranker: None,
            sparse: None,
        }
    }

    /// Attach a reranker; it only runs for tenants with
    /// `reranker_enabled`.
    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Enable hybrid (dense + sparse) search with the given vectorizer.
    pub fn with_hybrid_search(mut self, sparse: Arc<dyn SparseVectorizer>) -> Self {
        self.sparse = Some(sparse);
        self
    }

    /// Replace the conversation memory (e.g. with a remote cache).
    pub fn with_memory(mut self, memory: Arc<dyn ConversationMemory>) -> Self {
        self.memory = memory;
        self
    }

    /// Blocking query: retrieve, assemble, generate, return the answer
    /// with source attributions and timing metadata.
    pub async fn query(&self, req: &QueryRequest) -> Result<QueryResponse> {
        let start = Instant::now();

        let (tenant, options) = self.load_tenant_and_options(req).await?;

        let retrieval_start = Instant::now();
        let results = self.search_candidates(&tenant, &req.query, &options).await?;
        let retrieval_ms = retrieval_start.elapsed().as_millis() as i64;

        let sources: Vec<RetrievedChunk> = results.iter().map(to_retrieved_chunk).collect();

        let history = self.load_history(req);
        let prompt = build_rag_prompt(&options.system_prompt, &sources, &req.query, &history);

        let generation_start = Instant::now();
        let answer = self
            .llm
            .generate(&prompt, &generate_options(&options))
            .await?;
        let generation_ms = generation_start.elapsed().as_millis() as i64;

        if let Some(session_id) = req.session_id.as_deref() {
            self.memory.add_assistant_message(session_id, &answer);
        }

        Ok(QueryResponse {
            answer,
            sources: sources.clone(),
            metadata: QueryMetadata {
                retrieval_time_ms: retrieval_ms,
                generation_time_ms: generation_ms,
                total_time_ms: start.elapsed().as_millis() as i64,
                chunks_retrieved: sources.len() as u32,
                model: options.model,
            },
        })
    }

    /// Streaming query. Events arrive as `source* token+ metadata`; a
    /// generation failure ends the stream with a terminal `error` event
    /// instead of the metadata.
    pub async fn query_stream(
        &self,
        req: &QueryRequest,
    ) -> Result<mpsc::Receiver<QueryStreamEvent>> {
        let start = Instant::now();

        let (tenant, options) = self.load_tenant_and_options(req).await?;

        let retrieval_start = Instant::now();
        let results = self.search_candidates(&tenant, &req.query, &options).await?;
        let retrieval_ms = retrieval_start.elapsed().as_millis() as i64;

        let sources: Vec<RetrievedChunk> = results.iter().map(to_retrieved_chunk).collect();

        let history = self.load_history(req);
        let prompt = build_rag_prompt(&options.system_prompt, &sources, &req.query, &history);

        let generation_start = Instant::now();
        let mut llm_rx = self
            .llm
            .generate_stream(&prompt, &generate_options(&options))
            .await?;

        let (tx, rx) = mpsc::channel(32);
        let memory = Arc::clone(&self.memory);
        let session_id = req.session_id.clone();
        let model = options.model.clone();

        tokio::spawn(async move {
            for source in &sources {
                if tx
                    .send(QueryStreamEvent::Source(source.clone()))
                    .await
                    .is_err()
                {
                    return;
                }
            }

            let mut full_response = String::new();

            while let Some(chunk) = llm_rx.recv().await {
                match chunk {
                    Ok(chunk) => {
                        if !chunk.token.is_empty() {
                            full_response.push_str(&chunk.token);
                            if tx
                                .send(QueryStreamEvent::Token(chunk.token))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx
                            .send(QueryStreamEvent::Error(StreamError {
                                code: "generation_error".to_string(),
                                message: e.to_string(),
                            }))
                            .await;
                        return;
                    }
                }
            }

            if let Some(session_id) = session_id.as_deref() {
                memory.add_assistant_message(session_id, &full_response);
            }

            let _ = tx
                .send(QueryStreamEvent::Metadata(QueryMetadata {
                    retrieval_time_ms: retrieval_ms,
                    generation_time_ms: generation_start.elapsed().as_millis() as i64,
                    total_time_ms: start.elapsed().as_millis() as i64,
                    chunks_retrieved: sources.len() as u32,
                    model,
                }))
                .await;
        });

        Ok(rx)
    }

    /// Retrieval without generation: relevant chunks only, optionally
    /// filtered to specific documents.
    pub async fn retrieve(&self, req: &QueryRequest) -> Result<RetrieveResponse> {
        let start = Instant::now();

        let (tenant, options) = self.load_tenant_and_options(req).await?;

        let query_vector = self.embedder.embed(&req.query).await?;

        let mut results = self
            .vectors
            .search(
                &tenant.id.to_string(),
                query_vector,
                options.top_k as usize,
                options.min_score,
            )
            .await?;

        if let Some(opts) = &req.options {
            if !opts.document_ids.is_empty() {
                let allowed: HashSet<&str> =
                    opts.document_ids.iter().map(String::as_str).collect();
                results.retain(|result| allowed.contains(result.document_id.as_str()));
            }
        }

        let chunks: Vec<RetrievedChunk> = results.iter().map(to_retrieved_chunk).collect();

        Ok(RetrieveResponse {
            metadata: RetrieveMetadata {
                retrieval_time_ms: start.elapsed().as_millis() as i64,
                chunks_retrieved: chunks.len() as u32,
            },
            chunks,
        })
    }

    async fn load_tenant_and_options(
        &self,
        req: &QueryRequest,
    ) -> Result<(Tenant, ResolvedOptions)> {
        if req.tenant_id.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "tenant_id is required".to_string(),
            ));
        }
        if req.query.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "query is required".to_string(),
            ));
        }

        let tenant_id = parse_tenant_id(&req.tenant_id)?;
        let tenant = self
            .db
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| GranaryError::NotFound("tenant not found".to_string()))?;

        let options = resolve_options(&tenant, req);
        Ok((tenant, options))
    }

    // Shared retrieval path: embed, (hybrid) search with oversampling,
    // near-duplicate suppression, optional rerank, then truncate.
    async fn search_candidates(
        &self,
        tenant: &Tenant,
        query: &str,
        options: &ResolvedOptions,
    ) -> Result<Vec<SearchResult>> {
        let query_vector = self.embedder.embed(query).await?;

        let oversampled = (options.top_k * OVERSAMPLE_FACTOR) as usize;
        let tenant_key = tenant.id.to_string();

        let mut results = match &self.sparse {
            Some(sparse) => {
                let sparse_vector = sparse.vectorize(query);
                self.vectors
                    .hybrid_search(
                        &tenant_key,
                        query_vector,
                        Some(&sparse_vector),
                        oversampled,
                        options.min_score,
                    )
                    .await?
            }
            None => self
                .vectors
                .search(&tenant_key, query_vector, oversampled, options.min_score)
                .await?,
        };

        results = deduplicate_results(results, DEDUP_THRESHOLD);

        if let Some(reranker) = &self.reranker {
            if tenant.config.reranker_enabled && !results.is_empty() {
                match reranker
                    .rerank(query, &results, options.top_k as usize)
                    .await
                {
                    Ok(reranked) if !reranked.is_empty() => {
                        results = reranked
                            .into_iter()
                            .map(|scored| {
                                let mut result = scored.result;
                                result.score = scored.reranker_score;
                                result
                            })
                            .collect();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Reranking is best-effort; vector ordering stands.
                        tracing::debug!(error = %e, "reranker failed; using vector scores");
                    }
                }
            }
        }

        results.truncate(options.top_k as usize);
        Ok(results)
    }

    fn load_history(&self, req: &QueryRequest) -> Vec<Message> {
        match req.session_id.as_deref() {
            Some(session_id) => {
                let history = self.memory.get_recent_history(session_id, HISTORY_MESSAGES);
                self.memory.add_user_message(session_id, &req.query);
                history
            }
            None => Vec::new(),
        }
    }
}

fn generate_options(options: &ResolvedOptions) -> GenerateOptions {
    GenerateOptions {
        model: options.model.clone(),
        system_prompt: options.system_prompt.clone(),
        temperature: options.temperature,
        max_tokens: options.max_tokens,
    }
}

// Tenant config is the base; hard defaults fill zero/empty fields; request
// options override when strictly positive / non-empty.
fn resolve_options(tenant: &Tenant, req: &QueryRequest) -> ResolvedOptions {
    let mut options = ResolvedOptions {
        top_k: tenant.config.top_k,
        min_score: tenant.config.min_score,
        system_prompt: tenant.config.system_prompt.clone(),
        temperature: DEFAULT_TEMPERATURE,
        max_tokens: DEFAULT_MAX_TOKENS,
        model: tenant.config.llm_model.clone(),
    };

    if options.top_k == 0 {
        options.top_k = DEFAULT_TOP_K;
    }
    if options.min_score <= 0.0 {
        options.min_score = DEFAULT_MIN_SCORE;
    }
    if options.system_prompt.is_empty() {
        options.system_prompt = DEFAULT_SYSTEM_PROMPT.to_string();
    }

    if let Some(opts) = &req.options {
        if opts.top_k > 0 {
            options.top_k = opts.top_k;
        }
        if opts.min_score > 0.0 {
            options.min_score = opts.min_score;
        }
        if !opts.system_prompt.is_empty() {
            options.system_prompt = opts.system_prompt.clone();
        }
        if opts.temperature > 0.0 {
            options.temperature = opts.temperature;
        }
        if opts.max_tokens > 0 {
            options.max_tokens = opts.max_tokens;
        }
    }

    options
}

fn to_retrieved_chunk(result: &SearchResult) -> RetrievedChunk {
    RetrievedChunk {
        document_id: result.document_id.clone(),
        chunk_id: result.id.clone(),
        content: result.content.clone(),
        score: result.score,
        source: result.metadata.get("source").cloned().unwrap_or_default(),
        title: result.metadata.get("title").cloned().unwrap_or_default(),
        metadata: result.metadata.clone(),
    }
}

// Relevance scores are deliberately omitted from the prompt so the model
// is not biased toward any one document.
fn build_rag_prompt(
    system_prompt: &str,
    chunks: &[RetrievedChunk],
    query: &str,
    history: &[Message],
) -> String {
    let mut prompt = String::new();

    prompt.push_str(system_prompt);
    prompt.push_str("\n\n");

    if !history.is_empty() {
        prompt.push_str("## Conversation History\n");
        prompt.push_str("(Previous exchanges in this session for context)\n\n");
        prompt.push_str(&format_for_prompt(history));
        prompt.push('\n');
    }

    prompt.push_str("## Context Documents\n\n");
    for (i, chunk) in chunks.iter().enumerate() {
        prompt.push_str(&format!("[Doc {}]", i + 1));
        if !chunk.title.is_empty() {
            prompt.push_str(&format!(" (Title: {})", chunk.title));
        }
        if !chunk.source.is_empty() {
            prompt.push_str(&format!(" (Source: {})", chunk.source));
        }
        prompt.push('\n');
        prompt.push_str(&chunk.content);
        prompt.push_str("\n\n");
    }

    prompt.push_str("## Question\n");
    prompt.push_str(query);
    prompt.push_str("\n\n");

    prompt.push_str("## Answer (be brief and direct)\n");

    prompt
}

// ----------------------------------------------------------------------
// Near-duplicate suppression
// ----------------------------------------------------------------------

/// Drop candidates whose content is a near-duplicate (Jaccard >= threshold)
/// of a higher-ranked survivor. Input is score-descending, so for each
/// similar pair the earlier entry wins.
fn deduplicate_results(results: Vec<SearchResult>, threshold: f64) -> Vec<SearchResult> {
    if results.len() <= 1 {
        return results;
    }

    let word_sets: Vec<HashSet<String>> = results
        .iter()
        .map(|result| tokenize(&result.content))
        .collect();

    let mut keep = vec![true; results.len()];
    for i in 0..results.len() {
        if !keep[i] {
            continue;
        }
        for j in (i + 1)..results.len() {
            if !keep[j] {
                continue;
            }
            if jaccard_similarity(&word_sets[i], &word_sets[j]) >= threshold {
                keep[j] = false;
            }
        }
    }

    results
        .into_iter()
        .zip(keep)
        .filter_map(|(result, keep)| keep.then_some(result))
        .collect()
}

// Lowercase, split on whitespace, strip outer punctuation, drop short
// tokens.
fn tokenize(content: &str) -> HashSet<String> {
    content
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c| ".,!?;:\"'()[]{}=<>".contains(c)))
        .filter(|word| word.len() > 2)
        .map(|word| word.to_string())
        .collect()
}

fn jaccard_similarity(set1: &HashSet<String>, set2: &HashSet<String>) -> f64 {
    if set1.is_empty() && set2.is_empty() {
        return 1.0;
    }
    if set1.is_empty() || set2.is_empty() {
        return 0.0;
    }

    let intersection = set1.intersection(set2).count();
    let union = set1.len() + set2.len() - intersection;

    intersection as f64 / union as f64
}
