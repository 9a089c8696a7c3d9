use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{GranaryError, Result};
use crate::llm::{GenerateOptions, LlmClient};
use crate::vectorstore::SearchResult;

use super::{Reranker, ScoredResult};

// Candidates are truncated before prompting to keep the scoring prompt
// inside small-model context windows.
const MAX_CONTENT_CHARS: usize = 500;

// Score assumed for candidates the model forgot to mention.
const MISSING_SCORE: f32 = 0.5;

/// LLM-based cross-encoder: one prompt carries the query and every
/// candidate, and the model returns strict JSON scores. Parse failures
/// fall back to the original vector scores.
pub struct LlmReranker {
    llm: Arc<dyn LlmClient>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct RelevanceScore {
    doc_index: i64,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    scores: Vec<RelevanceScore>,
}

impl LlmReranker {
    pub fn new(llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            llm,
            model: model.into(),
        }
    }

    fn build_prompt(query: &str, results: &[SearchResult]) -> String {
        let mut prompt = String::from(
            "You are a relevance scoring system. Score each document's relevance to the query.\n\n",
        );
        prompt.push_str("Query: ");
        prompt.push_str(query);
        prompt.push_str("\n\n");

        prompt.push_str("Documents to score:\n");
        for (i, result) in results.iter().enumerate() {
            let content: String = if result.content.len() > MAX_CONTENT_CHARS {
                let truncated: String = result.content.chars().take(MAX_CONTENT_CHARS).collect();
                format!("{truncated}...")
            } else {
                result.content.clone()
            };
            prompt.push_str(&format!("[Doc {i}]: {content}\n\n"));
        }

        prompt.push_str(
            r#"Score each document from 0.0 to 1.0 based on relevance to the query.
Output ONLY valid JSON in this exact format:
{"scores": [{"doc_index": 0, "score": 0.9}, {"doc_index": 1, "score": 0.3}, ...]}

Be strict: irrelevant documents should score below 0.3, somewhat relevant 0.3-0.7, highly relevant above 0.7.
Output only JSON, no explanation:"#,
        );

        prompt
    }

    /// Accepts bare JSON or JSON inside a fenced code block; clamps scores
    /// into [0, 1]; candidates the model skipped default to 0.5.
    fn parse_response(response: &str, num_results: usize) -> Result<Vec<f32>> {
        let mut response = response.trim();

        if let Some(start) = response.find("```json") {
            let rest = &response[start + 7..];
            if let Some(end) = rest.find("```") {
                response = &rest[..end];
            }
        } else if let Some(start) = response.find("```") {
            let rest = &response[start + 3..];
            if let Some(end) = rest.find("```") {
                response = &rest[..end];
            }
        }

        let parsed: RerankResponse = serde_json::from_str(response.trim())
            .map_err(|e| GranaryError::Llm(format!("failed to parse rerank response: {e}")))?;

        let mut scores = vec![MISSING_SCORE; num_results];
        for entry in parsed.scores {
            if entry.doc_index >= 0 && (entry.doc_index as usize) < num_results {
                scores[entry.doc_index as usize] = entry.score.clamp(0.0, 1.0);
            }
        }

        Ok(scores)
    }

    fn fallback_scoring(results: &[SearchResult], top_k: usize) -> Vec<ScoredResult> {
        results
            .iter()
            .take(top_k)
            .map(|result| ScoredResult {
                result: result.clone(),
                reranker_score: result.score,
            })
            .collect()
    }
}

#[async_trait]
impl Reranker for LlmReranker {
    async fn rerank(
        &self,
        query: &str,
        results: &[SearchResult],
        top_k: usize,
    ) -> Result<Vec<ScoredResult>> {
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let top_k = top_k.min(results.len());
        let prompt = Self::build_prompt(query, results);

        let opts = GenerateOptions {
            model: self.model.clone(),
            system_prompt: String::new(),
            // Deterministic scoring.
            temperature: 0.0,
            max_tokens: 1024,
        };

        let response = self
            .llm
            .generate(&prompt, &opts)
            .await
            .map_err(|e| GranaryError::Llm(format!("LLM reranking failed: {e}")))?;

        let scores = match Self::parse_response(&response, results.len()) {
            Ok(scores) => scores,
            Err(_) => return Ok(Self::fallback_scoring(results, top_k)),
        };

        let mut scored: Vec<ScoredResult> = results
            .iter()
            .zip(scores)
            .map(|(result, score)| ScoredResult {
                result: result.clone(),
                reranker_score: score,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.reranker_score
                .partial_cmp(&a.reranker_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);

        Ok(scored)
    }
}
