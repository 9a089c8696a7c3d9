use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::db::MetadataBackend;
use crate::embeddings::Embedder;
use crate::error::{GranaryError, Result};
use crate::ingestion::Chunker;
use crate::models::{Document, DocumentChunk, DocumentStatus, IngestOutcome, Tenant};
use crate::vectorstore::{VectorChunk, VectorStore};

use super::{clamp_page_size, parse_page_token, parse_tenant_id};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "RAG-Service/1.0";

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]+)</title>").unwrap());
static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Drives documents from submission to READY or FAILED. The synchronous
/// part validates, hashes, and dedupes; chunking, embedding, and vector
/// upserts run on a detached background task so a client disconnect right
/// after the accept response cannot orphan in-flight work.
#[derive(Clone)]
pub struct DocumentService {
    db: Arc<dyn MetadataBackend>,
    vectors: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    http: reqwest::Client,
}

impl DocumentService {
    pub fn new(
        db: Arc<dyn MetadataBackend>,
        vectors: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| GranaryError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            db,
            vectors,
            embedder,
            http,
        })
    }

    /// Ingest raw text. Idempotent per `(tenant, source, content)`: a
    /// duplicate returns the existing document's id and current status.
    pub async fn ingest(
        &self,
        tenant_id: &str,
        content: &str,
        source: &str,
        title: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IngestOutcome> {
        if tenant_id.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "tenant_id is required".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(GranaryError::InvalidArgument(
                "content is required".to_string(),
            ));
        }

        let tenant_id = parse_tenant_id(tenant_id)?;
        let tenant = self
            .db
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| GranaryError::NotFound("tenant not found".to_string()))?;

        // The source URI participates in the hash so near-identical pages
        // from different URLs are not collapsed.
        let content_hash = hash_content(&format!("{source}\n{content}"));

        if let Some(existing) = self.db.get_document_by_hash(tenant_id, &content_hash).await? {
            tracing::debug!(
                tenant_id = %tenant_id,
                document_id = %existing.id,
                "duplicate ingest resolved to existing document"
            );
            return Ok(IngestOutcome {
                document_id: existing.id,
                status: existing.status,
            });
        }

        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4(),
            tenant_id,
            source: if source.is_empty() {
                "direct-upload".to_string()
            } else {
                source.to_string()
            },
            title: if title.is_empty() {
                "Untitled Document".to_string()
            } else {
                title.to_string()
            },
            content_hash,
            chunk_count: 0,
            status: DocumentStatus::Processing,
            error_message: None,
            metadata,
            created_at: now,
            updated_at: now,
        };

        if let Err(create_err) = self.db.create_document(&doc).await {
            // A concurrent ingest of the same payload may have won the
            // unique (tenant_id, content_hash) race; resolve to the winner.
            if let Some(existing) = self
                .db
                .get_document_by_hash(tenant_id, &doc.content_hash)
                .await?
            {
                return Ok(IngestOutcome {
                    document_id: existing.id,
                    status: existing.status,
                });
            }
            return Err(create_err);
        }

        let service = self.clone();
        let background_doc = doc.clone();
        let background_content = content.to_string();
        tokio::spawn(async move {
            service
                .process_document(background_doc, background_content, tenant)
                .await;
        });

        Ok(IngestOutcome {
            document_id: doc.id,
            status: DocumentStatus::Processing,
        })
    }

    /// Ingest the content behind a URL. Returns immediately with a PENDING
    /// document; fetching and processing happen in the background.
    pub async fn ingest_url(
        &self,
        tenant_id: &str,
        url: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IngestOutcome> {
        if tenant_id.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "tenant_id is required".to_string(),
            ));
        }
        if url.is_empty() {
            return Err(GranaryError::InvalidArgument("url is required".to_string()));
        }

        let tenant_id = parse_tenant_id(tenant_id)?;
        let tenant = self
            .db
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| GranaryError::NotFound("tenant not found".to_string()))?;

        let now = Utc::now();
        let doc = Document {
            id: Uuid::new_v4(),
            tenant_id,
            source: url.to_string(),
            title: String::new(),
            content_hash: String::new(),
            chunk_count: 0,
            status: DocumentStatus::Pending,
            error_message: None,
            metadata,
            created_at: now,
            updated_at: now,
        };

        self.db.create_document(&doc).await?;

        let service = self.clone();
        let background_doc = doc.clone();
        let background_url = url.to_string();
        tokio::spawn(async move {
            service
                .process_url(background_doc, background_url, tenant)
                .await;
        });

        Ok(IngestOutcome {
            document_id: doc.id,
            status: DocumentStatus::Pending,
        })
    }

    pub async fn get(&self, id: &str) -> Result<Document> {
        let id = parse_document_id(id)?;
        self.db
            .get_document(id)
            .await?
            .ok_or_else(|| GranaryError::NotFound("document not found".to_string()))
    }

    pub async fn list(
        &self,
        tenant_id: &str,
        status: Option<DocumentStatus>,
        page_size: u32,
        page_token: &str,
    ) -> Result<(Vec<Document>, Option<String>, u32)> {
        let tenant_id = parse_tenant_id(tenant_id)?;
        let limit = clamp_page_size(page_size);
        let offset = parse_page_token(page_token)?;

        let (documents, total) = self
            .db
            .list_documents(tenant_id, status, limit, offset)
            .await?;

        let next_token = if offset + (documents.len() as u32) < total {
            Some((offset + documents.len() as u32).to_string())
        } else {
            None
        };

        Ok((documents, next_token, total))
    }

    /// Delete a document, its vector points (best-effort), and its chunk
    /// rows. Vector errors are logged, not fatal: the metadata row is the
    /// source of truth and orphaned points are unreachable once it is gone.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let doc = self.get(id).await?;

        if let Err(e) = self
            .vectors
            .delete_by_document(&doc.tenant_id.to_string(), &doc.id.to_string())
            .await
        {
            tracing::warn!(document_id = %doc.id, error = %e, "failed to delete vector points");
        }

        if let Err(e) = self.db.delete_chunks(doc.id).await {
            tracing::warn!(document_id = %doc.id, error = %e, "failed to delete chunk rows");
        }

        if !self.db.delete_document(doc.id).await? {
            return Err(GranaryError::NotFound("document not found".to_string()));
        }

        Ok(())
    }

    pub async fn get_chunks(
        &self,
        document_id: &str,
        page_size: u32,
        page_token: &str,
    ) -> Result<(Vec<DocumentChunk>, Option<String>)> {
        let document_id = parse_document_id(document_id)?;
        let limit = clamp_page_size(page_size);
        let offset = parse_page_token(page_token)?;

        let chunks = self.db.get_chunks(document_id, limit, offset).await?;

        let next_token = if chunks.len() as u32 == limit {
            Some((offset + chunks.len() as u32).to_string())
        } else {
            None
        };

        Ok((chunks, next_token))
    }

    // ------------------------------------------------------------------
    // Background processing
    // ------------------------------------------------------------------

    async fn process_document(&self, doc: Document, content: String, tenant: Tenant) {
        if let Err(e) = self
            .db
            .update_document_status(doc.id, DocumentStatus::Processing, None)
            .await
        {
            tracing::error!(document_id = %doc.id, error = %e, "failed to persist PROCESSING");
        }

        let chunker = Chunker::new(tenant.config.chunker.clone());
        let chunks = chunker.chunk(&content);
        if chunks.is_empty() {
            self.mark_failed(doc.id, "chunking failed: content cannot be empty")
                .await;
            return;
        }

        // Metadata priority: chunker output, then the caller's document
        // metadata, then the document-scoped defaults. The document
        // reference keys always win.
        let doc_chunks: Vec<DocumentChunk> = chunks
            .iter()
            .map(|chunk| {
                let mut metadata = chunk.metadata.clone();
                metadata
                    .entry("source".to_string())
                    .or_insert_with(|| doc.source.clone());
                metadata
                    .entry("title".to_string())
                    .or_insert_with(|| doc.title.clone());
                for (key, value) in &doc.metadata {
                    metadata.entry(key.clone()).or_insert_with(|| value.clone());
                }
                metadata.insert("document_id".to_string(), doc.id.to_string());
                metadata.insert("content_hash".to_string(), doc.content_hash.clone());

                DocumentChunk::new(doc.id, chunk.index as i64, chunk.content.clone(), metadata)
            })
            .collect();

        if let Err(e) = self.db.create_chunks(&doc_chunks).await {
            self.mark_failed(doc.id, &format!("failed to store chunks: {e}"))
                .await;
            return;
        }

        let texts: Vec<String> = doc_chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = match self.embedder.embed_batch(&texts).await {
            Ok(embeddings) => embeddings,
            Err(e) => {
                self.mark_failed(doc.id, &format!("embedding failed: {e}"))
                    .await;
                return;
            }
        };

        let vector_chunks: Vec<VectorChunk> = doc_chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| {
                let mut metadata = chunk.metadata.clone();
                metadata.insert("title".to_string(), doc.title.clone());
                metadata.insert("source".to_string(), doc.source.clone());

                VectorChunk {
                    id: chunk.id.to_string(),
                    document_id: doc.id.to_string(),
                    content: chunk.content.clone(),
                    vector,
                    sparse_vector: None,
                    metadata,
                }
            })
            .collect();

        if let Err(e) = self
            .vectors
            .upsert(&doc.tenant_id.to_string(), vector_chunks)
            .await
        {
            self.mark_failed(doc.id, &format!("vector storage failed: {e}"))
                .await;
            return;
        }

        let chunk_count = doc_chunks.len() as i64;
        match self.db.mark_document_ready(doc.id, chunk_count).await {
            Ok(true) => {
                let delta = crate::models::TenantUsage {
                    document_count: 1,
                    chunk_count,
                    query_count_month: 0,
                };
                if let Err(e) = self.db.increment_tenant_usage(doc.tenant_id, &delta).await {
                    tracing::warn!(tenant_id = %doc.tenant_id, error = %e, "failed to update usage");
                }
            }
            Ok(false) => {
                tracing::warn!(document_id = %doc.id, "document reached a terminal state elsewhere");
            }
            Err(e) => {
                tracing::error!(document_id = %doc.id, error = %e, "failed to persist READY");
            }
        }
    }

    async fn process_url(&self, mut doc: Document, url: String, tenant: Tenant) {
        if let Err(e) = self
            .db
            .update_document_status(doc.id, DocumentStatus::Processing, None)
            .await
        {
            tracing::error!(document_id = %doc.id, error = %e, "failed to persist PROCESSING");
        }

        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                self.mark_failed(doc.id, &format!("failed to fetch URL: {e}"))
                    .await;
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            self.mark_failed(doc.id, &format!("HTTP {status}")).await;
            return;
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                self.mark_failed(doc.id, &format!("failed to read response: {e}"))
                    .await;
                return;
            }
        };

        doc.title = match extract_title(&body) {
            Some(title) => title,
            None => url.clone(),
        };

        let content = strip_html(&body);
        doc.content_hash = hash_content(&content);

        match self
            .db
            .get_document_by_hash(doc.tenant_id, &doc.content_hash)
            .await
        {
            Ok(Some(existing)) if existing.id != doc.id => {
                self.mark_failed(
                    doc.id,
                    &format!("duplicate content exists in document {}", existing.id),
                )
                .await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                self.mark_failed(doc.id, &format!("dedupe lookup failed: {e}"))
                    .await;
                return;
            }
        }

        if let Err(e) = self
            .db
            .set_document_title_and_hash(doc.id, &doc.title, &doc.content_hash)
            .await
        {
            self.mark_failed(doc.id, &format!("failed to update document: {e}"))
                .await;
            return;
        }

        self.process_document(doc, content, tenant).await;
    }

    async fn mark_failed(&self, id: Uuid, message: &str) {
        tracing::warn!(document_id = %id, message, "document processing failed");
        if let Err(e) = self
            .db
            .update_document_status(id, DocumentStatus::Failed, Some(message))
            .await
        {
            tracing::error!(document_id = %id, error = %e, "failed to persist FAILED");
        }
    }
}

fn parse_document_id(raw: &str) -> Result<Uuid> {
    if raw.is_empty() {
        return Err(GranaryError::InvalidArgument("id is required".to_string()));
    }
    Uuid::parse_str(raw)
        .map_err(|_| GranaryError::InvalidArgument("invalid document ID format".to_string()))
}

fn hash_content(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut out = String::with_capacity(64);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

fn extract_title(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .map(|caps| caps[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Strip script/style elements and all tags, then collapse whitespace.
fn strip_html(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = TAG_RE.replace_all(&text, " ");
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_includes_source() {
        let a = hash_content("http://a\nbody");
        let b = hash_content("http://b\nbody");
        assert_ne!(a, b);
        assert_eq!(a, hash_content("http://a\nbody"));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_extract_title() {
        assert_eq!(
            extract_title("<html><head><TITLE>Hello World</TITLE></head></html>"),
            Some("Hello World".to_string())
        );
        assert_eq!(
            extract_title("<title class=\"x\"> Spaced </title>"),
            Some("Spaced".to_string())
        );
        assert_eq!(extract_title("<p>no title</p>"), None);
    }

    #[test]
    fn test_strip_html() {
        let html = "<html><head><style>p { color: red; }</style>\
                    <script>alert('x');</script></head>\
                    <body><p>Hello <b>world</b></p></body></html>";
        assert_eq!(strip_html(html), "Hello world");
    }

    #[test]
    fn test_strip_html_collapses_whitespace() {
        assert_eq!(strip_html("<div>a</div>\n\n  <div>b</div>"), "a b");
    }
}
