use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CrawlJob, CrawledPage, Document, DocumentChunk, DocumentStatus, Tenant, TenantUsage,
};

/// CRUD and lookup operations for tenants.
#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn create_tenant(&self, tenant: &Tenant) -> Result<()>;
    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>>;
    async fn get_tenant_by_api_key(&self, api_key: &str) -> Result<Option<Tenant>>;
    async fn list_tenants(&self, limit: u32, offset: u32) -> Result<(Vec<Tenant>, u32)>;
    async fn update_tenant(&self, tenant: &Tenant) -> Result<()>;
    async fn delete_tenant(&self, id: Uuid) -> Result<bool>;
    async fn update_tenant_api_key(&self, id: Uuid, api_key: &str) -> Result<()>;
    /// Add the delta onto the stored usage counters.
    async fn increment_tenant_usage(&self, id: Uuid, delta: &TenantUsage) -> Result<()>;
}

/// CRUD and dedupe lookups for documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, doc: &Document) -> Result<()>;
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>>;
    async fn get_document_by_hash(
        &self,
        tenant_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Document>>;
    async fn list_documents(
        &self,
        tenant_id: Uuid,
        status: Option<DocumentStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Document>, u32)>;
    async fn update_document(&self, doc: &Document) -> Result<()>;
    /// Transition a document's status. Terminal rows (READY, FAILED) are
    /// left untouched; returns whether a row changed.
    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool>;
    /// Mark READY with the final chunk count. Same terminal guard.
    async fn mark_document_ready(&self, id: Uuid, chunk_count: i64) -> Result<bool>;
    async fn set_document_title_and_hash(
        &self,
        id: Uuid,
        title: &str,
        content_hash: &str,
    ) -> Result<()>;
    async fn delete_document(&self, id: Uuid) -> Result<bool>;
}

/// Batch persistence and paginated reads for document chunks.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn create_chunks(&self, chunks: &[DocumentChunk]) -> Result<()>;
    async fn get_chunks(
        &self,
        document_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<DocumentChunk>>;
    async fn count_chunks(&self, document_id: Uuid) -> Result<i64>;
    async fn delete_chunks(&self, document_id: Uuid) -> Result<()>;
}

/// Persistence for crawl jobs and their pages. The crawler producing these
/// rows runs outside this crate.
#[async_trait]
pub trait CrawlJobStore: Send + Sync {
    async fn create_crawl_job(&self, job: &CrawlJob) -> Result<()>;
    async fn get_crawl_job(&self, id: Uuid) -> Result<Option<CrawlJob>>;
    async fn list_crawl_jobs(
        &self,
        tenant_id: Uuid,
        status: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<CrawlJob>, u32)>;
    async fn update_crawl_job(&self, job: &CrawlJob) -> Result<()>;
    async fn create_crawled_page(&self, page: &CrawledPage) -> Result<()>;
    async fn update_crawled_page(&self, page: &CrawledPage) -> Result<()>;
    async fn get_crawled_pages(
        &self,
        job_id: Uuid,
        status: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<CrawledPage>, u32)>;
}

/// Everything the services need from the metadata store.
pub trait MetadataBackend: TenantStore + DocumentStore + ChunkStore + CrawlJobStore {}

impl<T: TenantStore + DocumentStore + ChunkStore + CrawlJobStore> MetadataBackend for T {}
