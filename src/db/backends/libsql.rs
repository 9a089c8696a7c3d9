use async_trait::async_trait;
use uuid::Uuid;

use crate::db::connection::Database;
use crate::db::repository::{
    ChunkRepository, CrawlJobRepository, DocumentRepository, TenantRepository,
};
use crate::db::traits::{ChunkStore, CrawlJobStore, DocumentStore, TenantStore};
use crate::error::Result;
use crate::models::{
    CrawlJob, CrawledPage, Document, DocumentChunk, DocumentStatus, Tenant, TenantUsage,
};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TenantStore for LibSqlBackend {
    async fn create_tenant(&self, tenant: &Tenant) -> Result<()> {
        let conn = self.db.connect().await?;
        TenantRepository::create(&conn, tenant).await
    }
    async fn get_tenant(&self, id: Uuid) -> Result<Option<Tenant>> {
        let conn = self.db.connect().await?;
        TenantRepository::get_by_id(&conn, id).await
    }
    async fn get_tenant_by_api_key(&self, api_key: &str) -> Result<Option<Tenant>> {
        let conn = self.db.connect().await?;
        TenantRepository::get_by_api_key(&conn, api_key).await
    }
    async fn list_tenants(&self, limit: u32, offset: u32) -> Result<(Vec<Tenant>, u32)> {
        let conn = self.db.connect().await?;
        TenantRepository::list(&conn, limit, offset).await
    }
    async fn update_tenant(&self, tenant: &Tenant) -> Result<()> {
        let conn = self.db.connect().await?;
        TenantRepository::update(&conn, tenant).await
    }
    async fn delete_tenant(&self, id: Uuid) -> Result<bool> {
        let conn = self.db.connect().await?;
        TenantRepository::delete(&conn, id).await
    }
    async fn update_tenant_api_key(&self, id: Uuid, api_key: &str) -> Result<()> {
        let conn = self.db.connect().await?;
        TenantRepository::update_api_key(&conn, id, api_key).await
    }
    async fn increment_tenant_usage(&self, id: Uuid, delta: &TenantUsage) -> Result<()> {
        let conn = self.db.connect().await?;
        TenantRepository::increment_usage(&conn, id, delta).await
    }
}

#[async_trait]
impl DocumentStore for LibSqlBackend {
    async fn create_document(&self, doc: &Document) -> Result<()> {
        let conn = self.db.connect().await?;
        DocumentRepository::create(&conn, doc).await
    }
    async fn get_document(&self, id: Uuid) -> Result<Option<Document>> {
        let conn = self.db.connect().await?;
        DocumentRepository::get_by_id(&conn, id).await
    }
    async fn get_document_by_hash(
        &self,
        tenant_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let conn = self.db.connect().await?;
        DocumentRepository::get_by_hash(&conn, tenant_id, content_hash).await
    }
    async fn list_documents(
        &self,
        tenant_id: Uuid,
        status: Option<DocumentStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Document>, u32)> {
        let conn = self.db.connect().await?;
        DocumentRepository::list(&conn, tenant_id, status, limit, offset).await
    }
    async fn update_document(&self, doc: &Document) -> Result<()> {
        let conn = self.db.connect().await?;
        DocumentRepository::update(&conn, doc).await
    }
    async fn update_document_status(
        &self,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let conn = self.db.connect().await?;
        DocumentRepository::update_status(&conn, id, status, error_message).await
    }
    async fn mark_document_ready(&self, id: Uuid, chunk_count: i64) -> Result<bool> {
        let conn = self.db.connect().await?;
        DocumentRepository::mark_ready(&conn, id, chunk_count).await
    }
    async fn set_document_title_and_hash(
        &self,
        id: Uuid,
        title: &str,
        content_hash: &str,
    ) -> Result<()> {
        let conn = self.db.connect().await?;
        DocumentRepository::set_title_and_hash(&conn, id, title, content_hash).await
    }
    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let conn = self.db.connect().await?;
        DocumentRepository::delete(&conn, id).await
    }
}

#[async_trait]
impl ChunkStore for LibSqlBackend {
    async fn create_chunks(&self, chunks: &[DocumentChunk]) -> Result<()> {
        let conn = self.db.connect().await?;
        ChunkRepository::create_batch(&conn, chunks).await
    }
    async fn get_chunks(
        &self,
        document_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<DocumentChunk>> {
        let conn = self.db.connect().await?;
        ChunkRepository::get_for_document(&conn, document_id, limit, offset).await
    }
    async fn count_chunks(&self, document_id: Uuid) -> Result<i64> {
        let conn = self.db.connect().await?;
        ChunkRepository::count_for_document(&conn, document_id).await
    }
    async fn delete_chunks(&self, document_id: Uuid) -> Result<()> {
        let conn = self.db.connect().await?;
        ChunkRepository::delete_for_document(&conn, document_id).await
    }
}

#[async_trait]
impl CrawlJobStore for LibSqlBackend {
    async fn create_crawl_job(&self, job: &CrawlJob) -> Result<()> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::create(&conn, job).await
    }
    async fn get_crawl_job(&self, id: Uuid) -> Result<Option<CrawlJob>> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::get_by_id(&conn, id).await
    }
    async fn list_crawl_jobs(
        &self,
        tenant_id: Uuid,
        status: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<CrawlJob>, u32)> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::list(&conn, tenant_id, status, limit, offset).await
    }
    async fn update_crawl_job(&self, job: &CrawlJob) -> Result<()> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::update(&conn, job).await
    }
    async fn create_crawled_page(&self, page: &CrawledPage) -> Result<()> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::create_page(&conn, page).await
    }
    async fn update_crawled_page(&self, page: &CrawledPage) -> Result<()> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::update_page(&conn, page).await
    }
    async fn get_crawled_pages(
        &self,
        job_id: Uuid,
        status: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<CrawledPage>, u32)> {
        let conn = self.db.connect().await?;
        CrawlJobRepository::get_pages(&conn, job_id, status, limit, offset).await
    }
}
