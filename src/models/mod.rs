mod chunk;
mod crawl;
mod document;
mod query;
mod tenant;

pub use chunk::DocumentChunk;
pub use crawl::{CrawlJob, CrawledPage, SpiderConfig};
pub use document::{Document, DocumentStatus, IngestOutcome};
pub use query::{
    QueryMetadata, QueryOptions, QueryRequest, QueryResponse, QueryStreamEvent, RetrieveMetadata,
    RetrieveResponse, RetrievedChunk, StreamError,
};
pub use tenant::{
    ChunkMethod, ChunkerConfig, Tenant, TenantConfig, TenantConfigPatch, TenantUsage,
};
