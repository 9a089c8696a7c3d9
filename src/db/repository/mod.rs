mod chunks;
mod crawl_jobs;
mod documents;
mod tenants;

pub use chunks::ChunkRepository;
pub use crawl_jobs::CrawlJobRepository;
pub use documents::DocumentRepository;
pub use tenants::TenantRepository;
