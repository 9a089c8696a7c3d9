use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A web crawling job. The crawler itself runs outside this crate; the
/// core only persists and reads these rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_type: String,
    pub status: String,
    pub root_url: String,
    pub config: SpiderConfig,
    pub pages_crawled: i64,
    pub pages_total: i64,
    pub pages_failed: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpiderConfig {
    pub max_depth: i64,
    pub max_pages: i64,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub use_headless: bool,
    #[serde(rename = "respect_robots_txt")]
    pub respect_robots: bool,
    pub delay_ms: i64,
    pub timeout_seconds: i64,
    pub user_agent: String,
    pub follow_redirects: bool,
    pub max_redirects: i64,
}

/// One page visited by a crawl job. `(job_id, url)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawledPage {
    pub id: Uuid,
    pub job_id: Uuid,
    pub url: String,
    pub title: String,
    pub status: String,
    pub error_message: Option<String>,
    pub document_id: Option<Uuid>,
    pub content_length: i64,
    pub depth: i64,
    pub crawled_at: Option<DateTime<Utc>>,
}
