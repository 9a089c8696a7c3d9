use libsql::{params, Connection};
use uuid::Uuid;

use super::tenants::{parse_timestamp, parse_uuid};
use crate::error::Result;
use crate::models::{CrawlJob, CrawledPage};

pub struct CrawlJobRepository;

impl CrawlJobRepository {
    pub async fn create(conn: &Connection, job: &CrawlJob) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO crawl_jobs (
                id, tenant_id, job_type, status, root_url, config,
                pages_crawled, pages_total, pages_failed, error_message,
                created_at, started_at, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                job.id.to_string(),
                job.tenant_id.to_string(),
                job.job_type.clone(),
                job.status.clone(),
                job.root_url.clone(),
                serde_json::to_string(&job.config)?,
                job.pages_crawled,
                job.pages_total,
                job.pages_failed,
                job.error_message.clone(),
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: Uuid) -> Result<Option<CrawlJob>> {
        let mut rows = conn
            .query(
                "SELECT * FROM crawl_jobs WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_job(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list(
        conn: &Connection,
        tenant_id: Uuid,
        status: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<CrawlJob>, u32)> {
        let (total, mut rows) = match status {
            Some(status) => {
                let mut count_rows = conn
                    .query(
                        "SELECT COUNT(*) FROM crawl_jobs WHERE tenant_id = ?1 AND status = ?2",
                        params![tenant_id.to_string(), status],
                    )
                    .await?;
                let total: i64 = match count_rows.next().await? {
                    Some(row) => row.get(0)?,
                    None => 0,
                };
                let rows = conn
                    .query(
                        "SELECT * FROM crawl_jobs WHERE tenant_id = ?1 AND status = ?2 \
                         ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                        params![tenant_id.to_string(), status, limit as i64, offset as i64],
                    )
                    .await?;
                (total, rows)
            }
            None => {
                let mut count_rows = conn
                    .query(
                        "SELECT COUNT(*) FROM crawl_jobs WHERE tenant_id = ?1",
                        params![tenant_id.to_string()],
                    )
                    .await?;
                let total: i64 = match count_rows.next().await? {
                    Some(row) => row.get(0)?,
                    None => 0,
                };
                let rows = conn
                    .query(
                        "SELECT * FROM crawl_jobs WHERE tenant_id = ?1 \
                         ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                        params![tenant_id.to_string(), limit as i64, offset as i64],
                    )
                    .await?;
                (total, rows)
            }
        };

        let mut jobs = Vec::new();
        while let Some(row) = rows.next().await? {
            jobs.push(Self::row_to_job(&row)?);
        }

        Ok((jobs, total as u32))
    }

    pub async fn update(conn: &Connection, job: &CrawlJob) -> Result<()> {
        conn.execute(
            r#"
            UPDATE crawl_jobs SET
                status = ?2, pages_crawled = ?3, pages_total = ?4, pages_failed = ?5,
                error_message = ?6, started_at = ?7, completed_at = ?8
            WHERE id = ?1
            "#,
            params![
                job.id.to_string(),
                job.status.clone(),
                job.pages_crawled,
                job.pages_total,
                job.pages_failed,
                job.error_message.clone(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn create_page(conn: &Connection, page: &CrawledPage) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO crawled_pages (
                id, job_id, url, title, status, error_message,
                document_id, content_length, depth, crawled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                page.id.to_string(),
                page.job_id.to_string(),
                page.url.clone(),
                page.title.clone(),
                page.status.clone(),
                page.error_message.clone(),
                page.document_id.map(|id| id.to_string()),
                page.content_length,
                page.depth,
                page.crawled_at.map(|t| t.to_rfc3339()),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn update_page(conn: &Connection, page: &CrawledPage) -> Result<()> {
        conn.execute(
            r#"
            UPDATE crawled_pages SET
                title = ?2, status = ?3, error_message = ?4, document_id = ?5,
                content_length = ?6, crawled_at = ?7
            WHERE id = ?1
            "#,
            params![
                page.id.to_string(),
                page.title.clone(),
                page.status.clone(),
                page.error_message.clone(),
                page.document_id.map(|id| id.to_string()),
                page.content_length,
                page.crawled_at.map(|t| t.to_rfc3339()),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_pages(
        conn: &Connection,
        job_id: Uuid,
        status: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<CrawledPage>, u32)> {
        let (total, mut rows) = match status {
            Some(status) => {
                let mut count_rows = conn
                    .query(
                        "SELECT COUNT(*) FROM crawled_pages WHERE job_id = ?1 AND status = ?2",
                        params![job_id.to_string(), status],
                    )
                    .await?;
                let total: i64 = match count_rows.next().await? {
                    Some(row) => row.get(0)?,
                    None => 0,
                };
                let rows = conn
                    .query(
                        "SELECT * FROM crawled_pages WHERE job_id = ?1 AND status = ?2 \
                         ORDER BY depth ASC, url ASC LIMIT ?3 OFFSET ?4",
                        params![job_id.to_string(), status, limit as i64, offset as i64],
                    )
                    .await?;
                (total, rows)
            }
            None => {
                let mut count_rows = conn
                    .query(
                        "SELECT COUNT(*) FROM crawled_pages WHERE job_id = ?1",
                        params![job_id.to_string()],
                    )
                    .await?;
                let total: i64 = match count_rows.next().await? {
                    Some(row) => row.get(0)?,
                    None => 0,
                };
                let rows = conn
                    .query(
                        "SELECT * FROM crawled_pages WHERE job_id = ?1 \
                         ORDER BY depth ASC, url ASC LIMIT ?2 OFFSET ?3",
                        params![job_id.to_string(), limit as i64, offset as i64],
                    )
                    .await?;
                (total, rows)
            }
        };

        let mut pages = Vec::new();
        while let Some(row) = rows.next().await? {
            pages.push(Self::row_to_page(&row)?);
        }

        Ok((pages, total as u32))
    }

    fn row_to_job(row: &libsql::Row) -> Result<CrawlJob> {
        Ok(CrawlJob {
            id: parse_uuid(&row.get::<String>(0)?),
            tenant_id: parse_uuid(&row.get::<String>(1)?),
            job_type: row.get(2)?,
            status: row.get(3)?,
            root_url: row.get(4)?,
            config: serde_json::from_str(&row.get::<String>(5)?).unwrap_or_default(),
            pages_crawled: row.get(6)?,
            pages_total: row.get(7)?,
            pages_failed: row.get(8)?,
            error_message: row.get(9)?,
            created_at: parse_timestamp(&row.get::<String>(10)?),
            started_at: row.get::<Option<String>>(11)?.map(|t| parse_timestamp(&t)),
            completed_at: row.get::<Option<String>>(12)?.map(|t| parse_timestamp(&t)),
        })
    }

    fn row_to_page(row: &libsql::Row) -> Result<CrawledPage> {
        Ok(CrawledPage {
            id: parse_uuid(&row.get::<String>(0)?),
            job_id: parse_uuid(&row.get::<String>(1)?),
            url: row.get(2)?,
            title: row.get(3)?,
            status: row.get(4)?,
            error_message: row.get(5)?,
            document_id: row.get::<Option<String>>(6)?.map(|id| parse_uuid(&id)),
            content_length: row.get(7)?,
            depth: row.get(8)?,
            crawled_at: row.get::<Option<String>>(9)?.map(|t| parse_timestamp(&t)),
        })
    }
}
