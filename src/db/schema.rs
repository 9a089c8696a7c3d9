use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Tenants: isolation boundary, config + usage stored as JSON blobs
        CREATE TABLE IF NOT EXISTS tenants (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            api_key TEXT NOT NULL UNIQUE,
            config TEXT NOT NULL DEFAULT '{}',
            usage TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tenants_api_key ON tenants(api_key);

        -- Documents: one row per ingested source
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            source TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            content_hash TEXT NOT NULL DEFAULT '',
            chunk_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'PENDING',
            error_message TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE
        );

        -- Partial: URL ingests sit at content_hash = '' until fetched, and
        -- several may be in flight for one tenant at once.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_tenant_hash
            ON documents(tenant_id, content_hash) WHERE content_hash != '';
        CREATE INDEX IF NOT EXISTS idx_documents_tenant_status
            ON documents(tenant_id, status);

        -- Document chunks: dense 0-based chunk_index within a document
        CREATE TABLE IF NOT EXISTS document_chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_document_chunks_document_id
            ON document_chunks(document_id);

        -- Crawl jobs and pages: written by the external crawler, opaque here
        CREATE TABLE IF NOT EXISTS crawl_jobs (
            id TEXT PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_type TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            root_url TEXT NOT NULL DEFAULT '',
            config TEXT NOT NULL DEFAULT '{}',
            pages_crawled INTEGER NOT NULL DEFAULT 0,
            pages_total INTEGER NOT NULL DEFAULT 0,
            pages_failed INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            FOREIGN KEY (tenant_id) REFERENCES tenants(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS crawled_pages (
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            url TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT '',
            error_message TEXT,
            document_id TEXT,
            content_length INTEGER NOT NULL DEFAULT 0,
            depth INTEGER NOT NULL DEFAULT 0,
            crawled_at TEXT,
            FOREIGN KEY (job_id) REFERENCES crawl_jobs(id) ON DELETE CASCADE
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_crawled_pages_job_url
            ON crawled_pages(job_id, url);
        "#,
    )
    .await?;

    // updated_at maintenance. Issued separately: batch execution splits on
    // statement boundaries that trigger bodies would confuse.
    conn.execute(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_tenants_updated_at
        AFTER UPDATE ON tenants
        FOR EACH ROW
        WHEN NEW.updated_at = OLD.updated_at
        BEGIN
            UPDATE tenants
            SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = NEW.id;
        END
        "#,
        (),
    )
    .await?;

    conn.execute(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_documents_updated_at
        AFTER UPDATE ON documents
        FOR EACH ROW
        WHEN NEW.updated_at = OLD.updated_at
        BEGIN
            UPDATE documents
            SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = NEW.id;
        END
        "#,
        (),
    )
    .await?;

    Ok(())
}
