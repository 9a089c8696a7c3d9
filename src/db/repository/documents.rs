use chrono::Utc;
use libsql::{params, Connection};
use uuid::Uuid;

use super::tenants::{parse_timestamp, parse_uuid};
use crate::error::Result;
use crate::models::{Document, DocumentStatus};

pub struct DocumentRepository;

impl DocumentRepository {
    pub async fn create(conn: &Connection, doc: &Document) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO documents (
                id, tenant_id, source, title, content_hash, chunk_count,
                status, error_message, metadata, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                doc.id.to_string(),
                doc.tenant_id.to_string(),
                doc.source.clone(),
                doc.title.clone(),
                doc.content_hash.clone(),
                doc.chunk_count,
                doc.status.to_string(),
                doc.error_message.clone(),
                serde_json::to_string(&doc.metadata)?,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: Uuid) -> Result<Option<Document>> {
        let mut rows = conn
            .query(
                "SELECT * FROM documents WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_document(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_by_hash(
        conn: &Connection,
        tenant_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Document>> {
        let mut rows = conn
            .query(
                "SELECT * FROM documents WHERE tenant_id = ?1 AND content_hash = ?2",
                params![tenant_id.to_string(), content_hash],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_document(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list(
        conn: &Connection,
        tenant_id: Uuid,
        status: Option<DocumentStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Document>, u32)> {
        let (count_sql, list_sql, status_param) = match status {
            Some(status) => (
                "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1 AND status = ?2",
                "SELECT * FROM documents WHERE tenant_id = ?1 AND status = ?2 \
                 ORDER BY created_at DESC LIMIT ?3 OFFSET ?4",
                Some(status.to_string()),
            ),
            None => (
                "SELECT COUNT(*) FROM documents WHERE tenant_id = ?1",
                "SELECT * FROM documents WHERE tenant_id = ?1 \
                 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3",
                None,
            ),
        };

        let total: i64 = match &status_param {
            Some(status) => {
                let mut rows = conn
                    .query(count_sql, params![tenant_id.to_string(), status.clone()])
                    .await?;
                match rows.next().await? {
                    Some(row) => row.get(0)?,
                    None => 0,
                }
            }
            None => {
                let mut rows = conn
                    .query(count_sql, params![tenant_id.to_string()])
                    .await?;
                match rows.next().await? {
                    Some(row) => row.get(0)?,
                    None => 0,
                }
            }
        };

        let mut rows = match &status_param {
            Some(status) => {
                conn.query(
                    list_sql,
                    params![
                        tenant_id.to_string(),
                        status.clone(),
                        limit as i64,
                        offset as i64
                    ],
                )
                .await?
            }
            None => {
                conn.query(
                    list_sql,
                    params![tenant_id.to_string(), limit as i64, offset as i64],
                )
                .await?
            }
        };

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::row_to_document(&row)?);
        }

        Ok((documents, total as u32))
    }

    pub async fn update(conn: &Connection, doc: &Document) -> Result<()> {
        conn.execute(
            r#"
            UPDATE documents SET
                source = ?2,
                title = ?3,
                content_hash = ?4,
                chunk_count = ?5,
                status = ?6,
                error_message = ?7,
                metadata = ?8,
                updated_at = ?9
            WHERE id = ?1
            "#,
            params![
                doc.id.to_string(),
                doc.source.clone(),
                doc.title.clone(),
                doc.content_hash.clone(),
                doc.chunk_count,
                doc.status.to_string(),
                doc.error_message.clone(),
                serde_json::to_string(&doc.metadata)?,
                doc.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    // Terminal rows stay terminal: the WHERE clause refuses to move a
    // document out of READY or FAILED.
    pub async fn update_status(
        conn: &Connection,
        id: Uuid,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let rows_affected = conn
            .execute(
                r#"
                UPDATE documents
                SET status = ?2, error_message = ?3, updated_at = ?4
                WHERE id = ?1 AND status NOT IN ('READY', 'FAILED')
                "#,
                params![
                    id.to_string(),
                    status.to_string(),
                    error_message,
                    Utc::now().to_rfc3339()
                ],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    pub async fn mark_ready(conn: &Connection, id: Uuid, chunk_count: i64) -> Result<bool> {
        let rows_affected = conn
            .execute(
                r#"
                UPDATE documents
                SET status = 'READY', chunk_count = ?2, error_message = NULL, updated_at = ?3
                WHERE id = ?1 AND status NOT IN ('READY', 'FAILED')
                "#,
                params![id.to_string(), chunk_count, Utc::now().to_rfc3339()],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    pub async fn set_title_and_hash(
        conn: &Connection,
        id: Uuid,
        title: &str,
        content_hash: &str,
    ) -> Result<()> {
        conn.execute(
            "UPDATE documents SET title = ?2, content_hash = ?3, updated_at = ?4 WHERE id = ?1",
            params![id.to_string(), title, content_hash, Utc::now().to_rfc3339()],
        )
        .await?;

        Ok(())
    }

    pub async fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
        let rows_affected = conn
            .execute(
                "DELETE FROM documents WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    fn row_to_document(row: &libsql::Row) -> Result<Document> {
        Ok(Document {
            id: parse_uuid(&row.get::<String>(0)?),
            tenant_id: parse_uuid(&row.get::<String>(1)?),
            source: row.get(2)?,
            title: row.get(3)?,
            content_hash: row.get(4)?,
            chunk_count: row.get(5)?,
            status: row
                .get::<String>(6)?
                .parse()
                .unwrap_or(DocumentStatus::Failed),
            error_message: row.get(7)?,
            metadata: serde_json::from_str(&row.get::<String>(8)?).unwrap_or_default(),
            created_at: parse_timestamp(&row.get::<String>(9)?),
            updated_at: parse_timestamp(&row.get::<String>(10)?),
        })
    }
}
