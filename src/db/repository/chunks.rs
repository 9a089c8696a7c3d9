use libsql::{params, Connection};
use uuid::Uuid;

use super::tenants::{parse_timestamp, parse_uuid};
use crate::error::Result;
use crate::models::DocumentChunk;

pub struct ChunkRepository;

impl ChunkRepository {
    pub async fn create_batch(conn: &Connection, chunks: &[DocumentChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let tx = conn.transaction().await?;
        for chunk in chunks {
            tx.execute(
                r#"
                INSERT INTO document_chunks (id, document_id, chunk_index, content, metadata, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    chunk.id.to_string(),
                    chunk.document_id.to_string(),
                    chunk.chunk_index,
                    chunk.content.clone(),
                    serde_json::to_string(&chunk.metadata)?,
                    chunk.created_at.to_rfc3339(),
                ],
            )
            .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn get_for_document(
        conn: &Connection,
        document_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<DocumentChunk>> {
        let mut rows = conn
            .query(
                r#"
                SELECT * FROM document_chunks
                WHERE document_id = ?1
                ORDER BY chunk_index ASC
                LIMIT ?2 OFFSET ?3
                "#,
                params![document_id.to_string(), limit as i64, offset as i64],
            )
            .await?;

        let mut chunks = Vec::new();
        while let Some(row) = rows.next().await? {
            chunks.push(Self::row_to_chunk(&row)?);
        }

        Ok(chunks)
    }

    pub async fn count_for_document(conn: &Connection, document_id: Uuid) -> Result<i64> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM document_chunks WHERE document_id = ?1",
                params![document_id.to_string()],
            )
            .await?;

        Ok(match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        })
    }

    pub async fn delete_for_document(conn: &Connection, document_id: Uuid) -> Result<()> {
        conn.execute(
            "DELETE FROM document_chunks WHERE document_id = ?1",
            params![document_id.to_string()],
        )
        .await?;

        Ok(())
    }

    fn row_to_chunk(row: &libsql::Row) -> Result<DocumentChunk> {
        Ok(DocumentChunk {
            id: parse_uuid(&row.get::<String>(0)?),
            document_id: parse_uuid(&row.get::<String>(1)?),
            chunk_index: row.get(2)?,
            content: row.get(3)?,
            metadata: serde_json::from_str(&row.get::<String>(4)?).unwrap_or_default(),
            created_at: parse_timestamp(&row.get::<String>(5)?),
        })
    }
}
