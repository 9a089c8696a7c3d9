use chrono::{DateTime, Utc};
use libsql::{params, Connection};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Tenant, TenantUsage};

pub struct TenantRepository;

impl TenantRepository {
    pub async fn create(conn: &Connection, tenant: &Tenant) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO tenants (id, name, api_key, config, usage, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                tenant.id.to_string(),
                tenant.name.clone(),
                tenant.api_key.clone(),
                serde_json::to_string(&tenant.config)?,
                serde_json::to_string(&tenant.usage)?,
                tenant.created_at.to_rfc3339(),
                tenant.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn get_by_id(conn: &Connection, id: Uuid) -> Result<Option<Tenant>> {
        let mut rows = conn
            .query(
                "SELECT * FROM tenants WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_tenant(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_by_api_key(conn: &Connection, api_key: &str) -> Result<Option<Tenant>> {
        let mut rows = conn
            .query("SELECT * FROM tenants WHERE api_key = ?1", params![api_key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_tenant(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list(conn: &Connection, limit: u32, offset: u32) -> Result<(Vec<Tenant>, u32)> {
        let mut count_rows = conn.query("SELECT COUNT(*) FROM tenants", ()).await?;
        let total: i64 = if let Some(row) = count_rows.next().await? {
            row.get(0)?
        } else {
            0
        };

        let mut rows = conn
            .query(
                "SELECT * FROM tenants ORDER BY created_at ASC LIMIT ?1 OFFSET ?2",
                params![limit as i64, offset as i64],
            )
            .await?;

        let mut tenants = Vec::new();
        while let Some(row) = rows.next().await? {
            tenants.push(Self::row_to_tenant(&row)?);
        }

        Ok((tenants, total as u32))
    }

    pub async fn update(conn: &Connection, tenant: &Tenant) -> Result<()> {
        conn.execute(
            r#"
            UPDATE tenants
            SET name = ?2, config = ?3, usage = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                tenant.id.to_string(),
                tenant.name.clone(),
                serde_json::to_string(&tenant.config)?,
                serde_json::to_string(&tenant.usage)?,
                tenant.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    pub async fn delete(conn: &Connection, id: Uuid) -> Result<bool> {
        let rows_affected = conn
            .execute(
                "DELETE FROM tenants WHERE id = ?1",
                params![id.to_string()],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    pub async fn update_api_key(conn: &Connection, id: Uuid, api_key: &str) -> Result<()> {
        conn.execute(
            "UPDATE tenants SET api_key = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), api_key, Utc::now().to_rfc3339()],
        )
        .await?;

        Ok(())
    }

    pub async fn increment_usage(conn: &Connection, id: Uuid, delta: &TenantUsage) -> Result<()> {
        let Some(tenant) = Self::get_by_id(conn, id).await? else {
            return Ok(());
        };

        let usage = TenantUsage {
            document_count: tenant.usage.document_count + delta.document_count,
            chunk_count: tenant.usage.chunk_count + delta.chunk_count,
            query_count_month: tenant.usage.query_count_month + delta.query_count_month,
        };

        conn.execute(
            "UPDATE tenants SET usage = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(&usage)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    fn row_to_tenant(row: &libsql::Row) -> Result<Tenant> {
        Ok(Tenant {
            id: parse_uuid(&row.get::<String>(0)?),
            name: row.get(1)?,
            api_key: row.get(2)?,
            config: serde_json::from_str(&row.get::<String>(3)?)?,
            usage: serde_json::from_str(&row.get::<String>(4)?).unwrap_or_default(),
            created_at: parse_timestamp(&row.get::<String>(5)?),
            updated_at: parse_timestamp(&row.get::<String>(6)?),
        })
    }
}

pub(crate) fn parse_uuid(raw: &str) -> Uuid {
    Uuid::parse_str(raw).unwrap_or_else(|_| Uuid::nil())
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkerConfig, TenantConfig};

    async fn setup_test_db() -> Connection {
        let db = crate::db::Database::new(&crate::config::DatabaseConfig {
            url: ":memory:".to_string(),
            auth_token: None,
        })
        .await
        .unwrap();
        db.connect().await.unwrap()
    }

    fn make_tenant(name: &str) -> Tenant {
        let now = Utc::now();
        Tenant {
            id: Uuid::new_v4(),
            name: name.to_string(),
            api_key: format!("rag_{}", Uuid::new_v4().simple()),
            config: TenantConfig {
                embedding_model: "nomic-embed-text".to_string(),
                llm_model: "llama3.2".to_string(),
                chunker: ChunkerConfig::default(),
                top_k: 4,
                min_score: 0.35,
                system_prompt: String::new(),
                reranker_enabled: false,
            },
            usage: TenantUsage::default(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let conn = setup_test_db().await;
        let tenant = make_tenant("acme");
        TenantRepository::create(&conn, &tenant).await.unwrap();

        let loaded = TenantRepository::get_by_id(&conn, tenant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.name, "acme");
        assert_eq!(loaded.config.embedding_model, "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_get_by_api_key() {
        let conn = setup_test_db().await;
        let tenant = make_tenant("acme");
        TenantRepository::create(&conn, &tenant).await.unwrap();

        let loaded = TenantRepository::get_by_api_key(&conn, &tenant.api_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.id, tenant.id);

        let missing = TenantRepository::get_by_api_key(&conn, "rag_nope")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_api_key_unique() {
        let conn = setup_test_db().await;
        let tenant = make_tenant("a");
        TenantRepository::create(&conn, &tenant).await.unwrap();

        let mut clone = make_tenant("b");
        clone.api_key = tenant.api_key.clone();
        assert!(TenantRepository::create(&conn, &clone).await.is_err());
    }

    #[tokio::test]
    async fn test_increment_usage() {
        let conn = setup_test_db().await;
        let tenant = make_tenant("acme");
        TenantRepository::create(&conn, &tenant).await.unwrap();

        let delta = TenantUsage {
            document_count: 1,
            chunk_count: 7,
            query_count_month: 0,
        };
        TenantRepository::increment_usage(&conn, tenant.id, &delta)
            .await
            .unwrap();
        TenantRepository::increment_usage(&conn, tenant.id, &delta)
            .await
            .unwrap();

        let loaded = TenantRepository::get_by_id(&conn, tenant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.usage.document_count, 2);
        assert_eq!(loaded.usage.chunk_count, 14);
    }

    #[tokio::test]
    async fn test_list_pagination() {
        let conn = setup_test_db().await;
        for i in 0..5 {
            TenantRepository::create(&conn, &make_tenant(&format!("t{i}")))
                .await
                .unwrap();
        }

        let (page, total) = TenantRepository::list(&conn, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 5);

        let (rest, _) = TenantRepository::list(&conn, 10, 4).await.unwrap();
        assert_eq!(rest.len(), 1);
    }
}
