use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use crate::config::Config;
use crate::db::MetadataBackend;
use crate::embeddings::ModelConfig;
use crate::error::{GranaryError, Result};
use crate::models::{ChunkerConfig, Tenant, TenantConfig, TenantConfigPatch, TenantUsage};
use crate::vectorstore::VectorStore;

use super::{clamp_page_size, parse_page_token, parse_tenant_id, DEFAULT_SYSTEM_PROMPT};

/// Administers the tenant lifecycle: creation with resolved defaults and
/// model-aware chunk limits, credential rotation, config updates, and
/// cross-store deletion.
pub struct TenantService {
    db: Arc<dyn MetadataBackend>,
    vectors: Arc<dyn VectorStore>,
    config: Config,
}

impl TenantService {
    pub fn new(db: Arc<dyn MetadataBackend>, vectors: Arc<dyn VectorStore>, config: Config) -> Self {
        Self {
            db,
            vectors,
            config,
        }
    }

    /// Create a tenant. A caller-supplied id makes the operation
    /// reproducible; the vector collection is created best-effort and can
    /// be recreated lazily if the engine is down.
    pub async fn create(
        &self,
        name: &str,
        id: Option<&str>,
        patch: Option<&TenantConfigPatch>,
    ) -> Result<Tenant> {
        if name.is_empty() {
            return Err(GranaryError::InvalidArgument("name is required".to_string()));
        }

        let tenant_id = match id {
            Some(raw) => Uuid::parse_str(raw).map_err(|e| {
                GranaryError::InvalidArgument(format!("invalid tenant ID format: {e}"))
            })?,
            None => Uuid::new_v4(),
        };

        let config = self.build_tenant_config(patch);
        config.validate()?;

        let api_key = generate_api_key();
        let now = Utc::now();
        let tenant = Tenant {
            id: tenant_id,
            name: name.to_string(),
            api_key,
            config,
            usage: TenantUsage::default(),
            created_at: now,
            updated_at: now,
        };

        self.db.create_tenant(&tenant).await?;

        let dimension = ModelConfig::for_model(&tenant.config.embedding_model).dimension;
        if let Err(e) = self
            .vectors
            .create_collection(&tenant.id.to_string(), dimension)
            .await
        {
            tracing::warn!(
                tenant_id = %tenant.id,
                error = %e,
                "failed to create vector collection; it will be created lazily"
            );
        }

        Ok(tenant)
    }

    pub async fn get(&self, id: &str) -> Result<Tenant> {
        let tenant_id = parse_tenant_id(id)?;
        self.db
            .get_tenant(tenant_id)
            .await?
            .ok_or_else(|| GranaryError::NotFound("tenant not found".to_string()))
    }

    pub async fn get_by_api_key(&self, api_key: &str) -> Result<Tenant> {
        if api_key.is_empty() {
            return Err(GranaryError::InvalidArgument(
                "api_key is required".to_string(),
            ));
        }
        self.db
            .get_tenant_by_api_key(api_key)
            .await?
            .ok_or_else(|| GranaryError::NotFound("tenant not found".to_string()))
    }

    /// Paginated listing; the returned token, when present, fetches the
    /// next page.
    pub async fn list(
        &self,
        page_size: u32,
        page_token: &str,
    ) -> Result<(Vec<Tenant>, Option<String>)> {
        let limit = clamp_page_size(page_size);
        let offset = parse_page_token(page_token)?;

        let (tenants, total) = self.db.list_tenants(limit, offset).await?;

        let next_token = if offset + (tenants.len() as u32) < total {
            Some((offset + tenants.len() as u32).to_string())
        } else {
            None
        };

        Ok((tenants, next_token))
    }

    pub async fn update(
        &self,
        id: &str,
        name: Option<&str>,
        patch: Option<&TenantConfigPatch>,
    ) -> Result<Tenant> {
        let mut tenant = self.get(id).await?;

        if let Some(name) = name {
            if !name.is_empty() {
                tenant.name = name.to_string();
            }
        }

        if let Some(patch) = patch {
            let mut config = tenant.config.clone();
            config.merge(patch);
            config.validate()?;
            tenant.config = config;
        }

        tenant.updated_at = Utc::now();
        self.db.update_tenant(&tenant).await?;

        Ok(tenant)
    }

    /// Delete a tenant and everything it owns. The vector collection goes
    /// first, best-effort; the metadata delete cascades to documents and
    /// chunks.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let tenant_id = parse_tenant_id(id)?;

        if let Err(e) = self.vectors.delete_collection(&tenant_id.to_string()).await {
            tracing::warn!(
                tenant_id = %tenant_id,
                error = %e,
                "failed to delete vector collection; continuing with tenant deletion"
            );
        }

        if !self.db.delete_tenant(tenant_id).await? {
            return Err(GranaryError::NotFound("tenant not found".to_string()));
        }

        Ok(())
    }

    pub async fn regenerate_api_key(&self, id: &str) -> Result<String> {
        let tenant = self.get(id).await?;

        let api_key = generate_api_key();
        self.db
            .update_tenant_api_key(tenant.id, &api_key)
            .await?;

        Ok(api_key)
    }

    // Resolve the creation-time config: global defaults, chunk limits from
    // the embedding model's context window, then the caller's overrides.
    fn build_tenant_config(&self, patch: Option<&TenantConfigPatch>) -> TenantConfig {
        let embedding_model = patch
            .and_then(|p| p.embedding_model.clone())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.config.ollama.embedding_model.clone());

        let model_config = ModelConfig::for_model(&embedding_model);

        let mut config = TenantConfig {
            embedding_model,
            llm_model: self.config.ollama.llm_model.clone(),
            chunker: ChunkerConfig {
                method: self.config.chunking.method,
                target_size: model_config.target_chunk_words,
                max_size: model_config.max_chunk_words,
                overlap: self.config.chunking.overlap,
            },
            top_k: self.config.retrieval.top_k,
            min_score: self.config.retrieval.min_score,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            reranker_enabled: false,
        };

        if let Some(patch) = patch {
            config.merge(patch);
        }

        config
    }
}

/// `"rag_"` + 32 hex chars of CSPRNG output.
fn generate_api_key() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);

    let mut key = String::with_capacity(36);
    key.push_str("rag_");
    for byte in bytes {
        key.push_str(&format!("{byte:02x}"));
    }
    key
}
