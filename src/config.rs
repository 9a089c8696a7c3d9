use serde::Deserialize;
use std::env;

use crate::models::ChunkMethod;

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub qdrant: QdrantConfig,
    pub ollama: OllamaConfig,
    pub chunking: ChunkingDefaults,
    pub retrieval: RetrievalDefaults,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub grpc_port: u16,
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub llm_model: String,
}

/// Tenant-creation-time chunking defaults. Sizes are word counts used as a
/// token proxy; target and max may be tightened per embedding model.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkingDefaults {
    pub method: ChunkMethod,
    pub target_size: usize,
    pub max_size: usize,
    pub overlap: usize,
}

/// Tenant-creation-time retrieval defaults. `min_score` here seeds new
/// tenant configs; the query pipeline applies its own hard default of 0.5
/// when a resolved tenant value is zero.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalDefaults {
    pub top_k: u32,
    pub min_score: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub api_key_secret: String,
    pub session_secret: String,
    pub token_expiry_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                grpc_port: parse_env_or("GRPC_PORT", 9090),
                http_port: parse_env_or("HTTP_PORT", 8080),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or_else(|_| "file:granary.db".to_string()),
                auth_token: env::var("DATABASE_AUTH_TOKEN").ok(),
            },
            qdrant: QdrantConfig {
                url: env::var("QDRANT_URL")
                    .unwrap_or_else(|_| "http://localhost:6334".to_string()),
            },
            ollama: OllamaConfig {
                base_url: env::var("OLLAMA_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                embedding_model: env::var("OLLAMA_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "nomic-embed-text".to_string()),
                llm_model: env::var("OLLAMA_LLM_MODEL")
                    .unwrap_or_else(|_| "llama3.2".to_string()),
            },
            chunking: ChunkingDefaults {
                method: env::var("DEFAULT_CHUNK_METHOD")
                    .ok()
                    .map(ChunkMethod::from)
                    .unwrap_or(ChunkMethod::Semantic),
                target_size: parse_env_or("DEFAULT_CHUNK_TARGET_SIZE", 512),
                max_size: parse_env_or("DEFAULT_CHUNK_MAX_SIZE", 1024),
                overlap: parse_env_or("DEFAULT_CHUNK_OVERLAP", 50),
            },
            retrieval: RetrievalDefaults {
                top_k: parse_env_or("DEFAULT_TOP_K", 4),
                min_score: parse_env_or("DEFAULT_MIN_SCORE", 0.35),
            },
            auth: AuthConfig {
                api_key_secret: env::var("API_KEY_SECRET")
                    .unwrap_or_else(|_| "change-this-in-production".to_string()),
                session_secret: env::var("SESSION_SECRET")
                    .unwrap_or_else(|_| "change-this-in-production".to_string()),
                token_expiry_secs: parse_env_or("TOKEN_EXPIRY_SECS", 86400),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::default()
    }
}
