//! Multi-tenant retrieval-augmented generation core.
//!
//! Each tenant owns an isolated document corpus in the metadata store, a
//! dedicated vector collection, and a configuration bundle. Documents flow
//! through the ingestion pipeline (hash, dedupe, chunk, embed, upsert) and
//! queries flow through the retrieval pipeline (embed, search, dedupe,
//! rerank, prompt, generate). The HTTP/gRPC transport, auth middleware, and
//! crawler live outside this crate; it exposes the service layer they wrap.

pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod ingestion;
pub mod llm;
pub mod memory;
pub mod models;
pub mod reranker;
pub mod services;
pub mod vectorstore;

pub use error::{ErrorKind, GranaryError, Result};
