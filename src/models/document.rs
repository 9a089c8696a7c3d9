use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GranaryError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub source: String,
    pub title: String,
    pub content_hash: String,
    pub chunk_count: i64,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub metadata: HashMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of an ingested document.
///
/// ```text
/// PENDING ──fetch ok──▶ PROCESSING ──chunks+vectors stored──▶ READY
///    │                      │
///    └──fetch fail──▶ FAILED ◀──any step err
/// ```
///
/// `Ready` and `Failed` are terminal; the store refuses transitions out of
/// them, so only deletion follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Failed)
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DocumentStatus::Pending => "PENDING",
            DocumentStatus::Processing => "PROCESSING",
            DocumentStatus::Ready => "READY",
            DocumentStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = GranaryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(DocumentStatus::Pending),
            "PROCESSING" => Ok(DocumentStatus::Processing),
            "READY" => Ok(DocumentStatus::Ready),
            "FAILED" => Ok(DocumentStatus::Failed),
            other => Err(GranaryError::InvalidArgument(format!(
                "invalid document status: {other}"
            ))),
        }
    }
}

/// Returned by the ingest operations: the (possibly pre-existing) document
/// id and its status at the time of the call.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub document_id: Uuid,
    pub status: DocumentStatus,
}
