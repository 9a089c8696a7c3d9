mod documents;
mod rag;
mod tenants;

pub use documents::DocumentService;
pub use rag::RagService;
pub use tenants::TenantService;

use crate::error::{GranaryError, Result};

/// System prompt applied when a tenant config carries an empty one.
pub(crate) const DEFAULT_SYSTEM_PROMPT: &str = "You are a concise knowledge assistant. Answer questions using ONLY the provided documents.

IMPORTANT: Be brief and direct. Most answers should be 2-5 sentences.

Rules:
- Give the direct answer first, then brief supporting details only if needed
- Do NOT include step-by-step instructions unless specifically asked
- Do NOT include code examples unless specifically asked for code
- If the documents don't cover the topic, say \"The documents don't cover this.\"
- Never invent information not in the provided documents";

pub(crate) fn clamp_page_size(page_size: u32) -> u32 {
    if page_size == 0 {
        20
    } else {
        page_size.min(100)
    }
}

/// Page tokens are numeric offsets issued by earlier list calls.
pub(crate) fn parse_page_token(token: &str) -> Result<u32> {
    if token.is_empty() {
        return Ok(0);
    }
    token
        .parse()
        .map_err(|_| GranaryError::InvalidArgument("invalid page token".to_string()))
}

pub(crate) fn parse_tenant_id(raw: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw)
        .map_err(|_| GranaryError::InvalidArgument("invalid tenant_id format".to_string()))
}
