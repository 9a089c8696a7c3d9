use thiserror::Error;

#[derive(Error, Debug)]
pub enum GranaryError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy surfaced to callers. Transports map these onto
/// their own status codes; the crate never leaks raw upstream errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    Upstream,
    Parse,
    Cancelled,
    Internal,
}

impl GranaryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GranaryError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            GranaryError::NotFound(_) => ErrorKind::NotFound,
            GranaryError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            GranaryError::Database(_)
            | GranaryError::VectorStore(_)
            | GranaryError::Embedding(_)
            | GranaryError::Llm(_)
            | GranaryError::Http(_) => ErrorKind::Upstream,
            GranaryError::Json(_) => ErrorKind::Parse,
            GranaryError::Cancelled => ErrorKind::Cancelled,
            GranaryError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, GranaryError>;
