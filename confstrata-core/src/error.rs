use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrataError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid scope selector: {0}")]
    InvalidScope(String),

    #[error("Scope not found: {0}")]
    ScopeNotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Invalid archive path component: {0}")]
    InvalidPathComponent(String),

    #[error("Value for key {key} is {size} bytes, limit is {limit} bytes")]
    ValueTooLarge {
        key: String,
        size: usize,
        limit: usize,
    },

    #[error("Archive corrupted: version {version_id} references missing blob {path}")]
    ArchiveCorrupted { version_id: String, path: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hashing error: {0}")]
    Hashing(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StrataError {
    /// Validation failures are surfaced to the caller as-is and never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StrataError::InvalidRequest(_)
                | StrataError::InvalidScope(_)
                | StrataError::InvalidKey(_)
                | StrataError::InvalidPathComponent(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StrataError>;
