use thiserror::Error;

/// Errors surfaced by object-store backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The key is not addressable by this backend.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (service error, bad credentials, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}
