//! Storage port for uploaded post covers.

use async_trait::async_trait;

/// Persists uploaded cover files and hands back the path they are served under.
#[async_trait]
pub trait CoverStore: Send + Sync {
    /// Store `contents` uploaded as `original_name`. Returns the public path.
    async fn store(&self, original_name: &str, contents: Vec<u8>) -> Result<String, StorageError>;

    /// Remove a previously stored cover by its public path.
    async fn remove(&self, path: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O failed: {0}")]
    Io(String),

    #[error("Path is outside the upload directory: {0}")]
    InvalidPath(String),
}
