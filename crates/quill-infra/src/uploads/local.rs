//! Local-disk cover store.
//!
//! Uploads land under a random temp name first and are then renamed to carry
//! the original file's extension, so a partially written file is never
//! visible under its final name.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use quill_core::ports::{CoverStore, StorageError};

/// Stores covers in `root` and serves them as `<public_prefix>/<file>`.
pub struct LocalCoverStore {
    root: PathBuf,
    public_prefix: String,
}

impl LocalCoverStore {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.into().trim_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the upload directory if it does not exist yet.
    pub async fn ensure_root(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }

    /// Map a public path back to a file inside `root`.
    fn resolve(&self, public_path: &str) -> Result<PathBuf, StorageError> {
        let file_name = public_path
            .trim_start_matches('/')
            .strip_prefix(&self.public_prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|name| !name.is_empty() && !name.contains(['/', '\\']) && *name != "..")
            .ok_or_else(|| StorageError::InvalidPath(public_path.to_string()))?;

        Ok(self.root.join(file_name))
    }
}

/// Extension of an uploaded file name, if it has a usable one.
///
/// Only ASCII alphanumerics are accepted so the stored name cannot escape the
/// upload directory.
pub fn cover_extension(original_name: &str) -> Option<&str> {
    let (stem, ext) = original_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 16 {
        return None;
    }
    ext.chars().all(|c| c.is_ascii_alphanumeric()).then_some(ext)
}

#[async_trait]
impl CoverStore for LocalCoverStore {
    async fn store(&self, original_name: &str, contents: Vec<u8>) -> Result<String, StorageError> {
        self.ensure_root().await?;

        let temp_name = Uuid::new_v4().simple().to_string();
        let temp_path = self.root.join(&temp_name);
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let file_name = match cover_extension(original_name) {
            Some(ext) => format!("{}.{}", temp_name, ext),
            None => temp_name,
        };
        let final_path = self.root.join(&file_name);
        if final_path != temp_path {
            if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(StorageError::Io(e.to_string()));
            }
        }

        tracing::debug!(file = %file_name, bytes = contents.len(), "Stored cover");
        Ok(format!("{}/{}", self.public_prefix, file_name))
    }

    async fn remove(&self, path: &str) -> Result<(), StorageError> {
        let file = self.resolve(path)?;
        tokio::fs::remove_file(&file)
            .await
            .map_err(|e| StorageError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> LocalCoverStore {
        let root = std::env::temp_dir().join(format!("quill-covers-{}", Uuid::new_v4()));
        LocalCoverStore::new(root, "uploads")
    }

    #[test]
    fn test_cover_extension() {
        assert_eq!(cover_extension("photo.png"), Some("png"));
        assert_eq!(cover_extension("archive.tar.gz"), Some("gz"));
        assert_eq!(cover_extension("README"), None);
        assert_eq!(cover_extension(".hidden"), None);
        assert_eq!(cover_extension("trailing."), None);
        assert_eq!(cover_extension("evil.p/ng"), None);
    }

    #[tokio::test]
    async fn test_store_appends_extension() {
        let store = temp_store();

        let path = store.store("cat.jpeg", b"jpeg bytes".to_vec()).await.unwrap();

        assert!(path.starts_with("uploads/"));
        assert!(path.ends_with(".jpeg"));
        let on_disk = store.resolve(&path).unwrap();
        assert_eq!(tokio::fs::read(&on_disk).await.unwrap(), b"jpeg bytes");

        tokio::fs::remove_dir_all(store.root()).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_without_extension() {
        let store = temp_store();

        let path = store.store("noext", vec![1, 2, 3]).await.unwrap();

        assert!(!path.contains('.'));
        tokio::fs::remove_dir_all(store.root()).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_deletes_file() {
        let store = temp_store();
        let path = store.store("cat.png", vec![0u8; 4]).await.unwrap();

        store.remove(&path).await.unwrap();

        assert!(!store.resolve(&path).unwrap().exists());
        tokio::fs::remove_dir_all(store.root()).await.unwrap();
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let store = temp_store();

        assert!(store.resolve("uploads/../secret").is_err());
        assert!(store.resolve("elsewhere/file.png").is_err());
        assert!(store.resolve("uploads/").is_err());
    }
}
