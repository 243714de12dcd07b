//! Filesystem blob storage
//!
//! Default backend for local deployments. Writes go through a temp file and
//! an atomic rename so readers never observe partial content.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use super::error::BlobError;
use super::BlobStorage;

/// Filesystem-backed blob storage rooted at a single directory.
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    root: PathBuf,
}

impl FilesystemStorage {
    pub fn new(root: PathBuf) -> Result<Self, BlobError> {
        std::fs::create_dir_all(&root)?;
        tracing::debug!(root = %root.display(), "Filesystem blob storage initialized");
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobError> {
        // Keys are `<doc-id>.<ext>`; reject anything that could escape root.
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(BlobError::InvalidLocation(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn location_to_path(&self, location: &str) -> Result<PathBuf, BlobError> {
        let path = location
            .strip_prefix("file://")
            .ok_or_else(|| BlobError::InvalidLocation(location.to_string()))?;
        Ok(PathBuf::from(path))
    }
}

#[async_trait]
impl BlobStorage for FilesystemStorage {
    async fn put(
        &self,
        key: &str,
        data: &[u8],
        _content_type: &str,
    ) -> Result<String, BlobError> {
        let final_path = self.path_for(key)?;
        let temp_path = final_path.with_extension("tmp");

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &final_path).await?;

        tracing::debug!(key, size = data.len(), "Blob stored on filesystem");
        Ok(format!("file://{}", final_path.display()))
    }

    async fn get(&self, location: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.location_to_path(location)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(BlobError::NotFound {
                location: location.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}

#[cfg(test)]
impl FilesystemStorage {
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> (tempfile::TempDir, FilesystemStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path().to_path_buf()).unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_then_get_round_trip() {
        let (_dir, storage) = storage();
        let location = storage
            .put("doc-1.txt", b"P0301 misfire", "text/plain")
            .await
            .unwrap();
        assert!(location.starts_with("file://"));
        let data = storage.get(&location).await.unwrap();
        assert_eq!(data, b"P0301 misfire");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_dir, storage) = storage();
        let missing = format!("file://{}/absent.txt", storage.root().display());
        assert!(matches!(
            storage.get(&missing).await,
            Err(BlobError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_location_scheme_rejected() {
        let (_dir, storage) = storage();
        assert!(matches!(
            storage.get("s3://bucket/key").await,
            Err(BlobError::InvalidLocation(_))
        ));
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let (_dir, storage) = storage();
        assert!(storage.put("../escape.txt", b"x", "text/plain").await.is_err());
        assert!(storage.put("a/b.txt", b"x", "text/plain").await.is_err());
    }

}
