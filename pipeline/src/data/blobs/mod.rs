//! Document blob storage
//!
//! Extracted document text lives in a content blob keyed `<doc-id>.<ext>`;
//! the relational store keeps only the opaque location string this module
//! returns (`file://…` or `s3://bucket/key`). Written once by the crawl
//! stage, read by the chunk stage. No atomicity beyond per-object write.

mod error;
pub mod filesystem;
pub mod s3;

pub use error::BlobError;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::config::{BlobBackend, BlobsConfig};

/// Blob storage backend.
///
/// Implementations must be thread-safe for use across stage workers.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `data` under `key`, returning the location string to persist.
    async fn put(&self, key: &str, data: &[u8], content_type: &str)
    -> Result<String, BlobError>;

    /// Fetch the bytes at a location previously returned by `put`.
    async fn get(&self, location: &str) -> Result<Vec<u8>, BlobError>;

    /// Backend name for logs and stats
    fn backend_name(&self) -> &'static str;
}

/// Derive the blob key extension from a MIME type.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "text/html" => "html",
        "application/pdf" => "pdf",
        _ => "txt",
    }
}

/// Compose the blob key for a document: `<doc-id>.<ext>`.
pub fn blob_key(doc_id: &uuid::Uuid, mime_type: &str) -> String {
    format!("{}.{}", doc_id, extension_for_mime(mime_type))
}

/// Build the configured blob backend.
pub async fn connect(config: &BlobsConfig) -> Result<Arc<dyn BlobStorage>, BlobError> {
    match config.backend {
        BlobBackend::Filesystem => {
            let root = config
                .filesystem_path
                .clone()
                .unwrap_or_else(|| "./data/blobs".to_string());
            Ok(Arc::new(filesystem::FilesystemStorage::new(root.into())?))
        }
        BlobBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| BlobError::Backend("S3 backend requires bucket config".into()))?;
            Ok(Arc::new(
                s3::S3Storage::new(
                    s3.bucket.clone(),
                    s3.prefix.clone(),
                    s3.region.clone(),
                    s3.endpoint.clone(),
                )
                .await?,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key_extensions() {
        let id = uuid::Uuid::nil();
        assert!(blob_key(&id, "text/html").ends_with(".html"));
        assert!(blob_key(&id, "application/pdf").ends_with(".pdf"));
        assert!(blob_key(&id, "text/plain").ends_with(".txt"));
        assert!(blob_key(&id, "application/octet-stream").ends_with(".txt"));
    }
}
