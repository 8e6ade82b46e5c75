//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must
//! implement, along with the error taxonomy shared by backends and the
//! registry.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use sha2::{Digest, Sha256};
use thiserror::Error;

use affix_core::FileMetadata;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No storage registered under key: {0}")]
    UnknownStorage(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object id: {0}")]
    InvalidId(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Stream of downloaded content chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Options for URL generation.
#[derive(Debug, Clone, Default)]
pub struct UrlOptions {
    /// Expiry for signed URLs; backends without signing ignore it.
    pub expires_in: Option<Duration>,
}

/// Storage abstraction trait
///
/// Object ids are opaque strings assigned by the uploader. Backends must be
/// safe for concurrent use on distinct ids; concurrent operations on the
/// same id carry no ordering guarantee at this layer.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` under `id`, overwriting any existing object. Returns the
    /// metadata the backend computed for the stored content (size, SHA-256
    /// checksum).
    async fn upload(
        &self,
        id: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<FileMetadata>;

    /// Download the full object content.
    async fn download(&self, id: &str) -> StorageResult<Bytes>;

    /// Open the object as a stream of chunks.
    async fn open(&self, id: &str) -> StorageResult<ByteStream>;

    /// Delete the object. Deleting an absent object is not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Check whether the object exists.
    async fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Public or signed URL for the object.
    async fn url(&self, id: &str, options: &UrlOptions) -> StorageResult<String>;

    /// Backend kind, for logging.
    fn kind(&self) -> &'static str;
}

/// Metadata a backend reports for freshly written content.
pub(crate) fn content_metadata(data: &[u8]) -> FileMetadata {
    let mut hasher = Sha256::new();
    hasher.update(data);

    FileMetadata {
        size: Some(data.len() as u64),
        checksum: Some(hex::encode(hasher.finalize())),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_metadata() {
        let metadata = content_metadata(b"abc");

        assert_eq!(metadata.size, Some(3));
        assert_eq!(
            metadata.checksum.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}
