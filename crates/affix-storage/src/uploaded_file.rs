//! Immutable handle to one stored object.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::NamedTempFile;

use affix_core::{FileData, FileMetadata};

use crate::{ByteStream, Storage, StorageError, StorageResult, StorageRegistry, UrlOptions};

/// One stored object: serialized identity plus the registry that resolves
/// its backend.
///
/// The value is immutable; replacing an attachment produces a new
/// `UploadedFile`. Equality compares the serialized identity only (storage
/// key, id, metadata).
#[derive(Clone)]
pub struct UploadedFile {
    data: FileData,
    registry: StorageRegistry,
}

impl UploadedFile {
    pub fn new(data: FileData, registry: StorageRegistry) -> Self {
        UploadedFile { data, registry }
    }

    pub fn storage_key(&self) -> &str {
        &self.data.storage
    }

    pub fn id(&self) -> &str {
        &self.data.id
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.data.metadata
    }

    pub fn size(&self) -> Option<u64> {
        self.data.metadata.size
    }

    pub fn filename(&self) -> Option<&str> {
        self.data.metadata.filename.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.data.metadata.mime_type.as_deref()
    }

    /// Serialized identity, as persisted in the attachment column.
    pub fn data(&self) -> &FileData {
        &self.data
    }

    pub fn into_data(self) -> FileData {
        self.data
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Resolves the backend this object lives on.
    pub fn storage(&self) -> StorageResult<Arc<dyn Storage>> {
        self.registry.resolve(&self.data.storage)
    }

    /// Full object content.
    pub async fn read(&self) -> StorageResult<Bytes> {
        self.storage()?.download(&self.data.id).await
    }

    /// Object content as a chunk stream.
    pub async fn open(&self) -> StorageResult<ByteStream> {
        self.storage()?.open(&self.data.id).await
    }

    /// Downloads the object to a local temporary file, preserving the
    /// filename extension so type-sniffing tools keep working.
    pub async fn download(&self) -> StorageResult<NamedTempFile> {
        let start = std::time::Instant::now();
        let data = self.read().await?;

        let mut builder = tempfile::Builder::new();
        let suffix = self.data.metadata.extension().map(|ext| format!(".{ext}"));
        if let Some(suffix) = &suffix {
            builder.suffix(suffix);
        }
        let temp = builder
            .tempfile()
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to create tempfile: {e}")))?;

        tokio::fs::write(temp.path(), &data).await.map_err(|e| {
            StorageError::DownloadFailed(format!(
                "Failed to write tempfile {}: {}",
                temp.path().display(),
                e
            ))
        })?;

        tracing::info!(
            storage = %self.data.storage,
            id = %self.data.id,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Downloaded stored object to tempfile"
        );

        Ok(temp)
    }

    pub async fn exists(&self) -> StorageResult<bool> {
        self.storage()?.exists(&self.data.id).await
    }

    /// Deletes the object. Idempotent: deleting an already-absent object is
    /// not an error.
    pub async fn delete(&self) -> StorageResult<()> {
        self.storage()?.delete(&self.data.id).await
    }

    pub async fn url(&self, options: &UrlOptions) -> StorageResult<String> {
        self.storage()?.url(&self.data.id, options).await
    }
}

impl PartialEq for UploadedFile {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("storage", &self.data.storage)
            .field("id", &self.data.id)
            .field("metadata", &self.data.metadata)
            .finish()
    }
}
