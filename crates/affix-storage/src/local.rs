//! Local filesystem storage backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use affix_core::FileMetadata;

use crate::traits::content_metadata;
use crate::{ByteStream, Storage, StorageError, StorageResult, UrlOptions};

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for object storage (e.g. "/var/lib/affix/store")
    /// * `base_url` - Base URL for serving objects (e.g. "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::Config(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
        })
    }

    /// Convert an object id to a filesystem path with security validation
    ///
    /// Rejects ids containing path traversal sequences that could escape the
    /// base storage directory.
    fn id_to_path(&self, id: &str) -> StorageResult<PathBuf> {
        if id.contains("..") || id.starts_with('/') || id.starts_with('\\') {
            return Err(StorageError::InvalidId(id.to_string()));
        }

        Ok(self.base_path.join(id))
    }

    /// Generate public URL for an object
    fn generate_url(&self, id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), id)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(
        &self,
        id: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> StorageResult<FileMetadata> {
        let path = self.id_to_path(id)?;
        let metadata = content_metadata(&data);

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            id = %id,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        Ok(metadata)
    }

    async fn download(&self, id: &str) -> StorageResult<Bytes> {
        let path = self.id_to_path(id)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            id = %id,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage download successful"
        );

        Ok(Bytes::from(data))
    }

    async fn open(&self, id: &str) -> StorageResult<ByteStream> {
        let path = self.id_to_path(id)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let reader = tokio_util::io::ReaderStream::new(file);
        let stream = reader.map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Failed to read chunk: {e}")))
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        let path = self.id_to_path(id)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            id = %id,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        let path = self.id_to_path(id)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn url(&self, id: &str, _options: &UrlOptions) -> StorageResult<String> {
        self.id_to_path(id)?;
        Ok(self.generate_url(id))
    }

    fn kind(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn storage(dir: &Path) -> LocalStorage {
        LocalStorage::new(dir, "http://localhost:3000/files".to_string())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_download() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let metadata = storage
            .upload("nested/test.txt", Bytes::from_static(b"test data"), None)
            .await
            .unwrap();
        assert_eq!(metadata.size, Some(9));

        let downloaded = storage.download("nested/test.txt").await.unwrap();
        assert_eq!(downloaded, Bytes::from_static(b"test data"));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let result = storage.download("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidId(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidId(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidId(_))));
    }

    #[tokio::test]
    async fn test_delete_nonexistent() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        assert!(storage.delete("nonexistent/file.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_exists() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .upload("exists.txt", Bytes::from_static(b"test"), None)
            .await
            .unwrap();

        assert!(storage.exists("exists.txt").await.unwrap());
        assert!(!storage.exists("nonexistent.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_url() {
        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        let url = storage.url("a/b.txt", &UrlOptions::default()).await.unwrap();
        assert_eq!(url, "http://localhost:3000/files/a/b.txt");
    }

    #[tokio::test]
    async fn test_open_streams_content() {
        use futures::StreamExt;

        let dir = tempdir().unwrap();
        let storage = storage(dir.path()).await;

        storage
            .upload("stream.txt", Bytes::from_static(b"stream content"), None)
            .await
            .unwrap();

        let mut stream = storage.open("stream.txt").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(collected, b"stream content");
    }
}
