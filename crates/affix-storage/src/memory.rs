//! In-memory storage backend.
//!
//! Backs the transient cache tier in single-process deployments and the test
//! suites. Objects live in a shared map until deleted or overwritten.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use parking_lot::RwLock;

use affix_core::FileMetadata;

use crate::traits::content_metadata;
use crate::{ByteStream, Storage, StorageError, StorageResult, UrlOptions};

#[derive(Default)]
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        id: &str,
        data: Bytes,
        _content_type: Option<&str>,
    ) -> StorageResult<FileMetadata> {
        let metadata = content_metadata(&data);
        self.objects.write().insert(id.to_string(), data);
        Ok(metadata)
    }

    async fn download(&self, id: &str) -> StorageResult<Bytes> {
        self.objects
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    async fn open(&self, id: &str) -> StorageResult<ByteStream> {
        let data = self.download(id).await?;
        let chunks: [StorageResult<Bytes>; 1] = [Ok(data)];
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        self.objects.write().remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> StorageResult<bool> {
        Ok(self.objects.read().contains_key(id))
    }

    async fn url(&self, id: &str, _options: &UrlOptions) -> StorageResult<String> {
        Ok(format!("memory://{id}"))
    }

    fn kind(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_upload_download() {
        let storage = MemoryStorage::new();

        let metadata = storage
            .upload("foo", Bytes::from_static(b"data"), None)
            .await
            .unwrap();
        assert_eq!(metadata.size, Some(4));
        assert!(metadata.checksum.is_some());

        let downloaded = storage.download("foo").await.unwrap();
        assert_eq!(downloaded, Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_download_missing_fails() {
        let storage = MemoryStorage::new();

        let err = storage.download("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = MemoryStorage::new();
        storage
            .upload("foo", Bytes::from_static(b"data"), None)
            .await
            .unwrap();

        storage.delete("foo").await.unwrap();
        storage.delete("foo").await.unwrap();

        assert!(!storage.exists("foo").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_streams_content() {
        let storage = MemoryStorage::new();
        storage
            .upload("foo", Bytes::from_static(b"stream me"), None)
            .await
            .unwrap();

        let mut stream = storage.open("foo").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }

        assert_eq!(collected, b"stream me");
    }

    #[tokio::test]
    async fn test_url() {
        let storage = MemoryStorage::new();
        let url = storage.url("foo/bar", &UrlOptions::default()).await.unwrap();
        assert_eq!(url, "memory://foo/bar");
    }
}
