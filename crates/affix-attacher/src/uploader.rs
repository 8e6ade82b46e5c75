//! Upload pipeline: metadata extraction, validation, id generation, write.

use std::sync::Arc;

use bytes::Bytes;

use affix_core::{Config, FileData, FileMetadata, RawContent, RawFile, Validator};
use affix_core::{AllowedExtensions, AllowedMimeTypes, MaxSize};
use affix_storage::{StorageRegistry, UploadedFile};

use crate::{AttacherError, AttacherResult, Context, LocationPolicy};

/// Options for a single upload.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Explicit object id, overriding the location policy.
    pub location: Option<String>,
    /// Delete filesystem sources after a successful upload.
    pub delete: bool,
    /// Run registered validators. Enabled for user-supplied files; internal
    /// re-uploads (promotion, derivatives) skip validation.
    pub validate: bool,
    /// Metadata overriding the extracted values, e.g. when re-uploading a
    /// file whose metadata is already known.
    pub metadata: Option<FileMetadata>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            location: None,
            delete: true,
            validate: true,
            metadata: None,
        }
    }
}

/// Uploads raw files to a storage tier, producing [`UploadedFile`] handles.
#[derive(Clone)]
pub struct Uploader {
    registry: StorageRegistry,
    location: LocationPolicy,
    validators: Vec<Arc<dyn Validator>>,
}

impl Uploader {
    pub fn new(registry: StorageRegistry) -> Self {
        Uploader {
            registry,
            location: LocationPolicy::Random,
            validators: Vec::new(),
        }
    }

    /// Builds an uploader with the validators the configuration asks for.
    pub fn from_config(registry: StorageRegistry, config: &Config) -> Self {
        let mut uploader = Self::new(registry);
        if let Some(max) = config.max_file_size_bytes {
            uploader = uploader.with_validator(Arc::new(MaxSize(max)));
        }
        if let Some(types) = &config.allowed_mime_types {
            uploader = uploader.with_validator(Arc::new(AllowedMimeTypes(types.clone())));
        }
        if let Some(extensions) = &config.allowed_extensions {
            uploader = uploader.with_validator(Arc::new(AllowedExtensions(extensions.clone())));
        }
        uploader
    }

    pub fn with_location(mut self, location: LocationPolicy) -> Self {
        self.location = location;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    /// Uploads `io` to the given tier.
    ///
    /// Extracts metadata (size, filename, content type, checksum), runs
    /// validators when enabled, generates an object id via the location
    /// policy, writes to the backend, and deletes filesystem sources unless
    /// told not to. Validation failures surface as
    /// [`AttacherError::Validation`] before anything is written.
    pub async fn upload(
        &self,
        io: RawFile,
        storage_key: &str,
        context: &Context,
        options: &UploadOptions,
    ) -> AttacherResult<UploadedFile> {
        let storage = self.registry.resolve(storage_key)?;
        let start = std::time::Instant::now();

        let data = read_content(&io).await?;

        let mut metadata = options.metadata.clone().unwrap_or_default();
        metadata.fill_from(extract_metadata(&io));

        if options.validate {
            let mut messages = Vec::new();
            for validator in &self.validators {
                messages.extend(validator.validate(&metadata, &data));
            }
            if !messages.is_empty() {
                return Err(AttacherError::Validation(messages));
            }
        }

        let id = match &options.location {
            Some(location) => location.clone(),
            None => self.location.generate(&io, context),
        };

        let size = data.len();
        let backend_metadata = storage
            .upload(&id, data, metadata.mime_type.as_deref())
            .await?;
        metadata.fill_from(backend_metadata);

        if options.delete {
            if let RawContent::Path(path) = &io.content {
                if let Err(error) = tokio::fs::remove_file(path).await {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "Failed to delete upload source"
                    );
                }
            }
        }

        tracing::info!(
            storage = %storage_key,
            id = %id,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload finished"
        );

        Ok(UploadedFile::new(
            FileData::new(storage_key, id, metadata),
            self.registry.clone(),
        ))
    }
}

async fn read_content(io: &RawFile) -> AttacherResult<Bytes> {
    match &io.content {
        RawContent::Bytes(data) => Ok(data.clone()),
        RawContent::Path(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
    }
}

fn extract_metadata(io: &RawFile) -> FileMetadata {
    let mime_type = io.mime_type.clone().or_else(|| {
        io.filename
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.to_string())
    });

    FileMetadata {
        filename: io.filename.clone(),
        mime_type,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use affix_storage::MemoryStorage;
    use std::io::Write;

    fn registry() -> StorageRegistry {
        let registry = StorageRegistry::new();
        registry.register("cache", Arc::new(MemoryStorage::new()));
        registry.register("store", Arc::new(MemoryStorage::new()));
        registry
    }

    #[tokio::test]
    async fn test_upload_extracts_metadata() {
        let uploader = Uploader::new(registry());
        let io = RawFile::from_bytes("content").with_filename("notes.txt");

        let file = uploader
            .upload(io, "cache", &Context::new(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(file.storage_key(), "cache");
        assert_eq!(file.size(), Some(7));
        assert_eq!(file.filename(), Some("notes.txt"));
        assert_eq!(file.mime_type(), Some("text/plain"));
        assert!(file.metadata().checksum.is_some());
        assert!(file.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_upload_unknown_storage_fails() {
        let uploader = Uploader::new(StorageRegistry::new());

        let err = uploader
            .upload(
                RawFile::from_bytes("x"),
                "nowhere",
                &Context::new(),
                &UploadOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            AttacherError::Storage(affix_storage::StorageError::UnknownStorage(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_failure_aborts() {
        let uploader = Uploader::new(registry()).with_validator(Arc::new(MaxSize(2)));

        let err = uploader
            .upload(
                RawFile::from_bytes("too large"),
                "cache",
                &Context::new(),
                &UploadOptions::default(),
            )
            .await
            .unwrap_err();

        let AttacherError::Validation(messages) = err else {
            panic!("expected validation error");
        };
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_validation_skipped_when_disabled() {
        let uploader = Uploader::new(registry()).with_validator(Arc::new(MaxSize(2)));

        let options = UploadOptions {
            validate: false,
            ..Default::default()
        };
        let file = uploader
            .upload(RawFile::from_bytes("too large"), "cache", &Context::new(), &options)
            .await
            .unwrap();

        assert!(file.exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_explicit_location() {
        let uploader = Uploader::new(registry());

        let options = UploadOptions {
            location: Some("fixed/id.txt".to_string()),
            ..Default::default()
        };
        let file = uploader
            .upload(RawFile::from_bytes("x"), "store", &Context::new(), &options)
            .await
            .unwrap();

        assert_eq!(file.id(), "fixed/id.txt");
    }

    #[tokio::test]
    async fn test_path_source_deleted_after_upload() {
        let uploader = Uploader::new(registry());

        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"file content").unwrap();
        let path = temp.into_temp_path().keep().unwrap();

        let file = uploader
            .upload(
                RawFile::from_path(&path),
                "cache",
                &Context::new(),
                &UploadOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(file.read().await.unwrap(), Bytes::from_static(b"file content"));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_path_source_kept_when_delete_disabled() {
        let uploader = Uploader::new(registry());

        let mut temp = tempfile::NamedTempFile::new().unwrap();
        temp.write_all(b"keep me").unwrap();

        let options = UploadOptions {
            delete: false,
            ..Default::default()
        };
        uploader
            .upload(
                RawFile::from_path(temp.path()),
                "cache",
                &Context::new(),
                &options,
            )
            .await
            .unwrap();

        assert!(temp.path().exists());
    }

    #[tokio::test]
    async fn test_metadata_override_wins() {
        let uploader = Uploader::new(registry());

        let mut metadata = FileMetadata {
            filename: Some("original.bin".to_string()),
            mime_type: Some("application/x-custom".to_string()),
            ..Default::default()
        };
        metadata
            .extra
            .insert("pages".to_string(), serde_json::json!(3));

        let options = UploadOptions {
            metadata: Some(metadata),
            ..Default::default()
        };
        let file = uploader
            .upload(
                RawFile::from_bytes("x").with_filename("upload.txt"),
                "store",
                &Context::new(),
                &options,
            )
            .await
            .unwrap();

        assert_eq!(file.filename(), Some("original.bin"));
        assert_eq!(file.mime_type(), Some("application/x-custom"));
        assert_eq!(file.metadata().extra["pages"], serde_json::json!(3));
        // size still comes from the backend
        assert_eq!(file.size(), Some(1));
    }
}
