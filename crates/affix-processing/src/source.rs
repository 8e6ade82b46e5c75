//! Sources handed to derivation processors.

use bytes::Bytes;

use affix_core::FileMetadata;
use affix_storage::UploadedFile;

use crate::ProcessError;

/// The input a derivation processor receives.
///
/// By default the stored source is materialized into [`DerivationSource::Bytes`]
/// before the processor runs. Processors registered as `raw_source` receive
/// the [`UploadedFile`] handle unmodified and do their own I/O (useful for
/// processors that shell out to tools which stream directly from storage
/// URLs).
#[derive(Debug, Clone)]
pub enum DerivationSource {
    Bytes { data: Bytes, metadata: FileMetadata },
    Uploaded(UploadedFile),
}

impl DerivationSource {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        DerivationSource::Bytes {
            data: data.into(),
            metadata: FileMetadata::default(),
        }
    }

    pub fn metadata(&self) -> &FileMetadata {
        match self {
            DerivationSource::Bytes { metadata, .. } => metadata,
            DerivationSource::Uploaded(file) => file.metadata(),
        }
    }

    /// Full source content, downloading when the source is still remote.
    pub async fn read(&self) -> Result<Bytes, ProcessError> {
        match self {
            DerivationSource::Bytes { data, .. } => Ok(data.clone()),
            DerivationSource::Uploaded(file) => Ok(file.read().await?),
        }
    }

    /// Materializes a remote source into buffered content. Already-buffered
    /// sources pass through unchanged.
    pub async fn materialize(self) -> Result<DerivationSource, ProcessError> {
        match self {
            buffered @ DerivationSource::Bytes { .. } => Ok(buffered),
            DerivationSource::Uploaded(file) => {
                let data = file.read().await?;
                Ok(DerivationSource::Bytes {
                    data,
                    metadata: file.metadata().clone(),
                })
            }
        }
    }
}

impl From<UploadedFile> for DerivationSource {
    fn from(file: UploadedFile) -> Self {
        DerivationSource::Uploaded(file)
    }
}
