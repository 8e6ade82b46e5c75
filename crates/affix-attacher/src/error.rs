//! Attacher error taxonomy.

use thiserror::Error;

use affix_core::DataError;
use affix_processing::ProcessError;
use affix_storage::StorageError;

/// Errors from record persistence adapters.
#[derive(Debug, Error)]
pub enum PersistError {
    /// The attacher is not bound to a record, or the adapter cannot perform
    /// the requested operation.
    #[error("record adapter does not support {0}")]
    NotSupported(&'static str),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum AttacherError {
    /// A validator rejected the file. On `attach` this is recorded on the
    /// attacher instead of surfacing to the caller.
    #[error("file validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Invalid state-machine transition (e.g. promoting a stored file).
    #[error("invalid promotion: {0}")]
    Promotion(String),

    /// Another actor changed the attachment between reading it and writing
    /// back. Recoverable: retry the whole operation against fresh state.
    #[error("attachment changed concurrently during {0}")]
    AttachmentChanged(&'static str),

    #[error("no file is attached")]
    NoFileAttached,

    /// A merge or path operation would turn a mapping into a sequence or
    /// vice versa.
    #[error("derivative tree shape mismatch: {0}")]
    TreeShape(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for attacher operations
pub type AttacherResult<T> = Result<T, AttacherError>;
