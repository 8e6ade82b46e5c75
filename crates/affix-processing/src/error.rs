//! Derivation processing errors.

use thiserror::Error;

use affix_storage::StorageError;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("No derivation processor registered under name: {0}")]
    ProcessorNotFound(String),

    #[error("Derivation processor returned an invalid result: {0}")]
    InvalidResult(String),

    #[error("Derivation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
