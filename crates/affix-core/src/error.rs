//! Error types for the core data model.

use thiserror::Error;

/// Errors raised when parsing serialized attachment column data.
///
/// Parsing never partially applies: on error the caller's state is left
/// unchanged.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("attachment data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized attachment data shape: {0}")]
    UnknownShape(String),

    #[error("attachment data mixes legacy and native derivative fields: {0}")]
    MixedLegacy(String),

    #[error("malformed file entry: {0}")]
    MalformedFile(String),
}
