//! Affix Attacher Library
//!
//! The attacher orchestrates the attachment lifecycle: uploading
//! user-supplied files to a transient cache tier, managing the tree of
//! derived files, promoting everything to permanent storage, and persisting
//! the result into a host record without losing races against concurrent
//! writers.
//!
//! # Lifecycle
//!
//! ```text
//! attach(io)            cache tier   (validation, metadata extraction)
//! promote()             store tier   (+ derivatives, create_on_promote)
//! atomic_promote()      store tier   + reload-compare-write persistence
//! destroy_previous()    deferred cleanup of the displaced attachment
//! ```
//!
//! Concurrency safety is optimistic: no locks, a reload-compare-write
//! protocol instead. At most one of several racing writers wins; the others
//! observe [`AttacherError::AttachmentChanged`], with storage left
//! consistent (no orphaned promoted files).

pub mod attacher;
pub mod context;
pub mod error;
pub mod jobs;
pub mod location;
pub mod persistence;
pub mod tree;
pub mod uploader;

pub use attacher::{
    AttachOptions, AttachedState, Attacher, AttacherConfig, DefaultUrlFn, DerivativeStorage,
    DerivativesOptions, PromoteOptions,
};
pub use context::{Context, RecordIdent};
pub use error::{AttacherError, AttacherResult, PersistError};
pub use jobs::{run_destroy_job, AttachmentJob, DestroyJob, PromoteJob};
pub use location::LocationPolicy;
pub use persistence::{
    AtomicOptions, PersistFn, PersistStrategy, RecordAdapter, ReloadFn, ReloadStrategy,
};
pub use tree::{format_path, DerivativeTree, PathSegment};
pub use uploader::{UploadOptions, Uploader};

// Re-export the rest of the toolkit so most consumers depend on one crate.
pub use affix_core::{
    AllowedExtensions, AllowedMimeTypes, AttachmentData, Config, DataError, FileData,
    FileMetadata, MaxSize, RawContent, RawFile, SourceTree, TreeData, Validator,
};
pub use affix_processing::{
    Derivation, DerivationOptions, DerivationRegistry, DerivationSource, ProcessError,
};
pub use affix_storage::{
    create_registry, ByteStream, MemoryStorage, Storage, StorageError, StorageRegistry,
    StorageResult, UploadedFile, UrlOptions,
};
