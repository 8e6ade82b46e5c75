//! Affix Storage Library
//!
//! This crate provides the storage abstraction for the affix attachment
//! toolkit: the [`Storage`] trait, the [`StorageRegistry`] that maps symbolic
//! tier keys ("cache", "store") to backend instances, the immutable
//! [`UploadedFile`] handle, and backend implementations.
//!
//! # Object ids
//!
//! Ids are opaque strings assigned by the uploader. Backends must accept any
//! id that does not attempt path traversal (`..`, leading `/`); id
//! generation policy lives above this crate.

pub mod factory;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod registry;
pub mod traits;
pub mod uploaded_file;

// Re-export commonly used types
pub use factory::create_registry;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use registry::StorageRegistry;
pub use traits::{ByteStream, Storage, StorageError, StorageResult, UrlOptions};
pub use uploaded_file::UploadedFile;
