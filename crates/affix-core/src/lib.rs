//! Core data model for the affix attachment toolkit.
//!
//! This crate holds the serialized shapes shared by the rest of the
//! workspace: file identity and metadata, the attachment column codec
//! (including the legacy two-field versions format), raw byte sources,
//! upload validation hooks, and environment-driven configuration.
//!
//! # Column format
//!
//! An attachment is persisted as a JSON mapping:
//!
//! ```json
//! {
//!   "id": "b3c1…",
//!   "storage": "store",
//!   "metadata": { "size": 1024, "filename": "photo.jpg", "mime_type": "image/jpeg" },
//!   "derivatives": { "small": { "id": "…", "storage": "store", "metadata": {} } }
//! }
//! ```
//!
//! A bare top-level array is accepted for derivatives-only attachments.

pub mod attachment_data;
pub mod config;
pub mod error;
pub mod file_data;
pub mod raw;
pub mod validation;

pub use attachment_data::{AttachmentData, TreeData};
pub use config::Config;
pub use error::DataError;
pub use file_data::{FileData, FileMetadata};
pub use raw::{RawContent, RawFile, SourceTree};
pub use validation::{AllowedExtensions, AllowedMimeTypes, MaxSize, Validator};
