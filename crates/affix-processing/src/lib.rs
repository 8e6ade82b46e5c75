//! Derivation processing for the affix attachment toolkit.
//!
//! Processors are named functions that take a source file and produce a tree
//! of raw sources (thumbnails, transcodes, extracted pages). Registration
//! and invocation live here; uploading the results is the attacher's job.

pub mod error;
pub mod registry;
pub mod source;

pub use error::ProcessError;
pub use registry::{Derivation, DerivationOptions, DerivationRegistry};
pub use source::DerivationSource;
