//! Upload location (object id) generation.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use affix_core::RawFile;

use crate::Context;

/// Policy for generating the id a new object is stored under.
#[derive(Clone, Default)]
pub enum LocationPolicy {
    /// Random token, keeping the source's filename extension.
    #[default]
    Random,
    /// Human-readable location derived from the bound record:
    /// `{model}/{record_id}/{attachment_name}/{token}.{ext}`. Segments
    /// without a value are omitted.
    Pretty,
    Custom(Arc<dyn Fn(&RawFile, &Context) -> String + Send + Sync>),
}

impl LocationPolicy {
    pub fn generate(&self, io: &RawFile, context: &Context) -> String {
        match self {
            LocationPolicy::Random => basename(io),
            LocationPolicy::Pretty => {
                let mut segments: Vec<String> = Vec::new();
                if let Some(record) = context.record() {
                    segments.push(record.model.clone());
                    if let Some(id) = &record.id {
                        segments.push(id.clone());
                    }
                }
                if let Some(name) = context.name() {
                    segments.push(name.to_string());
                }
                segments.push(basename(io));
                segments.join("/")
            }
            LocationPolicy::Custom(generate) => generate(io, context),
        }
    }
}

fn basename(io: &RawFile) -> String {
    let token = Uuid::new_v4().simple().to_string();
    match extension(io) {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    }
}

fn extension(io: &RawFile) -> Option<&str> {
    let filename = io.filename.as_deref()?;
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

impl fmt::Debug for LocationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationPolicy::Random => f.write_str("Random"),
            LocationPolicy::Pretty => f.write_str("Pretty"),
            LocationPolicy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
