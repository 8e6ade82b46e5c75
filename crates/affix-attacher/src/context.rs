//! Explicit operation context.
//!
//! The context is passed by parameter at every upload boundary instead of
//! being threaded implicitly. `record` and `name` identify the attachment
//! slot and are fixed when the attacher is bound; `extra` is an open map the
//! caller may mutate between operations (e.g. to pass hints to a custom
//! location policy).

use serde_json::{Map, Value};

/// Identity of the host record an attacher is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIdent {
    pub model: String,
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Context {
    record: Option<RecordIdent>,
    name: Option<String>,
    pub extra: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(record: Option<RecordIdent>, name: impl Into<String>) -> Self {
        Context {
            record,
            name: Some(name.into()),
            extra: Map::new(),
        }
    }

    pub fn record(&self) -> Option<&RecordIdent> {
        self.record.as_ref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
