//! Raw byte sources: inputs to uploads and outputs of derivation processors.

use std::path::PathBuf;

use bytes::Bytes;
use indexmap::IndexMap;

/// A not-yet-uploaded byte source with optional identity hints.
///
/// Content is either fully buffered or a local filesystem path (typically a
/// processing tempfile). Reads are byte-oriented, so text/binary mode is not
/// a concern.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub content: RawContent,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum RawContent {
    Bytes(Bytes),
    Path(PathBuf),
}

impl RawFile {
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        RawFile {
            content: RawContent::Bytes(data.into()),
            filename: None,
            mime_type: None,
        }
    }

    /// A source backed by a local file. The filename hint is taken from the
    /// path's final component.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        RawFile {
            content: RawContent::Path(path),
            filename,
            mime_type: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

impl From<Bytes> for RawFile {
    fn from(data: Bytes) -> Self {
        RawFile::from_bytes(data)
    }
}

impl From<Vec<u8>> for RawFile {
    fn from(data: Vec<u8>) -> Self {
        RawFile::from_bytes(data)
    }
}

impl From<&str> for RawFile {
    fn from(data: &str) -> Self {
        RawFile::from_bytes(data.as_bytes().to_vec())
    }
}

/// Recursive mapping/sequence of raw sources, the shape produced by a
/// derivation processor before its results are uploaded.
#[derive(Debug, Clone)]
pub enum SourceTree {
    Leaf(RawFile),
    Map(IndexMap<String, SourceTree>),
    List(Vec<SourceTree>),
}

impl SourceTree {
    pub fn empty() -> Self {
        SourceTree::Map(IndexMap::new())
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<SourceTree>,
        I: IntoIterator<Item = (K, V)>,
    {
        SourceTree::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn list<V, I>(entries: I) -> Self
    where
        V: Into<SourceTree>,
        I: IntoIterator<Item = V>,
    {
        SourceTree::List(entries.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SourceTree::Leaf(_) => false,
            SourceTree::Map(map) => map.is_empty(),
            SourceTree::List(list) => list.is_empty(),
        }
    }
}

impl From<RawFile> for SourceTree {
    fn from(io: RawFile) -> Self {
        SourceTree::Leaf(io)
    }
}

impl From<Bytes> for SourceTree {
    fn from(data: Bytes) -> Self {
        SourceTree::Leaf(data.into())
    }
}

impl From<Vec<u8>> for SourceTree {
    fn from(data: Vec<u8>) -> Self {
        SourceTree::Leaf(data.into())
    }
}

impl From<&str> for SourceTree {
    fn from(data: &str) -> Self {
        SourceTree::Leaf(data.into())
    }
}
