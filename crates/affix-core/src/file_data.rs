//! Serialized identity of a stored file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::DataError;

/// Metadata extracted for an uploaded file.
///
/// `size`, `filename` and `mime_type` are always present in the serialized
/// form (null when unknown); `checksum` is the hex-encoded SHA-256 digest of
/// the content when the backend computed one. Output of custom extractors is
/// carried in `extra` and round-trips untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FileMetadata {
    pub size: Option<u64>,
    pub filename: Option<String>,
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileMetadata {
    /// Fills fields that are `None` in `self` from `other`. Extra keys from
    /// `other` are only added when not already present.
    pub fn fill_from(&mut self, other: FileMetadata) {
        if self.size.is_none() {
            self.size = other.size;
        }
        if self.filename.is_none() {
            self.filename = other.filename;
        }
        if self.mime_type.is_none() {
            self.mime_type = other.mime_type;
        }
        if self.checksum.is_none() {
            self.checksum = other.checksum;
        }
        for (key, value) in other.extra {
            self.extra.entry(key).or_insert(value);
        }
    }

    /// File extension from the recorded filename, without the dot.
    pub fn extension(&self) -> Option<&str> {
        let filename = self.filename.as_deref()?;
        let (stem, ext) = filename.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext)
    }
}

/// Serialized identity of one stored object: the symbolic backend key, the
/// backend-assigned opaque id, and extracted metadata.
///
/// Two values are equal iff all three components are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileData {
    pub id: String,
    pub storage: String,
    #[serde(default)]
    pub metadata: FileMetadata,
}

impl FileData {
    pub fn new(storage: impl Into<String>, id: impl Into<String>, metadata: FileMetadata) -> Self {
        FileData {
            id: id.into(),
            storage: storage.into(),
            metadata,
        }
    }

    /// Parses a serialized file entry, e.g. one leaf of a derivatives tree.
    pub fn from_value(value: &Value) -> Result<FileData, DataError> {
        serde_json::from_value(value.clone())
            .map_err(|e| DataError::MalformedFile(e.to_string()))
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("storage".into(), Value::String(self.storage.clone()));
        let metadata = serde_json::to_value(&self.metadata).unwrap_or(Value::Null);
        map.insert("metadata".into(), metadata);
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_roundtrip_with_extra_keys() {
        let value = json!({
            "size": 1024,
            "filename": "photo.jpg",
            "mime_type": "image/jpeg",
            "checksum": "abc123",
            "width": 640,
            "height": 480,
        });

        let metadata: FileMetadata = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(metadata.size, Some(1024));
        assert_eq!(metadata.filename.as_deref(), Some("photo.jpg"));
        assert_eq!(metadata.extra.get("width"), Some(&json!(640)));

        assert_eq!(serde_json::to_value(&metadata).unwrap(), value);
    }

    #[test]
    fn test_metadata_serializes_null_fields() {
        let json = serde_json::to_value(FileMetadata::default()).unwrap();

        assert_eq!(json, json!({"size": null, "filename": null, "mime_type": null}));
    }

    #[test]
    fn test_metadata_extension() {
        let metadata = FileMetadata {
            filename: Some("archive.tar.gz".into()),
            ..Default::default()
        };
        assert_eq!(metadata.extension(), Some("gz"));

        let metadata = FileMetadata {
            filename: Some("README".into()),
            ..Default::default()
        };
        assert_eq!(metadata.extension(), None);

        let metadata = FileMetadata {
            filename: Some(".bashrc".into()),
            ..Default::default()
        };
        assert_eq!(metadata.extension(), None);
    }

    #[test]
    fn test_metadata_fill_from_keeps_existing() {
        let mut metadata = FileMetadata {
            size: Some(10),
            ..Default::default()
        };
        metadata.fill_from(FileMetadata {
            size: Some(99),
            filename: Some("a.txt".into()),
            ..Default::default()
        });

        assert_eq!(metadata.size, Some(10));
        assert_eq!(metadata.filename.as_deref(), Some("a.txt"));
    }

    #[test]
    fn test_file_data_equality() {
        let a = FileData::new("store", "foo", FileMetadata::default());
        let b = FileData::new("store", "foo", FileMetadata::default());
        assert_eq!(a, b);

        let c = FileData::new("cache", "foo", FileMetadata::default());
        assert_ne!(a, c);

        let mut d = b.clone();
        d.metadata.size = Some(1);
        assert_ne!(a, d);
    }

    #[test]
    fn test_file_data_from_value_rejects_missing_id() {
        let err = FileData::from_value(&json!({"storage": "store"})).unwrap_err();
        assert!(matches!(err, DataError::MalformedFile(_)));
    }

    #[test]
    fn test_file_data_ignores_unknown_top_level_keys() {
        let value = json!({"id": "foo", "storage": "store", "derivatives": {}});
        let data = FileData::from_value(&value).unwrap();
        assert_eq!(data.id, "foo");
    }
}
