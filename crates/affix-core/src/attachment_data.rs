//! Column codec for serialized attachment data.
//!
//! The persisted column is a JSON mapping with the stored file's identity at
//! the top level and a `derivatives` key holding nested mappings/sequences of
//! further file entries. A bare top-level array is accepted for attachments
//! that consist only of indexed derivatives. The legacy two-field format
//! (`{"original": ..., "<version>": ...}`) is read by mapping `original` to
//! the top-level file and every other key into `derivatives`.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::{DataError, FileData};

/// Serialized derivative tree: nested mappings/sequences whose leaves are
/// file entries.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeData {
    File(FileData),
    Map(IndexMap<String, TreeData>),
    List(Vec<TreeData>),
}

impl TreeData {
    pub fn is_empty(&self) -> bool {
        match self {
            TreeData::File(_) => false,
            TreeData::Map(map) => map.is_empty(),
            TreeData::List(list) => list.is_empty(),
        }
    }

    /// Parses a node of the serialized tree. An object with an `id` key is a
    /// file entry; any other object is a nested mapping; arrays are
    /// sequences.
    pub fn from_value(value: &Value) -> Result<TreeData, DataError> {
        match value {
            Value::Object(map) if map.contains_key("id") => {
                Ok(TreeData::File(FileData::from_value(value)?))
            }
            Value::Object(map) => {
                let mut entries = IndexMap::with_capacity(map.len());
                for (key, value) in map {
                    entries.insert(key.clone(), TreeData::from_value(value)?);
                }
                Ok(TreeData::Map(entries))
            }
            Value::Array(items) => {
                let mut entries = Vec::with_capacity(items.len());
                for item in items {
                    entries.push(TreeData::from_value(item)?);
                }
                Ok(TreeData::List(entries))
            }
            other => Err(DataError::UnknownShape(format!(
                "derivative node must be an object or array, got {other}"
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            TreeData::File(file) => file.to_value(),
            TreeData::Map(map) => {
                let mut object = Map::new();
                for (key, node) in map {
                    object.insert(key.clone(), node.to_value());
                }
                Value::Object(object)
            }
            TreeData::List(list) => Value::Array(list.iter().map(TreeData::to_value).collect()),
        }
    }
}

/// Parsed attachment column data: the optional original file plus the
/// derivative tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttachmentData {
    pub file: Option<FileData>,
    pub derivatives: Option<TreeData>,
}

impl AttachmentData {
    pub fn is_empty(&self) -> bool {
        self.file.is_none() && self.derivatives.as_ref().map_or(true, TreeData::is_empty)
    }

    /// Parses column data. `null` clears the attachment; unrecognized shapes
    /// fail with [`DataError::UnknownShape`].
    pub fn parse(value: &Value) -> Result<AttachmentData, DataError> {
        match value {
            Value::Null => Ok(AttachmentData::default()),
            Value::Array(_) => Ok(AttachmentData {
                file: None,
                derivatives: non_empty(TreeData::from_value(value)?),
            }),
            Value::Object(map) if map.contains_key("id") => {
                if map.contains_key("original") {
                    return Err(DataError::MixedLegacy(
                        "both \"id\" and \"original\" present".into(),
                    ));
                }
                let file = FileData::from_value(value)?;
                let derivatives = match map.get("derivatives") {
                    None | Some(Value::Null) => None,
                    Some(node) => non_empty(TreeData::from_value(node)?),
                };
                Ok(AttachmentData {
                    file: Some(file),
                    derivatives,
                })
            }
            Value::Object(map) if map.contains_key("original") => {
                if map.contains_key("derivatives") {
                    return Err(DataError::MixedLegacy(
                        "both \"original\" and \"derivatives\" present".into(),
                    ));
                }
                let file = match &map["original"] {
                    Value::Null => None,
                    node => Some(FileData::from_value(node)?),
                };
                let mut versions = IndexMap::new();
                for (key, node) in map {
                    if key == "original" {
                        continue;
                    }
                    versions.insert(key.clone(), TreeData::from_value(node)?);
                }
                Ok(AttachmentData {
                    file,
                    derivatives: non_empty(TreeData::Map(versions)),
                })
            }
            other => Err(DataError::UnknownShape(format!(
                "attachment data must be a file object, array or null, got {other}"
            ))),
        }
    }

    /// Parses column data from its JSON string encoding.
    pub fn parse_json(data: &str) -> Result<AttachmentData, DataError> {
        let value: Value = serde_json::from_str(data)?;
        Self::parse(&value)
    }

    /// Serializes back to the column value, or `None` when there is nothing
    /// to persist.
    pub fn to_value(&self) -> Option<Value> {
        let derivatives = self
            .derivatives
            .as_ref()
            .filter(|tree| !tree.is_empty())
            .map(TreeData::to_value);

        match (&self.file, derivatives) {
            (None, None) => None,
            (Some(file), None) => Some(file.to_value()),
            (file, Some(derivatives)) => {
                let mut map = match file {
                    Some(file) => match file.to_value() {
                        Value::Object(map) => map,
                        _ => Map::new(),
                    },
                    None => Map::new(),
                };
                map.insert("derivatives".into(), derivatives);
                Some(Value::Object(map))
            }
        }
    }

    /// Serializes to the JSON string persisted in the column.
    pub fn to_json(&self) -> Result<Option<String>, DataError> {
        match self.to_value() {
            Some(value) => Ok(Some(serde_json::to_string(&value)?)),
            None => Ok(None),
        }
    }
}

fn non_empty(tree: TreeData) -> Option<TreeData> {
    (!tree.is_empty()).then_some(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileMetadata;
    use serde_json::json;

    fn file_value(id: &str) -> Value {
        json!({"id": id, "storage": "store", "metadata": {"size": 4, "filename": null, "mime_type": null}})
    }

    #[test]
    fn test_parse_file_with_derivatives() {
        let value = json!({
            "id": "orig",
            "storage": "store",
            "metadata": {"size": 4, "filename": null, "mime_type": null},
            "derivatives": {"small": file_value("small"), "pages": [file_value("p1")]},
        });

        let data = AttachmentData::parse(&value).unwrap();
        assert_eq!(data.file.as_ref().unwrap().id, "orig");

        let TreeData::Map(derivatives) = data.derivatives.unwrap() else {
            panic!("expected mapping");
        };
        assert!(matches!(derivatives["small"], TreeData::File(_)));
        assert!(matches!(&derivatives["pages"], TreeData::List(items) if items.len() == 1));
    }

    #[test]
    fn test_parse_null_and_empty_derivatives() {
        assert!(AttachmentData::parse(&Value::Null).unwrap().is_empty());

        let value = json!({"id": "orig", "storage": "store", "derivatives": {}});
        let data = AttachmentData::parse(&value).unwrap();
        assert!(data.derivatives.is_none());
    }

    #[test]
    fn test_parse_bare_array() {
        let value = json!([file_value("a"), file_value("b")]);
        let data = AttachmentData::parse(&value).unwrap();

        assert!(data.file.is_none());
        assert!(matches!(data.derivatives, Some(TreeData::List(ref items)) if items.len() == 2));
    }

    #[test]
    fn test_parse_legacy_versions() {
        let value = json!({"original": file_value("orig"), "thumb": file_value("thumb")});
        let data = AttachmentData::parse(&value).unwrap();

        assert_eq!(data.file.as_ref().unwrap().id, "orig");
        let TreeData::Map(derivatives) = data.derivatives.unwrap() else {
            panic!("expected mapping");
        };
        assert!(matches!(&derivatives["thumb"], TreeData::File(file) if file.id == "thumb"));
    }

    #[test]
    fn test_parse_legacy_null_original() {
        let value = json!({"original": null, "thumb": file_value("thumb")});
        let data = AttachmentData::parse(&value).unwrap();

        assert!(data.file.is_none());
        assert!(data.derivatives.is_some());
    }

    #[test]
    fn test_rejects_mixed_legacy_and_native() {
        let value = json!({"original": file_value("orig"), "derivatives": {}});
        assert!(matches!(
            AttachmentData::parse(&value),
            Err(DataError::MixedLegacy(_))
        ));

        let mut mixed = file_value("orig");
        mixed["original"] = file_value("other");
        assert!(matches!(
            AttachmentData::parse(&mixed),
            Err(DataError::MixedLegacy(_))
        ));
    }

    #[test]
    fn test_rejects_unknown_shapes() {
        assert!(matches!(
            AttachmentData::parse(&json!("nope")),
            Err(DataError::UnknownShape(_))
        ));
        assert!(matches!(
            AttachmentData::parse(&json!({"something": "else"})),
            Err(DataError::UnknownShape(_))
        ));
    }

    #[test]
    fn test_roundtrip() {
        let data = AttachmentData {
            file: Some(FileData::new("store", "orig", FileMetadata::default())),
            derivatives: Some(TreeData::Map(IndexMap::from([(
                "small".to_string(),
                TreeData::File(FileData::new("store", "small", FileMetadata::default())),
            )]))),
        };

        let json = data.to_json().unwrap().unwrap();
        let parsed = AttachmentData::parse_json(&json).unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_to_value_derivatives_only() {
        let data = AttachmentData {
            file: None,
            derivatives: Some(TreeData::List(vec![TreeData::File(FileData::new(
                "store",
                "a",
                FileMetadata::default(),
            ))])),
        };

        let value = data.to_value().unwrap();
        assert!(value["derivatives"].is_array());
        assert!(value.get("id").is_none());
    }

    #[test]
    fn test_to_value_empty_is_none() {
        assert!(AttachmentData::default().to_value().is_none());
        assert!(AttachmentData {
            file: None,
            derivatives: Some(TreeData::Map(IndexMap::new())),
        }
        .to_value()
        .is_none());
    }
}
