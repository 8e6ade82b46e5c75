//! Derivative tree: recursive container addressing uploaded files by path.
//!
//! Internal nodes are ordered-key mappings or indexed sequences, nested
//! arbitrarily; leaves are uploaded files. Every leaf is reachable by a
//! unique path of keys and indices, and map/merge operations preserve the
//! structure: a mapping never silently becomes a sequence or vice versa.

use std::fmt;

use indexmap::map::Entry;
use indexmap::IndexMap;

use affix_core::TreeData;
use affix_storage::{StorageRegistry, UploadedFile};

use crate::AttacherError;

/// One step of a derivative path: a mapping key or a sequence index.
///
/// Keys and indices are coerced at lookup time: a numeric key addresses a
/// sequence position, and an index addresses a mapping by its decimal form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn as_key(&self) -> String {
        match self {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(index) => index.to_string(),
        }
    }

    fn as_index(&self) -> Option<usize> {
        match self {
            PathSegment::Key(key) => key.parse().ok(),
            PathSegment::Index(index) => Some(*index),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Renders a path for messages and logging, e.g. `thumbs.0.small`.
pub fn format_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Debug, Clone, PartialEq)]
pub enum DerivativeTree {
    Leaf(UploadedFile),
    Map(IndexMap<String, DerivativeTree>),
    List(Vec<DerivativeTree>),
}

impl Default for DerivativeTree {
    fn default() -> Self {
        DerivativeTree::Map(IndexMap::new())
    }
}

impl DerivativeTree {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DerivativeTree::Leaf(_) => false,
            DerivativeTree::Map(map) => map.is_empty(),
            DerivativeTree::List(list) => list.is_empty(),
        }
    }

    pub fn as_leaf(&self) -> Option<&UploadedFile> {
        match self {
            DerivativeTree::Leaf(file) => Some(file),
            _ => None,
        }
    }

    /// Resolves a nested subtree. An empty path addresses the tree itself.
    pub fn get(&self, path: &[PathSegment]) -> Option<&DerivativeTree> {
        let Some((first, rest)) = path.split_first() else {
            return Some(self);
        };
        self.child(first)?.get(rest)
    }

    fn child(&self, segment: &PathSegment) -> Option<&DerivativeTree> {
        match self {
            DerivativeTree::Map(map) => map.get(&segment.as_key()),
            DerivativeTree::List(list) => list.get(segment.as_index()?),
            DerivativeTree::Leaf(_) => None,
        }
    }

    fn child_mut(&mut self, segment: &PathSegment) -> Option<&mut DerivativeTree> {
        match self {
            DerivativeTree::Map(map) => map.get_mut(&segment.as_key()),
            DerivativeTree::List(list) => {
                let index = segment.as_index()?;
                list.get_mut(index)
            }
            DerivativeTree::Leaf(_) => None,
        }
    }

    /// Every leaf together with its path, in tree order.
    pub fn leaves(&self) -> Vec<(Vec<PathSegment>, &UploadedFile)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut Vec::new(), &mut out);
        out
    }

    fn collect_leaves<'a>(
        &'a self,
        prefix: &mut Vec<PathSegment>,
        out: &mut Vec<(Vec<PathSegment>, &'a UploadedFile)>,
    ) {
        match self {
            DerivativeTree::Leaf(file) => out.push((prefix.clone(), file)),
            DerivativeTree::Map(map) => {
                for (key, child) in map {
                    prefix.push(PathSegment::Key(key.clone()));
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
            DerivativeTree::List(list) => {
                for (index, child) in list.iter().enumerate() {
                    prefix.push(PathSegment::Index(index));
                    child.collect_leaves(prefix, out);
                    prefix.pop();
                }
            }
        }
    }

    /// Replaces the leaf at an existing path.
    pub fn set_leaf(
        &mut self,
        path: &[PathSegment],
        file: UploadedFile,
    ) -> Result<(), AttacherError> {
        let Some((first, rest)) = path.split_first() else {
            *self = DerivativeTree::Leaf(file);
            return Ok(());
        };
        match self.child_mut(first) {
            Some(child) => child.set_leaf(rest, file),
            None => Err(AttacherError::TreeShape(format!(
                "no derivative at path {first}"
            ))),
        }
    }

    /// Detaches and returns the subtree at `path`. Returns `None` when the
    /// path does not resolve; the tree is left unchanged in that case.
    pub fn remove(&mut self, path: &[PathSegment]) -> Option<DerivativeTree> {
        let (first, rest) = path.split_first()?;
        if rest.is_empty() {
            match self {
                DerivativeTree::Map(map) => map.shift_remove(&first.as_key()),
                DerivativeTree::List(list) => {
                    let index = first.as_index()?;
                    (index < list.len()).then(|| list.remove(index))
                }
                DerivativeTree::Leaf(_) => None,
            }
        } else {
            self.child_mut(first)?.remove(rest)
        }
    }

    /// Deep merge. Mappings merge key-wise, sequences append positionally,
    /// and a mapping whose keys are decimal indices merges into a sequence.
    /// Leaves overwrite whatever they land on. Any other kind mismatch is a
    /// [`AttacherError::TreeShape`] error.
    pub fn merge(&mut self, other: DerivativeTree) -> Result<(), AttacherError> {
        match (&mut *self, other) {
            (DerivativeTree::Map(ours), DerivativeTree::Map(theirs)) => {
                for (key, value) in theirs {
                    match ours.entry(key) {
                        Entry::Occupied(mut entry) => entry.get_mut().merge(value)?,
                        Entry::Vacant(entry) => {
                            entry.insert(value);
                        }
                    }
                }
                Ok(())
            }
            (DerivativeTree::List(ours), DerivativeTree::List(theirs)) => {
                ours.extend(theirs);
                Ok(())
            }
            (DerivativeTree::List(ours), DerivativeTree::Map(theirs)) => {
                let mut entries = Vec::with_capacity(theirs.len());
                for (key, value) in theirs {
                    let index: usize = key.parse().map_err(|_| {
                        AttacherError::TreeShape(format!(
                            "cannot merge mapping key {key:?} into a sequence"
                        ))
                    })?;
                    entries.push((index, value));
                }
                entries.sort_by_key(|(index, _)| *index);
                for (index, value) in entries {
                    if index < ours.len() {
                        ours[index].merge(value)?;
                    } else if index == ours.len() {
                        ours.push(value);
                    } else {
                        return Err(AttacherError::TreeShape(format!(
                            "sequence merge leaves a gap at index {index}"
                        )));
                    }
                }
                Ok(())
            }
            (DerivativeTree::Map(_), DerivativeTree::List(_)) => Err(AttacherError::TreeShape(
                "cannot merge a sequence into a mapping".to_string(),
            )),
            (DerivativeTree::Leaf(_), other) => {
                *self = other;
                Ok(())
            }
            (_, leaf @ DerivativeTree::Leaf(_)) => {
                *self = leaf;
                Ok(())
            }
        }
    }

    /// Serialized form for the attachment column.
    pub fn to_data(&self) -> TreeData {
        match self {
            DerivativeTree::Leaf(file) => TreeData::File(file.data().clone()),
            DerivativeTree::Map(map) => TreeData::Map(
                map.iter()
                    .map(|(key, child)| (key.clone(), child.to_data()))
                    .collect(),
            ),
            DerivativeTree::List(list) => {
                TreeData::List(list.iter().map(DerivativeTree::to_data).collect())
            }
        }
    }

    /// Rebinds serialized data to live file handles.
    pub fn from_data(data: &TreeData, registry: &StorageRegistry) -> DerivativeTree {
        match data {
            TreeData::File(file) => {
                DerivativeTree::Leaf(UploadedFile::new(file.clone(), registry.clone()))
            }
            TreeData::Map(map) => DerivativeTree::Map(
                map.iter()
                    .map(|(key, child)| (key.clone(), Self::from_data(child, registry)))
                    .collect(),
            ),
            TreeData::List(list) => DerivativeTree::List(
                list.iter()
                    .map(|child| Self::from_data(child, registry))
                    .collect(),
            ),
        }
    }
}
