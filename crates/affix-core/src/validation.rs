//! Upload validation hooks.
//!
//! Validators run after metadata extraction and before anything is written
//! to storage. Each returns a human-readable message per violated rule;
//! callers collect the messages instead of aborting on the first one.

use crate::FileMetadata;

pub trait Validator: Send + Sync {
    fn validate(&self, metadata: &FileMetadata, data: &[u8]) -> Vec<String>;
}

/// Rejects files larger than the given number of bytes.
pub struct MaxSize(pub u64);

impl Validator for MaxSize {
    fn validate(&self, _metadata: &FileMetadata, data: &[u8]) -> Vec<String> {
        if data.len() as u64 > self.0 {
            vec![format!(
                "file is too large ({} bytes, max is {})",
                data.len(),
                self.0
            )]
        } else {
            Vec::new()
        }
    }
}

/// Rejects files whose content type is not in the allowed set. Files with no
/// detected content type are rejected.
pub struct AllowedMimeTypes(pub Vec<String>);

impl Validator for AllowedMimeTypes {
    fn validate(&self, metadata: &FileMetadata, _data: &[u8]) -> Vec<String> {
        match metadata.mime_type.as_deref() {
            Some(mime) if self.0.iter().any(|allowed| allowed == mime) => Vec::new(),
            Some(mime) => vec![format!("type {mime} is not allowed")],
            None => vec!["could not determine content type".to_string()],
        }
    }
}

/// Rejects files whose filename extension is not in the allowed set
/// (case-insensitive). Files with no extension are rejected.
pub struct AllowedExtensions(pub Vec<String>);

impl Validator for AllowedExtensions {
    fn validate(&self, metadata: &FileMetadata, _data: &[u8]) -> Vec<String> {
        match metadata.extension() {
            Some(ext) if self.0.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)) => {
                Vec::new()
            }
            Some(ext) => vec![format!("extension {ext} is not allowed")],
            None => vec!["file has no extension".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(filename: Option<&str>, mime_type: Option<&str>) -> FileMetadata {
        FileMetadata {
            filename: filename.map(String::from),
            mime_type: mime_type.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_max_size() {
        let validator = MaxSize(4);
        assert!(validator.validate(&FileMetadata::default(), b"data").is_empty());
        assert_eq!(validator.validate(&FileMetadata::default(), b"toobig").len(), 1);
    }

    #[test]
    fn test_allowed_mime_types() {
        let validator = AllowedMimeTypes(vec!["image/jpeg".into()]);

        assert!(validator
            .validate(&metadata(None, Some("image/jpeg")), b"")
            .is_empty());
        assert_eq!(
            validator.validate(&metadata(None, Some("text/plain")), b"").len(),
            1
        );
        assert_eq!(validator.validate(&metadata(None, None), b"").len(), 1);
    }

    #[test]
    fn test_allowed_extensions() {
        let validator = AllowedExtensions(vec!["jpg".into(), "png".into()]);

        assert!(validator
            .validate(&metadata(Some("photo.JPG"), None), b"")
            .is_empty());
        assert_eq!(
            validator.validate(&metadata(Some("doc.pdf"), None), b"").len(),
            1
        );
        assert_eq!(validator.validate(&metadata(None, None), b"").len(), 1);
    }
}
