//! File object model and path-key normalization.

use crate::clock::EpochMs;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

static REPEATED_SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/{2,}").expect("valid slash regex"));

/// User-defined object metadata.
pub type CustomMetadata = BTreeMap<String, String>;

/// Upload payload for one object key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub path: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub custom_metadata: CustomMetadata,
}

impl UploadRequest {
    pub fn new(path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            bytes: bytes.into(),
            content_type: None,
            custom_metadata: CustomMetadata::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_metadata.insert(key.into(), value.into());
        self
    }
}

/// Stored object metadata as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub size_bytes: u64,
    pub content_type: Option<String>,
    pub custom_metadata: CustomMetadata,
    pub created_at: EpochMs,
    pub updated_at: EpochMs,
}

/// One listed object with its resolved download reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub path: String,
    pub download_url: String,
}

/// Normalizes a folder key: trims whitespace, collapses repeated `/`, strips
/// leading/trailing `/`. The empty string denotes the root folder.
pub fn normalize_folder_path(raw: &str) -> String {
    REPEATED_SLASH_RE
        .replace_all(raw.trim(), "/")
        .trim_matches('/')
        .to_string()
}

/// Normalizes an object key like `normalize_folder_path`; returns `None`
/// when nothing addressable remains.
pub fn normalize_object_path(raw: &str) -> Option<String> {
    let normalized = normalize_folder_path(raw);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Returns the last segment of a normalized key.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::{file_name, normalize_folder_path, normalize_object_path, UploadRequest};

    #[test]
    fn normalizes_slashes_and_whitespace() {
        assert_eq!(
            normalize_object_path(" /avatars//u1///photo.png/ ").as_deref(),
            Some("avatars/u1/photo.png")
        );
        assert_eq!(normalize_folder_path("///"), "");
        assert_eq!(normalize_object_path("  / "), None);
    }

    #[test]
    fn file_name_is_last_segment() {
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("root.txt"), "root.txt");
    }

    #[test]
    fn upload_request_builder_collects_metadata() {
        let request = UploadRequest::new("docs/a.txt", b"abc".to_vec())
            .with_content_type("text/plain")
            .with_metadata("owner", "u1");
        assert_eq!(request.content_type.as_deref(), Some("text/plain"));
        assert_eq!(request.custom_metadata["owner"], "u1");
    }
}
