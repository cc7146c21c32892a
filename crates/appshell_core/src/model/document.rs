//! Document domain model.
//!
//! # Responsibility
//! - Define the stored document shape shared by every collection.
//! - Name the system-managed fields the repository owns.
//!
//! # Invariants
//! - `id` is non-empty and never changes after creation.
//! - `created_at` is set once; `updated_at >= created_at`.
//! - Collection names and document ids are non-empty and contain no `/`.

use crate::clock::EpochMs;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Schema-less field map.
pub type Fields = Map<String, Value>;

/// Provider-assigned document identifier.
pub type DocumentId = String;

pub const FIELD_ID: &str = "id";
pub const FIELD_CREATED_AT: &str = "createdAt";
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// Field names the repository manages on behalf of callers.
pub const SYSTEM_FIELDS: [&str; 3] = [FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT];

/// Document as held by the remote store: identifier plus raw fields
/// (timestamps included).
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: DocumentId,
    pub fields: Fields,
}

/// Document as returned to callers, with caller data typed as `T`.
///
/// Serializes flat: `{ "id", ...data, "createdAt", "updatedAt" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document<T = Fields> {
    pub id: DocumentId,
    #[serde(flatten)]
    pub data: T,
    pub created_at: EpochMs,
    pub updated_at: EpochMs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegmentError {
    Empty(&'static str),
    ContainsSlash { kind: &'static str, value: String },
}

impl Display for PathSegmentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty(kind) => write!(f, "{kind} must not be empty"),
            Self::ContainsSlash { kind, value } => {
                write!(f, "{kind} must not contain `/`: {value}")
            }
        }
    }
}

impl Error for PathSegmentError {}

pub fn validate_collection_name(name: &str) -> Result<(), PathSegmentError> {
    validate_segment("collection name", name)
}

pub fn validate_document_id(id: &str) -> Result<(), PathSegmentError> {
    validate_segment("document id", id)
}

fn validate_segment(kind: &'static str, value: &str) -> Result<(), PathSegmentError> {
    if value.trim().is_empty() {
        return Err(PathSegmentError::Empty(kind));
    }
    if value.contains('/') {
        return Err(PathSegmentError::ContainsSlash {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Removes every system-managed field from `fields`.
pub fn strip_system_fields(fields: &mut Fields) {
    for name in SYSTEM_FIELDS {
        fields.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        strip_system_fields, validate_collection_name, validate_document_id, Document, Fields,
        PathSegmentError,
    };
    use serde_json::json;

    #[test]
    fn document_serializes_flat_with_camel_case_timestamps() {
        let mut data = Fields::new();
        data.insert("text".to_string(), json!("hi"));
        let document = Document {
            id: "n1".to_string(),
            data,
            created_at: 10,
            updated_at: 10,
        };

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(
            value,
            json!({"id": "n1", "text": "hi", "createdAt": 10, "updatedAt": 10})
        );
    }

    #[test]
    fn path_segments_reject_empty_and_slashes() {
        assert!(validate_collection_name("notes").is_ok());
        assert_eq!(
            validate_collection_name(""),
            Err(PathSegmentError::Empty("collection name"))
        );
        assert!(matches!(
            validate_document_id("a/b"),
            Err(PathSegmentError::ContainsSlash { .. })
        ));
    }

    #[test]
    fn strip_system_fields_keeps_user_fields() {
        let mut fields = json!({"id": "x", "createdAt": 1, "updatedAt": 2, "text": "t"})
            .as_object()
            .cloned()
            .unwrap();
        strip_system_fields(&mut fields);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["text"], "t");
    }
}
