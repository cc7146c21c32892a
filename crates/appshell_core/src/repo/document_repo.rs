//! Generic document repository over the remote document store.
//!
//! # Responsibility
//! - Provide CRUD and constraint queries over any collection and record
//!   shape.
//! - Own the `id`, `createdAt` and `updatedAt` bookkeeping for every caller.
//!
//! # Invariants
//! - Writes stamp `createdAt == updatedAt` on create and refresh only
//!   `updatedAt` on update; callers cannot set system fields.
//! - Read paths reject documents without an id or valid timestamps instead of
//!   masking them.
//! - `get` and `list` report "nothing found" as `None`/empty, never as an
//!   error; `delete` is idempotent.

use crate::backend::{BackendError, BackendErrorCode, DocumentBackend};
use crate::clock::{Clock, EpochMs, SystemClock};
use crate::model::document::{
    strip_system_fields, validate_collection_name, validate_document_id, Document, DocumentId,
    Fields, PathSegmentError, RawDocument, FIELD_CREATED_AT, FIELD_UPDATED_AT,
};
use crate::model::query::{validate_constraints, Constraint, QueryValidationError};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    InvalidPath(PathSegmentError),
    InvalidQuery(QueryValidationError),
    /// Record data that cannot be stored, or stored data that cannot be read.
    InvalidData(String),
    NotFound { collection: String, id: DocumentId },
    PermissionDenied(BackendError),
    Network(BackendError),
    Backend(BackendError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(err) => write!(f, "{err}"),
            Self::InvalidQuery(err) => write!(f, "invalid query: {err}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
            Self::NotFound { collection, id } => write!(f, "document not found: {collection}/{id}"),
            Self::PermissionDenied(err) => write!(f, "permission denied: {}", err.message),
            Self::Network(err) => write!(f, "network error: {}", err.message),
            Self::Backend(err) => write!(f, "document store failed: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidPath(err) => Some(err),
            Self::InvalidQuery(err) => Some(err),
            Self::PermissionDenied(err) | Self::Network(err) | Self::Backend(err) => Some(err),
            Self::InvalidData(_) | Self::NotFound { .. } => None,
        }
    }
}

impl From<PathSegmentError> for StoreError {
    fn from(value: PathSegmentError) -> Self {
        Self::InvalidPath(value)
    }
}

impl From<QueryValidationError> for StoreError {
    fn from(value: QueryValidationError) -> Self {
        Self::InvalidQuery(value)
    }
}

impl From<BackendError> for StoreError {
    fn from(value: BackendError) -> Self {
        match value.code {
            BackendErrorCode::PermissionDenied => Self::PermissionDenied(value),
            BackendErrorCode::Network | BackendErrorCode::RateLimited => Self::Network(value),
            BackendErrorCode::InvalidArgument => Self::InvalidData(value.message),
            _ => Self::Backend(value),
        }
    }
}

/// Schema-agnostic repository with uniform timestamp bookkeeping.
pub struct DocumentRepository {
    backend: Arc<dyn DocumentBackend>,
    clock: Arc<dyn Clock>,
}

impl DocumentRepository {
    pub fn new(backend: Arc<dyn DocumentBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn with_system_clock(backend: Arc<dyn DocumentBackend>) -> Self {
        Self::new(backend, Arc::new(SystemClock::new()))
    }

    /// Creates a document and returns its identifier.
    ///
    /// With `explicit_id` the document at that id is created or overwritten;
    /// otherwise the store assigns a fresh id.
    pub async fn create<T>(
        &self,
        collection: &str,
        data: &T,
        explicit_id: Option<&str>,
    ) -> StoreResult<DocumentId>
    where
        T: Serialize + ?Sized + Sync,
    {
        validate_collection_name(collection)?;
        if let Some(id) = explicit_id {
            validate_document_id(id)?;
        }

        let mut fields = to_fields(data)?;
        let now = self.clock.now_ms();
        fields.insert(FIELD_CREATED_AT.to_string(), Value::from(now));
        fields.insert(FIELD_UPDATED_AT.to_string(), Value::from(now));

        let started_at = Instant::now();
        let id = self
            .backend
            .set_document(collection, explicit_id, fields)
            .await
            .map_err(|err| failure("doc_create", collection, err))?;
        if id.trim().is_empty() {
            return Err(StoreError::InvalidData(
                "store returned an empty document id".to_string(),
            ));
        }

        info!(
            "event=doc_create module=repo status=ok collection={} explicit_id={} duration_ms={}",
            collection,
            explicit_id.is_some(),
            started_at.elapsed().as_millis()
        );
        Ok(id)
    }

    /// Reads one document; `None` when nothing exists at `id`.
    pub async fn get<T>(&self, collection: &str, id: &str) -> StoreResult<Option<Document<T>>>
    where
        T: DeserializeOwned,
    {
        validate_collection_name(collection)?;
        validate_document_id(id)?;

        let raw = self
            .backend
            .get_document(collection, id)
            .await
            .map_err(|err| failure("doc_get", collection, err))?;
        raw.map(parse_document).transpose()
    }

    /// Lists documents matching every constraint, evaluated by the store.
    pub async fn list<T>(
        &self,
        collection: &str,
        constraints: &[Constraint],
    ) -> StoreResult<Vec<Document<T>>>
    where
        T: DeserializeOwned,
    {
        validate_collection_name(collection)?;
        validate_constraints(constraints)?;

        let started_at = Instant::now();
        let raw = self
            .backend
            .query_documents(collection, constraints)
            .await
            .map_err(|err| failure("doc_list", collection, err))?;
        let documents = raw
            .into_iter()
            .map(parse_document)
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(
            "event=doc_list module=repo status=ok collection={} constraints={} results={} duration_ms={}",
            collection,
            constraints.len(),
            documents.len(),
            started_at.elapsed().as_millis()
        );
        Ok(documents)
    }

    /// Merges `partial` into an existing document and refreshes `updatedAt`.
    ///
    /// Fields absent from `partial` are left untouched.
    pub async fn update<P>(&self, collection: &str, id: &str, partial: &P) -> StoreResult<()>
    where
        P: Serialize + ?Sized + Sync,
    {
        validate_collection_name(collection)?;
        validate_document_id(id)?;

        let mut fields = to_fields(partial)?;
        fields.insert(FIELD_UPDATED_AT.to_string(), Value::from(self.clock.now_ms()));

        self.backend
            .update_document(collection, id, fields)
            .await
            .map_err(|err| match err.code {
                BackendErrorCode::NotFound => StoreError::NotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                },
                _ => failure("doc_update", collection, err),
            })?;

        info!("event=doc_update module=repo status=ok collection={collection}");
        Ok(())
    }

    /// Removes a document. Deleting a missing document succeeds.
    pub async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        validate_collection_name(collection)?;
        validate_document_id(id)?;

        match self.backend.delete_document(collection, id).await {
            Ok(()) => {}
            Err(err) if err.code == BackendErrorCode::NotFound => {
                debug!("event=doc_delete module=repo status=ok collection={collection} missing=true");
                return Ok(());
            }
            Err(err) => return Err(failure("doc_delete", collection, err)),
        }

        info!("event=doc_delete module=repo status=ok collection={collection}");
        Ok(())
    }
}

/// Serializes caller data to a field map with system fields removed.
fn to_fields<T: Serialize + ?Sized>(data: &T) -> StoreResult<Fields> {
    let value = serde_json::to_value(data)
        .map_err(|err| StoreError::InvalidData(format!("record is not serializable: {err}")))?;
    let Value::Object(mut fields) = value else {
        return Err(StoreError::InvalidData(
            "record must serialize to an object".to_string(),
        ));
    };
    strip_system_fields(&mut fields);
    Ok(fields)
}

fn parse_document<T: DeserializeOwned>(raw: RawDocument) -> StoreResult<Document<T>> {
    let RawDocument { id, mut fields } = raw;
    if id.trim().is_empty() {
        return Err(StoreError::InvalidData(
            "stored document has an empty id".to_string(),
        ));
    }

    let created_at = take_timestamp(&mut fields, FIELD_CREATED_AT, &id)?;
    let updated_at = take_timestamp(&mut fields, FIELD_UPDATED_AT, &id)?;
    if updated_at < created_at {
        return Err(StoreError::InvalidData(format!(
            "document `{id}` has updatedAt {updated_at} earlier than createdAt {created_at}"
        )));
    }
    strip_system_fields(&mut fields);

    let data = serde_json::from_value(Value::Object(fields)).map_err(|err| {
        StoreError::InvalidData(format!("document `{id}` does not match record shape: {err}"))
    })?;

    Ok(Document {
        id,
        data,
        created_at,
        updated_at,
    })
}

fn take_timestamp(fields: &mut Fields, name: &str, id: &str) -> StoreResult<EpochMs> {
    fields
        .remove(name)
        .as_ref()
        .and_then(Value::as_i64)
        .ok_or_else(|| {
            StoreError::InvalidData(format!("document `{id}` is missing a valid `{name}`"))
        })
}

fn failure(event: &str, collection: &str, err: BackendError) -> StoreError {
    warn!(
        "event={} module=repo status=error collection={} error_code={}",
        event,
        collection,
        err.code.as_str()
    );
    err.into()
}
