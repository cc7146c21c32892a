//! Remote backend-as-a-service boundary.
//!
//! # Responsibility
//! - Define the async contracts the services depend on for authentication,
//!   document storage and file storage.
//! - Carry remote failures in one `BackendError` envelope that each service
//!   maps onto its own error kind.
//!
//! # Invariants
//! - Implementations are `Send + Sync` and shared behind `Arc<dyn ...>`.
//! - No local state is mutated by a backend call that returns an error.

use crate::model::document::{DocumentId, Fields, RawDocument};
use crate::model::file::{FileMetadata, UploadRequest};
use crate::model::query::Constraint;
use crate::model::session::{IdentityProvider, PrincipalId, Session};
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;

pub type BackendResult<T> = Result<T, BackendError>;

/// Stable failure codes reported by the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendErrorCode {
    Network,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    WeakSecret,
    InvalidCredentials,
    AccountDisabled,
    ConsentCancelled,
    ConsentRejected,
    RateLimited,
    Internal,
}

impl BackendErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::AlreadyExists => "already_exists",
            Self::InvalidArgument => "invalid_argument",
            Self::WeakSecret => "weak_secret",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccountDisabled => "account_disabled",
            Self::ConsentCancelled => "consent_cancelled",
            Self::ConsentRejected => "consent_rejected",
            Self::RateLimited => "rate_limited",
            Self::Internal => "internal",
        }
    }
}

/// Failure envelope returned by every backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub code: BackendErrorCode,
    pub message: String,
}

impl BackendError {
    pub fn new(code: BackendErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::Network, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(BackendErrorCode::PermissionDenied, message)
    }

    /// Transport-level failures the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            BackendErrorCode::Network | BackendErrorCode::RateLimited
        )
    }
}

impl Display for BackendError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code.as_str())
    }
}

impl Error for BackendError {}

/// Remote authentication operations.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    /// Resolves the session the provider persisted from an earlier run.
    async fn resolve_session(&self) -> BackendResult<Option<Session>>;

    /// Creates a principal and signs it in.
    async fn sign_up(&self, identifier: &str, secret: &str) -> BackendResult<Session>;

    /// Applies a display name to an existing principal.
    async fn update_profile(&self, uid: &PrincipalId, display_name: &str)
        -> BackendResult<Session>;

    async fn sign_in(&self, identifier: &str, secret: &str) -> BackendResult<Session>;

    /// Runs the provider-hosted consent flow.
    async fn sign_in_with_provider(&self, provider: IdentityProvider) -> BackendResult<Session>;

    async fn sign_out(&self) -> BackendResult<()>;

    /// Starts the out-of-band reset flow. Must succeed for unknown
    /// identifiers too.
    async fn send_password_reset(&self, identifier: &str) -> BackendResult<()>;
}

/// Remote document store operations.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    /// Writes `fields` as the full document content. `None` asks the store to
    /// assign a fresh identifier; `Some` creates or overwrites that document.
    async fn set_document(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> BackendResult<DocumentId>;

    async fn get_document(&self, collection: &str, id: &str)
        -> BackendResult<Option<RawDocument>>;

    async fn query_documents(
        &self,
        collection: &str,
        constraints: &[Constraint],
    ) -> BackendResult<Vec<RawDocument>>;

    /// Merges top-level `fields`; fails with `NotFound` for a missing document.
    async fn update_document(&self, collection: &str, id: &str, fields: Fields)
        -> BackendResult<()>;

    /// Removes the document; a missing document is not an error.
    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult<()>;
}

/// Remote binary object store operations.
#[async_trait]
pub trait FileBackend: Send + Sync {
    /// Stores the object, overwriting any existing object at the same key.
    async fn put_object(&self, request: UploadRequest) -> BackendResult<()>;

    async fn download_url(&self, path: &str) -> BackendResult<String>;

    async fn delete_object(&self, path: &str) -> BackendResult<()>;

    /// Lists keys directly under `folder` (empty string for the root).
    async fn list_objects(&self, folder: &str) -> BackendResult<Vec<String>>;

    async fn object_metadata(&self, path: &str) -> BackendResult<FileMetadata>;
}
