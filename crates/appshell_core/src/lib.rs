//! Client integration layer for a backend-as-a-service platform.
//! Sessions, documents, files and the install-prompt lifecycle live here;
//! UI shells consume these services and never talk to the backend directly.

pub mod backend;
pub mod clock;
pub mod config;
pub mod db;
pub mod install;
pub mod logging;
pub mod model;
pub mod observe;
pub mod repo;
pub mod service;

pub use backend::memory::{BackendOp, ConsentScript, MemoryBackend};
pub use backend::{
    AuthBackend, BackendError, BackendErrorCode, BackendResult, DocumentBackend, FileBackend,
};
pub use clock::{Clock, EpochMs, ManualClock, SystemClock, DAY_MS};
pub use config::{BackendConfig, ConfigError, ConfigResult, InstallPromptConfig, LoggingConfig};
pub use install::{
    DeferredPrompt, DisplayMode, InstallController, InstallOutcome, InstallState,
    KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore,
};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::document::{Document, DocumentId, Fields};
pub use model::file::{FileEntry, FileMetadata, UploadRequest};
pub use model::query::{filter, limit, order_by, Constraint, FilterOp, SortDirection};
pub use model::session::{AuthSnapshot, IdentityProvider, PrincipalId, Session};
pub use observe::Subscription;
pub use repo::document_repo::{DocumentRepository, StoreError, StoreResult};
pub use service::file_service::{FileError, FileResult, FileStore};
pub use service::session_service::{AuthError, AuthResult, SessionManager};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
