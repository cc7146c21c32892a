//! File store service over the remote object store.
//!
//! # Invariants
//! - Every key is normalized before it reaches the backend.
//! - Upload overwrites any object at the same key.

use crate::backend::{BackendError, BackendErrorCode, FileBackend};
use crate::model::file::{
    normalize_folder_path, normalize_object_path, FileEntry, FileMetadata, UploadRequest,
};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

pub type FileResult<T> = Result<T, FileError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileError {
    InvalidPath(String),
    NotFound(String),
    PermissionDenied(BackendError),
    Network(BackendError),
    Backend(BackendError),
}

impl Display for FileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidPath(path) => write!(f, "invalid file path: `{path}`"),
            Self::NotFound(path) => write!(f, "file not found: {path}"),
            Self::PermissionDenied(err) => write!(f, "permission denied: {}", err.message),
            Self::Network(err) => write!(f, "network error: {}", err.message),
            Self::Backend(err) => write!(f, "file storage failed: {err}"),
        }
    }
}

impl Error for FileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::PermissionDenied(err) | Self::Network(err) | Self::Backend(err) => Some(err),
            Self::InvalidPath(_) | Self::NotFound(_) => None,
        }
    }
}

impl FileError {
    fn from_backend(path: &str, err: BackendError) -> Self {
        match err.code {
            BackendErrorCode::NotFound => Self::NotFound(path.to_string()),
            BackendErrorCode::PermissionDenied => Self::PermissionDenied(err),
            BackendErrorCode::Network | BackendErrorCode::RateLimited => Self::Network(err),
            _ => Self::Backend(err),
        }
    }
}

/// Upload/download/delete/list/metadata over path-like keys.
pub struct FileStore {
    backend: Arc<dyn FileBackend>,
}

impl FileStore {
    pub fn new(backend: Arc<dyn FileBackend>) -> Self {
        Self { backend }
    }

    /// Uploads the payload and returns its download URL.
    pub async fn upload(&self, mut request: UploadRequest) -> FileResult<String> {
        let path = object_path(&request.path)?;
        let size = request.bytes.len();
        let started_at = Instant::now();
        request.path = path.clone();

        self.backend
            .put_object(request)
            .await
            .map_err(|err| failure("file_upload", &path, err))?;
        let url = self
            .backend
            .download_url(&path)
            .await
            .map_err(|err| failure("file_upload", &path, err))?;

        info!(
            "event=file_upload module=file status=ok size_bytes={} duration_ms={}",
            size,
            started_at.elapsed().as_millis()
        );
        Ok(url)
    }

    pub async fn download_url(&self, path: &str) -> FileResult<String> {
        let path = object_path(path)?;
        self.backend
            .download_url(&path)
            .await
            .map_err(|err| failure("file_download_url", &path, err))
    }

    /// Deletes the object; a missing object is reported as `NotFound`.
    pub async fn delete(&self, path: &str) -> FileResult<()> {
        let path = object_path(path)?;
        self.backend
            .delete_object(&path)
            .await
            .map_err(|err| failure("file_delete", &path, err))?;
        info!("event=file_delete module=file status=ok");
        Ok(())
    }

    /// Lists objects directly under `folder` with their download URLs.
    pub async fn list(&self, folder: &str) -> FileResult<Vec<FileEntry>> {
        let folder = normalize_folder_path(folder);
        let paths = self
            .backend
            .list_objects(&folder)
            .await
            .map_err(|err| failure("file_list", &folder, err))?;

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let download_url = self
                .backend
                .download_url(&path)
                .await
                .map_err(|err| failure("file_list", &path, err))?;
            entries.push(FileEntry { path, download_url });
        }
        Ok(entries)
    }

    pub async fn metadata(&self, path: &str) -> FileResult<FileMetadata> {
        let path = object_path(path)?;
        self.backend
            .object_metadata(&path)
            .await
            .map_err(|err| failure("file_metadata", &path, err))
    }
}

fn object_path(raw: &str) -> FileResult<String> {
    normalize_object_path(raw).ok_or_else(|| FileError::InvalidPath(raw.to_string()))
}

fn failure(event: &str, path: &str, err: BackendError) -> FileError {
    warn!(
        "event={} module=file status=error error_code={}",
        event,
        err.code.as_str()
    );
    FileError::from_backend(path, err)
}
