//! In-process backend with provider-like semantics.
//!
//! # Responsibility
//! - Stand in for the remote platform in tests and local smoke runs.
//! - Reproduce the provider behaviors callers depend on: password policy,
//!   duplicate accounts, disabled accounts, consent outcomes, server-side
//!   constraint evaluation and download-URL resolution.
//! - Allow scripted failures per operation.
//!
//! # Invariants
//! - An injected failure is consumed by exactly one call of its operation.
//! - A failing call leaves stored state untouched.

use super::{
    AuthBackend, BackendError, BackendErrorCode, BackendResult, DocumentBackend, FileBackend,
};
use crate::clock::{Clock, EpochMs, SystemClock};
use crate::model::document::{DocumentId, Fields, RawDocument};
use crate::model::file::{file_name, CustomMetadata, FileMetadata, UploadRequest};
use crate::model::query::{validate_constraints, Constraint, FilterOp, SortDirection};
use crate::model::session::{IdentityProvider, PrincipalId, Session};
use crate::observe::lock_unpoisoned;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Minimum secret length accepted at sign-up.
pub const MIN_SECRET_CHARS: usize = 6;
pub const DEFAULT_DOWNLOAD_BASE_URL: &str = "https://storage.local.test/v0/b/appshell";

/// Backend operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BackendOp {
    ResolveSession,
    SignUp,
    UpdateProfile,
    SignIn,
    ProviderSignIn,
    SignOut,
    PasswordReset,
    SetDocument,
    GetDocument,
    QueryDocuments,
    UpdateDocument,
    DeleteDocument,
    PutObject,
    DownloadUrl,
    DeleteObject,
    ListObjects,
    ObjectMetadata,
}

/// Outcome of the next provider-hosted consent flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentScript {
    Grant {
        email: String,
        display_name: Option<String>,
    },
    Cancel,
    Reject(String),
}

#[derive(Debug, Clone)]
struct Account {
    uid: PrincipalId,
    email: String,
    secret: Option<String>,
    display_name: Option<String>,
    disabled: bool,
}

impl Account {
    fn session(&self) -> Session {
        Session {
            uid: self.uid.clone(),
            display_name: self.display_name.clone(),
            email: Some(self.email.clone()),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: Option<String>,
    custom_metadata: CustomMetadata,
    created_at: EpochMs,
    updated_at: EpochMs,
}

#[derive(Default)]
struct MemoryState {
    // Keyed by normalized email.
    accounts: BTreeMap<String, Account>,
    signed_in: Option<PrincipalId>,
    collections: BTreeMap<String, BTreeMap<DocumentId, Fields>>,
    objects: BTreeMap<String, StoredObject>,
    failures: BTreeMap<BackendOp, VecDeque<BackendError>>,
    consent: VecDeque<ConsentScript>,
    reset_outbox: Vec<String>,
    next_uid: u64,
}

impl MemoryState {
    fn take_failure(&mut self, op: BackendOp) -> BackendResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn account_by_uid_mut(&mut self, uid: &PrincipalId) -> Option<&mut Account> {
        self.accounts
            .values_mut()
            .find(|account| &account.uid == uid)
    }

    fn allocate_uid(&mut self) -> PrincipalId {
        self.next_uid += 1;
        PrincipalId::assigned(format!("uid-{:04}", self.next_uid))
    }
}

/// Shared in-memory implementation of every backend trait.
pub struct MemoryBackend {
    clock: Arc<dyn Clock>,
    download_base_url: String,
    state: Mutex<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            download_base_url: DEFAULT_DOWNLOAD_BASE_URL.to_string(),
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub fn with_download_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.download_base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Makes the next call of `op` fail with `error`. Multiple injections
    /// for one operation are consumed in order.
    pub fn fail_next(&self, op: BackendOp, error: BackendError) {
        lock_unpoisoned(&self.state)
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Queues the outcome of the next third-party consent flow. Without a
    /// script the flow grants consent for `<provider>.user@example.com`.
    pub fn script_consent(&self, script: ConsentScript) {
        lock_unpoisoned(&self.state).consent.push_back(script);
    }

    /// Disables an account; returns false when no account matches.
    pub fn disable_account(&self, identifier: &str) -> bool {
        let key = normalize_identifier(identifier);
        match lock_unpoisoned(&self.state).accounts.get_mut(&key) {
            Some(account) => {
                account.disabled = true;
                true
            }
            None => false,
        }
    }

    /// Identifiers that actually received a reset message.
    pub fn reset_outbox(&self) -> Vec<String> {
        lock_unpoisoned(&self.state).reset_outbox.clone()
    }

    pub fn signed_in_uid(&self) -> Option<PrincipalId> {
        lock_unpoisoned(&self.state).signed_in.clone()
    }

    pub fn document_count(&self, collection: &str) -> usize {
        lock_unpoisoned(&self.state)
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    pub fn object_count(&self) -> usize {
        lock_unpoisoned(&self.state).objects.len()
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "{}/o/{}?alt=media",
            self.download_base_url,
            path.replace('/', "%2F")
        )
    }
}

fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_ascii_lowercase()
}

fn looks_like_email(identifier: &str) -> bool {
    match identifier.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

#[async_trait]
impl AuthBackend for MemoryBackend {
    async fn resolve_session(&self) -> BackendResult<Option<Session>> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::ResolveSession)?;
        let Some(uid) = state.signed_in.clone() else {
            return Ok(None);
        };
        Ok(state.account_by_uid_mut(&uid).map(|account| account.session()))
    }

    async fn sign_up(&self, identifier: &str, secret: &str) -> BackendResult<Session> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::SignUp)?;

        let key = normalize_identifier(identifier);
        if !looks_like_email(&key) {
            return Err(BackendError::new(
                BackendErrorCode::InvalidArgument,
                "The email address is badly formatted.",
            ));
        }
        if secret.chars().count() < MIN_SECRET_CHARS {
            return Err(BackendError::new(
                BackendErrorCode::WeakSecret,
                format!("Password should be at least {MIN_SECRET_CHARS} characters."),
            ));
        }
        if state.accounts.contains_key(&key) {
            return Err(BackendError::new(
                BackendErrorCode::AlreadyExists,
                "The email address is already in use by another account.",
            ));
        }

        let account = Account {
            uid: state.allocate_uid(),
            email: key.clone(),
            secret: Some(secret.to_string()),
            display_name: None,
            disabled: false,
        };
        let session = account.session();
        state.signed_in = Some(account.uid.clone());
        state.accounts.insert(key, account);
        Ok(session)
    }

    async fn update_profile(
        &self,
        uid: &PrincipalId,
        display_name: &str,
    ) -> BackendResult<Session> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::UpdateProfile)?;
        let account = state
            .account_by_uid_mut(uid)
            .ok_or_else(|| BackendError::not_found(format!("no principal {uid}")))?;
        account.display_name = Some(display_name.to_string());
        Ok(account.session())
    }

    async fn sign_in(&self, identifier: &str, secret: &str) -> BackendResult<Session> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::SignIn)?;

        let key = normalize_identifier(identifier);
        let account = state
            .accounts
            .get(&key)
            .filter(|account| account.secret.as_deref() == Some(secret))
            .cloned()
            .ok_or_else(|| {
                BackendError::new(
                    BackendErrorCode::InvalidCredentials,
                    "The supplied credentials are invalid.",
                )
            })?;
        if account.disabled {
            return Err(BackendError::new(
                BackendErrorCode::AccountDisabled,
                "The user account has been disabled by an administrator.",
            ));
        }

        state.signed_in = Some(account.uid.clone());
        Ok(account.session())
    }

    async fn sign_in_with_provider(&self, provider: IdentityProvider) -> BackendResult<Session> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::ProviderSignIn)?;

        let script = state.consent.pop_front().unwrap_or(ConsentScript::Grant {
            email: format!("{}.user@example.com", provider.as_str()),
            display_name: None,
        });
        let (email, display_name) = match script {
            ConsentScript::Grant {
                email,
                display_name,
            } => (normalize_identifier(&email), display_name),
            ConsentScript::Cancel => {
                return Err(BackendError::new(
                    BackendErrorCode::ConsentCancelled,
                    "The popup has been closed by the user before finalizing the operation.",
                ))
            }
            ConsentScript::Reject(reason) => {
                return Err(BackendError::new(BackendErrorCode::ConsentRejected, reason))
            }
        };

        if !state.accounts.contains_key(&email) {
            let account = Account {
                uid: state.allocate_uid(),
                email: email.clone(),
                secret: None,
                display_name,
                disabled: false,
            };
            state.accounts.insert(email.clone(), account);
        }

        let account = state.accounts.get(&email).cloned().ok_or_else(|| {
            BackendError::new(BackendErrorCode::Internal, "account vanished during sign-in")
        })?;
        if account.disabled {
            return Err(BackendError::new(
                BackendErrorCode::AccountDisabled,
                "The user account has been disabled by an administrator.",
            ));
        }

        state.signed_in = Some(account.uid.clone());
        Ok(account.session())
    }

    async fn sign_out(&self) -> BackendResult<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::SignOut)?;
        state.signed_in = None;
        Ok(())
    }

    async fn send_password_reset(&self, identifier: &str) -> BackendResult<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::PasswordReset)?;
        let key = normalize_identifier(identifier);
        if state.accounts.contains_key(&key) {
            state.reset_outbox.push(key);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn set_document(
        &self,
        collection: &str,
        id: Option<&str>,
        fields: Fields,
    ) -> BackendResult<DocumentId> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::SetDocument)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> BackendResult<Option<RawDocument>> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::GetDocument)?;
        Ok(state
            .collections
            .get(collection)
            .and_then(|documents| documents.get(id))
            .map(|fields| RawDocument {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn query_documents(
        &self,
        collection: &str,
        constraints: &[Constraint],
    ) -> BackendResult<Vec<RawDocument>> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::QueryDocuments)?;
        validate_constraints(constraints)
            .map_err(|err| BackendError::new(BackendErrorCode::InvalidArgument, err.to_string()))?;

        Ok(match state.collections.get(collection) {
            Some(documents) => evaluate_query(documents, constraints),
            None => Vec::new(),
        })
    }

    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
    ) -> BackendResult<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::UpdateDocument)?;
        let existing = state
            .collections
            .get_mut(collection)
            .and_then(|documents| documents.get_mut(id))
            .ok_or_else(|| {
                BackendError::not_found(format!("No document to update: {collection}/{id}"))
            })?;
        for (name, value) in fields {
            existing.insert(name, value);
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> BackendResult<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::DeleteDocument)?;
        if let Some(documents) = state.collections.get_mut(collection) {
            documents.remove(id);
        }
        Ok(())
    }
}

#[async_trait]
impl FileBackend for MemoryBackend {
    async fn put_object(&self, request: UploadRequest) -> BackendResult<()> {
        let now = self.clock.now_ms();
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::PutObject)?;
        state.objects.insert(
            request.path,
            StoredObject {
                bytes: request.bytes,
                content_type: request.content_type,
                custom_metadata: request.custom_metadata,
                created_at: now,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn download_url(&self, path: &str) -> BackendResult<String> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::DownloadUrl)?;
        if !state.objects.contains_key(path) {
            return Err(object_not_found(path));
        }
        Ok(self.object_url(path))
    }

    async fn delete_object(&self, path: &str) -> BackendResult<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::DeleteObject)?;
        state
            .objects
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| object_not_found(path))
    }

    async fn list_objects(&self, folder: &str) -> BackendResult<Vec<String>> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::ListObjects)?;
        let prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{folder}/")
        };
        Ok(state
            .objects
            .keys()
            .filter(|path| {
                path.strip_prefix(prefix.as_str())
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect())
    }

    async fn object_metadata(&self, path: &str) -> BackendResult<FileMetadata> {
        let mut state = lock_unpoisoned(&self.state);
        state.take_failure(BackendOp::ObjectMetadata)?;
        let object = state
            .objects
            .get(path)
            .ok_or_else(|| object_not_found(path))?;
        Ok(FileMetadata {
            path: path.to_string(),
            name: file_name(path).to_string(),
            size_bytes: object.bytes.len() as u64,
            content_type: object.content_type.clone(),
            custom_metadata: object.custom_metadata.clone(),
            created_at: object.created_at,
            updated_at: object.updated_at,
        })
    }
}

fn object_not_found(path: &str) -> BackendError {
    BackendError::not_found(format!("Object '{path}' does not exist."))
}

fn evaluate_query(
    documents: &BTreeMap<DocumentId, Fields>,
    constraints: &[Constraint],
) -> Vec<RawDocument> {
    let mut sort_keys: Vec<(&str, SortDirection)> = Vec::new();
    let mut max_results: Option<usize> = None;
    for constraint in constraints {
        match constraint {
            Constraint::OrderBy { field, direction } => {
                sort_keys.push((field.as_str(), *direction))
            }
            Constraint::Limit { count } => max_results = Some(*count as usize),
            Constraint::Filter { .. } => {}
        }
    }

    // Documents lacking an ordered field are excluded, as the store does.
    let mut matched: Vec<(&DocumentId, &Fields)> = documents
        .iter()
        .filter(|(_, fields)| {
            constraints
                .iter()
                .all(|constraint| matches_filter(fields, constraint))
        })
        .filter(|(_, fields)| {
            sort_keys
                .iter()
                .all(|(field, _)| field_value(fields, field).is_some())
        })
        .collect();

    matched.sort_by(|(left_id, left), (right_id, right)| {
        for (field, direction) in &sort_keys {
            let ordering = compare_values(field_value(left, field), field_value(right, field));
            let ordering = match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        left_id.cmp(right_id)
    });

    if let Some(max_results) = max_results {
        matched.truncate(max_results);
    }

    matched
        .into_iter()
        .map(|(id, fields)| RawDocument {
            id: id.clone(),
            fields: fields.clone(),
        })
        .collect()
}

fn matches_filter(fields: &Fields, constraint: &Constraint) -> bool {
    let Constraint::Filter { field, op, value } = constraint else {
        return true;
    };
    let Some(actual) = field_value(fields, field) else {
        return false;
    };

    match op {
        FilterOp::Eq => values_equal(actual, value),
        FilterOp::Ne => !values_equal(actual, value),
        FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
            // Range filters only match values of the same type.
            if type_rank(actual) != type_rank(value) {
                return false;
            }
            let ordering = compare_values(Some(actual), Some(value));
            match op {
                FilterOp::Lt => ordering == Ordering::Less,
                FilterOp::Le => ordering != Ordering::Greater,
                FilterOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
        FilterOp::In => value
            .as_array()
            .is_some_and(|candidates| candidates.iter().any(|c| values_equal(actual, c))),
        FilterOp::ArrayContains => actual
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(item, value))),
    }
}

/// Resolves a dotted field path (`author.name`).
fn field_value<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = fields.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn values_equal(left: &Value, right: &Value) -> bool {
    type_rank(left) == type_rank(right)
        && compare_values(Some(left), Some(right)) == Ordering::Equal
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(left: Option<&Value>, right: Option<&Value>) -> Ordering {
    let (left, right) = match (left, right) {
        (Some(left), Some(right)) => (left, right),
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
    };

    match (left, right) {
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.partial_cmp(&b).unwrap_or(Ordering::Equal)
        }
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(a), Value::Array(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                let ordering = compare_values(Some(x), Some(y));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            a.len().cmp(&b.len())
        }
        (Value::Object(_), Value::Object(_)) => left.to_string().cmp(&right.to_string()),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}
