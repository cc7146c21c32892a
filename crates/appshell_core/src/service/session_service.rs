//! Session manager: the single owner of the signed-in session.
//!
//! # Responsibility
//! - Wrap remote authentication calls and keep one authoritative session.
//! - Push every session change to subscribed listeners.
//!
//! # Invariants
//! - Each successful mutating call publishes exactly one notification,
//!   except a direct switch between two principals, which publishes an absent
//!   value first so an identifier never changes without an absent state.
//! - Failed calls never touch the local session (no optimistic clearing).
//! - Session updates are versioned under one dispatch lock and delivered
//!   after it is released, so every listener observes changes in the order
//!   they were applied and may call back into the manager.
//! - `current_session()` equals the value of the latest notification once
//!   the publishing call has settled.

use crate::backend::{AuthBackend, BackendError, BackendErrorCode};
use crate::logging::mask_identifier;
use crate::model::session::{AuthSnapshot, IdentityProvider, Session};
use crate::observe::{lock_unpoisoned, ListenerRegistry, Subscription};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

pub type AuthResult<T> = Result<T, AuthError>;

/// Failure of a session operation, with a user-presentable `Display`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    InvalidInput(String),
    IdentifierTaken,
    WeakSecret(String),
    InvalidCredentials,
    AccountDisabled,
    ConsentCancelled,
    ConsentRejected(String),
    /// The principal was created and signed in, but the display name failed.
    ProfileUpdate(BackendError),
    Network(BackendError),
    Provider(BackendError),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(message) => write!(f, "{message}"),
            Self::IdentifierTaken => write!(f, "an account with this identifier already exists"),
            Self::WeakSecret(message) => write!(f, "password rejected: {message}"),
            Self::InvalidCredentials => write!(f, "invalid credentials"),
            Self::AccountDisabled => write!(f, "this account has been disabled"),
            Self::ConsentCancelled => write!(f, "sign-in was cancelled"),
            Self::ConsentRejected(message) => {
                write!(f, "sign-in was rejected by the provider: {message}")
            }
            Self::ProfileUpdate(err) => write!(
                f,
                "account created, but the display name could not be saved: {}",
                err.message
            ),
            Self::Network(err) => write!(f, "network error: {}", err.message),
            Self::Provider(err) => write!(f, "authentication failed: {err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ProfileUpdate(err) | Self::Network(err) | Self::Provider(err) => Some(err),
            _ => None,
        }
    }
}

impl From<BackendError> for AuthError {
    fn from(value: BackendError) -> Self {
        match value.code {
            BackendErrorCode::AlreadyExists => Self::IdentifierTaken,
            BackendErrorCode::WeakSecret => Self::WeakSecret(value.message),
            BackendErrorCode::InvalidArgument => Self::InvalidInput(value.message),
            // Unknown principals are reported like wrong secrets.
            BackendErrorCode::InvalidCredentials | BackendErrorCode::NotFound => {
                Self::InvalidCredentials
            }
            BackendErrorCode::AccountDisabled => Self::AccountDisabled,
            BackendErrorCode::ConsentCancelled => Self::ConsentCancelled,
            BackendErrorCode::ConsentRejected => Self::ConsentRejected(value.message),
            BackendErrorCode::Network | BackendErrorCode::RateLimited => Self::Network(value),
            _ => Self::Provider(value),
        }
    }
}

struct SessionState {
    version: u64,
    snapshot: AuthSnapshot,
}

/// Owner of the authoritative session and its listener registry.
pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    state: RwLock<SessionState>,
    dispatch: Mutex<()>,
    listeners: ListenerRegistry<Option<Session>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self {
            backend,
            state: RwLock::new(SessionState {
                version: 0,
                snapshot: AuthSnapshot::default(),
            }),
            dispatch: Mutex::new(()),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Resolves the provider's persisted session and publishes it as the
    /// initial resolution.
    ///
    /// On failure the manager stays unresolved and may be initialized again.
    pub async fn initialize(&self) -> AuthResult<Option<Session>> {
        match self.backend.resolve_session().await {
            Ok(session) => {
                info!(
                    "event=session_resolve module=session status=ok signed_in={}",
                    session.is_some()
                );
                self.publish(session.clone(), true);
                Ok(session)
            }
            Err(err) => {
                warn!(
                    "event=session_resolve module=session status=error error_code={}",
                    err.code.as_str()
                );
                Err(err.into())
            }
        }
    }

    /// Creates a principal, optionally applying a display name.
    ///
    /// # Errors
    /// - `InvalidInput` for blank identifier/secret (no network call made).
    /// - `IdentifierTaken`, `WeakSecret`, `Network` from the provider.
    /// - `ProfileUpdate` when the display name fails; the new session is
    ///   still published because the provider already signed it in.
    pub async fn register_principal(
        &self,
        identifier: &str,
        secret: &str,
        display_name: Option<&str>,
    ) -> AuthResult<Session> {
        let identifier = require_identifier(identifier)?;
        require_secret(secret)?;
        info!(
            "event=auth_register module=session status=start identifier={}",
            mask_identifier(identifier)
        );

        let session = self
            .backend
            .sign_up(identifier, secret)
            .await
            .map_err(|err| log_failure("auth_register", err))?;

        let display_name = display_name.map(str::trim).filter(|name| !name.is_empty());
        let Some(display_name) = display_name else {
            self.publish(Some(session.clone()), true);
            return Ok(session);
        };

        match self.backend.update_profile(&session.uid, display_name).await {
            Ok(updated) => {
                self.publish(Some(updated.clone()), true);
                Ok(updated)
            }
            Err(err) => {
                warn!(
                    "event=auth_profile_update module=session status=error error_code={}",
                    err.code.as_str()
                );
                self.publish(Some(session), true);
                Err(AuthError::ProfileUpdate(err))
            }
        }
    }

    /// Signs in with identifier and secret.
    pub async fn authenticate(&self, identifier: &str, secret: &str) -> AuthResult<Session> {
        let identifier = require_identifier(identifier)?;
        require_secret(secret)?;
        info!(
            "event=auth_sign_in module=session status=start identifier={}",
            mask_identifier(identifier)
        );

        let session = self
            .backend
            .sign_in(identifier, secret)
            .await
            .map_err(|err| log_failure("auth_sign_in", err))?;
        self.publish(Some(session.clone()), true);
        Ok(session)
    }

    /// Signs in through a provider-hosted consent flow.
    pub async fn authenticate_via_third_party(
        &self,
        provider: IdentityProvider,
    ) -> AuthResult<Session> {
        info!(
            "event=auth_provider_sign_in module=session status=start provider={}",
            provider.as_str()
        );
        let session = self
            .backend
            .sign_in_with_provider(provider)
            .await
            .map_err(|err| log_failure("auth_provider_sign_in", err))?;
        self.publish(Some(session.clone()), true);
        Ok(session)
    }

    /// Signs out. A failed call leaves the local session in place.
    pub async fn end_session(&self) -> AuthResult<()> {
        info!("event=auth_sign_out module=session status=start");
        self.backend
            .sign_out()
            .await
            .map_err(|err| log_failure("auth_sign_out", err))?;
        self.publish(None, true);
        Ok(())
    }

    /// Starts the out-of-band reset flow. The outcome is identical for
    /// registered and unknown identifiers.
    pub async fn request_password_reset(&self, identifier: &str) -> AuthResult<()> {
        let identifier = require_identifier(identifier)?;
        info!(
            "event=auth_password_reset module=session status=start identifier={}",
            mask_identifier(identifier)
        );
        self.backend
            .send_password_reset(identifier)
            .await
            .map_err(|err| log_failure("auth_password_reset", err))
    }

    /// Ingests a change the provider pushed on its own (token revocation,
    /// sign-out elsewhere). Returns whether a notification was published.
    pub fn observe_remote(&self, session: Option<Session>) -> bool {
        self.publish(session, false)
    }

    /// Last known session; `None` before the initial resolution too.
    pub fn current_session(&self) -> Option<Session> {
        self.read_state().snapshot.session.clone()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.read_state().snapshot.clone()
    }

    pub fn is_resolved(&self) -> bool {
        self.read_state().snapshot.resolved
    }

    /// Registers `listener` for every future session change.
    ///
    /// If the session has already been resolved, the listener first receives
    /// the current value. Dropping the returned `Subscription` keeps the
    /// listener attached; call `unsubscribe` to detach it.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Option<&Session>) + Send + Sync + 'static,
    {
        let (handle, subscription) = self
            .listeners
            .register(move |session: &Option<Session>| listener(session.as_ref()));

        let (version, snapshot) = {
            let state = self.read_state();
            (state.version, state.snapshot.clone())
        };
        if snapshot.resolved {
            handle.deliver(version, &snapshot.session);
        }

        debug!(
            "event=session_subscribe module=session status=ok subscription_id={}",
            subscription.id()
        );
        subscription
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn publish(&self, next: Option<Session>, always: bool) -> bool {
        let (version, signed_in) = {
            let _dispatch = lock_unpoisoned(&self.dispatch);
            let current = self.snapshot();

            if !always && current.resolved && current.session == next {
                return false;
            }

            if let (Some(previous), Some(incoming)) = (&current.session, &next) {
                if !previous.same_principal(incoming) {
                    self.stage(None);
                }
            }
            let signed_in = next.is_some();
            (self.stage(next), signed_in)
        };

        let delivered = self.listeners.flush();
        debug!(
            "event=session_publish module=session status=ok version={} signed_in={} listeners={}",
            version, signed_in, delivered
        );
        true
    }

    /// Records `next` as the current session and queues it for listeners.
    /// Callers hold the dispatch lock.
    fn stage(&self, next: Option<Session>) -> u64 {
        let version = {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            state.version += 1;
            state.snapshot = AuthSnapshot {
                session: next.clone(),
                resolved: true,
            };
            state.version
        };
        self.listeners.stage(version, next);
        version
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn require_identifier(identifier: &str) -> AuthResult<&str> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AuthError::InvalidInput(
            "identifier must not be empty".to_string(),
        ));
    }
    Ok(trimmed)
}

fn require_secret(secret: &str) -> AuthResult<()> {
    if secret.is_empty() {
        return Err(AuthError::InvalidInput(
            "password must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn log_failure(event: &str, err: BackendError) -> AuthError {
    warn!(
        "event={} module=session status=error error_code={} retryable={}",
        event,
        err.code.as_str(),
        err.is_retryable()
    );
    err.into()
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use crate::backend::{BackendError, BackendErrorCode};
    use std::error::Error;

    #[test]
    fn backend_codes_map_to_auth_errors() {
        let taken = BackendError::new(BackendErrorCode::AlreadyExists, "in use");
        assert_eq!(AuthError::from(taken), AuthError::IdentifierTaken);

        let unknown = BackendError::not_found("no such user");
        assert_eq!(AuthError::from(unknown), AuthError::InvalidCredentials);

        let offline = BackendError::network("offline");
        assert!(matches!(AuthError::from(offline), AuthError::Network(_)));

        let internal = BackendError::new(BackendErrorCode::Internal, "boom");
        assert!(matches!(AuthError::from(internal), AuthError::Provider(_)));
    }

    #[test]
    fn messages_are_user_presentable_and_chain_sources() {
        let err = AuthError::Network(BackendError::network("connection reset"));
        assert_eq!(err.to_string(), "network error: connection reset");
        assert!(err.source().is_some());
        assert!(AuthError::InvalidCredentials.source().is_none());
    }
}
