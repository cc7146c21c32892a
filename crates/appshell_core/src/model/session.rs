//! Session domain model.
//!
//! # Invariants
//! - `PrincipalId` is never empty.
//! - A `Session` value is immutable once published; a new sign-in produces a
//!   new value.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Opaque, provider-assigned principal identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Returns `None` for blank input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return None;
        }
        Some(Self(value))
    }

    /// Wraps an identifier minted by a backend, which is never blank.
    pub(crate) fn assigned(value: String) -> Self {
        Self(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PrincipalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the signed-in principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub uid: PrincipalId,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

impl Session {
    pub fn new(uid: PrincipalId, email: Option<String>) -> Self {
        Self {
            uid,
            display_name: None,
            email,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Best human-readable label: display name, then email, then uid.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or_else(|| self.uid.as_str())
    }

    /// Whether `other` belongs to the same signed-in principal.
    pub fn same_principal(&self, other: &Session) -> bool {
        self.uid == other.uid
    }
}

/// Read-only view handed to UI consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub session: Option<Session>,
    /// False until the provider's persisted session has been resolved once.
    pub resolved: bool,
}

impl AuthSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_loading(&self) -> bool {
        !self.resolved
    }
}

/// Third-party identity providers offering a hosted consent flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityProvider {
    Google,
    Github,
    Microsoft,
    Apple,
}

impl IdentityProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Github => "github",
            Self::Microsoft => "microsoft",
            Self::Apple => "apple",
        }
    }

    pub fn parse(value: &str) -> Result<Self, UnknownProviderError> {
        match value.trim() {
            "google" => Ok(Self::Google),
            "github" => Ok(Self::Github),
            "microsoft" => Ok(Self::Microsoft),
            "apple" => Ok(Self::Apple),
            other => Err(UnknownProviderError(other.to_string())),
        }
    }
}

impl Display for IdentityProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProviderError(pub String);

impl Display for UnknownProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "identity provider is unsupported: {}", self.0)
    }
}

impl Error for UnknownProviderError {}

#[cfg(test)]
mod tests {
    use super::{AuthSnapshot, IdentityProvider, PrincipalId, Session};

    #[test]
    fn principal_id_rejects_blank_values() {
        assert!(PrincipalId::new("  ").is_none());
        assert_eq!(PrincipalId::new("uid-1").unwrap().as_str(), "uid-1");
    }

    #[test]
    fn label_prefers_display_name_then_email() {
        let uid = PrincipalId::new("uid-1").unwrap();
        let bare = Session::new(uid.clone(), None);
        assert_eq!(bare.label(), "uid-1");

        let with_email = Session::new(uid.clone(), Some("a@example.com".to_string()));
        assert_eq!(with_email.label(), "a@example.com");
        assert_eq!(with_email.with_display_name("Ada").label(), "Ada");
    }

    #[test]
    fn snapshot_reports_loading_until_resolved() {
        let snapshot = AuthSnapshot::default();
        assert!(snapshot.is_loading());
        assert!(!snapshot.is_authenticated());
    }

    #[test]
    fn identity_provider_parses_stable_ids() {
        for provider in [
            IdentityProvider::Google,
            IdentityProvider::Github,
            IdentityProvider::Microsoft,
            IdentityProvider::Apple,
        ] {
            assert_eq!(IdentityProvider::parse(provider.as_str()), Ok(provider));
        }
        assert!(IdentityProvider::parse("myspace").is_err());
    }

    #[test]
    fn session_serializes_with_camel_case_fields() {
        let session = Session::new(PrincipalId::new("u").unwrap(), None).with_display_name("Ada");
        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["uid"], "u");
        assert_eq!(json["displayName"], "Ada");
    }
}
