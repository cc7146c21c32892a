//! Runtime configuration for backend wiring, logging and the install prompt.
//!
//! # Responsibility
//! - Load backend project settings from `APPSHELL_*` variables (or any
//!   lookup source) with placeholder fallbacks.
//! - Reject placeholder or empty values before a client is wired.
//!
//! # Invariants
//! - Configuration structs are plain data; loading never panics.
//! - Placeholders always start with `PLACEHOLDER_PREFIX`.

use crate::clock::{EpochMs, DAY_MS};
use crate::logging::default_log_level;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const ENV_PREFIX: &str = "APPSHELL_";
pub const PLACEHOLDER_PREFIX: &str = "YOUR_";
pub const STORAGE_DOWNLOAD_HOST: &str = "https://firebasestorage.googleapis.com";

/// Default durable-storage key for the last install-prompt dismissal.
pub const DEFAULT_INSTALL_DISMISSED_KEY: &str = "pwa-install-dismissed";
/// Default suppression window after a dismissal.
pub const DEFAULT_SUPPRESSION_WINDOW_MS: EpochMs = 7 * DAY_MS;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Placeholder(&'static str),
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(field) => write!(f, "configuration value `{field}` is missing"),
            Self::Placeholder(field) => {
                write!(f, "configuration value `{field}` still holds a placeholder")
            }
            Self::InvalidValue { field, message } => {
                write!(f, "configuration value `{field}` is invalid: {message}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Project settings for the remote backend platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
}

impl BackendConfig {
    /// Loads settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, keyed by `APPSHELL_<FIELD>`.
    ///
    /// Blank values count as unset. When only the project id is known, the
    /// auth domain and storage bucket are derived from it.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |field: &str| {
            lookup(&format!("{ENV_PREFIX}{field}"))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let project_id = read("PROJECT_ID").unwrap_or_else(|| placeholder("PROJECT_ID"));
        Self {
            api_key: read("API_KEY").unwrap_or_else(|| placeholder("API_KEY")),
            auth_domain: read("AUTH_DOMAIN")
                .unwrap_or_else(|| format!("{project_id}.firebaseapp.com")),
            storage_bucket: read("STORAGE_BUCKET")
                .unwrap_or_else(|| format!("{project_id}.appspot.com")),
            messaging_sender_id: read("MESSAGING_SENDER_ID")
                .unwrap_or_else(|| placeholder("MESSAGING_SENDER_ID")),
            app_id: read("APP_ID").unwrap_or_else(|| placeholder("APP_ID")),
            project_id,
        }
    }

    /// Rejects empty values and leftover placeholders.
    pub fn validate(&self) -> ConfigResult<()> {
        let fields: [(&'static str, &str); 6] = [
            ("api_key", &self.api_key),
            ("auth_domain", &self.auth_domain),
            ("project_id", &self.project_id),
            ("storage_bucket", &self.storage_bucket),
            ("messaging_sender_id", &self.messaging_sender_id),
            ("app_id", &self.app_id),
        ];

        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(field));
            }
            if value.starts_with(PLACEHOLDER_PREFIX) {
                return Err(ConfigError::Placeholder(field));
            }
        }

        if self.project_id.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidValue {
                field: "project_id",
                message: "must not contain whitespace".to_string(),
            });
        }

        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    /// Base of the public download URLs for objects in the storage bucket.
    pub fn download_base_url(&self) -> String {
        format!("{STORAGE_DOWNLOAD_HOST}/v0/b/{}", self.storage_bucket)
    }
}

fn placeholder(field: &str) -> String {
    format!("{PLACEHOLDER_PREFIX}{field}")
}

/// Logging bootstrap settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level_string")]
    pub level: String,
    pub log_dir: PathBuf,
}

impl LoggingConfig {
    /// Uses the build-mode default level.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            level: default_level_string(),
            log_dir: log_dir.into(),
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

fn default_level_string() -> String {
    default_log_level().to_string()
}

/// Install-prompt suppression policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallPromptConfig {
    pub storage_key: String,
    pub suppression_window_ms: EpochMs,
}

impl Default for InstallPromptConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_INSTALL_DISMISSED_KEY.to_string(),
            suppression_window_ms: DEFAULT_SUPPRESSION_WINDOW_MS,
        }
    }
}

impl InstallPromptConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::Missing("storage_key"));
        }
        if self.suppression_window_ms <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "suppression_window_ms",
                message: format!("must be positive, got {}", self.suppression_window_ms),
            });
        }
        Ok(())
    }

    /// Copy with every invalid field reset to its default.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        Self {
            storage_key: if self.storage_key.trim().is_empty() {
                defaults.storage_key
            } else {
                self.storage_key.clone()
            },
            suppression_window_ms: if self.suppression_window_ms > 0 {
                self.suppression_window_ms
            } else {
                defaults.suppression_window_ms
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BackendConfig, ConfigError, InstallPromptConfig, DEFAULT_SUPPRESSION_WINDOW_MS,
    };
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_values_fall_back_to_placeholders() {
        let config = BackendConfig::from_lookup(|_| None);
        assert_eq!(config.api_key, "YOUR_API_KEY");
        assert_eq!(config.auth_domain, "YOUR_PROJECT_ID.firebaseapp.com");
        assert_eq!(
            config.validate().expect_err("placeholders must fail"),
            ConfigError::Placeholder("api_key")
        );
    }

    #[test]
    fn derives_domain_and_bucket_from_project_id() {
        let config = BackendConfig::from_lookup(lookup_from(&[
            ("APPSHELL_API_KEY", "key-123"),
            ("APPSHELL_PROJECT_ID", "demo-app"),
            ("APPSHELL_MESSAGING_SENDER_ID", "42"),
            ("APPSHELL_APP_ID", "1:42:web:abc"),
        ]));
        assert_eq!(config.auth_domain, "demo-app.firebaseapp.com");
        assert_eq!(config.storage_bucket, "demo-app.appspot.com");
        assert!(config.is_complete());
    }

    #[test]
    fn download_base_url_points_at_bucket() {
        let config = BackendConfig::from_lookup(lookup_from(&[("APPSHELL_PROJECT_ID", "demo-app")]));
        assert_eq!(
            config.download_base_url(),
            "https://firebasestorage.googleapis.com/v0/b/demo-app.appspot.com"
        );
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = BackendConfig::from_lookup(lookup_from(&[("APPSHELL_API_KEY", "   ")]));
        assert_eq!(config.api_key, "YOUR_API_KEY");
    }

    #[test]
    fn install_prompt_config_defaults_to_seven_days() {
        let config = InstallPromptConfig::default();
        assert_eq!(config.storage_key, "pwa-install-dismissed");
        assert_eq!(config.suppression_window_ms, DEFAULT_SUPPRESSION_WINDOW_MS);
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn install_prompt_config_rejects_non_positive_window() {
        let config = InstallPromptConfig {
            suppression_window_ms: 0,
            ..InstallPromptConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "suppression_window_ms",
                ..
            })
        ));
    }

    #[test]
    fn backend_config_deserializes_from_camel_case_json() {
        let config: BackendConfig = serde_json::from_str(
            r#"{
                "apiKey": "k",
                "authDomain": "d",
                "projectId": "p",
                "storageBucket": "b",
                "messagingSenderId": "m",
                "appId": "a"
            }"#,
        )
        .expect("config json should parse");
        assert_eq!(config.project_id, "p");
        assert!(config.is_complete());
    }

    #[test]
    fn sanitized_resets_only_invalid_fields() {
        let config = InstallPromptConfig {
            storage_key: "install-snooze".to_string(),
            suppression_window_ms: -5,
        };
        let sanitized = config.sanitized();
        assert_eq!(sanitized.storage_key, "install-snooze");
        assert_eq!(sanitized.suppression_window_ms, DEFAULT_SUPPRESSION_WINDOW_MS);

        let config = InstallPromptConfig {
            storage_key: "  ".to_string(),
            suppression_window_ms: 1_000,
        };
        let sanitized = config.sanitized();
        assert_eq!(sanitized.storage_key, "pwa-install-dismissed");
        assert_eq!(sanitized.suppression_window_ms, 1_000);
        sanitized.validate().expect("sanitized config should validate");
    }
}
