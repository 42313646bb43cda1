use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Well-known durable storage key of the credential.
pub const DEFAULT_STORAGE_KEY: &str = "access-token";

/// Human-readable application name embedded in login challenges.
pub const DEFAULT_APP_NAME: &str = "HBV Tracker";

/// Configuration of the session subsystem.
///
/// Deserializable from JSON so host applications can pass it across the binding
/// boundary as a string. Missing fields take the development defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// Base URL of the REST backend, e.g. `http://127.0.0.1:8000/api`.
    pub api_base_url: String,
    /// Key under which the credential is persisted.
    pub storage_key: String,
    /// Application name shown in the login challenge.
    pub app_name: String,
    /// Path (relative to `api_base_url`) of the healthcare provider registry lookup.
    /// `{address}` is replaced with the checksummed account.
    pub provider_registry_path: String,
    /// Path of the researcher registry lookup.
    pub researcher_registry_path: String,
    /// Whether a restored credential is confirmed with the backend on start.
    pub verify_on_restore: bool,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Retries for transient HTTP failures. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8000/api".to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
            provider_registry_path: "/blockchain/provider/{address}/authorized"
                .to_string(),
            researcher_registry_path: "/blockchain/researcher/{address}/authorized"
                .to_string(),
            verify_on_restore: true,
            request_timeout_ms: 5_000,
            max_retries: 3,
        }
    }
}

impl SessionConfig {
    /// Deserializes a config from JSON.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidInput` if the JSON is invalid or the resulting
    /// config fails validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::InvalidInput {
                attribute: "config".to_string(),
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the config.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidInput` naming the first offending attribute.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_base_url.starts_with("http://")
            || self.api_base_url.starts_with("https://"))
        {
            return Err(ConfigError::InvalidInput {
                attribute: "api_base_url".to_string(),
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.storage_key.is_empty() {
            return Err(ConfigError::InvalidInput {
                attribute: "storage_key".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        for (attribute, path) in [
            ("provider_registry_path", &self.provider_registry_path),
            ("researcher_registry_path", &self.researcher_registry_path),
        ] {
            if !path.contains("{address}") {
                return Err(ConfigError::InvalidInput {
                    attribute: attribute.to_string(),
                    reason: "must contain the `{address}` placeholder".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Joins `path` onto the API base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
