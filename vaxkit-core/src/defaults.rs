use crate::{config::SessionConfig, error::ConfigError, Environment};

/// Local backend started by the HBV Tracker development setup.
pub static DEVELOPMENT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Builds a config with SDK defaults for an [`Environment`].
pub trait DefaultConfig {
    /// Returns the defaults for `environment`, optionally overriding the API base URL.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidInput` if the environment requires a base URL that
    /// was not supplied, or the supplied one is not acceptable for it.
    fn from_environment(
        environment: &Environment,
        api_base_url: Option<String>,
    ) -> Result<Self, ConfigError>
    where
        Self: Sized;
}

impl DefaultConfig for SessionConfig {
    fn from_environment(
        environment: &Environment,
        api_base_url: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config = match environment {
            Environment::Development => Self {
                api_base_url: api_base_url
                    .unwrap_or_else(|| DEVELOPMENT_API_BASE_URL.to_string()),
                ..Self::default()
            },
            Environment::Production => {
                let api_base_url =
                    api_base_url.ok_or_else(|| ConfigError::InvalidInput {
                        attribute: "api_base_url".to_string(),
                        reason: "required for production".to_string(),
                    })?;
                if !api_base_url.starts_with("https://") {
                    return Err(ConfigError::InvalidInput {
                        attribute: "api_base_url".to_string(),
                        reason: "production requires https".to_string(),
                    });
                }
                Self {
                    api_base_url,
                    request_timeout_ms: 10_000,
                    ..Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }
}
