use std::time::Duration;

use qcrbox_core::env;
use qcrbox_core::error::CoreError;

/// Default base URL of a local QCrBox deployment.
pub const DEFAULT_URL: &str = "http://localhost:11000";
/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for the QCrBox API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `QCRBOX_URL`                  | `http://localhost:11000` |
    /// | `QCRBOX_REQUEST_TIMEOUT_SECS` | `30`                     |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(env::process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let base_url = env::string_or(&lookup, "QCRBOX_URL", DEFAULT_URL);
        check_base_url("QCRBOX_URL", &base_url)?;
        let timeout_secs: u64 =
            env::parse_or(&lookup, "QCRBOX_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(CoreError::Validation(
                "QCRBOX_REQUEST_TIMEOUT_SECS must be positive".into(),
            ));
        }
        Ok(Self {
            base_url,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Replace the base URL, e.g. from a command-line flag.
    pub fn with_base_url(self, url: impl Into<String>) -> Result<Self, CoreError> {
        let base_url = url.into();
        check_base_url("--url", &base_url)?;
        Ok(Self { base_url, ..self })
    }
}

fn check_base_url(source: &str, url: &str) -> Result<(), CoreError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "{source} must be an http(s) URL, got '{url}'"
        )))
    }
}
