use std::path::PathBuf;
use std::time::Duration;

use qcrbox_core::companion::{default_rules, CompanionRule};
use qcrbox_core::env;
use qcrbox_core::error::CoreError;

use crate::backoff::RetryBackoff;

/// Settings shared by every workflow started from one host session.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Deadline for each network call.
    pub request_timeout: Duration,
    /// Re-check cadence for unattended runs.
    pub poll_interval: Duration,
    /// Unattended tracking budget, measured from submission.
    pub tracking_timeout: Duration,
    /// Parent of the per-calculation workspaces.
    pub workspace_root: PathBuf,
    /// Rewrite result CIFs to DDL1 data names.
    pub convert_ddl1: bool,
    /// Total submission attempts; only transient failures are retried.
    pub submit_attempts: u32,
    pub submit_backoff: RetryBackoff,
    pub companion_rules: Vec<CompanionRule>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(2),
            tracking_timeout: Duration::from_secs(600),
            workspace_root: PathBuf::from("./qcrbox-results"),
            convert_ddl1: true,
            submit_attempts: 1,
            submit_backoff: RetryBackoff::default(),
            companion_rules: default_rules(),
        }
    }
}

impl WorkflowConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default            |
    /// |--------------------------------|--------------------|
    /// | `QCRBOX_REQUEST_TIMEOUT_SECS`  | `30`               |
    /// | `QCRBOX_POLL_INTERVAL_SECS`    | `2`                |
    /// | `QCRBOX_TRACKING_TIMEOUT_SECS` | `600`              |
    /// | `QCRBOX_WORKSPACE_DIR`         | `./qcrbox-results` |
    /// | `QCRBOX_CONVERT_DDL1`          | `true`             |
    /// | `QCRBOX_SUBMIT_ATTEMPTS`       | `1`                |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(env::process_env)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let defaults = Self::default();

        let request_timeout = positive_secs(&lookup, "QCRBOX_REQUEST_TIMEOUT_SECS", 30)?;
        let poll_interval = positive_secs(&lookup, "QCRBOX_POLL_INTERVAL_SECS", 2)?;
        let tracking_timeout = positive_secs(&lookup, "QCRBOX_TRACKING_TIMEOUT_SECS", 600)?;
        let workspace_root = PathBuf::from(env::string_or(
            &lookup,
            "QCRBOX_WORKSPACE_DIR",
            "./qcrbox-results",
        ));
        let convert_ddl1 = env::flag_or(&lookup, "QCRBOX_CONVERT_DDL1", true)?;
        let submit_attempts: u32 = env::parse_or(&lookup, "QCRBOX_SUBMIT_ATTEMPTS", 1)?;
        if submit_attempts == 0 {
            return Err(CoreError::Validation(
                "QCRBOX_SUBMIT_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(Self {
            request_timeout,
            poll_interval,
            tracking_timeout,
            workspace_root,
            convert_ddl1,
            submit_attempts,
            ..defaults
        })
    }
}

fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<Duration, CoreError> {
    let secs: u64 = env::parse_or(lookup, key, default)?;
    if secs == 0 {
        return Err(CoreError::Validation(format!("{key} must be positive")));
    }
    Ok(Duration::from_secs(secs))
}
