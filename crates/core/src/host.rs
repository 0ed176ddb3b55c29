//! Capability interfaces injected into a calculation workflow.
//!
//! The workflow never talks to a UI toolkit or an HTTP stack directly.
//! Hosts (a desktop plugin, the terminal CLI, tests) implement these
//! traits and hand them to the controller.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::catalog::{Application, Command, ParameterSpec};
use crate::error::RemoteError;
use crate::status::JobStatus;
use crate::types::{JobId, RemoteFileRef};

// ---------------------------------------------------------------------------
// Remote service
// ---------------------------------------------------------------------------

/// Job API of the remote calculation service.
///
/// Each method performs exactly one logical network call.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Upload a local file and return its remote reference.
    async fn upload_file(&self, local_path: &Path) -> Result<RemoteFileRef, RemoteError>;

    /// Invoke `command` with fully bound arguments; returns the new job id.
    async fn submit_job(
        &self,
        command: &Command,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<JobId, RemoteError>;

    /// Latest status the service reports for a job.
    async fn get_job_status(&self, job_id: &JobId) -> Result<JobStatus, RemoteError>;

    /// Result files produced by a finished job.
    async fn list_job_results(&self, job_id: &JobId) -> Result<Vec<RemoteFileRef>, RemoteError>;

    /// Raw content of one remote file.
    async fn download_file(&self, file: &RemoteFileRef) -> Result<Vec<u8>, RemoteError>;
}

/// Catalog of applications and commands offered by the service.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_applications(&self) -> Result<Vec<Application>, RemoteError>;

    /// Public commands of one application.
    async fn list_commands(&self, app_id: &str) -> Result<Vec<Command>, RemoteError> {
        let apps = self.list_applications().await?;
        let app = apps
            .into_iter()
            .find(|a| a.id == app_id)
            .ok_or_else(|| RemoteError::NotFound(format!("application '{app_id}'")))?;
        Ok(app.public_commands().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Host UI capabilities
// ---------------------------------------------------------------------------

/// Answer to a scalar-value prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptReply {
    Value(String),
    /// Leave the parameter unset.
    Skip,
    /// Abandon the whole workflow.
    Cancel,
}

/// Answer from the host file chooser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChoice {
    Selected(PathBuf),
    Cancelled,
}

/// Points where an interactive workflow pauses for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// About to upload these local files and submit the job.
    BeforeUpload { command: String, files: Vec<PathBuf> },
    /// About to query the status of a submitted job.
    BeforeStatusCheck { job_id: JobId, last_status: JobStatus },
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeforeUpload { command, files } => {
                write!(f, "Upload {} file(s) and run {command}?", files.len())
            }
            Self::BeforeStatusCheck {
                job_id,
                last_status,
            } => write!(f, "Check status of job {job_id} (last seen {last_status})?"),
        }
    }
}

/// Interactive source of parameter values and confirmations.
pub trait ParameterSource: Send + Sync {
    fn prompt_value(&self, spec: &ParameterSpec) -> PromptReply;

    fn prompt_for_file(&self, spec: &ParameterSpec) -> FileChoice;

    /// `false` declines the step.
    fn confirm(&self, checkpoint: &Checkpoint) -> bool;
}

/// Severity of a host notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyKind {
    Info,
    Warning,
    Error,
}

/// Host notification sink (status bar, message box, terminal).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotifyKind);
}

/// Host-session hooks around a calculation.
pub trait HostSession: Send + Sync {
    /// Load a result file back into the host.
    fn open_file_in_host(&self, path: &Path) -> Result<(), String>;

    /// CIF of the structure currently open in the host, if any.
    fn current_structure(&self) -> Option<PathBuf> {
        None
    }
}
