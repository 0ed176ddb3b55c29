use std::path::PathBuf;

use crate::status::JobStatus;
use crate::types::JobId;

/// Errors from the pure domain layer (catalog, CIF, TSCB, configuration).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("CIF parse error at line {line}: {message}")]
    CifParse { line: usize, message: String },

    #[error("Malformed TSCB data: {0}")]
    Tscb(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a [`RemoteService`](crate::host::RemoteService)
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The call did not complete within the configured timeout.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// Connection, DNS or TLS failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The service understood the request and refused it.
    #[error("Remote service rejected the request ({code}): {message}")]
    Rejected { code: u16, message: String },

    /// The referenced job, dataset or file does not exist remotely.
    #[error("Not found remotely: {0}")]
    NotFound(String),

    /// The response could not be interpreted.
    #[error("Unexpected response: {0}")]
    Protocol(String),

    /// A local file involved in the call could not be read or written.
    #[error("Local I/O error: {0}")]
    LocalIo(String),
}

impl RemoteError {
    /// Failures worth retrying: nothing was decided by the service.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Network(_) => true,
            Self::Rejected { code, .. } => *code >= 500,
            Self::NotFound(_) | Self::Protocol(_) | Self::LocalIo(_) => false,
        }
    }
}

/// The calculation workflow error taxonomy.
///
/// Every variant maps to exactly one host notification when it ends or
/// interrupts a workflow step.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Missing required parameter '{name}'")]
    MissingParameter { name: String },

    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Transfer of '{file}' failed: {reason}")]
    Transfer { file: String, reason: String },

    #[error("Submission of '{command}' failed: {payload}")]
    Submission {
        command: String,
        /// Error payload returned by the service, or the transport failure.
        payload: String,
        transient: bool,
    },

    #[error("Status query for job {job_id} failed: {reason}")]
    StatusQuery { job_id: JobId, reason: String },

    #[error("Materialization failed on '{failed_file}': {reason} ({} file(s) kept on disk)", saved.len())]
    Materialization {
        failed_file: String,
        reason: String,
        /// Primary results written before the failure. They are not removed.
        saved: Vec<PathBuf>,
    },

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("Job {job_id} ended as {status}")]
    JobUnsuccessful { job_id: JobId, status: JobStatus },

    #[error("Job {job_id} was still {status} after {waited_secs}s")]
    TrackingTimeout {
        job_id: JobId,
        status: JobStatus,
        waited_secs: u64,
    },

    #[error("Invalid workflow state: {0}")]
    InvalidState(String),
}

impl WorkflowError {
    /// Short stable identifier, used in logs and workflow history.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingParameter { .. } => "missing_parameter",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::Transfer { .. } => "transfer_error",
            Self::Submission { .. } => "submission_error",
            Self::StatusQuery { .. } => "status_query_error",
            Self::Materialization { .. } => "materialization_error",
            Self::UserCancelled => "user_cancelled",
            Self::JobUnsuccessful { .. } => "job_unsuccessful",
            Self::TrackingTimeout { .. } => "tracking_timeout",
            Self::InvalidState(_) => "invalid_state",
        }
    }

    /// Parameter and transfer errors can be fixed by the user and retried
    /// from `Configuring`.
    pub fn is_recoverable_in_configuring(&self) -> bool {
        matches!(
            self,
            Self::MissingParameter { .. } | Self::InvalidParameter { .. } | Self::Transfer { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
