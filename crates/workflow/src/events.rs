//! Workflow states and the event history a controller records.
//!
//! Hosts render the history (e.g. a status panel); it is serializable so it
//! can also be logged or persisted as JSON.

use std::fmt;

use serde::Serialize;

use qcrbox_core::status::JobStatus;
use qcrbox_core::types::{JobId, Timestamp};

/// Orchestration state of one calculation workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Configuring,
    Uploading,
    Submitted,
    Tracking,
    Completing,
    Done,
    Aborted,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuring => "configuring",
            Self::Uploading => "uploading",
            Self::Submitted => "submitted",
            Self::Tracking => "tracking",
            Self::Completing => "completing",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a workflow's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// The workflow moved between orchestration states.
    StateChanged {
        at: Timestamp,
        from: WorkflowState,
        to: WorkflowState,
    },

    /// The remote job was created.
    JobSubmitted { at: Timestamp, job_id: JobId },

    /// A status check moved the job forward.
    JobStatusChanged {
        at: Timestamp,
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    /// A step failed. `kind` is [`WorkflowError::kind`](qcrbox_core::error::WorkflowError::kind).
    StepFailed {
        at: Timestamp,
        state: WorkflowState,
        kind: &'static str,
        message: String,
    },

    /// A companion artifact could not be derived; primary results stand.
    CompanionFailed {
        at: Timestamp,
        source_file: String,
        reason: String,
    },
}

impl WorkflowEvent {
    pub fn at(&self) -> Timestamp {
        match self {
            Self::StateChanged { at, .. }
            | Self::JobSubmitted { at, .. }
            | Self::JobStatusChanged { at, .. }
            | Self::StepFailed { at, .. }
            | Self::CompanionFailed { at, .. } => *at,
        }
    }
}
