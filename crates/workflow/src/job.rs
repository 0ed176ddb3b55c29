//! The remote job handle owned by one workflow.
//!
//! Status only moves forward along the [`JobStatus`] graph and the result
//! manifest can only be recorded once the job has succeeded. Mutators are
//! crate-private: the tracker changes status, the materializer records the
//! manifest.

use qcrbox_core::error::WorkflowError;
use qcrbox_core::status::JobStatus;
use qcrbox_core::types::{JobId, RemoteFileRef, Timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    id: JobId,
    command_id: String,
    status: JobStatus,
    submitted_at: Timestamp,
    last_checked_at: Option<Timestamp>,
    manifest: Option<Vec<RemoteFileRef>>,
}

/// Effect of applying a reported status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Unchanged,
    Advanced { from: JobStatus, to: JobStatus },
    /// The report would move the job backwards; it was not applied.
    Ignored { current: JobStatus, reported: JobStatus },
}

impl Job {
    pub(crate) fn new(id: JobId, command_id: impl Into<String>) -> Self {
        Self {
            id,
            command_id: command_id.into(),
            status: JobStatus::Queued,
            submitted_at: chrono::Utc::now(),
            last_checked_at: None,
            manifest: None,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn command_id(&self) -> &str {
        &self.command_id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn submitted_at(&self) -> Timestamp {
        self.submitted_at
    }

    pub fn last_checked_at(&self) -> Option<Timestamp> {
        self.last_checked_at
    }

    /// Result files, present only after a successful job was materialized.
    pub fn manifest(&self) -> Option<&[RemoteFileRef]> {
        self.manifest.as_deref()
    }

    pub(crate) fn apply_status(&mut self, reported: JobStatus) -> StatusUpdate {
        self.last_checked_at = Some(chrono::Utc::now());
        if reported == self.status {
            return StatusUpdate::Unchanged;
        }
        if !self.status.can_transition_to(reported) {
            return StatusUpdate::Ignored {
                current: self.status,
                reported,
            };
        }
        let from = self.status;
        self.status = reported;
        StatusUpdate::Advanced { from, to: reported }
    }

    pub(crate) fn record_manifest(&mut self, files: Vec<RemoteFileRef>) -> Result<(), WorkflowError> {
        if self.status != JobStatus::Succeeded {
            return Err(WorkflowError::InvalidState(format!(
                "job {} is {}, results exist only for succeeded jobs",
                self.id, self.status
            )));
        }
        self.manifest = Some(files);
        Ok(())
    }
}
