//! On-demand job status checks.
//!
//! The tracker never schedules anything: each [`StatusTracker::check_status`]
//! call is one query, made only when the job is not yet terminal. A failed
//! query leaves the job untouched.

use std::sync::Arc;
use std::time::Duration;

use qcrbox_core::error::WorkflowError;
use qcrbox_core::host::RemoteService;
use qcrbox_core::status::JobStatus;

use crate::call::bounded;
use crate::job::{Job, StatusUpdate};

pub struct StatusTracker {
    remote: Arc<dyn RemoteService>,
    timeout: Duration,
}

/// Result of one status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCheck {
    pub status: JobStatus,
    pub update: StatusUpdate,
}

impl StatusTracker {
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    pub async fn check_status(&self, job: &mut Job) -> Result<StatusCheck, WorkflowError> {
        if job.status().is_terminal() {
            return Ok(StatusCheck {
                status: job.status(),
                update: StatusUpdate::Unchanged,
            });
        }

        let reported = bounded(self.timeout, self.remote.get_job_status(job.id()))
            .await
            .map_err(|e| {
                tracing::warn!(job_id = %job.id(), error = %e, "Status query failed");
                WorkflowError::StatusQuery {
                    job_id: job.id().clone(),
                    reason: e.to_string(),
                }
            })?;

        let update = job.apply_status(reported);
        match update {
            StatusUpdate::Advanced { from, to } => {
                tracing::info!(job_id = %job.id(), from = %from, to = %to, "Job status changed");
            }
            StatusUpdate::Ignored { current, reported } => {
                tracing::warn!(
                    job_id = %job.id(),
                    current = %current,
                    reported = %reported,
                    "Ignoring backwards status report",
                );
            }
            StatusUpdate::Unchanged => {
                tracing::debug!(job_id = %job.id(), status = %reported, "Job status unchanged");
            }
        }

        Ok(StatusCheck {
            status: job.status(),
            update,
        })
    }
}
