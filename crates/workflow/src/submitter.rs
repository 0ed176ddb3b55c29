use std::sync::Arc;
use std::time::Duration;

use qcrbox_core::catalog::Command;
use qcrbox_core::error::WorkflowError;
use qcrbox_core::host::RemoteService;
use qcrbox_core::parameters::ParameterBinding;

use crate::call::bounded;
use crate::job::Job;

/// Sends one command invocation. Retrying is the caller's decision.
pub struct JobSubmitter {
    remote: Arc<dyn RemoteService>,
    timeout: Duration,
}

impl JobSubmitter {
    pub fn new(remote: Arc<dyn RemoteService>, timeout: Duration) -> Self {
        Self { remote, timeout }
    }

    /// Submit `command` with a binding whose file parameters are already
    /// remote references. Returns a `Queued` job.
    pub async fn submit(
        &self,
        command: &Command,
        binding: &ParameterBinding,
    ) -> Result<Job, WorkflowError> {
        let arguments = binding.to_arguments()?;
        tracing::debug!(command = %command.label(), arguments = ?arguments, "Submitting job");

        let job_id = bounded(self.timeout, self.remote.submit_job(command, &arguments))
            .await
            .map_err(|e| WorkflowError::Submission {
                command: command.label(),
                transient: e.is_transient(),
                payload: e.to_string(),
            })?;

        Ok(Job::new(job_id, command.id.clone()))
    }
}
