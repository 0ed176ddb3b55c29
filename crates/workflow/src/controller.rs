//! End-to-end orchestration of one calculation.
//!
//! A [`WorkflowController`] owns one command invocation from parameter
//! resolution to materialized results:
//!
//! ```text
//! Configuring -> Uploading -> Submitted -> Tracking -> Completing -> Done
//!      \____________\____________\____________\____________\______-> Aborted
//! ```
//!
//! Nothing runs in the background. The host (or [`crate::runner`]) calls
//! [`WorkflowController::advance`] to perform the next step; status checks
//! happen only on those calls. In interactive mode the controller asks the
//! [`ParameterSource`] before uploading and before every status check.
//!
//! Each error and each terminal transition produces exactly one host
//! notification.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use qcrbox_core::catalog::Command;
use qcrbox_core::error::WorkflowError;
use qcrbox_core::host::{Checkpoint, HostSession, Notifier, NotifyKind, ParameterSource, RemoteService};
use qcrbox_core::parameters::{resolve, ParameterBinding, ResolveContext};
use qcrbox_core::status::JobStatus;

use crate::backoff::{self, RetryBackoff};
use crate::config::WorkflowConfig;
use crate::events::{WorkflowEvent, WorkflowState};
use crate::job::{Job, StatusUpdate};
use crate::materializer::{MaterializedResults, ResultMaterializer};
use crate::submitter::JobSubmitter;
use crate::tracker::StatusTracker;
use crate::transfer::FileTransferAdapter;
use crate::workspace::LocalWorkspace;

/// Whether the user confirms steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Interactive,
    Unattended,
}

/// How a finished workflow ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutcome {
    Completed(MaterializedResults),
    Aborted {
        /// [`WorkflowError::kind`] of the error that ended the workflow.
        kind: &'static str,
        message: String,
        /// Result files written before the workflow aborted.
        saved: Vec<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

pub struct WorkflowBuilder {
    command: Command,
    remote: Arc<dyn RemoteService>,
    notifier: Arc<dyn Notifier>,
    config: WorkflowConfig,
    prompt: Option<Arc<dyn ParameterSource>>,
    host: Option<Arc<dyn HostSession>>,
    supplied: HashMap<String, String>,
    cancel: Option<CancellationToken>,
}

impl WorkflowBuilder {
    pub fn config(mut self, config: WorkflowConfig) -> Self {
        self.config = config;
        self
    }

    /// Run interactively, asking `prompt` for missing values and
    /// confirmations.
    pub fn interactive(mut self, prompt: Arc<dyn ParameterSource>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostSession>) -> Self {
        self.host = Some(host);
        self
    }

    /// Pre-fill one parameter with a raw value.
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.supplied.insert(name.into(), value.into());
        self
    }

    pub fn parameters(mut self, values: HashMap<String, String>) -> Self {
        self.supplied.extend(values);
        self
    }

    /// Share a cancellation token with the caller.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> WorkflowController {
        let id = Uuid::now_v7();
        let timeout = self.config.request_timeout;
        let mode = if self.prompt.is_some() {
            RunMode::Interactive
        } else {
            RunMode::Unattended
        };
        let workspace =
            LocalWorkspace::for_calculation(&self.config.workspace_root, &self.command.name, id);

        tracing::debug!(
            workflow_id = %id,
            command = %self.command.label(),
            mode = ?mode,
            workspace = %workspace.root().display(),
            "Workflow created",
        );

        WorkflowController {
            id,
            mode,
            state: WorkflowState::Configuring,
            supplied: self.supplied,
            rejected: HashSet::new(),
            transfer: FileTransferAdapter::new(self.remote.clone(), timeout),
            submitter: JobSubmitter::new(self.remote.clone(), timeout),
            tracker: StatusTracker::new(self.remote.clone(), timeout),
            materializer: ResultMaterializer::new(
                self.remote,
                timeout,
                self.config.convert_ddl1,
                self.config.companion_rules,
            ),
            submit_attempts: self.config.submit_attempts.max(1),
            submit_backoff: self.config.submit_backoff,
            notifier: self.notifier,
            host: self.host,
            prompt: self.prompt,
            binding: None,
            job: None,
            workspace,
            cancel: self.cancel.unwrap_or_default(),
            history: Vec::new(),
            outcome: None,
            command: self.command,
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct WorkflowController {
    id: Uuid,
    command: Command,
    mode: RunMode,
    state: WorkflowState,
    supplied: HashMap<String, String>,
    /// Parameters whose last value was refused; only the prompt may refill them.
    rejected: HashSet<String>,
    notifier: Arc<dyn Notifier>,
    host: Option<Arc<dyn HostSession>>,
    prompt: Option<Arc<dyn ParameterSource>>,
    transfer: FileTransferAdapter,
    submitter: JobSubmitter,
    tracker: StatusTracker,
    materializer: ResultMaterializer,
    submit_attempts: u32,
    submit_backoff: RetryBackoff,
    binding: Option<ParameterBinding>,
    job: Option<Job>,
    workspace: LocalWorkspace,
    cancel: CancellationToken,
    history: Vec<WorkflowEvent>,
    outcome: Option<WorkflowOutcome>,
}

impl WorkflowController {
    pub fn builder(
        command: Command,
        remote: Arc<dyn RemoteService>,
        notifier: Arc<dyn Notifier>,
    ) -> WorkflowBuilder {
        WorkflowBuilder {
            command,
            remote,
            notifier,
            config: WorkflowConfig::default(),
            prompt: None,
            host: None,
            supplied: HashMap::new(),
            cancel: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn command(&self) -> &Command {
        &self.command
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn job(&self) -> Option<&Job> {
        self.job.as_ref()
    }

    pub fn workspace(&self) -> &LocalWorkspace {
        &self.workspace
    }

    pub fn history(&self) -> &[WorkflowEvent] {
        &self.history
    }

    pub fn outcome(&self) -> Option<&WorkflowOutcome> {
        self.outcome.as_ref()
    }

    /// Token that aborts the workflow when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Perform the next step.
    ///
    /// Returns the new state, or the error the step produced. After an
    /// error the controller is either back in `Configuring` (interactive
    /// mode, fixable input), unchanged (failed status query) or `Aborted`.
    /// Calling this on a finished workflow returns its state and does
    /// nothing.
    pub async fn advance(&mut self) -> Result<WorkflowState, WorkflowError> {
        if self.state.is_terminal() {
            return Ok(self.state);
        }
        if self.cancel.is_cancelled() {
            return Err(self.handle_error(WorkflowError::UserCancelled));
        }

        let token = self.cancel.clone();
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(WorkflowError::UserCancelled),
            result = self.step() => result,
        };
        result.map_err(|err| self.handle_error(err))
    }

    /// Abort the workflow. A submitted remote job keeps running; only local
    /// tracking stops. Returns `false` if the workflow had already finished.
    pub fn cancel(&mut self) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.cancel.cancel();
        self.handle_error(WorkflowError::UserCancelled);
        true
    }

    /// End the workflow with an error raised outside a step (e.g. the
    /// runner's tracking timeout).
    pub(crate) fn fail(&mut self, err: WorkflowError) -> WorkflowError {
        self.handle_error(err)
    }

    // ---- steps ----

    async fn step(&mut self) -> Result<WorkflowState, WorkflowError> {
        match self.state {
            WorkflowState::Configuring => self.configure(),
            WorkflowState::Uploading => self.upload_and_submit().await,
            WorkflowState::Submitted | WorkflowState::Tracking => self.track().await,
            WorkflowState::Completing => self.complete().await,
            WorkflowState::Done | WorkflowState::Aborted => Ok(self.state),
        }
    }

    fn configure(&mut self) -> Result<WorkflowState, WorkflowError> {
        let ctx = ResolveContext {
            supplied: self.supplied.clone(),
            prompt: self.prompt.as_deref(),
            current_structure: self.host.as_ref().and_then(|h| h.current_structure()),
            rejected: self.rejected.clone(),
        };
        let binding = resolve(&self.command, &ctx)?;
        self.rejected.clear();
        let files: Vec<PathBuf> = binding.local_files().into_iter().map(|(_, p)| p).collect();

        if let Some(prompt) = &self.prompt {
            let checkpoint = Checkpoint::BeforeUpload {
                command: self.command.label(),
                files: files.clone(),
            };
            if !prompt.confirm(&checkpoint) {
                return Err(WorkflowError::UserCancelled);
            }
        }

        for file in &files {
            self.workspace.stage_input(file);
        }
        tracing::info!(
            workflow_id = %self.id,
            parameters = binding.len(),
            files = files.len(),
            "Parameters resolved",
        );
        self.binding = Some(binding);
        self.transition(WorkflowState::Uploading);
        Ok(self.state)
    }

    async fn upload_and_submit(&mut self) -> Result<WorkflowState, WorkflowError> {
        let mut binding = self
            .binding
            .take()
            .ok_or_else(|| WorkflowError::InvalidState("no resolved parameters".into()))?;

        for (name, path) in binding.local_files() {
            match self.transfer.upload(&path).await {
                Ok(file) => binding.bind_remote(&name, file),
                Err(err) => {
                    self.rejected.insert(name);
                    return Err(err);
                }
            }
        }

        let job = self.submit_with_retry(&binding).await?;
        let job_id = job.id().clone();
        self.history.push(WorkflowEvent::JobSubmitted {
            at: chrono::Utc::now(),
            job_id: job_id.clone(),
        });
        self.job = Some(job);
        self.transition(WorkflowState::Submitted);
        self.notifier.notify(
            &format!("Submitted {} as job {job_id}", self.command.label()),
            NotifyKind::Info,
        );
        Ok(self.state)
    }

    async fn submit_with_retry(&self, binding: &ParameterBinding) -> Result<Job, WorkflowError> {
        let mut delays = self.submit_backoff.delays();
        let mut attempt = 1;
        loop {
            match self.submitter.submit(&self.command, binding).await {
                Ok(job) => return Ok(job),
                Err(err @ WorkflowError::Submission { transient: true, .. })
                    if attempt < self.submit_attempts =>
                {
                    let delay = delays.next().unwrap_or(self.submit_backoff.max_delay);
                    tracing::warn!(
                        workflow_id = %self.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Submission attempt failed, retrying",
                    );
                    if !backoff::wait(delay, &self.cancel).await {
                        return Err(WorkflowError::UserCancelled);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn track(&mut self) -> Result<WorkflowState, WorkflowError> {
        let job = self
            .job
            .as_mut()
            .ok_or_else(|| WorkflowError::InvalidState("no submitted job".into()))?;

        if let Some(prompt) = &self.prompt {
            let checkpoint = Checkpoint::BeforeStatusCheck {
                job_id: job.id().clone(),
                last_status: job.status(),
            };
            if !prompt.confirm(&checkpoint) {
                tracing::debug!(workflow_id = %self.id, "Status check declined");
                return Ok(self.state);
            }
        }

        let check = self.tracker.check_status(job).await?;
        let job_id = job.id().clone();
        if let StatusUpdate::Advanced { from, to } = check.update {
            self.history.push(WorkflowEvent::JobStatusChanged {
                at: chrono::Utc::now(),
                job_id: job_id.clone(),
                from,
                to,
            });
        }

        if self.state == WorkflowState::Submitted {
            self.transition(WorkflowState::Tracking);
        }
        match check.status {
            JobStatus::Succeeded => {
                self.transition(WorkflowState::Completing);
                Ok(self.state)
            }
            status @ (JobStatus::Failed | JobStatus::Cancelled) => {
                Err(WorkflowError::JobUnsuccessful { job_id, status })
            }
            JobStatus::Queued | JobStatus::Running => Ok(self.state),
        }
    }

    async fn complete(&mut self) -> Result<WorkflowState, WorkflowError> {
        let job = self
            .job
            .as_mut()
            .ok_or_else(|| WorkflowError::InvalidState("no submitted job".into()))?;
        let results = self
            .materializer
            .materialize(job, &mut self.transfer, &mut self.workspace)
            .await?;

        let mut notes = Vec::new();
        if let (Some(host), Some(cif)) = (&self.host, results.primary_cif()) {
            if let Err(e) = host.open_file_in_host(cif) {
                tracing::warn!(path = %cif.display(), error = %e, "Host could not open result");
                notes.push(format!("could not open {} in host: {e}", cif.display()));
            }
        }
        for failure in &results.companion_failures {
            self.history.push(WorkflowEvent::CompanionFailed {
                at: chrono::Utc::now(),
                source_file: failure.source_file.clone(),
                reason: failure.reason.clone(),
            });
            notes.push(format!(
                "companion for {} not created: {}",
                failure.source_file, failure.reason
            ));
        }

        let mut message = format!(
            "{} finished: {} result file(s) saved to {}",
            self.command.label(),
            results.files.len(),
            self.workspace.root().display()
        );
        if !results.companions.is_empty() {
            message.push_str(&format!(", {} companion file(s)", results.companions.len()));
        }
        for note in &notes {
            message.push_str("; ");
            message.push_str(note);
        }

        self.transition(WorkflowState::Done);
        self.outcome = Some(WorkflowOutcome::Completed(results));
        let kind = if notes.is_empty() {
            NotifyKind::Info
        } else {
            NotifyKind::Warning
        };
        self.notifier.notify(&message, kind);
        Ok(self.state)
    }

    // ---- bookkeeping ----

    fn transition(&mut self, to: WorkflowState) {
        let from = self.state;
        if from == to {
            return;
        }
        tracing::info!(
            workflow_id = %self.id,
            command = %self.command.label(),
            from = %from,
            to = %to,
            "Workflow state changed",
        );
        self.state = to;
        self.history.push(WorkflowEvent::StateChanged {
            at: chrono::Utc::now(),
            from,
            to,
        });
    }

    /// Record the error, move to the right state and notify the host once.
    fn handle_error(&mut self, err: WorkflowError) -> WorkflowError {
        self.history.push(WorkflowEvent::StepFailed {
            at: chrono::Utc::now(),
            state: self.state,
            kind: err.kind(),
            message: err.to_string(),
        });

        if let WorkflowError::StatusQuery { .. } = &err {
            tracing::warn!(workflow_id = %self.id, error = %err, "Status check failed; job state kept");
            self.notifier
                .notify(&format!("Status check failed: {err}"), NotifyKind::Warning);
            return err;
        }

        if self.mode == RunMode::Interactive && err.is_recoverable_in_configuring() {
            if let WorkflowError::MissingParameter { name }
            | WorkflowError::InvalidParameter { name, .. } = &err
            {
                // Ask again instead of reusing the refused value.
                self.supplied.remove(name);
                self.rejected.insert(name.clone());
            }
            self.binding = None;
            tracing::warn!(workflow_id = %self.id, error = %err, "Step failed, back to configuration");
            self.transition(WorkflowState::Configuring);
            self.notifier.notify(&err.to_string(), NotifyKind::Warning);
            return err;
        }

        self.abort(&err);
        err
    }

    fn abort(&mut self, err: &WorkflowError) {
        let saved = match err {
            WorkflowError::Materialization { saved, .. } => saved.clone(),
            // Interrupted mid-download: whatever already reached the workspace.
            _ if self.state == WorkflowState::Completing => self.workspace.outputs().to_vec(),
            _ => Vec::new(),
        };

        let mut message = match err {
            WorkflowError::UserCancelled => format!("{} cancelled", self.command.label()),
            _ => format!("{} aborted: {err}", self.command.label()),
        };
        if let Some(job) = &self.job {
            if !job.status().is_terminal() {
                message.push_str(&format!(
                    "; remote job {} was left running",
                    job.id()
                ));
            }
        }
        if !saved.is_empty() {
            let list: Vec<String> = saved.iter().map(|p| p.display().to_string()).collect();
            message.push_str(&format!("; saved: {}", list.join(", ")));
        }

        match err {
            WorkflowError::UserCancelled => {
                tracing::info!(workflow_id = %self.id, "Workflow cancelled");
            }
            _ => tracing::error!(workflow_id = %self.id, kind = err.kind(), error = %err, "Workflow aborted"),
        }

        self.transition(WorkflowState::Aborted);
        self.outcome = Some(WorkflowOutcome::Aborted {
            kind: err.kind(),
            message: message.clone(),
            saved,
        });
        let kind = match err {
            WorkflowError::UserCancelled => NotifyKind::Warning,
            _ => NotifyKind::Error,
        };
        self.notifier.notify(&message, kind);
    }
}
