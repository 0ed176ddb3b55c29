//! Drives a [`WorkflowController`] until it finishes.
//!
//! The runner is the only place that waits between unattended status
//! checks. It sleeps `poll_interval` between checks, gives up after
//! `tracking_timeout` measured from submission, and stops early when the
//! controller's cancellation token fires. Interactive runs are paced by the
//! user's confirmation before each check, so neither limit applies to them.

use std::time::Duration;

use tokio::time::Instant;

use qcrbox_core::error::WorkflowError;

use crate::backoff;
use crate::config::WorkflowConfig;
use crate::controller::{RunMode, WorkflowController};
use crate::events::WorkflowState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub poll_interval: Duration,
    pub tracking_timeout: Duration,
}

impl RunOptions {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            poll_interval: config.poll_interval,
            tracking_timeout: config.tracking_timeout,
        }
    }
}

/// Advance `controller` until it reaches `Done` or `Aborted`.
///
/// Returns `Ok(())` once results are materialized, otherwise the error that
/// aborted the workflow. Failed status queries are retried on the next
/// tick; in interactive mode fixable input errors send the workflow back to
/// configuration and the loop carries on.
pub async fn run(controller: &mut WorkflowController, options: RunOptions) -> Result<(), WorkflowError> {
    let cancel = controller.cancel_token();
    let mut tracking_since: Option<Instant> = None;

    loop {
        match controller.advance().await {
            Ok(WorkflowState::Done) => return Ok(()),
            Ok(WorkflowState::Aborted) => {
                return Err(WorkflowError::InvalidState(format!(
                    "workflow {} was already aborted",
                    controller.id()
                )));
            }
            Ok(_) => {}
            Err(err) if controller.state().is_terminal() => return Err(err),
            Err(err @ WorkflowError::StatusQuery { .. }) => {
                tracing::debug!(workflow_id = %controller.id(), error = %err, "Retrying status check next tick");
            }
            Err(err) => {
                debug_assert_eq!(controller.mode(), RunMode::Interactive);
                tracing::info!(workflow_id = %controller.id(), error = %err, "Reconfiguring after error");
                // Let an interrupt handler observe the prompt loop.
                tokio::task::yield_now().await;
            }
        }

        if controller.mode() == RunMode::Interactive
            || !matches!(
                controller.state(),
                WorkflowState::Submitted | WorkflowState::Tracking
            )
        {
            continue;
        }

        let since = *tracking_since.get_or_insert_with(Instant::now);
        let elapsed = since.elapsed();
        if elapsed >= options.tracking_timeout {
            let Some(job) = controller.job() else {
                return Err(WorkflowError::InvalidState("tracking without a job".into()));
            };
            let err = WorkflowError::TrackingTimeout {
                job_id: job.id().clone(),
                status: job.status(),
                waited_secs: elapsed.as_secs(),
            };
            return Err(controller.fail(err));
        }

        let delay = options.poll_interval.min(options.tracking_timeout - elapsed);
        if !backoff::wait(delay, &cancel).await {
            // The next advance observes the token and aborts.
            tracing::debug!(workflow_id = %controller.id(), "Cancelled while waiting");
        }
    }
}
