//! Job status values and the transition graph between them.
//!
//! `Queued -> Running -> {Succeeded, Failed, Cancelled}`. A queued job may
//! also end without ever being observed running. Terminal states have no
//! outgoing edges.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of one remote job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted by the service, not yet executing.
    Queued,
    /// Executing remotely.
    Running,
    /// Finished and produced results.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped before completion.
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Whether moving from `self` to `next` follows the transition graph.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Queued => true,
            Self::Running => next.is_terminal(),
            Self::Succeeded | Self::Failed | Self::Cancelled => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
