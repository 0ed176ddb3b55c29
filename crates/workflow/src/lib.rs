//! Calculation workflow engine.
//!
//! Turns a chosen [`Command`](qcrbox_core::catalog::Command) and a set of
//! parameter values into a remote job and, once it succeeds, into result
//! files in a local workspace.
//!
//! - [`controller`] -- the per-calculation state machine.
//! - [`runner`] -- polls a controller to completion.
//! - [`transfer`], [`submitter`], [`tracker`], [`materializer`] -- the
//!   steps the controller delegates to.
//! - [`config`] -- environment-driven settings.

pub mod backoff;
mod call;
pub mod config;
pub mod controller;
pub mod events;
pub mod job;
pub mod materializer;
pub mod runner;
pub mod submitter;
pub mod tracker;
pub mod transfer;
pub mod workspace;

pub use config::WorkflowConfig;
pub use controller::{RunMode, WorkflowController, WorkflowOutcome};
pub use events::{WorkflowEvent, WorkflowState};
pub use runner::{run, RunOptions};
