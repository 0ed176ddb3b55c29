//! QCrBox REST client.
//!
//! Provides typed wire messages, the HTTP API wrapper and the
//! [`RemoteService`](qcrbox_core::host::RemoteService) /
//! [`Catalog`](qcrbox_core::host::Catalog) implementations used by the
//! calculation workflow.

pub mod api;
pub mod config;
pub mod messages;
pub mod service;

pub use api::{ApiError, QCrBoxApi};
pub use config::ClientConfig;
