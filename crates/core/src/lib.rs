//! Domain model and pure building blocks for QCrBox calculations.
//!
//! - [`catalog`] -- applications, commands and their parameter schemas.
//! - [`parameters`] -- resolution of a command's parameters into a
//!   [`ParameterBinding`](parameters::ParameterBinding).
//! - [`host`] -- capability traits the host application and the remote
//!   service implement.
//! - [`cif`] / [`tsc`] -- CIF text utilities and the binary TSCB
//!   form-factor table.
//! - [`companion`] -- rules that derive companion artifacts from results.
//! - [`status`] -- the job status transition graph.
//! - [`env`] -- environment lookups for configuration.

pub mod catalog;
pub mod cif;
pub mod companion;
pub mod env;
pub mod error;
pub mod host;
pub mod parameters;
pub mod status;
pub mod tsc;
pub mod types;
