//! Terminal front end for QCrBox calculations.
//!
//! The binary wires the HTTP client, the workflow engine and a terminal
//! implementation of the host capabilities together.

pub mod args;
pub mod commands;
pub mod terminal;
