//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Run QCrBox calculations from the terminal.
#[derive(Parser, Debug)]
#[command(name = "qcrbox")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run QCrBox calculations from the terminal", long_about = None)]
pub struct Cli {
    /// Service base URL; overrides `QCRBOX_URL`
    #[arg(global = true, long = "url")]
    pub url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that the service answers
    Health,

    /// List applications and their public commands
    Apps {
        /// Only list the commands of this application slug
        #[arg(value_name = "APP")]
        app: Option<String>,
    },

    /// Run one command and download its results
    Run {
        /// `name(application)` label, or a bare command name when unambiguous
        #[arg(value_name = "COMMAND")]
        command: String,

        /// Parameter value as `name=value`; repeatable
        #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
        params: Vec<(String, String)>,

        /// Prompt for missing values and confirm each step
        #[arg(long = "interactive", short = 'i')]
        interactive: bool,

        /// CIF treated as the currently loaded structure
        #[arg(long = "structure", value_name = "CIF")]
        structure: Option<PathBuf>,

        /// Parent directory of the result workspace
        #[arg(long = "output-dir", value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Seconds between status checks
        #[arg(long = "poll-secs")]
        poll_secs: Option<u64>,

        /// Give up tracking after this many seconds
        #[arg(long = "timeout-secs")]
        timeout_secs: Option<u64>,

        /// Print the workflow history as JSON when finished
        #[arg(long = "history")]
        history: bool,
    },
}

/// Parse a `name=value` pair. The value may itself contain `=`.
pub fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing parameter name in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
