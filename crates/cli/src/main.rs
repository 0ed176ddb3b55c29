//! `qcrbox` -- run QCrBox calculations from the terminal.
//!
//! # Environment variables
//!
//! | Variable                       | Required | Default                  | Description                          |
//! |--------------------------------|----------|--------------------------|--------------------------------------|
//! | `QCRBOX_URL`                   | no       | `http://localhost:11000` | Base URL of the QCrBox API           |
//! | `QCRBOX_REQUEST_TIMEOUT_SECS`  | no       | `30`                     | Deadline for each network call       |
//! | `QCRBOX_POLL_INTERVAL_SECS`    | no       | `2`                      | Seconds between status checks        |
//! | `QCRBOX_TRACKING_TIMEOUT_SECS` | no       | `600`                    | Tracking budget after submission     |
//! | `QCRBOX_WORKSPACE_DIR`         | no       | `./qcrbox-results`       | Parent of result workspaces          |
//! | `QCRBOX_CONVERT_DDL1`          | no       | `true`                   | Rewrite result CIFs to DDL1 names    |
//! | `QCRBOX_SUBMIT_ATTEMPTS`       | no       | `1`                      | Attempts for transient submit errors |
//! | `QCRBOX_LOG_JSON`              | no       | `false`                  | Emit logs as JSON lines              |
//! | `RUST_LOG`                     | no       | `qcrbox=info,...`        | Log filter                           |

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qcrbox_cli::args::Cli;
use qcrbox_cli::commands;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    commands::execute(cli).await
}

/// Logs go to stderr; stdout carries prompts and results.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "qcrbox=info,qcrbox_cli=info,qcrbox_workflow=info,qcrbox_client=info".into()
    });
    let json = std::env::var("QCRBOX_LOG_JSON")
        .is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
