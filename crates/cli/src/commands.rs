//! Subcommand handlers.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use qcrbox_client::{ClientConfig, QCrBoxApi};
use qcrbox_core::catalog::{find_command, public_commands, Command};
use qcrbox_core::host::Catalog;
use qcrbox_workflow::{run, RunOptions, WorkflowConfig, WorkflowController, WorkflowOutcome};

use crate::args::{Cli, Commands};
use crate::terminal::TerminalHost;

pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut client_config = ClientConfig::from_env().context("Invalid client configuration")?;
    if let Some(url) = cli.url {
        client_config = client_config
            .with_base_url(url)
            .context("Invalid --url")?;
    }
    let api = QCrBoxApi::from_config(&client_config).context("Cannot build HTTP client")?;

    match cli.command {
        Commands::Health => health(&api).await,
        Commands::Apps { app } => match app {
            Some(app) => app_commands(&api, &app).await,
            None => apps(&api).await,
        },
        Commands::Run {
            command,
            params,
            interactive,
            structure,
            output_dir,
            poll_secs,
            timeout_secs,
            history,
        } => {
            let mut config = WorkflowConfig::from_env().context("Invalid workflow configuration")?;
            config.request_timeout = client_config.request_timeout;
            if let Some(dir) = output_dir {
                config.workspace_root = dir;
            }
            if let Some(secs) = poll_secs.filter(|s| *s > 0) {
                config.poll_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = timeout_secs.filter(|s| *s > 0) {
                config.tracking_timeout = Duration::from_secs(secs);
            }
            let request = RunRequest {
                label: command,
                params: params.into_iter().collect(),
                interactive,
                structure,
                history,
            };
            run_command(api, config, request).await
        }
    }
}

async fn health(api: &QCrBoxApi) -> anyhow::Result<()> {
    let healthy = api
        .health()
        .await
        .with_context(|| format!("Cannot reach {}", api.api_url()))?;
    if !healthy {
        anyhow::bail!("{} reports an unhealthy status", api.api_url());
    }
    println!("{} is healthy", api.api_url());
    Ok(())
}

async fn apps(api: &QCrBoxApi) -> anyhow::Result<()> {
    let applications = api
        .list_applications()
        .await
        .context("Cannot list applications")?;
    for app in &applications {
        println!("{} {} ({})", app.name, app.version, app.id);
        for command in app.public_commands() {
            print_command(command);
        }
    }
    tracing::debug!(commands = public_commands(&applications).len(), "Catalog listed");
    Ok(())
}

async fn app_commands(api: &QCrBoxApi, app: &str) -> anyhow::Result<()> {
    let commands = Catalog::list_commands(api, app)
        .await
        .with_context(|| format!("Cannot list commands of '{app}'"))?;
    for command in &commands {
        print_command(command);
    }
    Ok(())
}

/// One line per command; required parameters are starred.
fn print_command(command: &Command) {
    let params: Vec<String> = command
        .parameters
        .iter()
        .map(|p| {
            if p.required {
                format!("{}*", p.name)
            } else {
                p.name.clone()
            }
        })
        .collect();
    println!("  {} [{}]", command.label(), params.join(", "));
}

struct RunRequest {
    label: String,
    params: HashMap<String, String>,
    interactive: bool,
    structure: Option<PathBuf>,
    history: bool,
}

async fn run_command(api: QCrBoxApi, config: WorkflowConfig, request: RunRequest) -> anyhow::Result<()> {
    let applications = api
        .list_applications()
        .await
        .context("Cannot list applications")?;
    let command = find_command(&applications, &request.label)
        .cloned()
        .with_context(|| format!("No public command matches '{}'", request.label))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Interrupt received, stopping workflow");
                cancel.cancel();
            }
        }
    });

    let terminal = Arc::new(TerminalHost::stdio(request.structure, cancel.clone()));
    let mut builder = WorkflowController::builder(command, Arc::new(api), terminal.clone())
        .config(config.clone())
        .host(terminal.clone())
        .parameters(request.params)
        .cancel_token(cancel);
    if request.interactive {
        builder = builder.interactive(terminal);
    }
    let mut controller = builder.build();

    tracing::info!(
        workflow_id = %controller.id(),
        command = %controller.command().label(),
        mode = ?controller.mode(),
        "Starting workflow",
    );
    let result = run(&mut controller, RunOptions::from_config(&config)).await;

    if request.history {
        println!("{}", serde_json::to_string_pretty(controller.history())?);
    }
    if let Some(WorkflowOutcome::Completed(results)) = controller.outcome() {
        for path in results.files.iter().chain(&results.companions) {
            println!("{}", path.display());
        }
    }
    result.with_context(|| format!("Workflow {} did not complete", controller.id()))
}
