use anyhow::Result;
use clap::Parser;

mod cli;

use boq_lifecycle::boq::LifecycleCommand;
use boq_lifecycle::{config, init_telemetry, shutdown_telemetry, BoqLifecycleConfig};
use cli::commands::lifecycle::{ImportCommand, RunCommand};
use cli::commands::record::{ActionsCommand, CreateCommand, ListCommand, ShowCommand};
use cli::commands::build_service;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env before the configuration is read
    let _ = BoqLifecycleConfig::load_env_file();
    let config = config()?;
    init_telemetry(&config.observability)?;

    let result = tokio::runtime::Runtime::new()?.block_on(async { run(cli, config).await });

    shutdown_telemetry();
    if let Err(e) = &result {
        tracing::error!(error = %e, "Command failed");
    }
    result
}

async fn run(cli: Cli, config: &BoqLifecycleConfig) -> Result<()> {
    let service = build_service(config, cli.data_dir)?;

    match cli.command {
        Commands::Create { id, project, warehouse } => {
            CreateCommand { id, project, warehouse }.execute(&service).await
        }
        Commands::List => ListCommand.execute(&service).await,
        Commands::Show { id, json } => ShowCommand { id, json }.execute(&service).await,
        Commands::Actions { id } => ActionsCommand { id }.execute(&service).await,
        Commands::Import { id, kind, file } => {
            ImportCommand { id, kind: kind.into(), file }.execute(&service).await
        }
        Commands::Default { id, target, value } => {
            RunCommand {
                id,
                command: LifecycleCommand::PropagateDefault { target, value },
            }
            .execute(&service)
            .await
        }
        Commands::Fetch { id } => {
            RunCommand { id, command: LifecycleCommand::LoadFetchedDetails }
                .execute(&service)
                .await
        }
        Commands::DeriveItems { id } => {
            RunCommand { id, command: LifecycleCommand::DeriveMissingItems }
                .execute(&service)
                .await
        }
        Commands::DeriveTasks { id } => {
            RunCommand { id, command: LifecycleCommand::DeriveTasks }
                .execute(&service)
                .await
        }
        Commands::Reset { id, which } => {
            RunCommand {
                id,
                command: LifecycleCommand::Reset { which: which.into() },
            }
            .execute(&service)
            .await
        }
    }
}
