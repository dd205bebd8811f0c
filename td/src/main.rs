//! agentd - autonomous coding-agent orchestrator.
//!
//! Entry point: parse CLI args, load config, set up logging, then dispatch
//! into the producer/consumer daemon loop or a read-only inspection command.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use agentd::cli::{Cli, Command};
use agentd::config::Config;
use agentd::daemon;
use agentd::state::{StateManager, TaskQuery};

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = match Config::load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::from(1);
        }
    };

    let project_root = PathBuf::from(".");
    let result = match cli.command {
        Command::Run { mode, continuous } => daemon::run(config, mode, continuous, &project_root).await,
        Command::Status { status } => cmd_status(&config, status).await,
        Command::Show { uuid } => cmd_show(&config, &uuid).await,
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!(error = %e, "agentd exited with an unrecoverable error");
            ExitCode::from(2)
        }
    }
}

async fn cmd_status(config: &Config, status: Option<String>) -> eyre::Result<()> {
    let state = StateManager::spawn(config.context_storage.base_dir.join("index"))?;
    let records = state
        .query(TaskQuery {
            status,
            ..Default::default()
        })
        .await?;
    info!(count = records.len(), "task index summary");
    for record in &records {
        println!("{}  {:?}  {}/{}  requester={}", record.uuid, record.status, record.task_source, record.task_type, record.requester);
    }
    Ok(())
}

async fn cmd_show(config: &Config, uuid_prefix: &str) -> eyre::Result<()> {
    let state = StateManager::spawn(config.context_storage.base_dir.join("index"))?;
    let records = state.query(TaskQuery::default()).await?;
    let matched = records.into_iter().find(|r| r.uuid.starts_with(uuid_prefix));
    match matched {
        Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
        None => println!("no task found matching uuid prefix '{uuid_prefix}'"),
    }
    Ok(())
}
