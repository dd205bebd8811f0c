use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;

use contextstore::ContextStore;
use contextstore::cli::{Cli, Command};
use contextstore::config::Config;

fn setup_logging() -> Result<()> {
    env_logger::Builder::from_default_env().filter_level(log::LevelFilter::Info).init();
    Ok(())
}

fn main() -> Result<()> {
    setup_logging().context("failed to set up logging")?;

    let cli = Cli::parse();
    let _config = Config::load(cli.config.as_ref()).context("failed to load configuration")?;

    info!("cs starting");

    match cli.command {
        Command::Show { task_dir } => {
            let store = ContextStore::open_existing(&task_dir)?;
            let meta = store.metadata()?;
            let messages = store.current_messages()?;
            println!("{} {}", "task:".dimmed(), meta.task_uuid.cyan());
            println!("{} {}", "source:".dimmed(), meta.task_source);
            println!("{} {} / {}", "llm:".dimmed(), meta.llm_provider, meta.model);
            println!("{} {}", "active messages:".dimmed(), messages.len());
            println!("{} {}", "estimated tokens:".dimmed(), store.current_token_estimate()?);
        }
        Command::Current { task_dir } => {
            let store = ContextStore::open_existing(&task_dir)?;
            for msg in store.current_messages()? {
                println!("[{}] {}", msg.role.yellow(), msg.content);
            }
        }
        Command::Log { task_dir } => {
            let content = std::fs::read_to_string(task_dir.join("messages.jsonl"))?;
            print!("{content}");
        }
        Command::CheckCompress {
            task_dir,
            context_length,
            threshold,
        } => {
            let store = ContextStore::open_existing(&task_dir)?;
            if store.should_compress(context_length, threshold)? {
                println!("{} over threshold, compression recommended", "⚠".yellow());
            } else {
                println!("{} under threshold", "✓".green());
            }
        }
    }

    Ok(())
}
