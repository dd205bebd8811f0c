//! CLI for inspecting a task's context directory directly (operator tool,
//! not used by the orchestrator itself).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cs")]
#[command(author, version, about = "Inspect per-task context directories", long_about = None)]
pub struct Cli {
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show metadata and message counts for a context directory
    Show {
        #[arg(required = true)]
        task_dir: PathBuf,
    },

    /// Print the active (current.jsonl) transcript
    Current {
        #[arg(required = true)]
        task_dir: PathBuf,
    },

    /// Print the full audit log (messages.jsonl)
    Log {
        #[arg(required = true)]
        task_dir: PathBuf,
    },

    /// Report whether a context directory is over its compression threshold
    CheckCompress {
        #[arg(required = true)]
        task_dir: PathBuf,

        #[arg(long, default_value = "200000")]
        context_length: usize,

        #[arg(long, default_value = "0.7")]
        threshold: f64,
    },
}
