//! CLI surface for inspecting a taskstore database directly (operator tool).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "taskstore", version = env!("CARGO_PKG_VERSION"), about = "Inspect a taskstore collection directory")]
pub struct Cli {
    /// Directory containing store.db and the collection's .jsonl files
    #[arg(short, long, default_value = ".")]
    pub base_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rebuild the SQLite index for a collection from its JSONL log
    Rebuild {
        /// Collection name (JSONL file stem)
        collection: String,
    },
    /// Print the count of live records in a collection
    Count {
        collection: String,
    },
}
