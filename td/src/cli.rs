//! CLI surface: producer/consumer mode selection plus a couple of
//! read-only inspection subcommands that query the index directly.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Autonomous coding-agent orchestrator.
#[derive(Parser)]
#[command(
    name = "agentd",
    about = "Tracker-driven producer/consumer scheduler over containerized LLM coding sessions",
    version = env!("GIT_DESCRIBE"),
    after_help = "Logs are written to stderr; pipe through your process supervisor's log collector."
)]
pub struct Cli {
    /// Path to config file. Defaults to `./config.yaml`, falling back to a
    /// user config dir and built-in defaults if that isn't present either.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one half of the scheduler: poll trackers for new work, or drain
    /// the queue and execute it.
    Run {
        /// Which side of the scheduler to run.
        #[arg(long, value_enum)]
        mode: Mode,

        /// Keep running on a cadence instead of doing exactly one pass.
        #[arg(long)]
        continuous: bool,
    },

    /// Print a summary of tasks in the index, optionally filtered by status.
    Status {
        #[arg(long)]
        status: Option<String>,
    },

    /// Print the full index row for one task.
    Show {
        /// Task uuid (or a unique prefix of it).
        uuid: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    Producer,
    Consumer,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_producer_continuous() {
        let cli = Cli::parse_from(["agentd", "run", "--mode", "producer", "--continuous"]);
        assert!(matches!(cli.command, Command::Run { mode: Mode::Producer, continuous: true }));
    }

    #[test]
    fn parse_run_consumer_one_shot() {
        let cli = Cli::parse_from(["agentd", "run", "--mode", "consumer"]);
        assert!(matches!(cli.command, Command::Run { mode: Mode::Consumer, continuous: false }));
    }

    #[test]
    fn parse_with_config_path() {
        let cli = Cli::parse_from(["agentd", "-c", "/tmp/my.yaml", "run", "--mode", "producer"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/my.yaml")));
    }

    #[test]
    fn parse_without_config_path_defaults_to_none() {
        let cli = Cli::parse_from(["agentd", "run", "--mode", "producer"]);
        assert_eq!(cli.config, None);
    }

    #[test]
    fn parse_show() {
        let cli = Cli::parse_from(["agentd", "show", "abc123"]);
        assert!(matches!(cli.command, Command::Show { uuid } if uuid == "abc123"));
    }

    #[test]
    fn run_requires_mode() {
        let result = Cli::try_parse_from(["agentd", "run"]);
        assert!(result.is_err());
    }
}
