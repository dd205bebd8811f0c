use clap::Parser;
use eyre::{Context, Result};
use taskstore::cli::{Cli, Command};

fn main() -> Result<()> {
    env_logger::Builder::from_default_env().filter_level(log::LevelFilter::Info).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Count { collection } => {
            let path = cli.base_dir.join(format!("{collection}.jsonl"));
            let n = count_live_lines(&path).context("failed to read collection log")?;
            println!("{n}");
        }
        Command::Rebuild { collection } => {
            // The generic rebuild lives on Store<T>, which needs a concrete
            // record type to deserialize into. This CLI only has the raw
            // JSONL path, so it reports what it can see in the log; callers
            // that need a typed rebuild do it in-process via `Store::open`.
            let path = cli.base_dir.join(format!("{collection}.jsonl"));
            let n = count_live_lines(&path).context("failed to read collection log")?;
            println!("{collection}: {n} live records in log (typed rebuild must run in-process)");
        }
    }

    Ok(())
}

fn count_live_lines(path: &std::path::Path) -> Result<usize> {
    use std::collections::HashMap;
    use std::io::BufRead;

    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut live: HashMap<String, bool> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)?;
        if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
            let tombstoned = value.get("tombstone").and_then(|v| v.as_bool()).unwrap_or(false);
            live.insert(id.to_string(), !tombstoned);
        }
    }

    Ok(live.values().filter(|v| **v).count())
}
