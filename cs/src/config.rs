//! Configuration for the standalone `cs` inspection CLI.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory holding context subdirectories (mirrors the
    /// orchestrator's `context_storage.base_dir`).
    pub base_dir: PathBuf,

    /// Token-pressure compression threshold, as a fraction of context_length.
    pub compression_threshold: f64,

    /// Number of most-recent messages kept verbatim across a compression.
    pub keep_recent_messages: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            compression_threshold: 0.7,
            keep_recent_messages: 8,
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("agentd").join("contexts")
}

impl Config {
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        if let Some(config_path) = path {
            let content = std::fs::read_to_string(config_path)?;
            return Ok(serde_yaml::from_str(&content)?);
        }

        let candidates = [
            dirs::config_dir().map(|p| p.join("agentd").join("contextstore.yml")),
            Some(PathBuf::from(".contextstore.yml")),
        ];
        for path in candidates.into_iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(&path)?;
                return Ok(serde_yaml::from_str(&content)?);
            }
        }

        Ok(Config::default())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert!((cfg.compression_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.keep_recent_messages, 8);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let cfg: Config = serde_yaml::from_str("compression_threshold: 0.9\n").unwrap();
        assert!((cfg.compression_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(cfg.keep_recent_messages, 8);
    }
}
