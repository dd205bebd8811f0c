//! Configuration types and fallback-chain loading for the coordinator.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(rename = "mcp_servers")]
    pub mcp_servers: Vec<McpServerConfig>,
    pub context_storage: ContextStorageConfig,
    pub planning: PlanningConfig,
    pub context_inheritance: ContextInheritanceConfig,
    pub command_executor: CommandExecutorConfig,
    pub continuous: ContinuousConfig,
    pub pause_resume: PauseResumeConfig,
    pub task_stop: TaskStopConfig,
    pub tracker: TrackerConfig,
    pub broker: BrokerConfig,
}

impl Config {
    /// Load configuration with fallback chain: explicit path, project-local
    /// `./config.yaml`, user config dir, defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => tracing::warn!("Failed to load config from {}: {}", local_config.display(), e),
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentd").join("config.yaml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => tracing::warn!("Failed to load config from {}: {}", user_config.display(), e),
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Per-provider settings, keyed by provider name (`anthropic`, `openai`, `ollama`, `lmstudio`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub context_length: Option<usize>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

/// LLM provider configuration: which provider is active and the per-provider table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub function_calling: bool,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = HashMap::new();
        providers.insert(
            "anthropic".to_string(),
            ProviderConfig {
                base_url: Some("https://api.anthropic.com".to_string()),
                model: Some("claude-sonnet-4-20250514".to_string()),
                context_length: Some(200_000),
                api_key: None,
                api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
            },
        );
        providers.insert(
            "openai".to_string(),
            ProviderConfig {
                base_url: Some("https://api.openai.com".to_string()),
                model: Some("gpt-4o".to_string()),
                context_length: Some(128_000),
                api_key: None,
                api_key_env: Some("OPENAI_API_KEY".to_string()),
            },
        );
        Self {
            provider: "anthropic".to_string(),
            function_calling: true,
            max_tokens: 16384,
            timeout_ms: 300_000,
            providers,
        }
    }
}

/// Config, narrowed to the active provider, ready to build a client from.
#[derive(Debug, Clone)]
pub struct ResolvedLlmConfig {
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_ms: u64,
    pub context_length: usize,
    api_key: Option<String>,
    api_key_env: Option<String>,
}

impl ResolvedLlmConfig {
    /// Resolve the API key: literal config value first, then environment variable.
    pub fn get_api_key(&self) -> Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.clone());
        }
        if let Some(env_var) = &self.api_key_env {
            if let Ok(key) = std::env::var(env_var) {
                return Ok(key);
            }
            return Err(eyre::eyre!("Environment variable {} not set", env_var));
        }
        // local providers (ollama, lmstudio) may require no key
        Ok(String::new())
    }
}

impl LlmConfig {
    /// Resolve the active provider into a flat, client-ready configuration.
    pub fn resolve(&self) -> Result<ResolvedLlmConfig> {
        let provider_config = self
            .providers
            .get(&self.provider)
            .ok_or_else(|| eyre::eyre!("No configuration for LLM provider '{}'", self.provider))?;

        Ok(ResolvedLlmConfig {
            provider: self.provider.clone(),
            model: provider_config
                .model
                .clone()
                .ok_or_else(|| eyre::eyre!("Provider '{}' has no model configured", self.provider))?,
            base_url: provider_config
                .base_url
                .clone()
                .ok_or_else(|| eyre::eyre!("Provider '{}' has no base_url configured", self.provider))?,
            max_tokens: self.max_tokens,
            timeout_ms: self.timeout_ms,
            context_length: provider_config.context_length.unwrap_or(128_000),
            api_key: provider_config.api_key.clone(),
            api_key_env: provider_config.api_key_env.clone(),
        })
    }
}

/// One MCP server the tool executor should dial at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextStorageConfig {
    pub enabled: bool,
    pub base_dir: PathBuf,
    pub compression_threshold: f64,
    pub keep_recent_messages: usize,
    pub cleanup_days: u32,
    pub summary_prompt: String,
}

impl Default for ContextStorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_dir: PathBuf::from(".agentd"),
            compression_threshold: 0.7,
            keep_recent_messages: 8,
            cleanup_days: 30,
            summary_prompt: "Summarize the conversation so far, preserving decisions and open issues.".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectionConfig {
    pub enabled: bool,
    pub trigger_on_error: bool,
    pub trigger_interval: u32,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_on_error: true,
            trigger_interval: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionConfig {
    pub max_revisions: u32,
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self { max_revisions: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
    pub max_rounds: u32,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_rounds: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningConfig {
    pub enabled: bool,
    pub strategy: String,
    pub max_subtasks: u32,
    pub reflection: ReflectionConfig,
    pub revision: RevisionConfig,
    pub verification: VerificationConfig,
    /// Per-task cap on LLM calls across every phase; exceeding it terminates
    /// the task same as a fatal error.
    pub max_llm_process_num: u32,
    /// Max consecutive response-parse failures before failing the task.
    pub max_parse_retries: u32,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: "decompose".to_string(),
            max_subtasks: 20,
            reflection: ReflectionConfig::default(),
            revision: RevisionConfig::default(),
            verification: VerificationConfig::default(),
            max_llm_process_num: 200,
            max_parse_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextInheritanceConfig {
    pub enabled: bool,
    pub context_expiry_days: u32,
    pub max_inherited_tokens: usize,
}

impl Default for ContextInheritanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            context_expiry_days: 90,
            max_inherited_tokens: 8000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub external_access: bool,
    pub whitelist_mode: bool,
    pub allowed_domains: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            external_access: true,
            whitelist_mode: false,
            allowed_domains: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub cpu_limit: f64,
    pub memory_limit: String,
    pub network: NetworkConfig,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            cpu_limit: 2.0,
            memory_limit: "4g".to_string(),
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloneConfig {
    pub shallow: bool,
    pub depth: u32,
    pub auto_install_deps: bool,
}

impl Default for CloneConfig {
    fn default() -> Self {
        Self {
            shallow: true,
            depth: 1,
            auto_install_deps: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub timeout_seconds: u64,
    pub max_output_size: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 1800,
            max_output_size: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_hours: u32,
    pub stale_threshold_hours: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            stale_threshold_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandExecutorConfig {
    pub enabled: bool,
    pub environments: HashMap<String, String>,
    pub default_environment: String,
    pub docker: DockerConfig,
    pub clone: CloneConfig,
    pub execution: ExecutionConfig,
    pub cleanup: CleanupConfig,
}

impl Default for CommandExecutorConfig {
    fn default() -> Self {
        let mut environments = HashMap::new();
        environments.insert("node".to_string(), "node:22-bookworm".to_string());
        environments.insert("python".to_string(), "python:3.12-bookworm".to_string());
        environments.insert("go".to_string(), "golang:1.23-bookworm".to_string());
        environments.insert("rust".to_string(), "rust:1.82-bookworm".to_string());
        Self {
            enabled: true,
            environments,
            default_environment: "node".to_string(),
            docker: DockerConfig::default(),
            clone: CloneConfig::default(),
            execution: ExecutionConfig::default(),
            cleanup: CleanupConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub interval_minutes: u32,
    pub delay_first_run: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            delay_first_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub queue_timeout_seconds: u64,
    pub min_interval_seconds: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            queue_timeout_seconds: 30,
            min_interval_seconds: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthcheckConfig {
    pub dir: PathBuf,
    pub update_interval_seconds: u64,
}

impl Default for HealthcheckConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".agentd/health"),
            update_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContinuousConfig {
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
    pub healthcheck: HealthcheckConfig,
}

impl Default for ContinuousConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
            healthcheck: HealthcheckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PauseResumeConfig {
    pub enabled: bool,
    pub signal_file: PathBuf,
    pub check_interval: u64,
    pub paused_task_expiry_days: u32,
}

impl Default for PauseResumeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signal_file: PathBuf::from(".agentd/pause_signal"),
            check_interval: 1,
            paused_task_expiry_days: 14,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStopConfig {
    pub enabled: bool,
    pub check_interval: u64,
}

impl Default for TaskStopConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval: 60,
        }
    }
}

/// One tracker repo the producer polls for trigger-labeled work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerRepo {
    /// `"github"` or `"gitlab"`.
    pub source: String,
    /// `owner/repo` for GitHub, numeric project id for GitLab.
    pub project: String,
    #[serde(default)]
    pub include_pull_requests: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub repos: Vec<TrackerRepo>,
    pub api_token_env: String,
    pub bot_login: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            repos: vec![],
            api_token_env: "GITHUB_TOKEN".to_string(),
            bot_login: "agentd-bot".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn api_token(&self) -> Result<String> {
        std::env::var(&self.api_token_env).context(format!("Environment variable {} not set", self.api_token_env))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Relative to `context_storage.base_dir`.
    pub db_file: String,
    pub lease_seconds: i64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            db_file: "tasks.db".to_string(),
            lease_seconds: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_anthropic_provider() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "anthropic");
        let resolved = config.llm.resolve().unwrap();
        assert!(resolved.model.contains("sonnet"));
    }

    #[test]
    fn resolve_fails_for_unknown_provider() {
        let mut config = LlmConfig::default();
        config.provider = "nonexistent".to_string();
        assert!(config.resolve().is_err());
    }

    #[test]
    fn get_api_key_prefers_literal_over_env() {
        let resolved = ResolvedLlmConfig {
            provider: "anthropic".into(),
            model: "claude".into(),
            base_url: "https://api.anthropic.com".into(),
            max_tokens: 100,
            timeout_ms: 1000,
            context_length: 1000,
            api_key: Some("literal-key".into()),
            api_key_env: Some("SOME_ENV_VAR_THAT_DOES_NOT_EXIST".into()),
        };
        assert_eq!(resolved.get_api_key().unwrap(), "literal-key");
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = r#"
llm:
  provider: openai
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.planning.max_subtasks, 20);
        assert_eq!(config.context_storage.compression_threshold, 0.7);
    }

    #[test]
    fn replan_budget_defaults_match_spec() {
        let config = PlanningConfig::default();
        assert_eq!(config.revision.max_revisions, 3);
        assert_eq!(config.verification.max_rounds, 2);
    }

    #[test]
    fn tracker_api_token_reads_configured_env_var() {
        std::env::set_var("TEST_TRACKER_TOKEN_VAR", "secret123");
        let config = TrackerConfig {
            api_token_env: "TEST_TRACKER_TOKEN_VAR".to_string(),
            ..TrackerConfig::default()
        };
        assert_eq!(config.api_token().unwrap(), "secret123");
        std::env::remove_var("TEST_TRACKER_TOKEN_VAR");
    }

    #[test]
    fn broker_defaults_share_the_index_database_file() {
        let config = BrokerConfig::default();
        assert_eq!(config.db_file, "tasks.db");
    }
}
