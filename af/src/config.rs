//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Model selection per role
    pub models: ModelsConfig,

    /// Retry parameters for model calls
    pub retry: RetryConfig,

    /// Plan execution settings
    pub execution: ExecutionConfig,

    /// Storage locations
    pub storage: StorageConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration for commands that call the model
    ///
    /// Call this early so a missing key fails fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        self.retry.validate()?;
        if std::env::var(&self.llm.api_key_env).is_err() {
            return Err(eyre::eyre!(
                "LLM API key not found. Set the {} environment variable.",
                self.llm.api_key_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .agentflow.yml
        let local_config = PathBuf::from(".agentflow.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/agentflow/agentflow.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("agentflow").join("agentflow.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
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

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("openai" or "openai-compatible")
    pub provider: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env).context(format!("Environment variable {} is not set", self.api_key_env))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            base_url: "https://api.openai.com".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 4096,
            timeout_ms: 120_000,
        }
    }
}

/// Model selection per role; absence only matters when the role is used
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model behind the LLM planner
    pub planner: Option<String>,

    /// Model the agent executor runs steps with
    pub executor: Option<String>,

    /// Model behind the plan edit engine
    pub editor: Option<String>,
}

/// Retry parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "initial-delay-ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "backoff-factor")]
    pub backoff_factor: f64,
}

impl RetryConfig {
    /// Reject a backoff factor that is negative, infinite or not a number
    pub fn validate(&self) -> Result<()> {
        if !self.backoff_factor.is_finite() || self.backoff_factor < 0.0 {
            return Err(eyre::eyre!(
                "retry.backoff-factor must be a finite, non-negative number (got {})",
                self.backoff_factor
            ));
        }
        Ok(())
    }

    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_factor,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            backoff_factor: policy.backoff_factor,
        }
    }
}

/// Which planner strategy produces plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlannerKind {
    #[default]
    Heuristic,
    Llm,
}

/// Plan execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub planner: PlannerKind,

    /// Steps allowed to run at once; 1 means strictly sequential
    #[serde(rename = "max-parallel-steps")]
    pub max_parallel_steps: usize,

    /// Report approval-gated steps as pre-approved in CLI output
    #[serde(rename = "auto-approve")]
    pub auto_approve: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            planner: PlannerKind::Heuristic,
            max_parallel_steps: 1,
            auto_approve: false,
        }
    }
}

/// Storage locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Hidden per-workspace directory
    #[serde(rename = "project-dir")]
    pub project_dir: String,

    /// File backing the global-scope key-value store
    #[serde(rename = "global-path")]
    pub global_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            project_dir: planstore::PROJECT_DIR.to_string(),
            global_path: planstore::FileKvStore::default_path(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay_ms, 2500);
        assert_eq!(config.execution.max_parallel_steps, 1);
        assert_eq!(config.execution.planner, PlannerKind::Heuristic);
        assert!(config.models.planner.is_none());
        assert_eq!(config.storage.project_dir, ".agentflow");
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: openai-compatible
  base-url: http://localhost:8080
  api-key-env: LOCAL_KEY
  max-tokens: 2048

models:
  planner: gpt-4o
  editor: gpt-4o-mini

retry:
  max-attempts: 5
  initial-delay-ms: 100
  backoff-factor: 2.0

execution:
  planner: llm
  max-parallel-steps: 4
  auto-approve: true

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.base_url, "http://localhost:8080");
        assert_eq!(config.llm.api_key_env, "LOCAL_KEY");
        assert_eq!(config.models.planner.as_deref(), Some("gpt-4o"));
        assert!(config.models.executor.is_none());
        assert_eq!(config.execution.planner, PlannerKind::Llm);
        assert_eq!(config.execution.max_parallel_steps, 4);
        assert!(config.execution.auto_approve);
        assert_eq!(config.log_level.as_deref(), Some("debug"));

        let policy = config.retry.to_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
models:
  executor: gpt-4o
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.models.executor.as_deref(), Some("gpt-4o"));
        assert_eq!(config.llm.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.retry.backoff_factor, 1.5);
        assert!(!config.execution.auto_approve);
    }

    #[test]
    fn test_load_explicit_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("custom.yml");
        fs::write(&path, "execution:\n  max-parallel-steps: 2\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.execution.max_parallel_steps, 2);

        let missing = temp.path().join("missing.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_backoff_factor_rejected() {
        for yaml in [
            "retry:\n  backoff-factor: -1.0\n",
            "retry:\n  backoff-factor: .nan\n",
            "retry:\n  backoff-factor: .inf\n",
        ] {
            let config: Config = serde_yaml::from_str(yaml).unwrap();
            let err = config.retry.validate().unwrap_err();
            assert!(err.to_string().contains("backoff-factor"), "{}", err);
            // Checked before the API key
            assert!(config.validate().unwrap_err().to_string().contains("backoff-factor"));
        }

        let config: Config = serde_yaml::from_str("retry:\n  backoff-factor: 0.0\n").unwrap();
        assert!(config.retry.validate().is_ok());
        assert!(Config::default().retry.validate().is_ok());
    }
}
