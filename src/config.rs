//! Orchestrator configuration: injected at construction, never read from
//! ambient/global state at request time (spec.md §9 "Replacing
//! ambient/global state").

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u64,

    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,

    #[serde(default = "default_reasoning_model")]
    pub reasoning_model: String,

    #[serde(default = "default_reasoning_api_base")]
    pub reasoning_api_base: String,

    #[serde(default)]
    pub bypass_json_validation: bool,

    #[serde(default = "default_synthesis_max_tokens")]
    pub synthesis_max_tokens: u64,

    /// Hard wall-clock deadline (spec.md §5) past which all in-flight
    /// outbound calls are cancelled, distinct from the soft per-run
    /// `time_limit_secs`.
    #[serde(default = "default_hard_deadline_secs")]
    pub hard_deadline_secs: u64,
}

fn default_max_depth() -> u32 {
    7
}
fn default_time_limit_secs() -> u64 {
    270
}
fn default_max_failed_attempts() -> u32 {
    3
}
fn default_reasoning_model() -> String {
    "o1-mini".to_string()
}
fn default_reasoning_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_synthesis_max_tokens() -> u64 {
    16_384
}
fn default_hard_deadline_secs() -> u64 {
    300
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            time_limit_secs: default_time_limit_secs(),
            max_failed_attempts: default_max_failed_attempts(),
            reasoning_model: default_reasoning_model(),
            reasoning_api_base: default_reasoning_api_base(),
            bypass_json_validation: false,
            synthesis_max_tokens: default_synthesis_max_tokens(),
            hard_deadline_secs: default_hard_deadline_secs(),
        }
    }
}

impl Config {
    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    pub fn hard_deadline(&self) -> Duration {
        Duration::from_secs(self.hard_deadline_secs)
    }

    /// Load `config.yaml` from the package root if present, falling back to
    /// defaults; then apply environment-variable overrides for the fields
    /// spec.md §6 names explicitly. Secrets are never read from the YAML
    /// file, only from the environment.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_yaml::from_str(&contents)?
        } else {
            Config::default()
        };

        if let Ok(model) = std::env::var("REASONING_MODEL") {
            config.reasoning_model = model;
        }
        if let Ok(base) = std::env::var("REASONING_API_BASE") {
            config.reasoning_api_base = base;
        }
        if let Ok(bypass) = std::env::var("BYPASS_JSON_VALIDATION") {
            config.bypass_json_validation = matches!(bypass.as_str(), "1" | "true" | "yes");
        }
        if let Ok(depth) = std::env::var("RESEARCH_MAX_DEPTH")
            && let Ok(depth) = depth.parse()
        {
            config.max_depth = depth;
        }
        if let Ok(secs) = std::env::var("RESEARCH_TIME_LIMIT_SECS")
            && let Ok(secs) = secs.parse()
        {
            config.time_limit_secs = secs;
        }
        if let Ok(secs) = std::env::var("RESEARCH_HARD_DEADLINE_SECS")
            && let Ok(secs) = secs.parse()
        {
            config.hard_deadline_secs = secs;
        }

        Ok(config)
    }
}

/// Secrets read once at process startup (spec.md §5: "API keys are read
/// once at startup"), kept separate from [`Config`] so the latter remains
/// cheaply `Clone` and safe to log.
#[derive(Debug, Clone)]
pub struct Secrets {
    pub firecrawl_api_key: String,
    pub reasoning_api_key: String,
}

impl Secrets {
    pub fn from_env() -> Result<Self, crate::errors::OrchestratorError> {
        let firecrawl_api_key = std::env::var("FIRECRAWL_API_KEY").map_err(|_| {
            crate::errors::OrchestratorError::Config(
                "FIRECRAWL_API_KEY is not set".to_string(),
            )
        })?;
        let reasoning_api_key = std::env::var("REASONING_API_KEY").map_err(|_| {
            crate::errors::OrchestratorError::Config(
                "REASONING_API_KEY is not set".to_string(),
            )
        })?;
        Ok(Self {
            firecrawl_api_key,
            reasoning_api_key,
        })
    }
}
