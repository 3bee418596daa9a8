use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SextantError};

/// Top-level Sextant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub fallback_models: Vec<ModelConfig>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

fn default_workspace() -> String { "~/.sextant".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_provider() -> String { "openai".to_string() }
fn default_max_tokens() -> u32 { 2000 }
fn default_temperature() -> f32 { 0.3 }
fn default_request_timeout() -> u64 { 60 }

impl ModelConfig {
    /// Minimal config for a model id with every other field defaulted.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            provider: default_provider(),
            model_id: model_id.into(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
            retry: None,
        }
    }
}

/// Retry configuration for transport failures against the generative backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

fn default_max_retries() -> u32 { 3 }
fn default_initial_backoff() -> u64 { 1000 }
fn default_max_backoff() -> u64 { 30000 }

/// Query cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// SQLite database path. Default: <workspace>/cache.db
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_ttl_hours")]
    pub default_ttl_hours: u64,
    /// Per-source TTL overrides, keyed by adapter name.
    #[serde(default)]
    pub ttl_hours: HashMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            default_ttl_hours: default_ttl_hours(),
            ttl_hours: HashMap::new(),
        }
    }
}

fn default_ttl_hours() -> u64 { 24 }

impl CacheConfig {
    pub fn ttl_for(&self, source: &str) -> Duration {
        let hours = self
            .ttl_hours
            .get(source)
            .copied()
            .unwrap_or(self.default_ttl_hours);
        Duration::from_secs(hours * 3600)
    }
}

/// External data provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Timeout applied to every external call.
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,
    /// Minimum delay between live calls to the same source type.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,
    #[serde(default)]
    pub serper: Option<SerperConfig>,
    #[serde(default)]
    pub github: Option<GithubConfig>,
    #[serde(default)]
    pub youtube: Option<YoutubeConfig>,
    #[serde(default)]
    pub hackernews: HackerNewsConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_source_timeout(),
            min_interval_ms: default_min_interval(),
            serper: None,
            github: None,
            youtube: None,
            hackernews: HackerNewsConfig::default(),
        }
    }
}

fn default_source_timeout() -> u64 { 20 }
fn default_min_interval() -> u64 { 500 }

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerperConfig {
    pub api_key: String,
    #[serde(default = "default_serper_results")]
    pub results: u32,
    #[serde(default = "default_serper_country")]
    pub country: String,
}

fn default_serper_results() -> u32 { 10 }
fn default_serper_country() -> String { "us".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_per_page")]
    pub per_page: u32,
}

fn default_github_per_page() -> u32 { 30 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoutubeConfig {
    pub api_key: String,
    #[serde(default = "default_youtube_max_results")]
    pub max_results: u32,
}

fn default_youtube_max_results() -> u32 { 25 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HackerNewsConfig {
    #[serde(default = "default_hn_enabled")]
    pub enabled: bool,
    #[serde(default = "default_hn_hits")]
    pub hits_per_page: u32,
}

impl Default for HackerNewsConfig {
    fn default() -> Self {
        Self {
            enabled: default_hn_enabled(),
            hits_per_page: default_hn_hits(),
        }
    }
}

fn default_hn_enabled() -> bool { true }
fn default_hn_hits() -> u32 { 50 }

/// Workflow limits and generation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Hard cap on iterations of a self-looping stage (e.g. drafting).
    #[serde(default = "default_max_draft_iterations")]
    pub max_draft_iterations: usize,
    /// Hard cap on total stage executions in one run.
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Append an evidence-restricted summary during report assembly.
    #[serde(default = "default_editorial_pass")]
    pub editorial_pass: bool,
    #[serde(default)]
    pub structured_retry: StructuredRetryConfig,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_draft_iterations: default_max_draft_iterations(),
            max_steps: default_max_steps(),
            editorial_pass: default_editorial_pass(),
            structured_retry: StructuredRetryConfig::default(),
        }
    }
}

fn default_max_draft_iterations() -> usize { 10 }
fn default_max_steps() -> usize { 64 }
fn default_editorial_pass() -> bool { true }

/// Retry policy for malformed structured output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredRetryConfig {
    #[serde(default = "default_structured_attempts")]
    pub max_attempts: u32,
    /// Temperature for each attempt; the last value repeats.
    #[serde(default = "default_temperature_schedule")]
    pub temperature_schedule: Vec<f32>,
}

impl Default for StructuredRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_structured_attempts(),
            temperature_schedule: default_temperature_schedule(),
        }
    }
}

fn default_structured_attempts() -> u32 { 3 }
fn default_temperature_schedule() -> Vec<f32> { vec![0.7, 0.4, 0.1] }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| SextantError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| SextantError::Config(e.to_string()))
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    /// Resolve the cache database path.
    pub fn cache_path(&self) -> PathBuf {
        match self.cache.path {
            Some(ref p) => expand_home(p),
            None => self.workspace_dir().join("cache.db"),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
