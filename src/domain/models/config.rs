use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::dimension::DimensionWeights;

/// Main configuration structure for prompt-evolve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Optimization loop settings
    #[serde(default)]
    pub optimizer: OptimizerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Model that executes candidate instructions
    #[serde(default)]
    pub task_model: ModelEndpointConfig,

    /// Model that reflects on diagnostics and rewrites instructions
    #[serde(default)]
    pub reflection_model: ModelEndpointConfig,

    /// Initial fitness weights; defaults are projected onto the metric's dimensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<DimensionWeights>,
}

/// Optimization loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OptimizerConfig {
    /// Iteration budget
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u64,

    /// Task-model call budget, including validation passes
    #[serde(default)]
    pub max_evaluation_calls: Option<u64>,

    /// Examples sampled per iteration
    #[serde(default = "default_minibatch_size")]
    pub minibatch_size: usize,

    /// Maximum archive entries
    #[serde(default = "default_archive_max_size")]
    pub archive_max_size: usize,

    /// Child must beat the parent's minibatch mean by strictly more than this
    #[serde(default)]
    pub acceptance_threshold: f64,

    /// Iteration workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Concurrent task-model calls within one evaluation
    #[serde(default = "default_eval_concurrency")]
    pub eval_concurrency: usize,

    /// Attempt a merge every N iterations; disabled when unset
    #[serde(default)]
    pub merge_interval: Option<u64>,

    /// Base seed for per-worker random generators
    #[serde(default)]
    pub seed: Option<u64>,

    /// Capacity of the progress broadcast channel
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

const fn default_max_iterations() -> u64 {
    100
}

const fn default_minibatch_size() -> usize {
    5
}

const fn default_archive_max_size() -> usize {
    50
}

const fn default_concurrency() -> usize {
    4
}

const fn default_eval_concurrency() -> usize {
    4
}

const fn default_progress_buffer() -> usize {
    256
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_evaluation_calls: None,
            minibatch_size: default_minibatch_size(),
            archive_max_size: default_archive_max_size(),
            acceptance_threshold: 0.0,
            concurrency: default_concurrency(),
            eval_concurrency: default_eval_concurrency(),
            merge_interval: None,
            seed: None,
            progress_buffer: default_progress_buffer(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; console only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation for file logs: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Emit logs on stderr
    #[serde(default = "default_true")]
    pub enable_console: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            enable_console: true,
        }
    }
}

/// An OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ModelEndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Inline API key; takes precedence over `api_key_env`
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: Option<f32>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for ModelEndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
            temperature: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ModelEndpointConfig {
    /// Inline key, else the value of `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty()))
    }
}
