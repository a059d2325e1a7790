use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::{Config, ModelEndpointConfig};

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Invalid {field}: {value}. Must be at least 1")]
    ZeroLimit { field: &'static str, value: u64 },

    #[error("Invalid acceptance_threshold: {0}. Must be a finite number")]
    InvalidThreshold(f64),

    #[error("Invalid max_tokens for {0}: cannot be 0")]
    InvalidMaxTokens(&'static str),

    #[error(
        "Invalid backoff configuration for {0}: initial_backoff_ms ({1}) must not exceed max_backoff_ms ({2})"
    )]
    InvalidBackoff(&'static str, u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .prompt-evolve/config.yaml (project config)
    /// 3. .prompt-evolve/local.yaml (local overrides, optional)
    /// 4. Environment variables (PROMPT_EVOLVE_* prefix, `__` separates sections)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".prompt-evolve/config.yaml"))
            .merge(Yaml::file(".prompt-evolve/local.yaml"))
            .merge(Env::prefixed("PROMPT_EVOLVE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honouring environment overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("PROMPT_EVOLVE_").split("__"))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        let optimizer = &config.optimizer;
        let limits = [
            ("minibatch_size", optimizer.minibatch_size),
            ("archive_max_size", optimizer.archive_max_size),
            ("concurrency", optimizer.concurrency),
            ("eval_concurrency", optimizer.eval_concurrency),
            ("progress_buffer", optimizer.progress_buffer),
        ];
        for (field, value) in limits {
            if value == 0 {
                return Err(ConfigError::ZeroLimit { field, value: 0 });
            }
        }

        if !optimizer.acceptance_threshold.is_finite() {
            return Err(ConfigError::InvalidThreshold(optimizer.acceptance_threshold));
        }

        Self::validate_endpoint("task_model", &config.task_model)?;
        Self::validate_endpoint("reflection_model", &config.reflection_model)?;

        Ok(())
    }

    fn validate_endpoint(name: &'static str, endpoint: &ModelEndpointConfig) -> Result<(), ConfigError> {
        if endpoint.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "{name}.base_url cannot be empty"
            )));
        }
        if endpoint.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(format!(
                "{name}.model cannot be empty"
            )));
        }
        if endpoint.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens(name));
        }
        if endpoint.initial_backoff_ms > endpoint.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                name,
                endpoint.initial_backoff_ms,
                endpoint.max_backoff_ms,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Dimension;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.optimizer.max_iterations, 100);
        assert_eq!(config.optimizer.minibatch_size, 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.task_model.api_key_env, "OPENAI_API_KEY");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
optimizer:
  max_iterations: 20
  max_evaluation_calls: 400
  minibatch_size: 3
  acceptance_threshold: 0.01
  merge_interval: 5
  seed: 7
logging:
  level: debug
  format: json
reflection_model:
  model: gpt-4o
  temperature: 0.7
weights:
  successRate: 0.5
  quality: 0.5
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.optimizer.max_iterations, 20);
        assert_eq!(config.optimizer.max_evaluation_calls, Some(400));
        assert_eq!(config.optimizer.minibatch_size, 3);
        assert!((config.optimizer.acceptance_threshold - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.optimizer.merge_interval, Some(5));
        assert_eq!(config.optimizer.seed, Some(7));
        assert_eq!(config.optimizer.archive_max_size, 50);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.reflection_model.model, "gpt-4o");
        assert_eq!(config.task_model.model, "gpt-4o-mini");

        let weights = config.weights.as_ref().expect("weights should parse");
        assert_eq!(weights.len(), 2);
        assert!((weights.get(Dimension::Quality).unwrap() - 0.5).abs() < f64::EPSILON);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_yaml_rejects_weights_not_summing_to_one() {
        let yaml = r"
weights:
  successRate: 0.9
  quality: 0.5
";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));
    }

    #[test]
    fn test_validate_invalid_rotation() {
        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRotation(_)
        ));
    }

    #[test]
    fn test_validate_zero_minibatch() {
        let mut config = Config::default();
        config.optimizer.minibatch_size = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroLimit {
                field: "minibatch_size",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default();
        config.optimizer.concurrency = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::ZeroLimit {
                field: "concurrency",
                ..
            }
        ));
    }

    #[test]
    fn test_validate_non_finite_threshold() {
        let mut config = Config::default();
        config.optimizer.acceptance_threshold = f64::NAN;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidThreshold(_)
        ));
    }

    #[test]
    fn test_validate_invalid_backoff() {
        let mut config = Config::default();
        config.task_model.initial_backoff_ms = 30_000;
        config.task_model.max_backoff_ms = 10_000;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidBackoff("task_model", 30_000, 10_000)
        ));
    }

    #[test]
    fn test_validate_empty_model() {
        let mut config = Config::default();
        config.reflection_model.model = String::new();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::ValidationFailed(msg) => assert!(msg.contains("reflection_model.model")),
            other => panic!("Expected ValidationFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_zero_max_tokens() {
        let mut config = Config::default();
        config.task_model.max_tokens = 0;

        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxTokens("task_model")
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("create temp file");
        writeln!(
            file,
            "optimizer:\n  max_iterations: 12\n  concurrency: 2\nlogging:\n  level: warn"
        )
        .expect("write config");

        temp_env::with_vars_unset(
            ["PROMPT_EVOLVE_OPTIMIZER__MAX_ITERATIONS", "PROMPT_EVOLVE_OPTIMIZER__CONCURRENCY"],
            || {
                let config = ConfigLoader::load_from_file(file.path()).expect("config should load");
                assert_eq!(config.optimizer.max_iterations, 12);
                assert_eq!(config.optimizer.concurrency, 2);
                assert_eq!(config.logging.level, "warn");
                assert_eq!(config.optimizer.minibatch_size, 5);
            },
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("create temp file");
        writeln!(file, "optimizer:\n  max_iterations: 12").expect("write config");

        temp_env::with_var("PROMPT_EVOLVE_OPTIMIZER__MAX_ITERATIONS", Some("40"), || {
            let config = ConfigLoader::load_from_file(file.path()).expect("config should load");
            assert_eq!(config.optimizer.max_iterations, 40);
        });
    }

    #[test]
    fn test_load_from_file_rejects_invalid_values() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("create temp file");
        writeln!(file, "optimizer:\n  archive_max_size: 0").expect("write config");

        temp_env::with_vars_unset(["PROMPT_EVOLVE_OPTIMIZER__ARCHIVE_MAX_SIZE"], || {
            assert!(ConfigLoader::load_from_file(file.path()).is_err());
        });
    }
}
