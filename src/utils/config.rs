//! Application configuration.

use crate::agent::DQNConfig;
use crate::environment::{EnvConfig, SyntheticConfig};
use crate::training::TrainerConfig;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Synthetic junction settings
    pub simulator: SyntheticConfig,
    /// Observed and controlled network objects
    pub environment: EnvConfig,
    /// Learner hyperparameters
    pub agent: DQNConfig,
    /// Training run settings
    pub training: TrainingConfig,
}

/// Training run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Number of training episodes
    pub episodes: usize,
    /// Steps per episode
    pub max_steps: usize,
    /// Batch size for each learning update
    pub batch_size: usize,
    /// Seed for the demand perturbation and the synthetic junction
    pub seed: Option<u64>,
    /// Where the trained model is written
    pub model_path: String,
    /// Directory for CSV metric exports, if any
    pub metrics_dir: Option<String>,
    /// Print a progress line every N episodes
    pub log_freq: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 1,
            max_steps: 100,
            batch_size: 64,
            seed: None,
            model_path: "models/traffic_dqn.json".to_string(),
            metrics_dir: None,
            log_freq: 1,
        }
    }
}

impl TrainingConfig {
    /// Loop parameters handed to the trainer
    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            episodes: self.episodes,
            max_steps: self.max_steps,
            batch_size: self.batch_size,
        }
    }
}

impl AppConfig {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Defaults with environment variable overrides applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply `TRAFFIC_*` environment variables on top of this config.
    /// Unparsable values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(episodes) = env_parse("TRAFFIC_EPISODES") {
            self.training.episodes = episodes;
        }
        if let Some(max_steps) = env_parse("TRAFFIC_MAX_STEPS") {
            self.training.max_steps = max_steps;
        }
        if let Some(batch_size) = env_parse("TRAFFIC_BATCH_SIZE") {
            self.training.batch_size = batch_size;
        }
        if let Some(seed) = env_parse("TRAFFIC_SEED") {
            self.training.seed = Some(seed);
        }
        if let Ok(path) = std::env::var("TRAFFIC_MODEL_PATH") {
            self.training.model_path = path;
        }

        self
    }

    /// Reject settings the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let agent = &self.agent;
        let unit = 0.0..=1.0;
        if !unit.contains(&agent.gamma) {
            bail!("gamma must be in [0, 1], got {}", agent.gamma);
        }
        if !unit.contains(&agent.epsilon_start) || !unit.contains(&agent.epsilon_min) {
            bail!("epsilon values must be in [0, 1]");
        }
        if agent.epsilon_min > agent.epsilon_start {
            bail!(
                "epsilon_min ({}) exceeds epsilon_start ({})",
                agent.epsilon_min,
                agent.epsilon_start
            );
        }
        if !unit.contains(&agent.epsilon_decay) {
            bail!("epsilon_decay must be in [0, 1], got {}", agent.epsilon_decay);
        }
        if agent.learning_rate <= 0.0 {
            bail!("learning_rate must be positive");
        }
        if agent.hidden_layers.iter().any(|&size| size == 0) {
            bail!("hidden layer sizes must be non-zero");
        }
        if self.training.batch_size == 0 {
            bail!("batch_size must be at least 1");
        }
        if self.environment.reward_edges.is_empty() {
            bail!("at least one reward edge is required");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.training.episodes, 1);
        assert_eq!(config.training.max_steps, 100);
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.agent.memory_size, 2000);
        assert_eq!(config.environment.tls_id, "J12");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = AppConfig::default();
        config.training.episodes = 12;
        config.training.seed = Some(7);
        config.agent.gamma = 0.9;
        config.to_file(&path).unwrap();

        let loaded = AppConfig::from_file(&path).unwrap();
        assert_eq!(loaded.training.episodes, 12);
        assert_eq!(loaded.training.seed, Some(7));
        assert_eq!(loaded.agent.gamma, 0.9);
        assert_eq!(loaded.environment.reward_edges, config.environment.reward_edges);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let err = AppConfig::from_file(dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("TRAFFIC_EPISODES", "3");
        std::env::set_var("TRAFFIC_SEED", "42");
        std::env::set_var("TRAFFIC_BATCH_SIZE", "not-a-number");

        let config = AppConfig::from_env();

        std::env::remove_var("TRAFFIC_EPISODES");
        std::env::remove_var("TRAFFIC_SEED");
        std::env::remove_var("TRAFFIC_BATCH_SIZE");

        assert_eq!(config.training.episodes, 3);
        assert_eq!(config.training.seed, Some(42));
        assert_eq!(config.training.batch_size, 64);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.agent.epsilon_min = 0.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.training.batch_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.gamma = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trainer_config() {
        let mut config = AppConfig::default();
        config.training.episodes = 4;
        let trainer = config.training.trainer_config();
        assert_eq!(trainer.episodes, 4);
        assert_eq!(trainer.max_steps, 100);
    }
}
