use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_CONFIG_YAML: &str = include_str!("../../config/solver.default.yaml");

/// Parameters of a planning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Simulations per planning step, the `P` of the planning loop.
    pub simulations_per_step: usize,
    /// UCB1 exploration coefficient.
    pub exploration: f64,
    /// Descent depth cap per simulation.
    pub maximum_depth: usize,
    /// Target particle count for the root belief.
    pub root_particles: usize,
    /// Optional wall-clock budget per planning step. Checked strictly
    /// between simulations, never inside one.
    pub time_budget_ms: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            simulations_per_step: 512,
            exploration: 1.4,
            maximum_depth: 100,
            root_particles: 256,
            time_budget_ms: None,
        }
    }
}

impl SearchConfig {
    /// Parse a search config from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, SearchConfigError> {
        let config: SearchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a search config from a YAML file path.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, SearchConfigError> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Return the default YAML config included with this crate.
    pub fn default_yaml() -> &'static str {
        DEFAULT_CONFIG_YAML
    }

    /// Parse the default YAML config included with this crate.
    pub fn from_default_yaml() -> Result<Self, SearchConfigError> {
        Self::from_yaml_str(Self::default_yaml())
    }

    pub fn validate(&self) -> Result<(), SearchConfigError> {
        if self.simulations_per_step == 0 {
            return Err(SearchConfigError::Invalid(
                "simulations_per_step must be greater than 0".to_string(),
            ));
        }
        if !self.exploration.is_finite() || self.exploration < 0.0 {
            return Err(SearchConfigError::Invalid(
                "exploration must be finite and >= 0".to_string(),
            ));
        }
        if self.maximum_depth == 0 {
            return Err(SearchConfigError::Invalid(
                "maximum_depth must be greater than 0".to_string(),
            ));
        }
        if self.root_particles == 0 {
            return Err(SearchConfigError::Invalid(
                "root_particles must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Error type for loading and validating `SearchConfig`.
#[derive(Debug, Error)]
pub enum SearchConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid search config: {0}")]
    Invalid(String),
}
