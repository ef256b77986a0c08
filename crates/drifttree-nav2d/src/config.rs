use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::NavError;

/// Kind of noise applied to commanded speeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ErrorKind {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "proportional gaussian noise")]
    ProportionalGaussian,
    #[serde(rename = "absolute gaussian noise")]
    AbsoluteGaussian,
}

/// Navigation problem parameters. The dotted key names are contractual;
/// they match the original option files verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    #[serde(rename = "problem.timeStepLength")]
    pub time_step_length: f64,
    #[serde(rename = "problem.costPerUnitTime")]
    pub cost_per_unit_time: f64,
    #[serde(rename = "problem.interpolationStepCount")]
    pub interpolation_step_count: u32,
    #[serde(rename = "problem.crashPenalty")]
    pub crash_penalty: f64,
    #[serde(rename = "problem.goalReward")]
    pub goal_reward: f64,
    #[serde(rename = "problem.maxSpeed")]
    pub max_speed: f64,
    #[serde(rename = "problem.costPerUnitDistance")]
    pub cost_per_unit_distance: f64,
    #[serde(rename = "problem.speedErrorType")]
    pub speed_error_type: ErrorKind,
    #[serde(rename = "problem.speedErrorSD")]
    pub speed_error_sd: f64,
    #[serde(rename = "problem.maxRotationalSpeed")]
    pub max_rotational_speed: f64,
    #[serde(rename = "problem.costPerRevolution")]
    pub cost_per_revolution: f64,
    #[serde(rename = "problem.rotationErrorType")]
    pub rotation_error_type: ErrorKind,
    #[serde(rename = "problem.rotationErrorSD")]
    pub rotation_error_sd: f64,
    #[serde(rename = "problem.discountFactor")]
    pub discount_factor: f64,
    #[serde(rename = "problem.mapPath")]
    pub map_path: String,
    #[serde(rename = "SBT.maxObservationDistance")]
    pub max_observation_distance: f64,
}

impl Default for NavConfig {
    fn default() -> Self {
        NavConfig {
            time_step_length: 1.0,
            cost_per_unit_time: 1.0,
            interpolation_step_count: 10,
            crash_penalty: 10.0,
            goal_reward: 10.0,
            max_speed: 1.0,
            cost_per_unit_distance: 0.0,
            speed_error_type: ErrorKind::None,
            speed_error_sd: 0.0,
            max_rotational_speed: 1.0,
            cost_per_revolution: 0.0,
            rotation_error_type: ErrorKind::None,
            rotation_error_sd: 0.0,
            discount_factor: 0.95,
            map_path: String::new(),
            max_observation_distance: 1.0,
        }
    }
}

impl NavConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, NavError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self, NavError> {
        let path = path.as_ref();
        let yaml = fs::read_to_string(path).map_err(|source| NavError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }
}
