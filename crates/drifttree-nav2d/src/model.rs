use std::collections::BTreeMap;
use std::f64::consts::TAU;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use drifttree_core::{
    ApproximateObservationPool, BinnedActionSource, ChangeFlags, DiscretizedActionPool, Model,
    StatePool, Step,
};

use crate::changes::{load_changes, MapChange};
use crate::config::{ErrorKind, NavConfig};
use crate::error::NavError;
use crate::geometry::Vector2D;
use crate::map::{AreaType, MapSpec};
use crate::{Nav2DAction, Nav2DObservation, Nav2DState, NAV2D_BIN_COUNT};

/// Result of driving one time step along an interpolated path.
#[derive(Debug, Clone, Copy)]
pub struct PathResult {
    pub state: Nav2DState,
    pub reward: f64,
    pub has_collision: bool,
    pub in_goal: bool,
}

/// The 2-D navigation world: a map of rectangular regions, noisy motion,
/// position sightings inside observation areas, and timed map changes.
pub struct Nav2DModel {
    config: NavConfig,
    map: MapSpec,
    changes: BTreeMap<u64, Vec<MapChange>>,
    total_start_area: f64,
    min_value: f64,
}

impl Nav2DModel {
    pub fn new(config: NavConfig, map: MapSpec) -> Self {
        let total_start_area = map
            .areas(AreaType::Start)
            .map(|(_, rect)| rect.area())
            .sum();
        let horizon = (1.0 - config.discount_factor).max(1e-9);
        let min_value = -(config.crash_penalty
            + config.max_speed * config.cost_per_unit_distance
            + config.max_rotational_speed * config.cost_per_revolution)
            / horizon;
        Nav2DModel {
            config,
            map,
            changes: BTreeMap::new(),
            total_start_area,
            min_value,
        }
    }

    /// Build the model by loading the map named in the config.
    pub fn from_config(config: NavConfig) -> Result<Self, NavError> {
        let map = MapSpec::load(&config.map_path)?;
        Ok(Self::new(config, map))
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn map(&self) -> &MapSpec {
        &self.map
    }

    /// The discretized action pool for this model.
    pub fn action_pool(&self) -> DiscretizedActionPool<Nav2DActionSource> {
        DiscretizedActionPool::new(Nav2DActionSource {
            max_speed: self.config.max_speed,
            max_rotational_speed: self.config.max_rotational_speed,
        })
    }

    /// The approximate observation pool, merging sightings within the
    /// configured maximum observation distance.
    pub fn observation_pool(&self) -> ApproximateObservationPool<Nav2DObservation> {
        ApproximateObservationPool::new(self.config.max_observation_distance)
    }

    fn apply_speed_error(&self, speed: f64, rng: &mut ChaCha8Rng) -> f64 {
        let noisy = match self.config.speed_error_type {
            ErrorKind::None => return speed,
            ErrorKind::ProportionalGaussian => {
                gaussian(1.0, self.config.speed_error_sd, rng) * speed
            }
            ErrorKind::AbsoluteGaussian => gaussian(speed, self.config.speed_error_sd, rng),
        };
        noisy.max(0.0)
    }

    fn apply_rotation_error(&self, rotational_speed: f64, rng: &mut ChaCha8Rng) -> f64 {
        match self.config.rotation_error_type {
            ErrorKind::None => rotational_speed,
            ErrorKind::ProportionalGaussian => {
                rotational_speed * gaussian(1.0, self.config.rotation_error_sd, rng)
            }
            ErrorKind::AbsoluteGaussian => {
                gaussian(rotational_speed, self.config.rotation_error_sd, rng)
            }
        }
    }

    /// Drive one time step, interpolating the path and stopping at the
    /// first collision or goal entry.
    ///
    /// With a nonzero turn rate the vehicle follows a circular arc. The
    /// rotation center sits a quarter turn to the side of the heading,
    /// toward the turn; interior points are taken on the circle at the
    /// interpolated heading, offset back by the same quarter turn so the
    /// arc starts exactly at the current position.
    pub fn try_path(&self, state: &Nav2DState, speed: f64, rotational_speed: f64) -> PathResult {
        let position = state.position();
        let direction = state.direction();
        let turn_amount = rotational_speed * self.config.time_step_length;
        let velocity = Vector2D::from_polar(speed, direction);

        let mut in_goal = false;
        let mut has_collision = false;
        let mut current_scalar = 0.0f64;
        let mut current_position = position;
        let mut current_direction = direction;

        let (radius, side) = if turn_amount == 0.0 {
            (0.0, 0.0)
        } else {
            let radius = speed / (TAU * rotational_speed);
            let side = if turn_amount > 0.0 { 0.25 } else { -0.25 };
            (radius.abs(), side)
        };
        let center = position + Vector2D::from_polar(radius, direction + side);

        let steps = self.config.interpolation_step_count.max(1);
        for step in 1..=steps {
            let previous_position = current_position;
            let previous_direction = current_direction;
            let previous_scalar = current_scalar;

            current_scalar = step as f64 / steps as f64;
            if turn_amount == 0.0 {
                current_position = position + current_scalar * velocity;
            } else {
                current_direction = direction + current_scalar * turn_amount;
                current_position =
                    center + Vector2D::from_polar(radius, current_direction - side);
            }

            if !self.map.world().contains(current_position)
                || self.map.is_inside(current_position, AreaType::Obstacle)
            {
                current_scalar = previous_scalar;
                current_position = previous_position;
                current_direction = previous_direction;
                has_collision = true;
                break;
            }
            if self.map.is_inside(current_position, AreaType::Goal) {
                in_goal = true;
                break;
            }
        }

        let (actual_distance, actual_turn) = if turn_amount == 0.0 {
            ((current_position - position).magnitude(), 0.0)
        } else {
            let turn = (current_scalar * turn_amount).abs();
            (TAU * turn * radius, turn)
        };

        let mut reward = 0.0;
        reward -= self.config.cost_per_unit_time * self.config.time_step_length;
        reward -= self.config.cost_per_unit_distance * actual_distance;
        reward -= self.config.cost_per_revolution * actual_turn;
        if in_goal {
            reward += self.config.goal_reward;
        }
        if has_collision {
            reward -= self.config.crash_penalty;
        }

        PathResult {
            state: Nav2DState::new(current_position, current_direction),
            reward,
            has_collision,
            in_goal,
        }
    }

    fn sample_direction(rng: &mut ChaCha8Rng) -> f64 {
        rng.gen_range(-0.5..0.5)
    }
}

fn gaussian(mean: f64, sd: f64, rng: &mut ChaCha8Rng) -> f64 {
    match Normal::new(mean, sd) {
        Ok(normal) => normal.sample(rng),
        Err(_) => mean,
    }
}

impl Model for Nav2DModel {
    type State = Nav2DState;
    type Action = Nav2DAction;
    type Observation = Nav2DObservation;

    fn sample_initial_state(&mut self, rng: &mut ChaCha8Rng) -> Option<Nav2DState> {
        if self.total_start_area <= 0.0 {
            return None;
        }
        let mut remaining = rng.gen_range(0.0..self.total_start_area);
        for (_, rect) in self.map.areas(AreaType::Start) {
            remaining -= rect.area();
            if remaining < 0.0 {
                return Some(Nav2DState::new(rect.sample_uniform(rng), 0.0));
            }
        }
        None
    }

    fn sample_state_uniform(&mut self, rng: &mut ChaCha8Rng) -> Option<Nav2DState> {
        let position = self.map.world().sample_uniform(rng);
        Some(Nav2DState::new(position, Self::sample_direction(rng)))
    }

    fn is_terminal(&self, state: &Nav2DState) -> bool {
        self.map.is_inside(state.position(), AreaType::Goal)
    }

    fn step(
        &mut self,
        state: &Nav2DState,
        action: &Nav2DAction,
        rng: &mut ChaCha8Rng,
    ) -> Option<Step<Nav2DState, Nav2DObservation>> {
        let speed = self.apply_speed_error(action.speed(), rng);
        let rotational_speed = self.apply_rotation_error(action.rotational_speed(), rng);
        let path = self.try_path(state, speed, rotational_speed);
        let observation = self.generate_observation(action, &path.state, rng)?;
        Some(Step {
            is_terminal: self.is_terminal(&path.state),
            next_state: path.state,
            reward: path.reward,
            observation,
        })
    }

    fn generate_next_state(
        &mut self,
        state: &Nav2DState,
        action: &Nav2DAction,
        rng: &mut ChaCha8Rng,
    ) -> Option<Nav2DState> {
        let speed = self.apply_speed_error(action.speed(), rng);
        let rotational_speed = self.apply_rotation_error(action.rotational_speed(), rng);
        Some(self.try_path(state, speed, rotational_speed).state)
    }

    fn generate_observation(
        &mut self,
        _action: &Nav2DAction,
        next_state: &Nav2DState,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Nav2DObservation> {
        if self.map.is_inside(next_state.position(), AreaType::Observation) {
            Some(Nav2DObservation::of_state(next_state))
        } else {
            Some(Nav2DObservation::blank())
        }
    }

    fn heuristic_value(&self, state: &Nav2DState) -> f64 {
        let distance = self.map.distance_to(state.position(), AreaType::Goal);
        let mut value = self.config.goal_reward;
        value -= self.config.cost_per_unit_distance * distance;
        value -= self.config.cost_per_unit_time * distance / self.config.max_speed;
        value
    }

    fn default_value(&self) -> f64 {
        self.min_value
    }

    fn discount_factor(&self) -> f64 {
        self.config.discount_factor
    }

    fn load_changes(
        &mut self,
        path: &Path,
    ) -> Result<Vec<u64>, Box<dyn std::error::Error + Send + Sync>> {
        self.changes = load_changes(path)?;
        Ok(self.changes.keys().copied().collect())
    }

    fn apply_changes(&mut self, time: u64, pool: &mut StatePool<Nav2DState>) {
        let Some(batch) = self.changes.get(&time).cloned() else {
            return;
        };
        for change in batch {
            debug!(kind = %change.kind, id = change.id, area = %change.area, "applying map change");
            self.map.add_area(change.kind, change.id, change.area);
            let flags = if change.kind == AreaType::Observation {
                ChangeFlags::OBSERVATION_BEFORE
            } else {
                ChangeFlags::DELETED
            };
            pool.flag_box(
                &[change.area.lower_left.x, change.area.lower_left.y],
                &[change.area.upper_right.x, change.area.upper_right.y],
                flags,
            );
        }
    }
}

/// Bin table for the ten navigation controls. Offers untried bins in a
/// freshly shuffled order at every belief.
pub struct Nav2DActionSource {
    max_speed: f64,
    max_rotational_speed: f64,
}

impl BinnedActionSource for Nav2DActionSource {
    type Action = Nav2DAction;

    fn bin_count(&self) -> usize {
        NAV2D_BIN_COUNT
    }

    fn sample_action(&mut self, bin: usize, _rng: &mut ChaCha8Rng) -> Option<Nav2DAction> {
        Nav2DAction::from_bin(bin, self.max_speed, self.max_rotational_speed)
    }

    fn bin_sequence(&mut self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let mut bins: Vec<usize> = (0..NAV2D_BIN_COUNT).collect();
        bins.shuffle(rng);
        bins
    }
}
