use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::{
    BinnedActionSource, DiscreteObservationPool, DiscretizedAction, DiscretizedActionPool, Model,
    SearchConfig, Solver, SpatialState, Step,
};

/// Position on a short line of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell(pub i64);

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl SpatialState for Cell {
    fn coords(&self) -> Vec<f64> {
        vec![self.0 as f64]
    }
}

/// Discretized action over three bins: stay, left, right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move(pub usize);

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a{}", self.0)
    }
}

impl DiscretizedAction for Move {
    fn bin_number(&self) -> usize {
        self.0
    }
}

/// Exact position observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sight(pub i64);

impl fmt::Display for Sight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

/// Fixed bin supply with an in-order sequence.
pub struct MoveSource {
    pub bins: usize,
}

impl BinnedActionSource for MoveSource {
    type Action = Move;

    fn bin_count(&self) -> usize {
        self.bins
    }

    fn sample_action(&mut self, bin: usize, _rng: &mut ChaCha8Rng) -> Option<Move> {
        Some(Move(bin))
    }

    fn bin_sequence(&mut self, _rng: &mut ChaCha8Rng) -> Vec<usize> {
        (0..self.bins).collect()
    }
}

/// Deterministic corridor: cost 1 per step, reward 10 for stepping while at
/// the goal cell, which then absorbs.
pub struct LineWorld {
    pub length: i64,
    pub goal: i64,
    pub discount: f64,
    pub heuristic: f64,
    pub default: f64,
}

impl LineWorld {
    pub fn new(length: i64, goal: i64) -> Self {
        LineWorld {
            length,
            goal,
            discount: 0.95,
            heuristic: 0.0,
            default: -20.0,
        }
    }
}

impl Model for LineWorld {
    type State = Cell;
    type Action = Move;
    type Observation = Sight;

    fn sample_initial_state(&mut self, _rng: &mut ChaCha8Rng) -> Option<Cell> {
        Some(Cell(0))
    }

    fn sample_state_uniform(&mut self, rng: &mut ChaCha8Rng) -> Option<Cell> {
        Some(Cell(rng.gen_range(0..self.length)))
    }

    fn is_terminal(&self, _state: &Cell) -> bool {
        false
    }

    fn step(&mut self, state: &Cell, action: &Move, _rng: &mut ChaCha8Rng) -> Option<Step<Cell, Sight>> {
        if state.0 == self.goal {
            return Some(Step {
                next_state: *state,
                reward: 10.0,
                observation: Sight(state.0),
                is_terminal: true,
            });
        }
        let next = match action.0 {
            1 => (state.0 - 1).max(0),
            2 => (state.0 + 1).min(self.length - 1),
            _ => state.0,
        };
        Some(Step {
            next_state: Cell(next),
            reward: -1.0,
            observation: Sight(next),
            is_terminal: false,
        })
    }

    fn generate_observation(
        &mut self,
        _action: &Move,
        next_state: &Cell,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Sight> {
        Some(Sight(next_state.0))
    }

    fn heuristic_value(&self, _state: &Cell) -> f64 {
        self.heuristic
    }

    fn default_value(&self) -> f64 {
        self.default
    }

    fn discount_factor(&self) -> f64 {
        self.discount
    }
}

pub type LineSolver =
    Solver<LineWorld, DiscretizedActionPool<MoveSource>, DiscreteObservationPool<Sight>>;

pub fn line_config(simulations: usize, particles: usize) -> SearchConfig {
    SearchConfig {
        simulations_per_step: simulations,
        exploration: 1.4,
        maximum_depth: 20,
        root_particles: particles,
        time_budget_ms: None,
    }
}

pub fn line_solver(world: LineWorld, simulations: usize, particles: usize, seed: u64) -> LineSolver {
    Solver::new(
        world,
        DiscretizedActionPool::new(MoveSource { bins: 3 }),
        DiscreteObservationPool::new(),
        line_config(simulations, particles),
        seed,
    )
    .expect("line solver should build")
}
