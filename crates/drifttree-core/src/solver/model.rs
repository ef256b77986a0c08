use std::path::Path;

use rand_chacha::ChaCha8Rng;

use crate::solver::state_pool::StatePool;
use crate::solver::values::SolverValue;

/// Result of one generative draw of the environment.
#[derive(Debug, Clone)]
pub struct Step<S, O> {
    pub next_state: S,
    pub reward: f64,
    pub observation: O,
    pub is_terminal: bool,
}

/// The abstraction the engine plans against: a generative model of a
/// stochastic environment with hidden state.
///
/// Sampling methods return `Option`; the engine treats `None` as a fatal
/// model error for the current simulation. All randomness flows through the
/// generator passed in — models must not keep global RNG state, or
/// determinism for a fixed seed is lost.
pub trait Model {
    type State: SolverValue;
    type Action: SolverValue;
    type Observation: SolverValue;

    /// Draw a state from the initial belief.
    fn sample_initial_state(&mut self, rng: &mut ChaCha8Rng) -> Option<Self::State>;

    /// Draw a state uniformly from the reachable state space.
    fn sample_state_uniform(&mut self, rng: &mut ChaCha8Rng) -> Option<Self::State>;

    fn is_terminal(&self, state: &Self::State) -> bool;

    /// A single generative draw of `(s', r, o, terminal)`.
    fn step(
        &mut self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut ChaCha8Rng,
    ) -> Option<Step<Self::State, Self::Observation>>;

    /// Draw only the successor state. The default goes through `step`.
    fn generate_next_state(
        &mut self,
        state: &Self::State,
        action: &Self::Action,
        rng: &mut ChaCha8Rng,
    ) -> Option<Self::State> {
        self.step(state, action, rng).map(|s| s.next_state)
    }

    /// Draw an observation for an action that led to `next_state`.
    fn generate_observation(
        &mut self,
        action: &Self::Action,
        next_state: &Self::State,
        rng: &mut ChaCha8Rng,
    ) -> Option<Self::Observation>;

    /// Estimate of the return-to-go from a state, used to bootstrap
    /// unexpanded leaves. Non-finite values are coerced to
    /// `default_value` by the engine.
    fn heuristic_value(&self, state: &Self::State) -> f64;

    /// The return assumed for a trajectory that cannot be evaluated,
    /// typically a conservative lower bound.
    fn default_value(&self) -> f64;

    /// Discount factor in `(0, 1]`.
    fn discount_factor(&self) -> f64;

    /// Load timed model changes, returning the sorted change times.
    /// Static worlds keep the default.
    fn load_changes(
        &mut self,
        path: &Path,
    ) -> Result<Vec<u64>, Box<dyn std::error::Error + Send + Sync>> {
        let _ = path;
        Ok(Vec::new())
    }

    /// Apply the changes scheduled for `time`, flagging every stored state
    /// they touch.
    fn apply_changes(&mut self, time: u64, pool: &mut StatePool<Self::State>) {
        let _ = (time, pool);
    }
}
