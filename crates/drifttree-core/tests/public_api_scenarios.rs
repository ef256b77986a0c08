use std::fmt;

use rand_chacha::ChaCha8Rng;

use drifttree_core::{
    ActionMapping, BinnedActionSource, DiscreteObservationPool, DiscretizedAction,
    DiscretizedActionPool, Model, SearchConfig, Solver, Step,
};

/// Three-state corridor: A - B - C with the goal at C, cost 1 per step and
/// reward 10 for stepping while at the goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Room(u8);

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ["A", "B", "C"][self.0 as usize % 3])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Walk(usize);

const LEFT: Walk = Walk(1);
const RIGHT: Walk = Walk(2);

impl fmt::Display for Walk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ["STAY", "LEFT", "RIGHT"][self.0 % 3])
    }
}

impl DiscretizedAction for Walk {
    fn bin_number(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Seen(u8);

impl fmt::Display for Seen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seen-{}", self.0)
    }
}

struct WalkSource;

impl BinnedActionSource for WalkSource {
    type Action = Walk;

    fn bin_count(&self) -> usize {
        3
    }

    fn sample_action(&mut self, bin: usize, _rng: &mut ChaCha8Rng) -> Option<Walk> {
        Some(Walk(bin))
    }

    fn bin_sequence(&mut self, _rng: &mut ChaCha8Rng) -> Vec<usize> {
        vec![0, 1, 2]
    }
}

struct Corridor;

impl Model for Corridor {
    type State = Room;
    type Action = Walk;
    type Observation = Seen;

    fn sample_initial_state(&mut self, _rng: &mut ChaCha8Rng) -> Option<Room> {
        Some(Room(0))
    }

    fn sample_state_uniform(&mut self, _rng: &mut ChaCha8Rng) -> Option<Room> {
        Some(Room(0))
    }

    fn is_terminal(&self, _state: &Room) -> bool {
        false
    }

    fn step(&mut self, state: &Room, action: &Walk, _rng: &mut ChaCha8Rng) -> Option<Step<Room, Seen>> {
        if state.0 == 2 {
            return Some(Step {
                next_state: *state,
                reward: 10.0,
                observation: Seen(state.0),
                is_terminal: true,
            });
        }
        let next = match *action {
            LEFT => state.0.saturating_sub(1),
            RIGHT => (state.0 + 1).min(2),
            _ => state.0,
        };
        Some(Step {
            next_state: Room(next),
            reward: -1.0,
            observation: Seen(next),
            is_terminal: false,
        })
    }

    fn generate_observation(
        &mut self,
        _action: &Walk,
        next_state: &Room,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Seen> {
        Some(Seen(next_state.0))
    }

    fn heuristic_value(&self, _state: &Room) -> f64 {
        0.0
    }

    fn default_value(&self) -> f64 {
        -40.0
    }

    fn discount_factor(&self) -> f64 {
        0.95
    }
}

#[test]
fn corridor_planning_prefers_right_with_the_expected_value() {
    let config = SearchConfig {
        simulations_per_step: 10_000,
        exploration: 1.4,
        maximum_depth: 30,
        root_particles: 100,
        time_budget_ms: None,
    };
    let mut solver = Solver::new(
        Corridor,
        DiscretizedActionPool::new(WalkSource),
        DiscreteObservationPool::new(),
        config,
        1,
    )
    .expect("solver should build");

    solver.plan().expect("planning should succeed");
    solver.check_invariants().expect("invariants hold");

    let best = solver
        .best_action()
        .expect("root lookup succeeds")
        .expect("an action is available");
    assert_eq!(best, RIGHT);

    let root = solver.tree().root();
    let entries = solver
        .tree()
        .belief(root)
        .expect("root exists")
        .actions()
        .visited_entries();
    let right = entries
        .iter()
        .find(|(action, _)| *action == RIGHT)
        .map(|(_, view)| view)
        .expect("RIGHT was visited");

    let expected = -1.0 + 0.95 * (-1.0 + 0.95 * 10.0);
    assert!(
        (right.mean_q - expected).abs() < 0.1,
        "mean Q for RIGHT was {}, expected about {}",
        right.mean_q,
        expected
    );
}

/// Four one-shot arms with increasing payoffs.
struct Bandit;

struct BanditSource;

impl BinnedActionSource for BanditSource {
    type Action = Walk;

    fn bin_count(&self) -> usize {
        4
    }

    fn sample_action(&mut self, bin: usize, _rng: &mut ChaCha8Rng) -> Option<Walk> {
        Some(Walk(bin))
    }

    fn bin_sequence(&mut self, _rng: &mut ChaCha8Rng) -> Vec<usize> {
        vec![0, 1, 2, 3]
    }
}

impl Model for Bandit {
    type State = Room;
    type Action = Walk;
    type Observation = Seen;

    fn sample_initial_state(&mut self, _rng: &mut ChaCha8Rng) -> Option<Room> {
        Some(Room(0))
    }

    fn sample_state_uniform(&mut self, _rng: &mut ChaCha8Rng) -> Option<Room> {
        Some(Room(0))
    }

    fn is_terminal(&self, _state: &Room) -> bool {
        false
    }

    fn step(&mut self, _state: &Room, action: &Walk, _rng: &mut ChaCha8Rng) -> Option<Step<Room, Seen>> {
        Some(Step {
            next_state: Room(1),
            reward: action.0 as f64,
            observation: Seen(1),
            is_terminal: true,
        })
    }

    fn generate_observation(
        &mut self,
        _action: &Walk,
        next_state: &Room,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Seen> {
        Some(Seen(next_state.0))
    }

    fn heuristic_value(&self, _state: &Room) -> f64 {
        0.0
    }

    fn default_value(&self) -> f64 {
        0.0
    }

    fn discount_factor(&self) -> f64 {
        1.0
    }
}

#[test]
fn four_legal_bins_account_for_every_simulation() {
    let config = SearchConfig {
        simulations_per_step: 100,
        exploration: 1.4,
        maximum_depth: 5,
        root_particles: 20,
        time_budget_ms: None,
    };
    let mut solver = Solver::new(
        Bandit,
        DiscretizedActionPool::new(BanditSource),
        DiscreteObservationPool::new(),
        config,
        2,
    )
    .expect("solver should build");

    let metrics = solver.plan().expect("planning should succeed");
    assert_eq!(metrics.simulations_completed, 100);

    let root = solver.tree().root();
    let actions = solver.tree().belief(root).expect("root exists").actions();
    assert_eq!(actions.total_visits(), 100);

    let visited = actions.visited_entries();
    assert_eq!(visited.len(), 4, "every legal untried bin was tried");
    for (_, view) in &visited {
        assert!(view.visits >= 1);
    }
    let sum: i64 = visited.iter().map(|(_, view)| view.visits).sum();
    assert_eq!(sum, 100);
    solver.check_invariants().expect("invariants hold");
}
