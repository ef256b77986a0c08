use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use drifttree_core::{
    ActionMapping, BinnedActionSource, DiscreteObservationPool, DiscretizedAction,
    DiscretizedActionPool, Model, ObservationMapping, SearchConfig, SerializeError, Solver, Step,
    TreeSerializer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Spot(i64);

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Hop(usize);

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hop{}", self.0)
    }
}

impl FromStr for Hop {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.strip_prefix("hop")
            .and_then(|n| n.parse().ok())
            .map(Hop)
            .ok_or_else(|| format!("bad action: {raw}"))
    }
}

impl DiscretizedAction for Hop {
    fn bin_number(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Ping(i64);

impl fmt::Display for Ping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ping{}", self.0)
    }
}

impl FromStr for Ping {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        raw.strip_prefix("ping")
            .and_then(|n| n.parse().ok())
            .map(Ping)
            .ok_or_else(|| format!("bad observation: {raw}"))
    }
}

struct HopSource;

impl BinnedActionSource for HopSource {
    type Action = Hop;

    fn bin_count(&self) -> usize {
        3
    }

    fn sample_action(&mut self, bin: usize, _rng: &mut ChaCha8Rng) -> Option<Hop> {
        Some(Hop(bin))
    }

    fn bin_sequence(&mut self, _rng: &mut ChaCha8Rng) -> Vec<usize> {
        vec![0, 1, 2]
    }
}

struct HopWorld;

impl Model for HopWorld {
    type State = Spot;
    type Action = Hop;
    type Observation = Ping;

    fn sample_initial_state(&mut self, _rng: &mut ChaCha8Rng) -> Option<Spot> {
        Some(Spot(0))
    }

    fn sample_state_uniform(&mut self, _rng: &mut ChaCha8Rng) -> Option<Spot> {
        Some(Spot(0))
    }

    fn is_terminal(&self, _state: &Spot) -> bool {
        false
    }

    fn step(&mut self, state: &Spot, action: &Hop, _rng: &mut ChaCha8Rng) -> Option<Step<Spot, Ping>> {
        if state.0 >= 3 {
            return Some(Step {
                next_state: *state,
                reward: 8.0,
                observation: Ping(state.0),
                is_terminal: true,
            });
        }
        let next = state.0 + action.0 as i64;
        Some(Step {
            next_state: Spot(next),
            reward: -(action.0 as f64) * 0.25 - 0.5,
            observation: Ping(next),
            is_terminal: false,
        })
    }

    fn generate_observation(
        &mut self,
        _action: &Hop,
        next_state: &Spot,
        _rng: &mut ChaCha8Rng,
    ) -> Option<Ping> {
        Some(Ping(next_state.0))
    }

    fn heuristic_value(&self, state: &Spot) -> f64 {
        8.0 - state.0 as f64
    }

    fn default_value(&self) -> f64 {
        -10.0
    }

    fn discount_factor(&self) -> f64 {
        0.9
    }
}

fn planned_solver() -> Solver<HopWorld, DiscretizedActionPool<HopSource>, DiscreteObservationPool<Ping>>
{
    let config = SearchConfig {
        simulations_per_step: 400,
        exploration: 1.2,
        maximum_depth: 12,
        root_particles: 30,
        time_budget_ms: None,
    };
    let mut solver = Solver::new(
        HopWorld,
        DiscretizedActionPool::new(HopSource),
        DiscreteObservationPool::new(),
        config,
        77,
    )
    .expect("solver should build");
    solver.plan().expect("planning should succeed");
    solver
}

#[test]
fn saving_and_reloading_reproduces_ids_statistics_and_best_action() {
    let solver = planned_solver();
    let serializer = TreeSerializer::new();

    let mut buffer: Vec<u8> = Vec::new();
    serializer
        .save_tree(solver.tree(), &mut buffer)
        .expect("saving should succeed");

    let mut action_pool = DiscretizedActionPool::new(HopSource);
    let mut observation_pool: DiscreteObservationPool<Ping> = DiscreteObservationPool::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let loaded = serializer
        .load_tree(&mut action_pool, &mut observation_pool, &mut rng, &buffer[..])
        .expect("loading should succeed");

    assert_eq!(loaded.root(), solver.tree().root());
    assert_eq!(loaded.belief_count(), solver.tree().belief_count());
    assert_eq!(loaded.action_node_count(), solver.tree().action_node_count());

    for (id, original) in solver.tree().beliefs() {
        let restored = loaded.belief(id).expect("belief id survives the round trip");
        assert_eq!(restored.n_particles(), original.n_particles());
        assert_eq!(restored.visit_count(), original.visit_count());
        assert_eq!(
            restored.value_total().to_bits(),
            original.value_total().to_bits(),
            "value totals must round-trip exactly"
        );
        assert_eq!(
            restored.actions().total_visits(),
            original.actions().total_visits()
        );
        for (action, view) in original.actions().visited_entries() {
            let restored_view = restored
                .actions()
                .entry(&action)
                .expect("entry survives the round trip");
            assert_eq!(restored_view.visits, view.visits);
            assert_eq!(restored_view.total_q.to_bits(), view.total_q.to_bits());
            assert_eq!(restored_view.mean_q.to_bits(), view.mean_q.to_bits());
            assert_eq!(restored_view.legal, view.legal);
            assert_eq!(restored_view.child, view.child);
        }
    }

    for (id, original) in solver.tree().action_nodes() {
        let restored = loaded
            .action_node(id)
            .expect("action node id survives the round trip");
        assert_eq!(restored.n_particles(), original.n_particles());
        assert_eq!(restored.total_q().to_bits(), original.total_q().to_bits());
        assert_eq!(
            restored.observations().total_visits(),
            original.observations().total_visits()
        );
        for entry in original.observations().entries() {
            assert_eq!(
                restored.observations().visit_count(&entry.observation),
                entry.visits
            );
            assert_eq!(
                restored.observations().child(&entry.observation),
                Some(entry.child)
            );
        }
    }

    let original_best = solver.tree().best_action().expect("lookup succeeds");
    let restored_best = loaded.best_action().expect("lookup succeeds");
    assert_eq!(original_best, restored_best);
}

#[test]
fn unknown_record_tags_abort_the_load() {
    let solver = planned_solver();
    let serializer = TreeSerializer::new();

    let mut buffer: Vec<u8> = Vec::new();
    serializer
        .save_tree(solver.tree(), &mut buffer)
        .expect("saving should succeed");
    let text = String::from_utf8(buffer).expect("tree files are text");
    let tampered = text.replacen("BELIEF ", "BOGUS ", 1);

    let mut action_pool = DiscretizedActionPool::new(HopSource);
    let mut observation_pool: DiscreteObservationPool<Ping> = DiscreteObservationPool::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let result = serializer.load_tree(
        &mut action_pool,
        &mut observation_pool,
        &mut rng,
        tampered.as_bytes(),
    );
    match result {
        Err(SerializeError::UnknownTag { tag }) => assert_eq!(tag, "BOGUS"),
        Err(other) => panic!("expected an unknown-tag error, got {other}"),
        Ok(_) => panic!("expected an unknown-tag error, got a tree"),
    }
}

#[test]
fn foreign_headers_abort_the_load() {
    let mut action_pool = DiscretizedActionPool::new(HopSource);
    let mut observation_pool: DiscreteObservationPool<Ping> = DiscreteObservationPool::new();
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    let result = serializer_load(
        &mut action_pool,
        &mut observation_pool,
        &mut rng,
        b"sometree v9; root 0\n",
    );
    assert!(matches!(result, Err(SerializeError::UnknownTag { .. })));
}

fn serializer_load(
    action_pool: &mut DiscretizedActionPool<HopSource>,
    observation_pool: &mut DiscreteObservationPool<Ping>,
    rng: &mut ChaCha8Rng,
    bytes: &[u8],
) -> Result<
    drifttree_core::BeliefTree<
        drifttree_core::DiscretizedActionMap<HopSource>,
        drifttree_core::DiscreteObservationMap<Ping>,
    >,
    SerializeError,
> {
    TreeSerializer::new().load_tree(action_pool, observation_pool, rng, bytes)
}
