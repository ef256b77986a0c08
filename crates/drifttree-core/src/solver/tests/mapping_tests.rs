use std::fmt;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::solver::tests::support::{Move, MoveSource};
use crate::{
    ActionChooser, ActionMapping, ActionPool, ApproximateObservationPool, BeliefId,
    ConstructionData, ContinuousAction, ContinuousActionPool, ContinuousActionSource,
    DiscretizedActionPool, MetricObservation, ObservationMapping, ObservationPool,
};

fn rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(7)
}

#[test]
fn bin_sequence_offers_each_bin_once_then_none() {
    let mut pool = DiscretizedActionPool::new(MoveSource { bins: 4 });
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);

    let offered: Vec<usize> = std::iter::from_fn(|| {
        map.next_action_to_try(&mut rng).map(|a| a.0)
    })
    .collect();
    assert_eq!(offered, vec![0, 1, 2, 3]);
    assert!(map.next_action_to_try(&mut rng).is_none());
}

#[test]
fn illegal_bins_are_never_offered_nor_selected() {
    let mut pool = DiscretizedActionPool::new(MoveSource { bins: 3 });
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);
    map.set_legal(&Move(1), false);

    let offered: Vec<usize> = std::iter::from_fn(|| {
        map.next_action_to_try(&mut rng).map(|a| a.0)
    })
    .collect();
    assert_eq!(offered, vec![0, 2]);

    map.update_entry(&Move(0), 3, 3.0);
    map.update_entry(&Move(2), 3, 9.0);
    // Give the illegal bin the best statistics; it must still lose.
    map.update_entry(&Move(1), 3, 300.0);
    let chosen = map.select_ucb(1.4).expect("legal visited entries exist");
    assert_ne!(chosen.0, 1);
}

#[test]
fn relegalized_bins_reenter_the_untried_pipeline() {
    let mut pool = DiscretizedActionPool::new(MoveSource { bins: 3 });
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);
    map.set_legal(&Move(1), false);

    let offered: Vec<usize> = std::iter::from_fn(|| {
        map.next_action_to_try(&mut rng).map(|a| a.0)
    })
    .collect();
    assert_eq!(offered, vec![0, 2]);

    // Ruling the bin legal again puts it back in the untried pipeline,
    // exactly once.
    map.set_legal(&Move(1), true);
    let offered: Vec<usize> = std::iter::from_fn(|| {
        map.next_action_to_try(&mut rng).map(|a| a.0)
    })
    .collect();
    assert_eq!(offered, vec![1]);
    assert!(map.next_action_to_try(&mut rng).is_none());
}

#[test]
fn ucb_is_deterministic_and_breaks_ties_by_insertion_order() {
    let mut pool = DiscretizedActionPool::new(MoveSource { bins: 3 });
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);
    map.update_entry(&Move(0), 2, 4.0);
    map.update_entry(&Move(1), 2, 4.0);
    map.update_entry(&Move(2), 2, 4.0);

    let first = map.select_ucb(1.4).expect("entries are visited");
    for _ in 0..10 {
        assert_eq!(map.select_ucb(1.4), Some(first));
    }
    assert_eq!(first.0, 0, "equal statistics resolve to the first entry");
}

#[test]
fn ucb_prefers_less_visited_entries_at_equal_value() {
    let mut pool = DiscretizedActionPool::new(MoveSource { bins: 2 });
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);
    map.update_entry(&Move(0), 10, 20.0);
    map.update_entry(&Move(1), 2, 4.0);

    let chosen = map.select_ucb(1.4).expect("entries are visited");
    assert_eq!(chosen.0, 1);
}

/// A scalar observation for the approximate mapping.
#[derive(Debug, Clone, Copy)]
struct Reading(f64);

impl PartialEq for Reading {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for Reading {}

impl std::hash::Hash for Reading {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl MetricObservation for Reading {
    fn distance_to(&self, other: &Self) -> f64 {
        (self.0 - other.0).abs()
    }
}

#[test]
fn approximate_mapping_merges_nearby_observations() {
    let mut pool: ApproximateObservationPool<Reading> = ApproximateObservationPool::new(0.5);
    let mut map = pool.create_mapping();

    // x = 0 founds the first edge.
    assert!(map.child(&Reading(0.0)).is_none());
    map.insert_child(&Reading(0.0), BeliefId::from(1));
    map.update_visits(&Reading(0.0), 1);

    // x = 0.3 resolves to the same edge.
    assert_eq!(map.child(&Reading(0.3)), Some(BeliefId::from(1)));
    map.update_visits(&Reading(0.3), 1);

    // x = 0.9 is too far from the representative and founds its own edge.
    assert!(map.child(&Reading(0.9)).is_none());
    map.insert_child(&Reading(0.9), BeliefId::from(2));
    map.update_visits(&Reading(0.9), 1);

    assert_eq!(map.entries().len(), 2);
    assert_eq!(map.visit_count(&Reading(0.0)), 2);
    assert_eq!(map.visit_count(&Reading(0.9)), 1);
    assert_eq!(map.total_visits(), 3);
    assert!(map.same_edge(&Reading(0.0), &Reading(0.3)));
    assert!(!map.same_edge(&Reading(0.0), &Reading(0.9)));
}

/// Continuous action keyed by a one-dimensional construction vector,
/// quotiented to a 0.1 grid.
#[derive(Debug, Clone)]
struct ThrottleData {
    raw: [f64; 1],
}

impl ThrottleData {
    fn new(value: f64) -> Self {
        ThrottleData { raw: [value] }
    }

    fn quantized(&self) -> i64 {
        (self.raw[0] * 10.0).round() as i64
    }
}

impl PartialEq for ThrottleData {
    fn eq(&self, other: &Self) -> bool {
        self.quantized() == other.quantized()
    }
}

impl Eq for ThrottleData {}

impl std::hash::Hash for ThrottleData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.quantized().hash(state);
    }
}

impl ConstructionData for ThrottleData {
    fn as_slice(&self) -> &[f64] {
        &self.raw
    }
}

#[derive(Debug, Clone)]
struct Throttle {
    data: ThrottleData,
}

impl PartialEq for Throttle {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Eq for Throttle {}

impl std::hash::Hash for Throttle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.data.hash(state);
    }
}

impl fmt::Display for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "throttle {:.1}", self.data.raw[0])
    }
}

impl ContinuousAction for Throttle {
    type Data = ThrottleData;

    fn construction_data(&self) -> &ThrottleData {
        &self.data
    }
}

struct ThrottleSource;

impl ContinuousActionSource for ThrottleSource {
    type Action = Throttle;

    fn make_action(&self, data: &ThrottleData) -> Throttle {
        Throttle { data: data.clone() }
    }

    fn fixed_actions(&self) -> Vec<ThrottleData> {
        vec![ThrottleData::new(0.0), ThrottleData::new(0.5)]
    }

    fn randomize_fixed(&self) -> bool {
        false
    }
}

/// Proposes evenly spaced throttle values until the range is covered.
struct GridChooser {
    step: f64,
    limit: f64,
}

impl ActionChooser<ThrottleData> for GridChooser {
    fn choose_next(&mut self, tried: &[ThrottleData], _rng: &mut ChaCha8Rng) -> Option<ThrottleData> {
        let proposal = tried.len() as f64 * self.step;
        if proposal > self.limit {
            None
        } else {
            Some(ThrottleData::new(proposal))
        }
    }
}

#[test]
fn continuous_mapping_serves_fixed_actions_then_chooser_proposals() {
    let mut pool = ContinuousActionPool::new(
        ThrottleSource,
        GridChooser {
            step: 0.2,
            limit: 0.4,
        },
    );
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);

    let first = map.next_action_to_try(&mut rng).expect("first fixed action");
    let second = map.next_action_to_try(&mut rng).expect("second fixed action");
    assert_eq!(first.data.quantized(), 0);
    assert_eq!(second.data.quantized(), 5);

    // Chooser proposals follow; tried count is 2, so the grid resumes at 0.4.
    let third = map.next_action_to_try(&mut rng).expect("chooser proposal");
    assert_eq!(third.data.quantized(), 4);
}

#[test]
fn continuous_entries_can_be_ruled_illegal_and_reinstated() {
    let mut pool = ContinuousActionPool::new(
        ThrottleSource,
        GridChooser {
            step: 0.2,
            limit: 0.4,
        },
    );
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);

    let zero = Throttle {
        data: ThrottleData::new(0.0),
    };
    let half = Throttle {
        data: ThrottleData::new(0.5),
    };
    map.update_entry(&zero, 2, 2.0);
    map.update_entry(&half, 2, 8.0);
    assert_eq!(map.select_ucb(1.4), Some(half.clone()));

    map.set_legal(&half, false);
    assert_eq!(map.select_ucb(1.4), Some(zero));

    map.set_legal(&half, true);
    assert_eq!(map.select_ucb(1.4), Some(half));
}

#[test]
fn continuous_entries_quotient_very_similar_actions() {
    let mut pool = ContinuousActionPool::new(
        ThrottleSource,
        GridChooser {
            step: 0.2,
            limit: 0.4,
        },
    );
    let mut rng = rng();
    let mut map = pool.create_mapping(&mut rng);

    let half = Throttle {
        data: ThrottleData::new(0.5),
    };
    let near_half = Throttle {
        data: ThrottleData::new(0.51),
    };
    map.update_entry(&half, 1, 2.0);
    map.update_entry(&near_half, 1, 4.0);

    let view = map.entry(&half).expect("entry exists");
    assert_eq!(view.visits, 2);
    assert!((view.total_q - 6.0).abs() < 1e-12);
    assert_eq!(map.entry_count(), 1);
}
