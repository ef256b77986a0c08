use std::marker::PhantomData;

use crate::solver::ids::BeliefId;
use crate::solver::mappings::observations::{ObsEntry, ObservationMapping, ObservationPool};
use crate::solver::values::MetricObservation;

/// Observation pool that merges observations within a threshold distance
/// into a single edge.
pub struct ApproximateObservationPool<O> {
    max_distance: f64,
    _obs: PhantomData<O>,
}

impl<O> ApproximateObservationPool<O> {
    pub fn new(max_distance: f64) -> Self {
        ApproximateObservationPool {
            max_distance,
            _obs: PhantomData,
        }
    }
}

/// Nearest-representative observation mapping. A lookup resolves to the
/// existing edge whose representative is closest to the query if that
/// distance is within `max_distance`; otherwise the query founds a new edge
/// with itself as representative. Representatives never migrate, which
/// keeps sibling indices stable for back-propagation.
pub struct ApproximateObservationMap<O>
where
    O: MetricObservation,
{
    entries: Vec<ObsEntry<O>>,
    max_distance: f64,
    total_visits: i64,
}

impl<O> ApproximateObservationMap<O>
where
    O: MetricObservation,
{
    fn nearest(&self, observation: &O) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, entry) in self.entries.iter().enumerate() {
            let d = entry.observation.distance_to(observation);
            if d > self.max_distance {
                continue;
            }
            match best {
                Some((_, bd)) if bd <= d => {}
                _ => best = Some((i, d)),
            }
        }
        best.map(|(i, _)| i)
    }

    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }
}

impl<O> ObservationPool for ApproximateObservationPool<O>
where
    O: MetricObservation,
{
    type Observation = O;
    type Mapping = ApproximateObservationMap<O>;

    fn create_mapping(&mut self) -> Self::Mapping {
        ApproximateObservationMap {
            entries: Vec::new(),
            max_distance: self.max_distance,
            total_visits: 0,
        }
    }
}

impl<O> ObservationMapping for ApproximateObservationMap<O>
where
    O: MetricObservation,
{
    type Observation = O;

    fn child(&self, observation: &O) -> Option<BeliefId> {
        self.nearest(observation).map(|i| self.entries[i].child)
    }

    fn insert_child(&mut self, observation: &O, child: BeliefId) {
        self.entries.push(ObsEntry {
            observation: observation.clone(),
            child,
            visits: 0,
        });
    }

    fn update_visits(&mut self, observation: &O, delta: i64) {
        if let Some(i) = self.nearest(observation) {
            self.entries[i].visits += delta;
            self.total_visits += delta;
        }
    }

    fn visit_count(&self, observation: &O) -> i64 {
        self.nearest(observation)
            .map(|i| self.entries[i].visits)
            .unwrap_or(0)
    }

    fn total_visits(&self) -> i64 {
        self.total_visits
    }

    fn entries(&self) -> &[ObsEntry<O>] {
        &self.entries
    }

    fn remove_child(&mut self, child: BeliefId) {
        let Some(slot) = self.entries.iter().position(|e| e.child == child) else {
            return;
        };
        let removed = self.entries.remove(slot);
        self.total_visits -= removed.visits;
    }

    fn same_edge(&self, a: &O, b: &O) -> bool {
        match (self.nearest(a), self.nearest(b)) {
            (Some(x), Some(y)) => x == y,
            (None, None) => a.distance_to(b) <= self.max_distance,
            _ => false,
        }
    }

    fn restore_entry(&mut self, observation: &O, child: BeliefId, visits: i64) {
        self.entries.push(ObsEntry {
            observation: observation.clone(),
            child,
            visits,
        });
        self.total_visits += visits;
    }
}
