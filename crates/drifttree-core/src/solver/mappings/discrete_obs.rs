use std::collections::HashMap;
use std::marker::PhantomData;

use crate::solver::ids::BeliefId;
use crate::solver::mappings::observations::{ObsEntry, ObservationMapping, ObservationPool};
use crate::solver::values::SolverValue;

/// Observation pool for spaces where observations compare exactly.
pub struct DiscreteObservationPool<O> {
    _obs: PhantomData<O>,
}

impl<O> DiscreteObservationPool<O> {
    pub fn new() -> Self {
        DiscreteObservationPool { _obs: PhantomData }
    }
}

impl<O> Default for DiscreteObservationPool<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> ObservationPool for DiscreteObservationPool<O>
where
    O: SolverValue,
{
    type Observation = O;
    type Mapping = DiscreteObservationMap<O>;

    fn create_mapping(&mut self) -> Self::Mapping {
        DiscreteObservationMap {
            entries: Vec::new(),
            index: HashMap::new(),
            total_visits: 0,
        }
    }
}

/// Exact observation mapping keyed by hash and equality.
pub struct DiscreteObservationMap<O>
where
    O: SolverValue,
{
    entries: Vec<ObsEntry<O>>,
    index: HashMap<O, usize>,
    total_visits: i64,
}

impl<O> ObservationMapping for DiscreteObservationMap<O>
where
    O: SolverValue,
{
    type Observation = O;

    fn child(&self, observation: &O) -> Option<BeliefId> {
        self.index.get(observation).map(|i| self.entries[*i].child)
    }

    fn insert_child(&mut self, observation: &O, child: BeliefId) {
        if self.index.contains_key(observation) {
            return;
        }
        self.index.insert(observation.clone(), self.entries.len());
        self.entries.push(ObsEntry {
            observation: observation.clone(),
            child,
            visits: 0,
        });
    }

    fn update_visits(&mut self, observation: &O, delta: i64) {
        if let Some(&i) = self.index.get(observation) {
            self.entries[i].visits += delta;
            self.total_visits += delta;
        }
    }

    fn visit_count(&self, observation: &O) -> i64 {
        self.index
            .get(observation)
            .map(|i| self.entries[*i].visits)
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
        self.index.remove(&removed.observation);
        for i in self.index.values_mut() {
            if *i > slot {
                *i -= 1;
            }
        }
    }

    fn same_edge(&self, a: &O, b: &O) -> bool {
        a == b
    }

    fn restore_entry(&mut self, observation: &O, child: BeliefId, visits: i64) {
        self.insert_child(observation, child);
        self.update_visits(observation, visits);
    }
}
