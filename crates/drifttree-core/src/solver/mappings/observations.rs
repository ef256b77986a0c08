use crate::solver::ids::BeliefId;
use crate::solver::values::SolverValue;

/// One observed outcome under an action node: the representative
/// observation, the child belief it leads to, and the edge visit count.
#[derive(Debug, Clone)]
pub struct ObsEntry<O> {
    pub observation: O,
    pub child: BeliefId,
    pub visits: i64,
}

/// Per-action-node record of observed outcomes and their child beliefs,
/// behind one contract for the exact and approximate variants.
pub trait ObservationMapping {
    type Observation: SolverValue;

    /// Child belief for this observation, if an edge exists.
    fn child(&self, observation: &Self::Observation) -> Option<BeliefId>;

    /// Create an edge to a freshly allocated belief node. Callers check
    /// `child` first; the observation becomes the edge's representative.
    fn insert_child(&mut self, observation: &Self::Observation, child: BeliefId);

    fn update_visits(&mut self, observation: &Self::Observation, delta: i64);

    fn visit_count(&self, observation: &Self::Observation) -> i64;

    fn total_visits(&self) -> i64;

    fn entries(&self) -> &[ObsEntry<Self::Observation>];

    /// Drop the edge leading to a pruned child belief.
    fn remove_child(&mut self, child: BeliefId);

    /// Whether the two observations resolve to the same edge. Used by the
    /// particle filter when accepting replenished particles.
    fn same_edge(&self, a: &Self::Observation, b: &Self::Observation) -> bool;

    /// Recreate an edge with explicit statistics when rebuilding a tree
    /// from a saved file.
    fn restore_entry(&mut self, observation: &Self::Observation, child: BeliefId, visits: i64);
}

/// Factory for observation mappings, owned by the model.
pub trait ObservationPool {
    type Observation: SolverValue;
    type Mapping: ObservationMapping<Observation = Self::Observation>;

    fn create_mapping(&mut self) -> Self::Mapping;
}
