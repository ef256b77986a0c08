use crate::solver::ids::{ActionNodeId, SequenceId};
use crate::solver::mappings::actions::ActionMapping;

/// A decision state in the belief tree: the particle set approximating the
/// belief, the action mapping to its children, and the running value
/// estimate.
///
/// `value_total` accumulates the discounted return-to-go of every
/// simulation touching this node, plus the tail bootstraps of sequences
/// ending here; that makes the value exactly recomputable from the action
/// mapping entries plus `tail_value_total` during repair.
pub struct BeliefNode<AM> {
    parent: Option<ActionNodeId>,
    action_map: AM,
    particles: Vec<(SequenceId, usize)>,
    /// Particle count. Tracks `particles.len()` in a live tree, but stands
    /// alone for trees rebuilt from a saved file, where the particle sets
    /// themselves are not persisted.
    n_particles: i64,
    n_starting: i64,
    n_ending: i64,
    tail_count: i64,
    tail_value_total: f64,
    visit_count: i64,
    value_total: f64,
    dirty: bool,
}

impl<AM> BeliefNode<AM> {
    pub(crate) fn new(parent: Option<ActionNodeId>, action_map: AM) -> Self {
        BeliefNode {
            parent,
            action_map,
            particles: Vec::new(),
            n_particles: 0,
            n_starting: 0,
            n_ending: 0,
            tail_count: 0,
            tail_value_total: 0.0,
            visit_count: 0,
            value_total: 0.0,
            dirty: false,
        }
    }

    pub fn parent(&self) -> Option<ActionNodeId> {
        self.parent
    }

    pub(crate) fn clear_parent(&mut self) {
        self.parent = None;
    }

    pub fn actions(&self) -> &AM {
        &self.action_map
    }

    pub fn actions_mut(&mut self) -> &mut AM {
        &mut self.action_map
    }

    pub fn particles(&self) -> &[(SequenceId, usize)] {
        &self.particles
    }

    pub fn n_particles(&self) -> i64 {
        self.n_particles
    }

    pub(crate) fn register_particle(&mut self, seq: SequenceId, pos: usize) {
        self.particles.push((seq, pos));
        self.n_particles += 1;
    }

    pub(crate) fn deregister_particle(&mut self, seq: SequenceId, pos: usize) {
        if let Some(slot) = self.particles.iter().position(|p| *p == (seq, pos)) {
            self.particles.swap_remove(slot);
            self.n_particles -= 1;
        }
    }

    pub fn n_starting_sequences(&self) -> i64 {
        self.n_starting
    }

    pub fn n_ending_sequences(&self) -> i64 {
        self.n_ending
    }

    pub(crate) fn add_starting(&mut self, delta: i64) {
        self.n_starting += delta;
    }

    pub(crate) fn add_ending(&mut self, delta: i64) {
        self.n_ending += delta;
    }

    pub fn tail_count(&self) -> i64 {
        self.tail_count
    }

    pub fn tail_value_total(&self) -> f64 {
        self.tail_value_total
    }

    pub fn visit_count(&self) -> i64 {
        self.visit_count
    }

    pub fn value_total(&self) -> f64 {
        self.value_total
    }

    /// Mean return-to-go observed from this belief. `-inf` until visited.
    pub fn value(&self) -> f64 {
        if self.visit_count > 0 {
            self.value_total / self.visit_count as f64
        } else {
            f64::NEG_INFINITY
        }
    }

    pub(crate) fn record_visit(&mut self, discounted_return: f64) {
        self.value_total += discounted_return;
        self.visit_count += 1;
    }

    pub(crate) fn retract_visit(&mut self, discounted_return: f64) {
        self.value_total -= discounted_return;
        self.visit_count -= 1;
        if self.visit_count == 0 {
            self.value_total = 0.0;
        }
    }

    /// A sequence ended here with the given bootstrap value.
    pub(crate) fn record_tail(&mut self, tail_value: f64) {
        self.tail_value_total += tail_value;
        self.tail_count += 1;
        self.n_ending += 1;
    }

    pub(crate) fn retract_tail(&mut self, tail_value: f64) {
        self.tail_value_total -= tail_value;
        self.tail_count -= 1;
        self.n_ending -= 1;
        if self.tail_count == 0 {
            self.tail_value_total = 0.0;
        }
    }

    /// Weight by which this belief's value contributes to the parent action
    /// node: sequences continuing through, minus starts, plus ends.
    pub fn sequence_count(&self) -> i64 {
        self.n_particles - self.n_starting + self.n_ending
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub(crate) fn set_restored_statistics(
        &mut self,
        n_particles: i64,
        n_starting: i64,
        n_ending: i64,
        tail_count: i64,
        tail_value_total: f64,
        value_total: f64,
        visit_count: i64,
    ) {
        self.n_particles = n_particles;
        self.n_starting = n_starting;
        self.n_ending = n_ending;
        self.tail_count = tail_count;
        self.tail_value_total = tail_value_total;
        self.value_total = value_total;
        self.visit_count = visit_count;
    }
}

impl<AM> BeliefNode<AM>
where
    AM: ActionMapping,
{
    /// Recompute the value statistics from the mapping entries and tail
    /// totals. Used by repair traversals; a no-op on a consistent node.
    pub(crate) fn recalculate(&mut self) {
        let mut total = self.tail_value_total;
        let mut visits = self.tail_count;
        for (_, view) in self.action_map.visited_entries() {
            total += view.total_q;
            visits += view.visits;
        }
        self.value_total = total;
        self.visit_count = visits;
    }
}
