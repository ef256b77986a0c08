use crate::solver::ids::BeliefId;

/// A chance node: the outcome of committing to one action at a belief.
/// Holds the observation mapping to its child beliefs and the cached
/// Q-statistics maintained by sequence-count accounting.
pub struct ActionNode<OM> {
    parent: BeliefId,
    n_particles: i64,
    total_q: f64,
    mean_q: f64,
    observations: OM,
}

impl<OM> ActionNode<OM> {
    pub(crate) fn new(parent: BeliefId, observations: OM) -> Self {
        ActionNode {
            parent,
            n_particles: 0,
            total_q: 0.0,
            mean_q: f64::NEG_INFINITY,
            observations,
        }
    }

    pub fn parent(&self) -> BeliefId {
        self.parent
    }

    pub fn observations(&self) -> &OM {
        &self.observations
    }

    pub fn observations_mut(&mut self) -> &mut OM {
        &mut self.observations
    }

    pub fn n_particles(&self) -> i64 {
        self.n_particles
    }

    pub fn total_q(&self) -> f64 {
        self.total_q
    }

    /// Mean Q; the sentinel `-inf` whenever the particle count is zero.
    pub fn mean_q(&self) -> f64 {
        self.mean_q
    }

    /// Fold a child belief's value change into the cached total. `old_*`
    /// are the child's sequence count and value before the current
    /// accounting update, `new_*` after it.
    pub(crate) fn apply_sequence_update(
        &mut self,
        discount: f64,
        old_seq: i64,
        old_child_q: f64,
        new_seq: i64,
        new_child_q: f64,
        delta_particles: i64,
    ) {
        if old_seq != 0 && old_child_q.is_finite() {
            self.total_q -= old_seq as f64 * discount * old_child_q;
        }
        if new_seq != 0 && new_child_q.is_finite() {
            self.total_q += new_seq as f64 * discount * new_child_q;
        }
        self.n_particles += delta_particles;
        self.recalculate();
    }

    pub(crate) fn set_total_q(&mut self, total_q: f64) {
        self.total_q = total_q;
    }

    pub(crate) fn set_restored_statistics(&mut self, n_particles: i64, total_q: f64) {
        self.n_particles = n_particles;
        self.total_q = total_q;
        self.recalculate();
    }

    pub(crate) fn recalculate(&mut self) {
        if self.n_particles > 0 {
            self.mean_q = self.total_q / self.n_particles as f64;
        } else {
            self.total_q = 0.0;
            self.mean_q = f64::NEG_INFINITY;
        }
    }
}
