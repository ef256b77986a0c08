use rand_chacha::ChaCha8Rng;

use crate::solver::ids::ActionNodeId;
use crate::solver::values::SolverValue;

/// Statistics view of one action mapping entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryView {
    pub visits: i64,
    pub total_q: f64,
    pub mean_q: f64,
    pub legal: bool,
    pub child: Option<ActionNodeId>,
}

/// Opaque strategy state that rides on a continuous action mapping so it can
/// be persisted alongside the tree. The tag routes loading through the
/// serializer's explicit registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ChooserBlob {
    pub tag: String,
    pub payload: String,
}

/// Per-belief record of the tried actions: per-action statistics and child
/// action-node pointers, behind one contract for the discretized and
/// continuous variants.
pub trait ActionMapping {
    type Action: SolverValue;

    /// Child action node for this action, if one exists.
    fn child(&self, action: &Self::Action) -> Option<ActionNodeId>;

    /// Point this action's entry at a child action node (or unlink it).
    fn set_child(&mut self, action: &Self::Action, child: Option<ActionNodeId>);

    fn entry(&self, action: &Self::Action) -> Option<EntryView>;

    /// Fold a back-propagation delta into this action's entry.
    fn update_entry(&mut self, action: &Self::Action, delta_visits: i64, delta_total_q: f64);

    fn set_legal(&mut self, action: &Self::Action, legal: bool);

    /// Produce the next untried but promising action, or `None` once the
    /// untried supply is exhausted. Illegal actions are never returned.
    fn next_action_to_try(&mut self, rng: &mut ChaCha8Rng) -> Option<Self::Action>;

    /// UCB1 over legal entries with nonzero visits, ties broken by entry
    /// insertion order. `None` when nothing has been visited yet.
    fn select_ucb(&self, exploration: f64) -> Option<Self::Action>;

    /// Entries with nonzero visit counts, in insertion order.
    fn visited_entries(&self) -> Vec<(Self::Action, EntryView)>;

    /// Entries with child action nodes, in insertion order.
    fn child_entries(&self) -> Vec<(Self::Action, EntryView)>;

    /// Sum of all entry visit counts.
    fn total_visits(&self) -> i64;

    /// Overwrite an entry's statistics wholesale. Used when rebuilding a
    /// tree from a saved file.
    fn restore_entry(&mut self, action: &Self::Action, view: EntryView);

    fn chooser_blob(&self) -> Option<&ChooserBlob> {
        None
    }

    fn set_chooser_blob(&mut self, _blob: ChooserBlob) {}
}

/// Factory for action mappings, owned by the model.
pub trait ActionPool {
    type Action: SolverValue;
    type Mapping: ActionMapping<Action = Self::Action>;

    fn create_mapping(&mut self, rng: &mut ChaCha8Rng) -> Self::Mapping;
}

/// Shared UCB1 argmax: `q̄ + c·sqrt(ln N / n)` over legal visited entries,
/// first entry wins ties so selection is deterministic for fixed statistics.
pub(crate) fn ucb_argmax<A: Clone>(
    entries: impl Iterator<Item = (A, EntryView)>,
    total_visits: i64,
    exploration: f64,
) -> Option<A> {
    let log_total = (total_visits.max(1) as f64).ln();
    let mut best: Option<(A, f64)> = None;
    for (action, view) in entries {
        if !view.legal || view.visits <= 0 {
            continue;
        }
        let score = view.mean_q + exploration * (log_total / view.visits as f64).sqrt();
        match &best {
            Some((_, current)) if *current >= score => {}
            _ => best = Some((action, score)),
        }
    }
    best.map(|(action, _)| action)
}
