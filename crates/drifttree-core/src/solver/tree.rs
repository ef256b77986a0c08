use std::collections::HashSet;

use crate::solver::action_node::ActionNode;
use crate::solver::arena::Arena;
use crate::solver::belief_node::BeliefNode;
use crate::solver::errors::SolverError;
use crate::solver::ids::{ActionNodeId, BeliefId};
use crate::solver::mappings::actions::ActionMapping;
use crate::solver::mappings::observations::ObservationMapping;

/// Owns the two node arenas. Belief and action nodes alternate; child
/// pointers live in the mappings, back-references are plain ids used only
/// by repair traversals. Destroying the tree frees all descendants.
pub struct BeliefTree<AM, OM> {
    beliefs: Arena<BeliefId, BeliefNode<AM>>,
    action_nodes: Arena<ActionNodeId, ActionNode<OM>>,
    root: BeliefId,
}

impl<AM, OM> BeliefTree<AM, OM>
where
    AM: ActionMapping,
    OM: ObservationMapping,
{
    /// Create a tree with a single root belief.
    pub fn new(root_actions: AM) -> Self {
        let mut beliefs = Arena::new();
        let root = beliefs.allocate(BeliefNode::new(None, root_actions));
        BeliefTree {
            beliefs,
            action_nodes: Arena::new(),
            root,
        }
    }

    /// Empty shell used when rebuilding a tree from a saved file.
    pub(crate) fn empty() -> Self {
        BeliefTree {
            beliefs: Arena::new(),
            action_nodes: Arena::new(),
            root: BeliefId::from(0),
        }
    }

    pub fn root(&self) -> BeliefId {
        self.root
    }

    pub(crate) fn set_root(&mut self, root: BeliefId) {
        self.root = root;
    }

    pub fn belief(&self, id: BeliefId) -> Result<&BeliefNode<AM>, SolverError> {
        self.beliefs
            .get(id.index())
            .ok_or(SolverError::MissingBelief(id))
    }

    pub fn belief_mut(&mut self, id: BeliefId) -> Result<&mut BeliefNode<AM>, SolverError> {
        self.beliefs
            .get_mut(id.index())
            .ok_or(SolverError::MissingBelief(id))
    }

    pub fn belief_opt(&self, id: BeliefId) -> Option<&BeliefNode<AM>> {
        self.beliefs.get(id.index())
    }

    pub fn action_node(&self, id: ActionNodeId) -> Result<&ActionNode<OM>, SolverError> {
        self.action_nodes
            .get(id.index())
            .ok_or(SolverError::MissingActionNode(id))
    }

    pub fn action_node_mut(&mut self, id: ActionNodeId) -> Result<&mut ActionNode<OM>, SolverError> {
        self.action_nodes
            .get_mut(id.index())
            .ok_or(SolverError::MissingActionNode(id))
    }

    /// Allocate an action node under a belief. The caller links the action
    /// mapping entry to the returned id.
    pub fn add_action_child(&mut self, parent: BeliefId, observations: OM) -> ActionNodeId {
        self.action_nodes
            .allocate(ActionNode::new(parent, observations))
    }

    /// Allocate a belief node under an action node. The caller links the
    /// observation mapping entry to the returned id.
    pub fn add_belief_child(&mut self, parent: ActionNodeId, actions: AM) -> BeliefId {
        self.beliefs
            .allocate(BeliefNode::new(Some(parent), actions))
    }

    pub(crate) fn insert_belief_at(&mut self, id: BeliefId, node: BeliefNode<AM>) {
        self.beliefs.insert_at(id.index(), node);
    }

    pub(crate) fn insert_action_at(&mut self, id: ActionNodeId, node: ActionNode<OM>) {
        self.action_nodes.insert_at(id.index(), node);
    }

    pub fn belief_count(&self) -> usize {
        self.beliefs.live()
    }

    pub fn action_node_count(&self) -> usize {
        self.action_nodes.live()
    }

    pub fn beliefs(&self) -> impl Iterator<Item = (BeliefId, &BeliefNode<AM>)> {
        self.beliefs.iter()
    }

    pub fn action_nodes(&self) -> impl Iterator<Item = (ActionNodeId, &ActionNode<OM>)> {
        self.action_nodes.iter()
    }

    /// Collect every node of the subtree rooted at `belief`.
    pub fn subtree(&self, belief: BeliefId) -> (Vec<BeliefId>, Vec<ActionNodeId>) {
        let mut beliefs = Vec::new();
        let mut actions = Vec::new();
        let mut stack = vec![belief];
        while let Some(b) = stack.pop() {
            let Some(node) = self.beliefs.get(b.index()) else {
                continue;
            };
            beliefs.push(b);
            for (_, view) in node.actions().child_entries() {
                let Some(a) = view.child else { continue };
                let Some(action_node) = self.action_nodes.get(a.index()) else {
                    continue;
                };
                actions.push(a);
                for entry in action_node.observations().entries() {
                    stack.push(entry.child);
                }
            }
        }
        (beliefs, actions)
    }

    /// Remove the subtree rooted at `belief`, unlinking it from its parent
    /// observation mapping. Returns how many belief nodes went away.
    pub(crate) fn prune_subtree(&mut self, belief: BeliefId) -> usize {
        if let Some(parent) = self.beliefs.get(belief.index()).and_then(|b| b.parent()) {
            if let Some(parent_node) = self.action_nodes.get_mut(parent.index()) {
                parent_node.observations_mut().remove_child(belief);
            }
        }
        let (beliefs, actions) = self.subtree(belief);
        let count = beliefs.len();
        for b in beliefs {
            self.beliefs.vacate(b.index());
        }
        for a in actions {
            self.action_nodes.vacate(a.index());
        }
        count
    }

    /// Remove everything outside the subtree rooted at `keep`.
    pub(crate) fn retain_subtree(&mut self, keep: BeliefId) -> usize {
        let (beliefs, actions) = self.subtree(keep);
        let keep_beliefs: HashSet<BeliefId> = beliefs.into_iter().collect();
        let keep_actions: HashSet<ActionNodeId> = actions.into_iter().collect();
        let all_beliefs: Vec<BeliefId> = self.beliefs.iter().map(|(id, _)| id).collect();
        let all_actions: Vec<ActionNodeId> = self.action_nodes.iter().map(|(id, _)| id).collect();
        let mut removed = 0;
        for b in all_beliefs {
            if !keep_beliefs.contains(&b) {
                self.beliefs.vacate(b.index());
                removed += 1;
            }
        }
        for a in all_actions {
            if !keep_actions.contains(&a) {
                self.action_nodes.vacate(a.index());
            }
        }
        removed
    }

    /// The root action with the highest mean Q over legal visited entries,
    /// ties broken by entry insertion order.
    pub fn best_action(&self) -> Result<Option<AM::Action>, SolverError> {
        let root = self.belief(self.root)?;
        let mut best: Option<(AM::Action, f64)> = None;
        for (action, view) in root.actions().visited_entries() {
            if !view.legal {
                continue;
            }
            match &best {
                Some((_, q)) if *q >= view.mean_q => {}
                _ => best = Some((action, view.mean_q)),
            }
        }
        Ok(best.map(|(action, _)| action))
    }

    /// The root action with the highest visit count.
    pub fn best_action_by_visits(&self) -> Result<Option<AM::Action>, SolverError> {
        let root = self.belief(self.root)?;
        let mut best: Option<(AM::Action, i64)> = None;
        for (action, view) in root.actions().visited_entries() {
            if !view.legal {
                continue;
            }
            match &best {
                Some((_, n)) if *n >= view.visits => {}
                _ => best = Some((action, view.visits)),
            }
        }
        Ok(best.map(|(action, _)| action))
    }
}
