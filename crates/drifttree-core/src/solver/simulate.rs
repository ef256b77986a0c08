use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use crate::solver::changes::ChangeFlags;
use crate::solver::config::SearchConfig;
use crate::solver::errors::SolverError;
use crate::solver::histories::{Histories, HistoryEntry};
use crate::solver::ids::{ActionNodeId, BeliefId, SequenceId, StateId};
use crate::solver::mappings::actions::{ActionMapping, ActionPool};
use crate::solver::mappings::observations::{ObservationMapping, ObservationPool};
use crate::solver::model::Model;
use crate::solver::state_pool::StatePool;
use crate::solver::tree::BeliefTree;

/// Metrics for one completed simulation.
#[derive(Debug, Clone, Copy)]
pub struct SimulationMetrics {
    pub depth: usize,
    pub total_return: f64,
    pub new_belief: bool,
}

/// Aggregate metrics for one planning step.
#[derive(Debug, Clone)]
pub struct RunMetrics {
    pub simulations_requested: usize,
    pub simulations_completed: usize,
    pub simulations_dropped: usize,
    pub total_return_sum: f64,
    pub average_total_return: f64,
}

impl RunMetrics {
    fn new(simulations_requested: usize) -> Self {
        RunMetrics {
            simulations_requested,
            simulations_completed: 0,
            simulations_dropped: 0,
            total_return_sum: 0.0,
            average_total_return: 0.0,
        }
    }

    fn record(&mut self, metrics: &SimulationMetrics) {
        self.simulations_completed += 1;
        self.total_return_sum += metrics.total_return;
        self.average_total_return = self.total_return_sum / self.simulations_completed as f64;
    }
}

/// Outcome of a repair traversal after model changes.
#[derive(Debug, Clone, Default)]
pub struct RepairStats {
    pub retracted_sequences: usize,
    pub pruned_beliefs: usize,
    pub recomputed_beliefs: usize,
}

struct TrajStep<A, O> {
    belief: BeliefId,
    node: ActionNodeId,
    action: A,
    observation: O,
    child: BeliefId,
}

/// The online planning session: owns the model, its pools, the belief
/// tree, the state pool, the histories, and the single random generator
/// everything consults.
///
/// The agent loop is strictly serial: apply changes, plan, choose, step the
/// world, observe, advance the root. Every invariant of the tree holds
/// between simulations, so suspending a session between them is always
/// safe.
pub struct Solver<M, AP, OP>
where
    M: Model,
    AP: ActionPool<Action = M::Action>,
    OP: ObservationPool<Observation = M::Observation>,
{
    model: M,
    action_pool: AP,
    observation_pool: OP,
    tree: BeliefTree<AP::Mapping, OP::Mapping>,
    state_pool: StatePool<M::State>,
    histories: Histories<M::Action, M::Observation>,
    rng: ChaCha8Rng,
    config: SearchConfig,
    model_error_logged: bool,
}

impl<M, AP, OP> Solver<M, AP, OP>
where
    M: Model,
    AP: ActionPool<Action = M::Action>,
    OP: ObservationPool<Observation = M::Observation>,
{
    /// Session over a static model, with a plain state pool.
    pub fn new(
        model: M,
        action_pool: AP,
        observation_pool: OP,
        config: SearchConfig,
        seed: u64,
    ) -> Result<Self, SolverError> {
        Self::with_state_pool(model, action_pool, observation_pool, StatePool::new(), config, seed)
    }

    /// Session with an explicit state pool, usually one carrying a spatial
    /// index for change tracking.
    pub fn with_state_pool(
        model: M,
        mut action_pool: AP,
        observation_pool: OP,
        state_pool: StatePool<M::State>,
        config: SearchConfig,
        seed: u64,
    ) -> Result<Self, SolverError> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let root_actions = action_pool.create_mapping(&mut rng);
        let tree = BeliefTree::new(root_actions);
        let mut solver = Solver {
            model,
            action_pool,
            observation_pool,
            tree,
            state_pool,
            histories: Histories::new(),
            rng,
            config,
            model_error_logged: false,
        };
        let count = solver.config.root_particles;
        solver.seed_root_particles(count)?;
        Ok(solver)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    pub fn tree(&self) -> &BeliefTree<AP::Mapping, OP::Mapping> {
        &self.tree
    }

    pub fn state_pool(&self) -> &StatePool<M::State> {
        &self.state_pool
    }

    pub fn state_pool_mut(&mut self) -> &mut StatePool<M::State> {
        &mut self.state_pool
    }

    pub fn histories(&self) -> &Histories<M::Action, M::Observation> {
        &self.histories
    }

    fn seed_root_particles(&mut self, count: usize) -> Result<(), SolverError> {
        let root = self.tree.root();
        for _ in 0..count {
            let state = self
                .model
                .sample_initial_state(&mut self.rng)
                .ok_or(SolverError::ModelSample("the initial belief"))?;
            let state_id = self.state_pool.intern(state);
            self.add_root_particle(root, state_id)?;
        }
        Ok(())
    }

    /// Register a fresh length-one sequence at the root. Such particles
    /// both start and end at the root and carry no value terms, which is
    /// exactly what cancels in the sequence-count formula.
    fn add_root_particle(&mut self, root: BeliefId, state_id: StateId) -> Result<(), SolverError> {
        let seq = self.histories.create();
        let pos = self
            .histories
            .get_mut(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .push(HistoryEntry {
                state: state_id,
                belief: root,
                action: None,
                observation: None,
                reward: 0.0,
            });
        self.state_pool.register_entry(state_id, seq, pos);
        let belief = self.tree.belief_mut(root)?;
        belief.register_particle(seq, pos);
        belief.add_starting(1);
        belief.add_ending(1);
        Ok(())
    }

    /// Run one planning step: up to `simulations_per_step` simulations,
    /// with the deadline checked strictly between simulations.
    pub fn plan(&mut self) -> Result<RunMetrics, SolverError> {
        let deadline = self
            .config
            .time_budget_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        let mut metrics = RunMetrics::new(self.config.simulations_per_step);
        for _ in 0..self.config.simulations_per_step {
            if let Some(at) = deadline {
                if Instant::now() >= at {
                    break;
                }
            }
            match self.simulate() {
                Ok(sim) => metrics.record(&sim),
                Err(err) if err.is_model_error() => {
                    if !self.model_error_logged {
                        warn!(error = %err, "dropping simulation after model error");
                        self.model_error_logged = true;
                    }
                    metrics.simulations_dropped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        debug!(
            completed = metrics.simulations_completed,
            dropped = metrics.simulations_dropped,
            beliefs = self.tree.belief_count(),
            "planning step finished"
        );
        Ok(metrics)
    }

    /// Extend the tree along one sampled trajectory and push the returns
    /// back up. A failed simulation leaves no trace behind.
    pub fn simulate(&mut self) -> Result<SimulationMetrics, SolverError> {
        let seq = self.histories.create();
        let result = self.run_simulation(seq);
        if result.is_err() {
            self.histories.remove(seq);
        }
        result
    }

    fn run_simulation(&mut self, seq: SequenceId) -> Result<SimulationMetrics, SolverError> {
        let root = self.tree.root();

        // Draw a particle uniformly from the root belief; the new sequence
        // shares its state.
        let seed_ref = {
            let belief = self.tree.belief(root)?;
            let particles = belief.particles();
            if particles.is_empty() {
                return Err(SolverError::EmptyRootBelief);
            }
            particles[self.rng.gen_range(0..particles.len())]
        };
        let state_id = self
            .histories
            .get(seed_ref.0)
            .and_then(|s| s.entry(seed_ref.1))
            .map(|e| e.state)
            .ok_or(SolverError::MissingSequence(seed_ref.0))?;
        let mut state = self
            .state_pool
            .get(state_id)
            .ok_or(SolverError::MissingState(state_id))?
            .clone();

        self.histories
            .get_mut(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .push(HistoryEntry {
                state: state_id,
                belief: root,
                action: None,
                observation: None,
                reward: 0.0,
            });

        let mut steps: Vec<TrajStep<M::Action, M::Observation>> = Vec::new();
        let mut belief = root;
        let mut terminal = self.model.is_terminal(&state);
        let mut new_belief = false;

        while !terminal && steps.len() < self.config.maximum_depth {
            // Untried actions first, then UCB over the visited ones.
            let action = {
                let node = self.tree.belief_mut(belief)?;
                match node.actions_mut().next_action_to_try(&mut self.rng) {
                    Some(action) => action,
                    None => node
                        .actions()
                        .select_ucb(self.config.exploration)
                        .ok_or(SolverError::NoAction(belief))?,
                }
            };

            // Expansion: materialize the action-node child if needed.
            let node_id = match self.tree.belief(belief)?.actions().child(&action) {
                Some(id) => id,
                None => {
                    let observations = self.observation_pool.create_mapping();
                    let id = self.tree.add_action_child(belief, observations);
                    self.tree
                        .belief_mut(belief)?
                        .actions_mut()
                        .set_child(&action, Some(id));
                    id
                }
            };

            let step = self
                .model
                .step(&state, &action, &mut self.rng)
                .ok_or(SolverError::ModelStep)?;
            let next_id = self.state_pool.intern(step.next_state.clone());

            // Locate or create the belief child through the observation
            // mapping.
            let child = match self
                .tree
                .action_node(node_id)?
                .observations()
                .child(&step.observation)
            {
                Some(id) => id,
                None => {
                    let actions = self.action_pool.create_mapping(&mut self.rng);
                    let id = self.tree.add_belief_child(node_id, actions);
                    self.tree
                        .action_node_mut(node_id)?
                        .observations_mut()
                        .insert_child(&step.observation, id);
                    new_belief = true;
                    id
                }
            };

            {
                let sequence = self
                    .histories
                    .get_mut(seq)
                    .ok_or(SolverError::MissingSequence(seq))?;
                let pos = sequence.len() - 1;
                if let Some(entry) = sequence.entry_mut(pos) {
                    entry.action = Some(action.clone());
                    entry.observation = Some(step.observation.clone());
                    entry.reward = step.reward;
                }
                sequence.push(HistoryEntry {
                    state: next_id,
                    belief: child,
                    action: None,
                    observation: None,
                    reward: 0.0,
                });
            }

            steps.push(TrajStep {
                belief,
                node: node_id,
                action,
                observation: step.observation,
                child,
            });
            state = step.next_state;
            belief = child;
            terminal = step.is_terminal;
        }

        // Bootstrap the tail: zero for terminal, the model heuristic for a
        // cut-off leaf, with non-finite heuristics coerced.
        let tail = if terminal {
            0.0
        } else {
            let h = self.model.heuristic_value(&state);
            if h.is_finite() {
                h
            } else {
                self.model.default_value()
            }
        };
        self.histories
            .get_mut(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .set_tail_value(tail);

        let total_return = self.backpropagate(seq, &steps, tail)?;
        Ok(SimulationMetrics {
            depth: steps.len(),
            total_return,
            new_belief,
        })
    }

    /// Push the discounted returns of one finished sequence into the tree.
    ///
    /// Per path step the order is: the child belief's particle accounting,
    /// then the action mapping entry, then the observation edge visit, then
    /// the action node's sequence-count update against the child counters
    /// snapshotted before this sequence touched them.
    fn backpropagate(
        &mut self,
        seq: SequenceId,
        steps: &[TrajStep<M::Action, M::Observation>],
        tail: f64,
    ) -> Result<f64, SolverError> {
        let gamma = self.model.discount_factor();
        let k = steps.len();

        let returns = self
            .histories
            .get(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .returns(gamma);

        let mut path: Vec<BeliefId> = Vec::with_capacity(k + 1);
        path.push(self.tree.root());
        for step in steps {
            path.push(step.child);
        }

        let mut snapshots: Vec<(i64, f64)> = Vec::with_capacity(k + 1);
        for &belief in &path {
            let node = self.tree.belief(belief)?;
            snapshots.push((node.sequence_count(), node.value()));
        }

        for t in 0..=k {
            let belief_id = path[t];
            let entry_state = self
                .histories
                .get(seq)
                .and_then(|s| s.entry(t))
                .map(|e| e.state)
                .ok_or(SolverError::MissingSequence(seq))?;
            self.state_pool.register_entry(entry_state, seq, t);
            let node = self.tree.belief_mut(belief_id)?;
            node.register_particle(seq, t);
            node.record_visit(returns[t]);
            if t == 0 {
                node.add_starting(1);
            }
            if t == k {
                node.record_tail(tail);
            }
        }

        for t in (0..k).rev() {
            let step = &steps[t];
            self.tree
                .belief_mut(step.belief)?
                .actions_mut()
                .update_entry(&step.action, 1, returns[t]);
            self.tree
                .action_node_mut(step.node)?
                .observations_mut()
                .update_visits(&step.observation, 1);
            let (new_seq, new_q) = {
                let child = self.tree.belief(step.child)?;
                (child.sequence_count(), child.value())
            };
            let (old_seq, old_q) = snapshots[t + 1];
            self.tree
                .action_node_mut(step.node)?
                .apply_sequence_update(gamma, old_seq, old_q, new_seq, new_q, 1);
        }

        self.histories
            .get_mut(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .mark_backpropagated();
        Ok(returns[0])
    }

    /// Undo everything one sequence contributed: the exact inverse of
    /// back-propagation. Returns the beliefs it touched, which are the
    /// candidates for empty-belief pruning.
    fn retract_sequence(&mut self, seq: SequenceId) -> Result<Vec<BeliefId>, SolverError> {
        let gamma = self.model.discount_factor();
        let (entries, returns, tail, backpropagated) = {
            let sequence = self
                .histories
                .get(seq)
                .ok_or(SolverError::MissingSequence(seq))?;
            (
                sequence.entries().to_vec(),
                sequence.returns(gamma),
                sequence.tail_value(),
                sequence.is_backpropagated(),
            )
        };
        if entries.is_empty() {
            self.histories.remove(seq);
            return Ok(Vec::new());
        }
        let k = entries.len() - 1;

        let mut snapshots: Vec<(i64, f64)> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let node = self.tree.belief(entry.belief)?;
            snapshots.push((node.sequence_count(), node.value()));
        }

        for (t, entry) in entries.iter().enumerate() {
            self.state_pool.deregister_entry(entry.state, seq, t);
            let node = self.tree.belief_mut(entry.belief)?;
            node.deregister_particle(seq, t);
            if backpropagated {
                node.retract_visit(returns[t]);
            }
            if t == 0 {
                node.add_starting(-1);
            }
            if t == k {
                if backpropagated {
                    node.retract_tail(tail);
                } else {
                    node.add_ending(-1);
                }
            }
        }

        if backpropagated {
            for t in (0..k).rev() {
                let entry = &entries[t];
                let action = entry.action.as_ref().ok_or_else(|| {
                    SolverError::Invariant(format!(
                        "sequence {} entry {} lacks an action",
                        seq.index(),
                        t
                    ))
                })?;
                let observation = entry.observation.as_ref().ok_or_else(|| {
                    SolverError::Invariant(format!(
                        "sequence {} entry {} lacks an observation",
                        seq.index(),
                        t
                    ))
                })?;
                let node_id = self
                    .tree
                    .belief(entry.belief)?
                    .actions()
                    .child(action)
                    .ok_or_else(|| {
                        SolverError::Invariant(format!(
                            "no action-node child while retracting sequence {}",
                            seq.index()
                        ))
                    })?;
                self.tree
                    .belief_mut(entry.belief)?
                    .actions_mut()
                    .update_entry(action, -1, -returns[t]);
                self.tree
                    .action_node_mut(node_id)?
                    .observations_mut()
                    .update_visits(observation, -1);
                let child_id = entries[t + 1].belief;
                let (new_seq, new_q) = {
                    let child = self.tree.belief(child_id)?;
                    (child.sequence_count(), child.value())
                };
                let (old_seq, old_q) = snapshots[t + 1];
                self.tree
                    .action_node_mut(node_id)?
                    .apply_sequence_update(gamma, old_seq, old_q, new_seq, new_q, -1);
            }
        }

        self.histories.remove(seq);
        Ok(entries.into_iter().map(|e| e.belief).collect())
    }

    /// Prune every candidate belief left without particles, subtree and
    /// all. The root is never pruned.
    fn prune_empty(&mut self, candidates: Vec<BeliefId>) -> Result<usize, SolverError> {
        let mut pruned = 0;
        for belief in candidates {
            if belief == self.tree.root() {
                continue;
            }
            let Some(node) = self.tree.belief_opt(belief) else {
                // Already vacated with an ancestor; flagged nodes are not
                // revisited within one repair step.
                continue;
            };
            if node.n_particles() > 0 {
                continue;
            }
            pruned += self.tree.prune_subtree(belief);
        }
        Ok(pruned)
    }

    /// Apply the model changes scheduled for `time` and repair the tree.
    pub fn apply_changes_at(&mut self, time: u64) -> Result<RepairStats, SolverError> {
        self.model.apply_changes(time, &mut self.state_pool);
        self.repair()
    }

    /// Repair the tree after states were flagged: retract every history
    /// stepping through a deleted state, prune beliefs left empty, and
    /// recompute Q-statistics of dirty subtrees from their children with no
    /// visit-count change.
    pub fn repair(&mut self) -> Result<RepairStats, SolverError> {
        let flagged = self.state_pool.take_flagged();
        let mut stats = RepairStats::default();
        let mut to_retract: Vec<SequenceId> = Vec::new();
        let mut retract_seen: HashSet<SequenceId> = HashSet::new();
        let mut dirty: Vec<BeliefId> = Vec::new();

        for state_id in flagged {
            let flags = self.state_pool.flags(state_id);
            let refs: Vec<(SequenceId, usize)> = self.state_pool.entry_refs(state_id).to_vec();
            for (seq, pos) in refs {
                if flags.contains(ChangeFlags::DELETED) {
                    if retract_seen.insert(seq) {
                        to_retract.push(seq);
                    }
                } else if let Some(entry) =
                    self.histories.get(seq).and_then(|s| s.entry(pos))
                {
                    let belief = entry.belief;
                    if let Ok(node) = self.tree.belief_mut(belief) {
                        node.set_dirty(true);
                    }
                    dirty.push(belief);
                }
            }
        }

        let mut prune_candidates = Vec::new();
        for seq in to_retract {
            stats.retracted_sequences += 1;
            prune_candidates.extend(self.retract_sequence(seq)?);
        }
        stats.pruned_beliefs = self.prune_empty(prune_candidates)?;

        let mut recomputed: HashSet<BeliefId> = HashSet::new();
        for belief in dirty {
            self.recompute_subtree(belief, &mut recomputed)?;
        }
        stats.recomputed_beliefs = recomputed.len();

        self.state_pool.clear_transient_flags();
        if stats.retracted_sequences > 0 || stats.recomputed_beliefs > 0 {
            debug!(
                retracted = stats.retracted_sequences,
                pruned = stats.pruned_beliefs,
                recomputed = stats.recomputed_beliefs,
                "repaired tree after model changes"
            );
        }
        Ok(stats)
    }

    /// Post-order recomputation of a subtree's Q-statistics from its
    /// children. Visit counts are untouched.
    fn recompute_subtree(
        &mut self,
        belief: BeliefId,
        done: &mut HashSet<BeliefId>,
    ) -> Result<(), SolverError> {
        if !done.insert(belief) {
            return Ok(());
        }
        let Some(node) = self.tree.belief_opt(belief) else {
            return Ok(());
        };
        let gamma = self.model.discount_factor();
        let action_children: Vec<ActionNodeId> = node
            .actions()
            .child_entries()
            .into_iter()
            .filter_map(|(_, view)| view.child)
            .collect();
        for action_id in action_children {
            let obs_children: Vec<BeliefId> = self
                .tree
                .action_node(action_id)?
                .observations()
                .entries()
                .iter()
                .map(|e| e.child)
                .collect();
            for child in &obs_children {
                self.recompute_subtree(*child, done)?;
            }
            let mut total = 0.0;
            for child in obs_children {
                let child_node = self.tree.belief(child)?;
                let weight = child_node.sequence_count();
                let value = child_node.value();
                if weight != 0 && value.is_finite() {
                    total += weight as f64 * gamma * value;
                }
            }
            let action_node = self.tree.action_node_mut(action_id)?;
            action_node.set_total_q(total);
            action_node.recalculate();
        }
        let node = self.tree.belief_mut(belief)?;
        node.recalculate();
        node.set_dirty(false);
        Ok(())
    }

    /// Commit the agent's real step: descend into the matching belief
    /// child, discard everything else, and replenish the root particle
    /// set from retained predecessor states.
    pub fn advance_root(
        &mut self,
        action: &M::Action,
        observation: &M::Observation,
    ) -> Result<(), SolverError> {
        let old_root = self.tree.root();

        let node_id = match self.tree.belief(old_root)?.actions().child(action) {
            Some(id) => id,
            None => {
                let observations = self.observation_pool.create_mapping();
                let id = self.tree.add_action_child(old_root, observations);
                self.tree
                    .belief_mut(old_root)?
                    .actions_mut()
                    .set_child(action, Some(id));
                id
            }
        };
        let new_root = match self.tree.action_node(node_id)?.observations().child(observation) {
            Some(id) => id,
            None => {
                let actions = self.action_pool.create_mapping(&mut self.rng);
                let id = self.tree.add_belief_child(node_id, actions);
                self.tree
                    .action_node_mut(node_id)?
                    .observations_mut()
                    .insert_child(observation, id);
                id
            }
        };

        // Predecessor states for replenishment, captured before the old
        // root's particles go away.
        let old_states: Vec<StateId> = {
            let belief = self.tree.belief(old_root)?;
            belief
                .particles()
                .iter()
                .filter_map(|&(seq, pos)| {
                    self.histories
                        .get(seq)
                        .and_then(|s| s.entry(pos))
                        .map(|e| e.state)
                })
                .collect()
        };

        // Histories: keep only sequences that pass through the new root,
        // truncated to start there.
        for seq in self.histories.ids() {
            let through = self
                .histories
                .get(seq)
                .and_then(|s| s.entries().iter().position(|e| e.belief == new_root));
            match through {
                None => self.discard_sequence(seq)?,
                Some(0) => {}
                Some(pos) => self.truncate_prefix(seq, pos)?,
            }
        }

        // Particle filter: re-simulate the committed action from retained
        // predecessor states and keep draws matching the observation edge.
        let target = self.config.root_particles;
        let current = self.tree.belief(new_root)?.n_particles().max(0) as usize;
        let mut replacements: Vec<StateId> = Vec::new();
        if current < target && !old_states.is_empty() {
            let needed = target - current;
            let mut attempts = 0usize;
            let max_attempts = needed.saturating_mul(100);
            while replacements.len() < needed && attempts < max_attempts {
                attempts += 1;
                let sid = old_states[self.rng.gen_range(0..old_states.len())];
                let Some(state) = self.state_pool.get(sid).cloned() else {
                    continue;
                };
                let Some(next) = self.model.generate_next_state(&state, action, &mut self.rng)
                else {
                    continue;
                };
                let Some(drawn) = self.model.generate_observation(action, &next, &mut self.rng)
                else {
                    continue;
                };
                let accept = self
                    .tree
                    .action_node(node_id)?
                    .observations()
                    .same_edge(&drawn, observation);
                if accept {
                    replacements.push(self.state_pool.intern(next));
                }
            }
            if replacements.len() < needed {
                warn!(
                    have = current + replacements.len(),
                    target, "root belief under-replenished after advancing"
                );
            }
        }

        let removed = self.tree.retain_subtree(new_root);
        self.tree.belief_mut(new_root)?.clear_parent();
        self.tree.set_root(new_root);
        for sid in replacements {
            self.add_root_particle(new_root, sid)?;
        }
        debug!(
            pruned = removed,
            particles = self.tree.belief(new_root)?.n_particles(),
            "advanced root"
        );
        Ok(())
    }

    /// Drop a sequence that survives nowhere in the retained subtree. Its
    /// statistics all live in nodes about to be pruned, so only the
    /// registrations are unwound.
    fn discard_sequence(&mut self, seq: SequenceId) -> Result<(), SolverError> {
        let entries = self
            .histories
            .get(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .entries()
            .to_vec();
        for (t, entry) in entries.iter().enumerate() {
            self.state_pool.deregister_entry(entry.state, seq, t);
            if let Ok(node) = self.tree.belief_mut(entry.belief) {
                node.deregister_particle(seq, t);
            }
        }
        self.histories.remove(seq);
        Ok(())
    }

    /// Re-anchor a surviving sequence at the new root by dropping its
    /// prefix and re-registering the suffix under shifted positions.
    fn truncate_prefix(&mut self, seq: SequenceId, prefix: usize) -> Result<(), SolverError> {
        let entries = self
            .histories
            .get(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .entries()
            .to_vec();
        for (t, entry) in entries.iter().enumerate() {
            self.state_pool.deregister_entry(entry.state, seq, t);
            if let Ok(node) = self.tree.belief_mut(entry.belief) {
                node.deregister_particle(seq, t);
            }
        }
        if let Some(first) = entries.first() {
            if let Ok(node) = self.tree.belief_mut(first.belief) {
                node.add_starting(-1);
            }
        }
        self.histories
            .get_mut(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .drop_prefix(prefix);
        let suffix = self
            .histories
            .get(seq)
            .ok_or(SolverError::MissingSequence(seq))?
            .entries()
            .to_vec();
        for (t, entry) in suffix.iter().enumerate() {
            self.state_pool.register_entry(entry.state, seq, t);
            self.tree.belief_mut(entry.belief)?.register_particle(seq, t);
        }
        if let Some(first) = suffix.first() {
            self.tree.belief_mut(first.belief)?.add_starting(1);
        }
        Ok(())
    }

    /// The empirically best action at the root by mean Q.
    pub fn best_action(&self) -> Result<Option<M::Action>, SolverError> {
        self.tree.best_action()
    }

    /// The root action with the highest visit count.
    pub fn best_action_by_visits(&self) -> Result<Option<M::Action>, SolverError> {
        self.tree.best_action_by_visits()
    }

    /// Verify every quantified invariant that must hold between
    /// simulations. Intended for tests and debugging sweeps.
    pub fn check_invariants(&self) -> Result<(), SolverError> {
        for (id, node) in self.tree.action_nodes() {
            let edge_sum: i64 = node.observations().entries().iter().map(|e| e.visits).sum();
            if node.n_particles() != edge_sum {
                return Err(SolverError::Invariant(format!(
                    "action node {}: n = {} but observation edges sum to {}",
                    id.index(),
                    node.n_particles(),
                    edge_sum
                )));
            }
            for entry in node.observations().entries() {
                if entry.visits < 0 {
                    return Err(SolverError::Invariant(format!(
                        "action node {}: negative observation edge visit count",
                        id.index()
                    )));
                }
            }
        }

        let root = self.tree.root();
        for (id, node) in self.tree.beliefs() {
            let mut entry_visits = 0i64;
            let mut entry_total = 0.0f64;
            for (_, view) in node.actions().visited_entries() {
                if view.visits < 0 {
                    return Err(SolverError::Invariant(format!(
                        "belief {}: negative entry visit count",
                        id.index()
                    )));
                }
                let mean = view.total_q / view.visits as f64;
                if (view.mean_q - mean).abs() > 1e-9 * mean.abs().max(1.0) {
                    return Err(SolverError::Invariant(format!(
                        "belief {}: entry mean Q {} does not match total/visits {}",
                        id.index(),
                        view.mean_q,
                        mean
                    )));
                }
                entry_visits += view.visits;
                entry_total += view.total_q;
            }

            if id != root {
                let parent = node.parent().ok_or_else(|| {
                    SolverError::Invariant(format!("belief {} has no parent", id.index()))
                })?;
                let parent_edge_visits: i64 = self
                    .tree
                    .action_node(parent)?
                    .observations()
                    .entries()
                    .iter()
                    .filter(|e| e.child == id)
                    .map(|e| e.visits)
                    .sum();
                if parent_edge_visits != node.n_particles() {
                    return Err(SolverError::Invariant(format!(
                        "belief {}: {} particles but parent edges carry {} visits",
                        id.index(),
                        node.n_particles(),
                        parent_edge_visits
                    )));
                }
            }

            for &(seq, pos) in node.particles() {
                let entry = self
                    .histories
                    .get(seq)
                    .and_then(|s| s.entry(pos))
                    .ok_or_else(|| {
                        SolverError::Invariant(format!(
                            "belief {}: particle points at missing history entry",
                            id.index()
                        ))
                    })?;
                if entry.belief != id {
                    return Err(SolverError::Invariant(format!(
                        "belief {}: particle registered at a different belief",
                        id.index()
                    )));
                }
                if !self.state_pool.contains(entry.state) {
                    return Err(SolverError::Invariant(format!(
                        "belief {}: particle state absent from the pool",
                        id.index()
                    )));
                }
            }

            let expected_visits = entry_visits + node.tail_count();
            if node.visit_count() != expected_visits {
                return Err(SolverError::Invariant(format!(
                    "belief {}: visit count {} but entries plus tails give {}",
                    id.index(),
                    node.visit_count(),
                    expected_visits
                )));
            }
            let expected_total = entry_total + node.tail_value_total();
            if (node.value_total() - expected_total).abs()
                > 1e-6 * expected_total.abs().max(1.0)
            {
                return Err(SolverError::Invariant(format!(
                    "belief {}: value total {} but entries plus tails give {}",
                    id.index(),
                    node.value_total(),
                    expected_total
                )));
            }
        }

        for (state_id, flags) in self.state_pool.iter_flags() {
            if flags.contains(ChangeFlags::DELETED)
                && !self.state_pool.entry_refs(state_id).is_empty()
            {
                return Err(SolverError::Invariant(format!(
                    "deleted state {} still has live particles",
                    state_id.index()
                )));
            }
        }
        Ok(())
    }
}
