use std::collections::HashMap;

use crate::solver::changes::ChangeFlags;
use crate::solver::ids::{SequenceId, StateId};
use crate::solver::index::{NullIndex, StateIndex};
use crate::solver::values::SolverValue;

#[derive(Debug)]
struct StateRecord<S> {
    state: S,
    flags: ChangeFlags,
    /// History entries whose particle references this state.
    used_in: Vec<(SequenceId, usize)>,
}

/// Append-only interned store owning every sampled environment state.
/// Particles elsewhere are raw `StateId` references into this pool.
pub struct StatePool<S>
where
    S: SolverValue,
{
    records: Vec<StateRecord<S>>,
    lookup: HashMap<S, StateId>,
    index: Box<dyn StateIndex<S>>,
    flagged: Vec<StateId>,
}

impl<S> StatePool<S>
where
    S: SolverValue,
{
    /// Pool without a spatial index, for models that never change.
    pub fn new() -> Self {
        Self::with_index(Box::new(NullIndex))
    }

    /// Pool backed by the given index for change propagation.
    pub fn with_index(index: Box<dyn StateIndex<S>>) -> Self {
        StatePool {
            records: Vec::new(),
            lookup: HashMap::new(),
            index,
            flagged: Vec::new(),
        }
    }

    /// Insert the state if needed and return its stable id. A record
    /// flagged `DELETED` stays dead: an identical sample drawn later gets
    /// a fresh record, so pruned histories can never resurface through it.
    pub fn intern(&mut self, state: S) -> StateId {
        if let Some(&id) = self.lookup.get(&state) {
            if !self.records[id.index()].flags.contains(ChangeFlags::DELETED) {
                return id;
            }
        }
        let id = StateId::from(self.records.len());
        self.index.insert(id, &state);
        self.records.push(StateRecord {
            state: state.clone(),
            flags: ChangeFlags::NONE,
            used_in: Vec::new(),
        });
        self.lookup.insert(state, id);
        id
    }

    pub fn get(&self, id: StateId) -> Option<&S> {
        self.records.get(id.index()).map(|r| &r.state)
    }

    pub fn id_of(&self, state: &S) -> Option<StateId> {
        self.lookup.get(state).copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: StateId) -> bool {
        id.index() < self.records.len()
    }

    pub fn flags(&self, id: StateId) -> ChangeFlags {
        self.records
            .get(id.index())
            .map(|r| r.flags)
            .unwrap_or(ChangeFlags::NONE)
    }

    /// Merge flags into a state's record, queueing it for the next repair
    /// traversal on the first flag it receives.
    pub fn set_flags(&mut self, id: StateId, flags: ChangeFlags) {
        if let Some(record) = self.records.get_mut(id.index()) {
            if record.flags.is_empty() && !flags.is_empty() {
                self.flagged.push(id);
            }
            record.flags |= flags;
        }
    }

    /// Flag every indexed state inside `[low, high]`.
    pub fn flag_box(&mut self, low: &[f64], high: &[f64], flags: ChangeFlags) {
        let mut hits = Vec::new();
        self.index.box_query(low, high, &mut hits);
        for id in hits {
            self.set_flags(id, flags);
        }
    }

    /// Drain the queue of states flagged since the last repair.
    pub fn take_flagged(&mut self) -> Vec<StateId> {
        std::mem::take(&mut self.flagged)
    }

    /// Clear every non-delete flag. Deleted states stay dead.
    pub fn clear_transient_flags(&mut self) {
        for record in &mut self.records {
            if !record.flags.contains(ChangeFlags::DELETED) {
                record.flags = ChangeFlags::NONE;
            }
        }
    }

    pub fn register_entry(&mut self, id: StateId, seq: SequenceId, pos: usize) {
        if let Some(record) = self.records.get_mut(id.index()) {
            record.used_in.push((seq, pos));
        }
    }

    pub fn deregister_entry(&mut self, id: StateId, seq: SequenceId, pos: usize) {
        if let Some(record) = self.records.get_mut(id.index()) {
            record.used_in.retain(|r| *r != (seq, pos));
        }
    }

    /// History entries currently referencing this state.
    pub fn entry_refs(&self, id: StateId) -> &[(SequenceId, usize)] {
        self.records
            .get(id.index())
            .map(|r| r.used_in.as_slice())
            .unwrap_or(&[])
    }

    /// Iterate every stored state id with its current change flags.
    pub fn iter_flags(&self) -> impl Iterator<Item = (StateId, ChangeFlags)> + '_ {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (StateId::from(i), r.flags))
    }
}

impl<S> Default for StatePool<S>
where
    S: SolverValue,
{
    fn default() -> Self {
        Self::new()
    }
}
