use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::solver::ids::ActionNodeId;
use crate::solver::mappings::actions::{
    ucb_argmax, ActionMapping, ActionPool, ChooserBlob, EntryView,
};
use crate::solver::values::ContinuousAction;

type DataOf<P> = <<P as ContinuousActionSource>::Action as ContinuousAction>::Data;

/// Problem-side supplier of a continuous or hybrid action space.
pub trait ContinuousActionSource {
    type Action: ContinuousAction;

    /// Build the concrete action identified by a construction-data vector.
    fn make_action(&self, data: &DataOf<Self>) -> Self::Action;

    /// Construction data for the fixed actions of a hybrid action space.
    fn fixed_actions(&self) -> Vec<DataOf<Self>> {
        Vec::new()
    }

    /// Hint: offer the fixed actions in the given order, or shuffled.
    fn randomize_fixed(&self) -> bool {
        true
    }
}

/// Strategy that proposes the next construction-data vector to try, guided
/// by the data vectors of the actions already tried at this belief.
pub trait ActionChooser<D> {
    fn choose_next(&mut self, tried: &[D], rng: &mut ChaCha8Rng) -> Option<D>;
}

/// Action pool for continuous action spaces.
pub struct ContinuousActionPool<P, C>
where
    P: ContinuousActionSource,
    C: ActionChooser<DataOf<P>>,
{
    source: Rc<RefCell<P>>,
    chooser: Rc<RefCell<C>>,
}

impl<P, C> ContinuousActionPool<P, C>
where
    P: ContinuousActionSource,
    C: ActionChooser<DataOf<P>>,
{
    pub fn new(source: P, chooser: C) -> Self {
        ContinuousActionPool {
            source: Rc::new(RefCell::new(source)),
            chooser: Rc::new(RefCell::new(chooser)),
        }
    }
}

impl<P, C> ActionPool for ContinuousActionPool<P, C>
where
    P: ContinuousActionSource,
    C: ActionChooser<DataOf<P>>,
{
    type Action = P::Action;
    type Mapping = ContinuousActionMap<P, C>;

    fn create_mapping(&mut self, rng: &mut ChaCha8Rng) -> Self::Mapping {
        let mut fixed = self.source.borrow().fixed_actions();
        if self.source.borrow().randomize_fixed() {
            fixed.shuffle(rng);
        }
        ContinuousActionMap {
            source: Rc::clone(&self.source),
            chooser: Rc::clone(&self.chooser),
            entries: Vec::new(),
            index: HashMap::new(),
            pending_fixed: fixed.into(),
            total_visits: 0,
            chooser_blob: None,
        }
    }
}

#[derive(Debug, Clone)]
struct ContinuousEntry<A>
where
    A: ContinuousAction,
{
    data: A::Data,
    action: A,
    child: Option<ActionNodeId>,
    visits: i64,
    total_q: f64,
    mean_q: f64,
    legal: bool,
}

impl<A> ContinuousEntry<A>
where
    A: ContinuousAction,
{
    fn view(&self) -> EntryView {
        EntryView {
            visits: self.visits,
            total_q: self.total_q,
            mean_q: self.mean_q,
            legal: self.legal,
            child: self.child,
        }
    }
}

/// Action mapping keyed by construction data. The domain-defined hash and
/// equality of the data vector quotient very similar actions into one
/// entry; entries keep insertion order for deterministic iteration and UCB
/// tie-breaks.
pub struct ContinuousActionMap<P, C>
where
    P: ContinuousActionSource,
    C: ActionChooser<DataOf<P>>,
{
    source: Rc<RefCell<P>>,
    chooser: Rc<RefCell<C>>,
    entries: Vec<ContinuousEntry<P::Action>>,
    index: HashMap<DataOf<P>, usize>,
    pending_fixed: VecDeque<DataOf<P>>,
    total_visits: i64,
    chooser_blob: Option<ChooserBlob>,
}

impl<P, C> ContinuousActionMap<P, C>
where
    P: ContinuousActionSource,
    C: ActionChooser<DataOf<P>>,
{
    fn slot(&self, action: &P::Action) -> Option<usize> {
        self.index.get(action.construction_data()).copied()
    }

    /// Entry for the action, created legal on first touch. Actions proposed
    /// for trial are legal by construction; `set_legal` can revoke them.
    fn ensure_slot(&mut self, action: &P::Action) -> usize {
        if let Some(slot) = self.slot(action) {
            return slot;
        }
        let slot = self.entries.len();
        self.entries.push(ContinuousEntry {
            data: action.construction_data().clone(),
            action: action.clone(),
            child: None,
            visits: 0,
            total_q: 0.0,
            mean_q: 0.0,
            legal: true,
        });
        self.index
            .insert(self.entries[slot].data.clone(), slot);
        slot
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

impl<P, C> ActionMapping for ContinuousActionMap<P, C>
where
    P: ContinuousActionSource,
    C: ActionChooser<DataOf<P>>,
{
    type Action = P::Action;

    fn child(&self, action: &P::Action) -> Option<ActionNodeId> {
        self.slot(action).and_then(|i| self.entries[i].child)
    }

    fn set_child(&mut self, action: &P::Action, child: Option<ActionNodeId>) {
        let slot = self.ensure_slot(action);
        self.entries[slot].child = child;
    }

    fn entry(&self, action: &P::Action) -> Option<EntryView> {
        self.slot(action).map(|i| self.entries[i].view())
    }

    fn update_entry(&mut self, action: &P::Action, delta_visits: i64, delta_total_q: f64) {
        let slot = self.ensure_slot(action);
        self.total_visits += delta_visits;
        let entry = &mut self.entries[slot];
        entry.visits += delta_visits;
        entry.total_q += delta_total_q;
        if entry.visits > 0 {
            entry.mean_q = entry.total_q / entry.visits as f64;
        } else {
            entry.total_q = 0.0;
            entry.mean_q = 0.0;
        }
    }

    fn set_legal(&mut self, action: &P::Action, legal: bool) {
        let slot = self.ensure_slot(action);
        self.entries[slot].legal = legal;
    }

    fn next_action_to_try(&mut self, rng: &mut ChaCha8Rng) -> Option<P::Action> {
        while let Some(data) = self.pending_fixed.pop_front() {
            if self.index.contains_key(&data) {
                continue;
            }
            let action = self.source.borrow().make_action(&data);
            self.ensure_slot(&action);
            return Some(action);
        }
        let tried: Vec<DataOf<P>> = self.entries.iter().map(|e| e.data.clone()).collect();
        let data = self.chooser.borrow_mut().choose_next(&tried, rng)?;
        let action = self.source.borrow().make_action(&data);
        self.ensure_slot(&action);
        Some(action)
    }

    fn select_ucb(&self, exploration: f64) -> Option<P::Action> {
        ucb_argmax(
            self.entries.iter().map(|e| (e.action.clone(), e.view())),
            self.total_visits,
            exploration,
        )
    }

    fn visited_entries(&self) -> Vec<(P::Action, EntryView)> {
        self.entries
            .iter()
            .filter(|e| e.visits > 0)
            .map(|e| (e.action.clone(), e.view()))
            .collect()
    }

    fn child_entries(&self) -> Vec<(P::Action, EntryView)> {
        self.entries
            .iter()
            .filter(|e| e.child.is_some())
            .map(|e| (e.action.clone(), e.view()))
            .collect()
    }

    fn total_visits(&self) -> i64 {
        self.total_visits
    }

    fn restore_entry(&mut self, action: &P::Action, view: EntryView) {
        let slot = self.ensure_slot(action);
        self.total_visits += view.visits;
        let entry = &mut self.entries[slot];
        entry.child = view.child;
        entry.visits = view.visits;
        entry.total_q = view.total_q;
        entry.legal = view.legal;
        entry.mean_q = if view.visits > 0 {
            view.total_q / view.visits as f64
        } else {
            0.0
        };
    }

    fn chooser_blob(&self) -> Option<&ChooserBlob> {
        self.chooser_blob.as_ref()
    }

    fn set_chooser_blob(&mut self, blob: ChooserBlob) {
        self.chooser_blob = Some(blob);
    }
}
