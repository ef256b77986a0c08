use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand_chacha::ChaCha8Rng;

use crate::solver::ids::ActionNodeId;
use crate::solver::mappings::actions::{ucb_argmax, ActionMapping, ActionPool, EntryView};
use crate::solver::values::DiscretizedAction;

/// Problem-side supplier of a finite discretized action space.
pub trait BinnedActionSource {
    type Action: DiscretizedAction;

    fn bin_count(&self) -> usize;

    /// Produce a concrete action for a bin.
    fn sample_action(&mut self, bin: usize, rng: &mut ChaCha8Rng) -> Option<Self::Action>;

    /// FIFO order in which untried bins are offered at a new belief node.
    /// Bins absent from the sequence stay illegal.
    fn bin_sequence(&mut self, rng: &mut ChaCha8Rng) -> Vec<usize>;
}

/// Action pool for discretized action spaces. Mappings share the source
/// so `next_action_to_try` can sample concrete actions lazily.
pub struct DiscretizedActionPool<P>
where
    P: BinnedActionSource,
{
    source: Rc<RefCell<P>>,
}

impl<P> DiscretizedActionPool<P>
where
    P: BinnedActionSource,
{
    pub fn new(source: P) -> Self {
        DiscretizedActionPool {
            source: Rc::new(RefCell::new(source)),
        }
    }

    pub fn source(&self) -> Rc<RefCell<P>> {
        Rc::clone(&self.source)
    }
}

impl<P> ActionPool for DiscretizedActionPool<P>
where
    P: BinnedActionSource,
{
    type Action = P::Action;
    type Mapping = DiscretizedActionMap<P>;

    fn create_mapping(&mut self, rng: &mut ChaCha8Rng) -> Self::Mapping {
        let bins = self.source.borrow().bin_count();
        let sequence = self.source.borrow_mut().bin_sequence(rng);
        DiscretizedActionMap::new(Rc::clone(&self.source), bins, sequence)
    }
}

#[derive(Debug, Clone)]
struct BinEntry<A> {
    /// Representative action for the bin; filled on first use. All actions
    /// resolving to this bin share the entry.
    action: Option<A>,
    child: Option<ActionNodeId>,
    visits: i64,
    total_q: f64,
    mean_q: f64,
    legal: bool,
}

impl<A> BinEntry<A> {
    fn new() -> Self {
        BinEntry {
            action: None,
            child: None,
            visits: 0,
            total_q: 0.0,
            mean_q: 0.0,
            legal: false,
        }
    }

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

/// Action mapping over a fixed bin count. Entries exist eagerly per bin and
/// are illegal by default; the bin sequence supplied at construction defines
/// both which bins are legal and the order untried bins are offered.
pub struct DiscretizedActionMap<P>
where
    P: BinnedActionSource,
{
    source: Rc<RefCell<P>>,
    entries: Vec<BinEntry<P::Action>>,
    bin_queue: VecDeque<usize>,
    total_visits: i64,
}

impl<P> DiscretizedActionMap<P>
where
    P: BinnedActionSource,
{
    fn new(source: Rc<RefCell<P>>, bin_count: usize, sequence: Vec<usize>) -> Self {
        let mut entries: Vec<BinEntry<P::Action>> =
            (0..bin_count).map(|_| BinEntry::new()).collect();
        for &bin in &sequence {
            if let Some(entry) = entries.get_mut(bin) {
                entry.legal = true;
            }
        }
        DiscretizedActionMap {
            source,
            entries,
            bin_queue: sequence.into(),
            total_visits: 0,
        }
    }

    pub fn bin_count(&self) -> usize {
        self.entries.len()
    }

    /// Rule a whole bin legal or illegal without needing a concrete action.
    /// A reinstated bin that was never tried re-enters the untried pipeline
    /// exactly once.
    pub fn set_bin_legal(&mut self, bin: usize, legal: bool) {
        let Some(entry) = self.entries.get_mut(bin) else {
            return;
        };
        entry.legal = legal;
        if legal {
            if entry.action.is_none() && !self.bin_queue.contains(&bin) {
                self.bin_queue.push_back(bin);
            }
        } else {
            self.bin_queue.retain(|b| *b != bin);
        }
    }

    fn entry_mut(&mut self, action: &P::Action) -> Option<&mut BinEntry<P::Action>> {
        self.entries.get_mut(action.bin_number())
    }
}

impl<P> ActionMapping for DiscretizedActionMap<P>
where
    P: BinnedActionSource,
{
    type Action = P::Action;

    fn child(&self, action: &P::Action) -> Option<ActionNodeId> {
        self.entries.get(action.bin_number()).and_then(|e| e.child)
    }

    fn set_child(&mut self, action: &P::Action, child: Option<ActionNodeId>) {
        if let Some(entry) = self.entry_mut(action) {
            entry.action.get_or_insert_with(|| action.clone());
            entry.child = child;
        }
    }

    fn entry(&self, action: &P::Action) -> Option<EntryView> {
        self.entries.get(action.bin_number()).map(BinEntry::view)
    }

    fn update_entry(&mut self, action: &P::Action, delta_visits: i64, delta_total_q: f64) {
        self.total_visits += delta_visits;
        if let Some(entry) = self.entry_mut(action) {
            entry.action.get_or_insert_with(|| action.clone());
            entry.visits += delta_visits;
            entry.total_q += delta_total_q;
            if entry.visits > 0 {
                entry.mean_q = entry.total_q / entry.visits as f64;
            } else {
                entry.total_q = 0.0;
                entry.mean_q = 0.0;
            }
        }
    }

    fn set_legal(&mut self, action: &P::Action, legal: bool) {
        self.set_bin_legal(action.bin_number(), legal);
    }

    fn next_action_to_try(&mut self, rng: &mut ChaCha8Rng) -> Option<P::Action> {
        while let Some(bin) = self.bin_queue.pop_front() {
            let legal = self.entries.get(bin).map(|e| e.legal).unwrap_or(false);
            if !legal {
                continue;
            }
            if let Some(action) = self.source.borrow_mut().sample_action(bin, rng) {
                if let Some(entry) = self.entries.get_mut(bin) {
                    entry.action.get_or_insert_with(|| action.clone());
                }
                return Some(action);
            }
        }
        None
    }

    fn select_ucb(&self, exploration: f64) -> Option<P::Action> {
        ucb_argmax(
            self.entries
                .iter()
                .filter_map(|e| e.action.clone().map(|a| (a, e.view()))),
            self.total_visits,
            exploration,
        )
    }

    fn visited_entries(&self) -> Vec<(P::Action, EntryView)> {
        self.entries
            .iter()
            .filter(|e| e.visits > 0)
            .filter_map(|e| e.action.clone().map(|a| (a, e.view())))
            .collect()
    }

    fn child_entries(&self) -> Vec<(P::Action, EntryView)> {
        self.entries
            .iter()
            .filter(|e| e.child.is_some())
            .filter_map(|e| e.action.clone().map(|a| (a, e.view())))
            .collect()
    }

    fn total_visits(&self) -> i64 {
        self.total_visits
    }

    fn restore_entry(&mut self, action: &P::Action, view: EntryView) {
        let bin = action.bin_number();
        self.total_visits += view.visits;
        if let Some(entry) = self.entries.get_mut(bin) {
            entry.action = Some(action.clone());
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
        // A restored entry has left the untried pipeline.
        if view.visits > 0 || view.child.is_some() {
            self.bin_queue.retain(|b| *b != bin);
        }
    }
}
