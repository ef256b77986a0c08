use std::collections::HashMap;

use crate::solver::ids::StateId;
use crate::solver::values::SpatialState;

/// Spatial or ordinal index over pooled states, used to find every stored
/// state inside an axis-aligned region when a model change lands.
pub trait StateIndex<S> {
    fn insert(&mut self, id: StateId, state: &S);

    /// Visit every indexed state whose coordinates lie within
    /// `[low, high]` (inclusive on both ends), pushing its id into `out`.
    fn box_query(&self, low: &[f64], high: &[f64], out: &mut Vec<StateId>);
}

/// Index for models without change tracking. Stores nothing.
#[derive(Debug, Default)]
pub struct NullIndex;

impl<S> StateIndex<S> for NullIndex {
    fn insert(&mut self, _id: StateId, _state: &S) {}

    fn box_query(&self, _low: &[f64], _high: &[f64], _out: &mut Vec<StateId>) {}
}

#[derive(Debug, Clone)]
struct Rect {
    low: Vec<f64>,
    high: Vec<f64>,
}

impl Rect {
    fn point(coords: &[f64]) -> Self {
        Rect {
            low: coords.to_vec(),
            high: coords.to_vec(),
        }
    }

    fn union_in_place(&mut self, other: &Rect) {
        for d in 0..self.low.len() {
            if other.low[d] < self.low[d] {
                self.low[d] = other.low[d];
            }
            if other.high[d] > self.high[d] {
                self.high[d] = other.high[d];
            }
        }
    }

    fn intersects(&self, low: &[f64], high: &[f64]) -> bool {
        for d in 0..self.low.len() {
            if self.high[d] < low[d] || self.low[d] > high[d] {
                return false;
            }
        }
        true
    }

    fn area(&self) -> f64 {
        self.low
            .iter()
            .zip(&self.high)
            .map(|(lo, hi)| hi - lo)
            .product()
    }

    fn enlargement(&self, other: &Rect) -> f64 {
        let mut grown = self.clone();
        grown.union_in_place(other);
        grown.area() - self.area()
    }
}

const MAX_NODE_ENTRIES: usize = 8;

#[derive(Debug)]
enum RNodeKind {
    Leaf(Vec<(Rect, StateId)>),
    Branch(Vec<RNode>),
}

#[derive(Debug)]
struct RNode {
    rect: Rect,
    kind: RNodeKind,
}

impl RNode {
    fn query(&self, low: &[f64], high: &[f64], out: &mut Vec<StateId>) {
        if !self.rect.intersects(low, high) {
            return;
        }
        match &self.kind {
            RNodeKind::Leaf(items) => {
                for (rect, id) in items {
                    if rect.intersects(low, high) {
                        out.push(*id);
                    }
                }
            }
            RNodeKind::Branch(children) => {
                for child in children {
                    child.query(low, high, out);
                }
            }
        }
    }
}

/// A compact R-tree over real-vector states. Insert-only: the pool it
/// indexes is append-only, and deleted states are handled by change flags
/// rather than removal.
#[derive(Debug)]
pub struct RTreeIndex {
    dims: usize,
    root: Option<RNode>,
}

impl RTreeIndex {
    pub fn new(dims: usize) -> Self {
        RTreeIndex { dims, root: None }
    }

    fn insert_rect(&mut self, rect: Rect, id: StateId) {
        let Some(mut root) = self.root.take() else {
            self.root = Some(RNode {
                rect: rect.clone(),
                kind: RNodeKind::Leaf(vec![(rect, id)]),
            });
            return;
        };
        if let Some(sibling) = insert_recursive(&mut root, rect, id) {
            let mut rect = root.rect.clone();
            rect.union_in_place(&sibling.rect);
            self.root = Some(RNode {
                rect,
                kind: RNodeKind::Branch(vec![root, sibling]),
            });
        } else {
            self.root = Some(root);
        }
    }
}

fn insert_recursive(node: &mut RNode, rect: Rect, id: StateId) -> Option<RNode> {
    node.rect.union_in_place(&rect);
    match &mut node.kind {
        RNodeKind::Leaf(items) => {
            items.push((rect, id));
            if items.len() > MAX_NODE_ENTRIES {
                let (lower, sibling) = split_leaf(items);
                node.rect = lower;
                return Some(sibling);
            }
            None
        }
        RNodeKind::Branch(children) => {
            let mut best = 0;
            let mut best_growth = f64::INFINITY;
            for (i, child) in children.iter().enumerate() {
                let growth = child.rect.enlargement(&rect);
                if growth < best_growth {
                    best_growth = growth;
                    best = i;
                }
            }
            if let Some(sibling) = insert_recursive(&mut children[best], rect, id) {
                children.push(sibling);
                if children.len() > MAX_NODE_ENTRIES {
                    let (lower, sibling) = split_branch(children);
                    node.rect = lower;
                    return Some(sibling);
                }
            }
            None
        }
    }
}

/// Pick the dimension with the widest spread of entry centers, sort along
/// it and split in half. `items` keeps the lower half; the upper half comes
/// back as the new sibling, together with the lower half's bounding rect.
fn split_leaf(items: &mut Vec<(Rect, StateId)>) -> (Rect, RNode) {
    let dim = widest_dimension(items.iter().map(|(r, _)| r));
    items.sort_by(|(a, _), (b, _)| {
        center(a, dim)
            .partial_cmp(&center(b, dim))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let upper = items.split_off(items.len() / 2);
    let lower_rect = bounding(items.iter().map(|(r, _)| r));
    let sibling = RNode {
        rect: bounding(upper.iter().map(|(r, _)| r)),
        kind: RNodeKind::Leaf(upper),
    };
    (lower_rect, sibling)
}

fn split_branch(children: &mut Vec<RNode>) -> (Rect, RNode) {
    let dim = widest_dimension(children.iter().map(|c| &c.rect));
    children.sort_by(|a, b| {
        center(&a.rect, dim)
            .partial_cmp(&center(&b.rect, dim))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let upper = children.split_off(children.len() / 2);
    let lower_rect = bounding(children.iter().map(|c| &c.rect));
    let sibling = RNode {
        rect: bounding(upper.iter().map(|c| &c.rect)),
        kind: RNodeKind::Branch(upper),
    };
    (lower_rect, sibling)
}

fn center(rect: &Rect, dim: usize) -> f64 {
    (rect.low[dim] + rect.high[dim]) / 2.0
}

fn widest_dimension<'a>(rects: impl Iterator<Item = &'a Rect> + Clone) -> usize {
    let dims = rects.clone().next().map(|r| r.low.len()).unwrap_or(0);
    let mut best = 0;
    let mut best_spread = f64::NEG_INFINITY;
    for d in 0..dims {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for r in rects.clone() {
            let c = center(r, d);
            lo = lo.min(c);
            hi = hi.max(c);
        }
        if hi - lo > best_spread {
            best_spread = hi - lo;
            best = d;
        }
    }
    best
}

fn bounding<'a>(mut rects: impl Iterator<Item = &'a Rect>) -> Rect {
    let mut rect = rects.next().cloned().unwrap_or(Rect {
        low: Vec::new(),
        high: Vec::new(),
    });
    for r in rects {
        rect.union_in_place(r);
    }
    rect
}

impl<S> StateIndex<S> for RTreeIndex
where
    S: SpatialState,
{
    fn insert(&mut self, id: StateId, state: &S) {
        let coords = state.coords();
        debug_assert_eq!(coords.len(), self.dims);
        self.insert_rect(Rect::point(&coords), id);
    }

    fn box_query(&self, low: &[f64], high: &[f64], out: &mut Vec<StateId>) {
        if let Some(root) = &self.root {
            root.query(low, high, out);
        }
    }
}

/// Hash-bucket index for low-dimensional enumerated states: each state maps
/// to the integer cell of its floored coordinates and box queries walk the
/// covered cells.
#[derive(Debug, Default)]
pub struct EnumeratedIndex {
    cells: HashMap<Vec<i64>, Vec<StateId>>,
}

impl EnumeratedIndex {
    pub fn new() -> Self {
        EnumeratedIndex::default()
    }

    fn visit_cells(
        &self,
        prefix: &mut Vec<i64>,
        low: &[f64],
        high: &[f64],
        out: &mut Vec<StateId>,
    ) {
        let d = prefix.len();
        if d == low.len() {
            if let Some(ids) = self.cells.get(prefix) {
                out.extend_from_slice(ids);
            }
            return;
        }
        let lo = low[d].floor() as i64;
        let hi = high[d].floor() as i64;
        for cell in lo..=hi {
            prefix.push(cell);
            self.visit_cells(prefix, low, high, out);
            prefix.pop();
        }
    }
}

impl<S> StateIndex<S> for EnumeratedIndex
where
    S: SpatialState,
{
    fn insert(&mut self, id: StateId, state: &S) {
        let cell: Vec<i64> = state.coords().iter().map(|c| c.floor() as i64).collect();
        self.cells.entry(cell).or_default().push(id);
    }

    fn box_query(&self, low: &[f64], high: &[f64], out: &mut Vec<StateId>) {
        self.visit_cells(&mut Vec::new(), low, high, out);
    }
}
