use crate::solver::tests::support::{line_config, LineWorld, MoveSource};
use crate::{
    ActionMapping, ChangeFlags, DiscreteObservationPool, DiscretizedActionPool, EntryView,
    EnumeratedIndex, Solver, StatePool,
};

fn indexed_solver(simulations: usize, seed: u64) -> crate::solver::tests::support::LineSolver {
    Solver::with_state_pool(
        LineWorld::new(5, 4),
        DiscretizedActionPool::new(MoveSource { bins: 3 }),
        DiscreteObservationPool::new(),
        StatePool::with_index(Box::new(EnumeratedIndex::new())),
        line_config(simulations, 24),
        seed,
    )
    .expect("solver should build")
}

fn root_entry_summary(
    solver: &crate::solver::tests::support::LineSolver,
) -> Vec<(usize, EntryView)> {
    let root = solver.tree().root();
    solver
        .tree()
        .belief(root)
        .expect("root exists")
        .actions()
        .visited_entries()
        .into_iter()
        .map(|(action, view)| (action.0, view))
        .collect()
}

#[test]
fn empty_change_set_is_a_no_op_on_all_statistics() {
    let mut solver = indexed_solver(120, 31);
    solver.plan().expect("planning should succeed");

    let before = root_entry_summary(&solver);
    let beliefs_before = solver.tree().belief_count();

    let stats = solver.apply_changes_at(1).expect("repair should succeed");
    assert_eq!(stats.retracted_sequences, 0);
    assert_eq!(stats.pruned_beliefs, 0);
    assert_eq!(stats.recomputed_beliefs, 0);

    let after = root_entry_summary(&solver);
    assert_eq!(solver.tree().belief_count(), beliefs_before);
    assert_eq!(before.len(), after.len());
    for ((bin_a, view_a), (bin_b, view_b)) in before.iter().zip(after.iter()) {
        assert_eq!(bin_a, bin_b);
        assert_eq!(view_a.visits, view_b.visits);
        assert_eq!(view_a.total_q.to_bits(), view_b.total_q.to_bits());
        assert_eq!(view_a.mean_q.to_bits(), view_b.mean_q.to_bits());
    }
    solver.check_invariants().expect("invariants hold");
}

#[test]
fn deleting_a_region_retracts_histories_and_keeps_invariants() {
    let mut solver = indexed_solver(300, 41);
    solver.plan().expect("planning should succeed");

    // Flag the middle cell; plenty of histories step through it.
    solver
        .state_pool_mut()
        .flag_box(&[2.0], &[2.0], ChangeFlags::DELETED);
    let stats = solver.repair().expect("repair should succeed");
    assert!(stats.retracted_sequences > 0);

    // No live particle may reference the deleted state, and the repaired
    // statistics must be internally consistent again.
    solver.check_invariants().expect("invariants hold after repair");

    // The session keeps planning; new simulations may wander back into the
    // deleted cell, which is the model's concern, not the repair's.
    solver.plan().expect("planning still works");
    solver.check_invariants().expect("invariants hold");
}

#[test]
fn observation_flags_mark_beliefs_dirty_and_recompute_them() {
    let mut solver = indexed_solver(200, 43);
    solver.plan().expect("planning should succeed");

    solver
        .state_pool_mut()
        .flag_box(&[1.0], &[1.0], ChangeFlags::OBSERVATION_BEFORE);
    let stats = solver.repair().expect("repair should succeed");
    assert_eq!(stats.retracted_sequences, 0);
    assert!(stats.recomputed_beliefs > 0);
    solver.check_invariants().expect("recomputation preserves invariants");
}

#[test]
fn rtree_and_bucket_indexes_answer_box_queries() {
    use crate::solver::tests::support::Cell;
    use crate::{RTreeIndex, StateId, StateIndex};

    let mut rtree = RTreeIndex::new(1);
    let mut bucket = EnumeratedIndex::new();
    for i in 0..64i64 {
        let state = Cell(i);
        <RTreeIndex as StateIndex<Cell>>::insert(&mut rtree, StateId::from(i as usize), &state);
        <EnumeratedIndex as StateIndex<Cell>>::insert(&mut bucket, StateId::from(i as usize), &state);
    }

    let mut hits = Vec::new();
    <RTreeIndex as StateIndex<Cell>>::box_query(&rtree, &[10.0], &[20.0], &mut hits);
    let mut ids: Vec<usize> = hits.iter().map(|id| id.index()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (10..=20).collect::<Vec<usize>>());

    hits.clear();
    <EnumeratedIndex as StateIndex<Cell>>::box_query(&bucket, &[10.0], &[20.0], &mut hits);
    let mut ids: Vec<usize> = hits.iter().map(|id| id.index()).collect();
    ids.sort_unstable();
    assert_eq!(ids, (10..=20).collect::<Vec<usize>>());
}
