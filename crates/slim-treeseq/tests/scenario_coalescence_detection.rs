//! Scenario D (spec §8): a single tree whose root carries every tracked
//! lineage has coalesced; two disjoint ancestries, each carrying only
//! some of the tracked samples, have not.

use slim_core::genome::{Genome, GenomeType};
use slim_core::subpopulation::SubpopulationId;
use slim_treeseq::{Recorder, is_coalesced};
use std::collections::HashSet;

fn build_tree_sequence(recorder: &mut Recorder) -> tskit::TreeSequence {
    recorder.tables.full_sort(tskit::TableSortOptions::default()).unwrap();
    recorder.tables.tree_sequence(tskit::TreeSequenceFlags::BUILD_INDEXES).unwrap()
}

fn node(recorder: &mut Recorder, time: f64) -> tskit::NodeId {
    let mut genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
    recorder.record_node(&mut genome, time, SubpopulationId(0), tskit::IndividualId::NULL).unwrap()
}

#[test]
fn single_common_ancestor_is_coalesced() {
    let mut recorder = Recorder::new(1000.0).unwrap();
    let ancestor = node(&mut recorder, 2.0);
    let b = node(&mut recorder, 1.0);
    let c = node(&mut recorder, 1.0);
    recorder.record_edge(0.0, 1000.0, ancestor, b).unwrap();
    recorder.record_edge(0.0, 1000.0, ancestor, c).unwrap();

    let tree_sequence = build_tree_sequence(&mut recorder);
    let tracked: HashSet<_> = [b, c].into_iter().collect();
    assert!(is_coalesced(&tree_sequence, &tracked).unwrap());
}

#[test]
fn two_disjoint_ancestries_have_not_coalesced() {
    let mut recorder = Recorder::new(1000.0).unwrap();
    let first_ancestor = node(&mut recorder, 2.0);
    let second_ancestor = node(&mut recorder, 2.0);
    let first_child = node(&mut recorder, 1.0);
    let second_child = node(&mut recorder, 1.0);
    recorder.record_edge(0.0, 1000.0, first_ancestor, first_child).unwrap();
    recorder.record_edge(0.0, 1000.0, second_ancestor, second_child).unwrap();

    let tree_sequence = build_tree_sequence(&mut recorder);
    let tracked: HashSet<_> = [first_child, second_child].into_iter().collect();
    assert!(!is_coalesced(&tree_sequence, &tracked).unwrap());
}

#[test]
fn empty_tracked_set_is_trivially_coalesced_on_a_real_tree() {
    let mut recorder = Recorder::new(1000.0).unwrap();
    let ancestor = node(&mut recorder, 2.0);
    let child = node(&mut recorder, 1.0);
    recorder.record_edge(0.0, 1000.0, ancestor, child).unwrap();

    let tree_sequence = build_tree_sequence(&mut recorder);
    assert!(is_coalesced(&tree_sequence, &HashSet::new()).unwrap());
}
