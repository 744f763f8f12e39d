//! Scenario B (spec §8): a child genome rejected by a `modifyChild`
//! callback must leave tree-sequence state exactly as it was before
//! recording began — not just node/edge counts, but its mutation row
//! and dedup cache entry too, so a later mutation at the same position
//! doesn't silently reuse a truncated site.

use slim_core::genome::{Genome, GenomeType};
use slim_core::mutation::mtype::MutationTypeId;
use slim_core::subpopulation::SubpopulationId;
use slim_treeseq::{MutationEntry, MutationRecord, MutationRowMetadata, Recorder};
use tskit::TableAccess;

fn entry(id: u64, generation: i64) -> MutationRowMetadata {
    MutationRowMetadata {
        entries: vec![MutationEntry {
            id,
            mutation_type: MutationTypeId(0),
            selection_coefficient: -0.02,
            origin_subpop: 0,
            origin_generation: generation,
            nucleotide: None,
        }],
    }
}

#[test]
fn rejected_child_leaves_no_trace_in_any_table() {
    let mut recorder = Recorder::new(1000.0).unwrap();
    let mut parent_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
    let parent = recorder
        .record_node(&mut parent_genome, 0.0, SubpopulationId(0), tskit::IndividualId::NULL)
        .unwrap();

    // Record one accepted child first, so the rejected child below isn't
    // the only row in every table.
    let mut accepted_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
    let accepted = recorder
        .record_node(&mut accepted_genome, 1.0, SubpopulationId(0), tskit::IndividualId::NULL)
        .unwrap();
    recorder.record_edge(0.0, 1000.0, parent, accepted).unwrap();

    let snapshot = recorder.snapshot_before_child();

    let mut rejected_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
    let rejected = recorder
        .record_node(&mut rejected_genome, 1.0, SubpopulationId(0), tskit::IndividualId::NULL)
        .unwrap();
    recorder.record_edge(0.0, 1000.0, parent, rejected).unwrap();
    let record = MutationRecord { position: 500.0, node: rejected, derived_state_ids: vec![7] };
    recorder.record_mutation(&record, &entry(7, 1), tskit::MutationId::NULL, 1.0).unwrap();

    assert_eq!(recorder.tables.nodes().num_rows().as_usize(), 3);
    assert_eq!(recorder.tables.edges().num_rows().as_usize(), 2);
    assert_eq!(recorder.tables.sites().num_rows().as_usize(), 1);
    assert_eq!(recorder.tables.mutations().num_rows().as_usize(), 1);

    recorder.rollback_child(&snapshot).unwrap();

    assert_eq!(recorder.tables.nodes().num_rows().as_usize(), 2, "rejected child's node must be gone");
    assert_eq!(recorder.tables.edges().num_rows().as_usize(), 1, "rejected child's edge must be gone");
    assert_eq!(recorder.tables.sites().num_rows().as_usize(), 0, "rejected child's site must be gone");
    assert_eq!(recorder.tables.mutations().num_rows().as_usize(), 0, "rejected child's mutation must be gone");

    // A later mutation at the same position must create a fresh site
    // rather than resolving against a dangling cache entry for the
    // truncated one.
    let mut later_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
    let later_node = recorder
        .record_node(&mut later_genome, 2.0, SubpopulationId(0), tskit::IndividualId::NULL)
        .unwrap();
    let later_record = MutationRecord { position: 500.0, node: later_node, derived_state_ids: vec![9] };
    recorder.record_mutation(&later_record, &entry(9, 2), tskit::MutationId::NULL, 2.0).unwrap();

    assert_eq!(recorder.tables.sites().num_rows().as_usize(), 1);
    assert_eq!(recorder.tables.mutations().num_rows().as_usize(), 1);
}
