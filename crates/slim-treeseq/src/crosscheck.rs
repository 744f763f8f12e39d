//! Coalescence testing and the slow cross-check against a variant
//! iterator (spec §4.5, "Coalescence check" / "Cross-check").

use crate::derived_state::decode_derived_state;
use slim_core::genome::Genome;
use slim_core::mutation::{MutationBlock, SubstitutionList};
use slim_error::{Result, slim_bail};
use std::collections::HashSet;
use tskit::TableAccess;

/// Walk every tree in `tree_sequence` and ask, for each root, how many
/// of `tracked` descend from it. The population has coalesced when
/// every tree has exactly one root whose tracked-sample count equals
/// `tracked.len()` — root *count* alone is not the right test, since
/// remembered ancestors keep extra roots around deliberately.
pub fn is_coalesced(tree_sequence: &tskit::TreeSequence, tracked: &HashSet<tskit::NodeId>) -> Result<bool> {
    if tracked.is_empty() {
        return Ok(true);
    }

    let mut trees = tree_sequence
        .tree_iterator(tskit::TreeFlags::SAMPLE_LISTS)
        .map_err(|e| slim_error::slim_err!(Internal: "failed to build tree iterator for coalescence check: {e}"))?;

    while let Some(tree) = trees.next() {
        let tree = tree.map_err(|e| slim_error::slim_err!(Internal: "tree iterator failed: {e}"))?;
        let mut full_roots = 0usize;
        for root in tree.roots() {
            let under_root: HashSet<tskit::NodeId> = tree
                .samples(root)
                .map_err(|e| slim_error::slim_err!(Internal: "failed to enumerate samples under root: {e}"))?
                .collect();
            let tracked_under_root = under_root.iter().filter(|n| tracked.contains(n)).count();
            if tracked_under_root == tracked.len() {
                full_roots += 1;
            } else if tracked_under_root > 0 {
                // A root carrying some but not all tracked samples means
                // this tree has not coalesced yet.
                return Ok(false);
            }
        }
        if full_roots != 1 {
            return Ok(false);
        }
    }
    Ok(true)
}

/// One genome's contribution to the cross-check: its tree-sequence node
/// and the sorted mutation ids it carries, segment by segment flattened
/// into one sorted list (matching [`Genome::sorted_mutation_indices`]'s
/// ordering, mapped to stable mutation ids via `block`).
pub struct CrossCheckGenome<'a> {
    pub node: tskit::NodeId,
    pub genome: &'a Genome,
}

/// Build a tree sequence from `tables` and verify that for every site,
/// every genome's carried mutation-id set (including fixed
/// substitutions at that position) matches the allele the variant
/// iterator reports for that genome's node. This is the "ultimate
/// sanity test" of the recorder (spec §4.5) and is deliberately slow;
/// callers run it periodically, not every generation.
pub fn cross_check(
    tables: &tskit::TableCollection,
    genomes: &[CrossCheckGenome<'_>],
    block: &MutationBlock,
    substitutions: &SubstitutionList,
) -> Result<()> {
    let tree_sequence = tables
        .tree_sequence(tskit::TreeSequenceFlags::BUILD_INDEXES)
        .map_err(|e| slim_error::slim_err!(Internal: "failed to build tree sequence for cross-check: {e}"))?;

    let node_to_genome: std::collections::HashMap<tskit::NodeId, &Genome> =
        genomes.iter().map(|g| (g.node, g.genome)).collect();

    let mut variants = tree_sequence
        .variants()
        .map_err(|e| slim_error::slim_err!(Internal: "failed to build variant iterator for cross-check: {e}"))?;

    while let Some(variant) = variants.next() {
        let variant = variant.map_err(|e| slim_error::slim_err!(Internal: "variant iterator failed: {e}"))?;
        let position = variant.position();
        let samples = variant.samples();
        let genotypes = variant.genotypes();
        let alleles = variant.alleles();

        for (sample_index, &node) in samples.iter().enumerate() {
            let Some(genome) = node_to_genome.get(&node) else { continue };
            let allele_index = genotypes[sample_index];
            let allele_bytes = alleles[allele_index as usize].unwrap_or(&[]);
            let reported_ids: HashSet<u64> = decode_derived_state(allele_bytes).into_iter().collect();

            let carried_ids = genome_mutation_ids_at(genome, block, position as i64);
            let substitution_ids: HashSet<u64> = substitutions
                .at_position(position as i64)
                .iter()
                .map(|s| s.id)
                .collect();
            let expected: HashSet<u64> = carried_ids.union(&substitution_ids).copied().collect();

            if expected != reported_ids {
                slim_bail!(
                    Internal:
                    "cross-check mismatch at position {position}: genome carries {expected:?}, tree sequence reports {reported_ids:?}"
                );
            }
        }
    }
    Ok(())
}

fn genome_mutation_ids_at(genome: &Genome, block: &MutationBlock, position: i64) -> HashSet<u64> {
    genome
        .sorted_mutation_indices()
        .into_iter()
        .filter_map(|index| {
            let mutation = block.get(index);
            (mutation.position == position).then_some(mutation.id)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracked_set_is_trivially_coalesced() {
        let tables = tskit::TableCollection::new(100.0).unwrap();
        let tree_sequence = tables.tree_sequence(tskit::TreeSequenceFlags::BUILD_INDEXES).unwrap();
        assert!(is_coalesced(&tree_sequence, &HashSet::new()).unwrap());
    }
}
