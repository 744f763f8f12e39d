//! The mutation registry: the population's frequency tally over every
//! segregating mutation, and the fixation sweep that converts mutations
//! at frequency 1 into [`Substitution`]s (spec §4.4 stage 3, "Remove
//! fixed mutations").

use crate::mutation::{MutationBlock, MutationIndex, MutationType, MutationTypeId, Substitution, SubstitutionList};
use crate::subpopulation::Subpopulation;
use slim_error::{Result, slim_bail};
use std::collections::HashMap;

/// Tracks, for every mutation index currently segregating anywhere in
/// the population, how many (non-null) genome copies carry it.
#[derive(Debug, Default)]
pub struct MutationRegistry {
    counts: HashMap<MutationIndex, u32>,
}

impl MutationRegistry {
    pub fn new() -> Self {
        MutationRegistry::default()
    }

    pub fn count(&self, index: MutationIndex) -> u32 {
        self.counts.get(&index).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Recompute every mutation's frequency count from scratch by
    /// scanning every non-null genome in every subpopulation. Invoked
    /// once per generation; an incremental update is possible but the
    /// spec does not require it and a full retally is the
    /// straightforward, obviously-correct baseline (and is what the
    /// file-format loader's step 10 calls for explicitly).
    pub fn retally(&mut self, subpopulations: &[Subpopulation]) {
        self.counts.clear();
        for subpop in subpopulations {
            for individual in &subpop.parents {
                for genome in individual.genomes() {
                    if genome.is_null {
                        continue;
                    }
                    for run in genome.runs() {
                        for &index in run.indices() {
                            *self.counts.entry(index).or_insert(0) += 1;
                        }
                    }
                }
            }
        }
    }

    /// Cross-check this registry's tally against the mutation block's
    /// own refcounts (spec §8.3): they must agree for every currently
    /// tallied index.
    pub fn check_against_block(&self, block: &MutationBlock) -> Result<()> {
        for (&index, &count) in &self.counts {
            let block_refcount = block.refcount(index);
            if block_refcount != count {
                slim_bail!(
                    Internal:
                    "registry tally {count} for mutation {index} disagrees with block refcount {block_refcount}"
                );
            }
        }
        Ok(())
    }

    /// Sweep every mutation whose tally equals `total_non_null_genomes`:
    /// remove it from every genome that carries it, release it from the
    /// block, and — if its mutation type converts fixations to
    /// substitutions — append a [`Substitution`]. Returns the indices
    /// that were fixed this sweep, so the tree-sequence recorder can
    /// fold the new substitution ids into subsequent derived-state
    /// writes at that position.
    pub fn sweep_fixed(
        &mut self,
        subpopulations: &mut [Subpopulation],
        block: &mut MutationBlock,
        mutation_types: &HashMap<MutationTypeId, MutationType>,
        substitutions: &mut SubstitutionList,
        total_non_null_genomes: u32,
        generation: i64,
    ) -> Result<Vec<MutationIndex>> {
        let fixed: Vec<MutationIndex> = self
            .counts
            .iter()
            .filter(|&(_, &count)| count == total_non_null_genomes && total_non_null_genomes > 0)
            .map(|(&index, _)| index)
            .collect();

        for &index in &fixed {
            for subpop in subpopulations.iter_mut() {
                for individual in subpop.parents.iter_mut() {
                    for genome in individual.genomes_mut() {
                        genome.remove_mutation(index);
                    }
                }
            }

            let mutation = block.get(index).clone();
            let converts = mutation_types
                .get(&mutation.mutation_type)
                .map(|t| t.convert_to_substitution)
                .unwrap_or(true);

            if converts {
                substitutions.push(Substitution::from_fixed_mutation(&mutation, generation));
            }

            block.release(index)?;
            self.counts.remove(&index);
        }

        crate::run::bump_operation_id();

        Ok(fixed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::{Genome, GenomeType};
    use crate::individual::{Individual, PedigreeId, Sex};
    use crate::mutation::mtype::MutationTypeId;

    fn population_with_fixed_mutation() -> (Vec<Subpopulation>, MutationBlock, MutationIndex) {
        let mut block = MutationBlock::new();
        let idx = block.allocate(MutationTypeId(0), 10, 0.1, 0, 0, None);

        let mut subpop = Subpopulation::new(crate::subpopulation::SubpopulationId(0));
        for _ in 0..2 {
            let mut g1 = Genome::new_empty(GenomeType::Autosome, 1, 0);
            let mut g2 = Genome::new_empty(GenomeType::Autosome, 1, 0);
            block.retain(idx);
            g1.add_mutation(&block, 1024, idx);
            block.retain(idx);
            g2.add_mutation(&block, 1024, idx);

            subpop.parents.push(Individual::new(
                PedigreeId(0),
                g1,
                g2,
                Sex::Hermaphrodite,
            ));
        }

        (vec![subpop], block, idx)
    }

    #[test]
    fn retally_counts_every_non_null_copy() {
        let (subpops, _block, idx) = population_with_fixed_mutation();
        let mut registry = MutationRegistry::new();
        registry.retally(&subpops);
        assert_eq!(registry.count(idx), 4);
    }
}
