//! [`Population`]: the set of subpopulations, the substitution list, and
//! the mutation registry, plus the process-... instance-wide allocators
//! (mutation block, pedigree id counter, mutation-run pool) that every
//! subpopulation's individuals ultimately draw from (spec §3,
//! "Population").
//!
//! This is the top of the data-model ownership tree described in §3's
//! "Ownership summary": the population owns subpopulations, the
//! mutation registry, and the substitution list, while the simulator
//! (built on top, in `slim-engine`) additionally owns the chromosome,
//! script blocks, and tree-sequence tables.

use crate::chromosome::Chromosome;
use crate::genome::{Genome, GenomeType};
use crate::individual::{Individual, PedigreeIdAllocator, Sex};
use crate::mutation::{MutationBlock, MutationType, MutationTypeId, SubstitutionList};
use crate::registry::MutationRegistry;
use crate::run::RunPool;
use crate::subpopulation::{Subpopulation, SubpopulationId};
use slim_error::{Result, slim_bail};
use std::collections::HashMap;

/// The population's mutable state, owned exclusively by the simulator
/// that drives the generation cycle.
#[derive(Debug)]
pub struct Population {
    pub subpopulations: Vec<Subpopulation>,
    pub mutation_block: MutationBlock,
    pub mutation_types: HashMap<MutationTypeId, MutationType>,
    pub registry: MutationRegistry,
    pub substitutions: SubstitutionList,
    pub run_pool: RunPool,
    pub pedigree_ids: PedigreeIdAllocator,
    pub generation: i64,
}

impl Population {
    pub fn new(mutation_types: HashMap<MutationTypeId, MutationType>) -> Self {
        Population {
            subpopulations: Vec::new(),
            mutation_block: MutationBlock::new(),
            mutation_types,
            registry: MutationRegistry::new(),
            substitutions: SubstitutionList::new(),
            run_pool: RunPool::new(),
            pedigree_ids: PedigreeIdAllocator::new(),
            generation: 1,
        }
    }

    pub fn subpopulation(&self, id: SubpopulationId) -> Option<&Subpopulation> {
        self.subpopulations.iter().find(|s| s.id == id)
    }

    pub fn subpopulation_mut(&mut self, id: SubpopulationId) -> Option<&mut Subpopulation> {
        self.subpopulations.iter_mut().find(|s| s.id == id)
    }

    /// Add a new, empty subpopulation of `size` hermaphroditic (or, if
    /// `sex_enabled`, sex-ratio-split) individuals with freshly allocated
    /// null-free genomes. This is the "create subpopulation" primitive
    /// that both a WF `initialize()`-equivalent config step and the
    /// file-format reconstruction pipeline (spec §4.6 step 4) call.
    pub fn add_subpopulation(
        &mut self,
        id: SubpopulationId,
        size: usize,
        chromosome: &Chromosome,
        sex_enabled: bool,
    ) -> Result<()> {
        if self.subpopulation(id).is_some() {
            slim_bail!(Configuration: "subpopulation {:?} already exists", id);
        }

        let mut subpop = Subpopulation::new(id);
        for i in 0..size {
            let sex = if sex_enabled {
                if i % 2 == 0 { Sex::Female } else { Sex::Male }
            } else {
                Sex::Hermaphrodite
            };
            let genome_type_2 = match sex {
                Sex::Male => GenomeType::YChromosome,
                _ => GenomeType::Autosome,
            };
            let pedigree_id = self.pedigree_ids.next();
            let g1 = Genome::new_empty(GenomeType::Autosome, chromosome.mutrun_count(), id.0);
            let is_null_2 = matches!(sex, Sex::Male);
            let g2 = if is_null_2 {
                Genome::new_null(genome_type_2, chromosome.mutrun_count(), id.0)
            } else {
                Genome::new_empty(genome_type_2, chromosome.mutrun_count(), id.0)
            };
            subpop.parents.push(Individual::new(pedigree_id, g1, g2, sex));
        }

        self.subpopulations.push(subpop);
        Ok(())
    }

    pub fn total_non_null_genomes(&self) -> u32 {
        self.subpopulations
            .iter()
            .flat_map(|s| s.parents.iter())
            .flat_map(|i| i.genomes())
            .filter(|g| !g.is_null)
            .count() as u32
    }

    pub fn next_pedigree_id(&self) -> crate::individual::PedigreeId {
        self.pedigree_ids.next()
    }

    /// Recompute the mutation registry's tally from the current parental
    /// generation (spec §4.4 stage 3, and §4.6 reconstruction step 10's
    /// "retally mutation reference counts").
    pub fn retally(&mut self) {
        self.registry.retally(&self.subpopulations);
    }

    /// Sweep every mutation now fixed across the whole population,
    /// converting eligible ones to substitutions (spec §4.4 stage 3,
    /// Concrete Scenario C).
    pub fn sweep_fixed_mutations(&mut self) -> Result<Vec<crate::mutation::MutationIndex>> {
        let total = self.total_non_null_genomes();
        self.registry.sweep_fixed(
            &mut self.subpopulations,
            &mut self.mutation_block,
            &self.mutation_types,
            &mut self.substitutions,
            total,
            self.generation,
        )
    }

    /// Check every cross-cutting invariant from spec §8 that this crate
    /// alone is responsible for (1, 3, 4): mutation-segment placement,
    /// registry/block refcount agreement, and the null-genome invariant.
    /// The COW-not-mutated-while-shared invariant (2) and the
    /// tree-sequence invariants (5, 6, 7) are enforced by `slim-engine`
    /// and `slim-treeseq` respectively, which hold the state needed to
    /// check them.
    pub fn check_invariants(&self, chromosome: &Chromosome) -> Result<()> {
        self.mutation_block.check_invariants()?;
        self.registry.check_against_block(&self.mutation_block)?;

        for subpop in &self.subpopulations {
            for individual in &subpop.parents {
                for genome in individual.genomes() {
                    genome.check_null_invariant()?;
                    for (segment, run) in genome.runs().iter().enumerate() {
                        run.check_segment_invariant(
                            &self.mutation_block,
                            chromosome.mutrun_length(),
                            segment,
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}
