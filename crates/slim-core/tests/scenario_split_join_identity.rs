//! Scenario A (spec §8): a subpopulation of 100 diploids carrying 10
//! mutations, `mutrun_count = 2`. Splitting twice and then joining twice
//! must leave every genome's mutation set unchanged, and hash-consing
//! after the joins must never decrease the amount of sharing already
//! present.

use slim_core::chromosome::{Chromosome, RateMap, SexSpecificMap};
use slim_core::mutation::mtype::{
    DominanceCoefficient, MutationType, MutationTypeId, SelectionCoefficientDistribution, StackingPolicy,
};
use slim_core::population::Population;
use slim_core::run::{distinct_allocation_count, hash_cons_unique, join_runs, split_run, JoinCache, SplitCache};
use slim_core::subpopulation::SubpopulationId;
use std::collections::HashMap;

fn catalog() -> HashMap<MutationTypeId, MutationType> {
    let mut types = HashMap::new();
    types.insert(
        MutationTypeId(0),
        MutationType {
            id: MutationTypeId(0),
            dominance: DominanceCoefficient::Fixed(0.5),
            distribution: SelectionCoefficientDistribution::Fixed(0.0),
            stacking_group: 0,
            stacking_policy: StackingPolicy::KeepAll,
            convert_to_substitution: true,
        },
    );
    types
}

fn chromosome(mutrun_count: u32) -> Chromosome {
    let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
    let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
    Chromosome::new(1024, recomb, mutr, mutrun_count).unwrap()
}

/// Split every genome's run array in two at the midpoint of each of its
/// current segments, hash-consing across genomes within this one pass.
fn split_all(population: &mut Population, old_segment_length: i64) {
    let mut cache = SplitCache::new();
    for subpop in &mut population.subpopulations {
        for individual in subpop.parents.iter_mut() {
            for genome in individual.genomes_mut() {
                let mut new_runs = Vec::with_capacity(genome.runs().len() * 2);
                for (segment, run) in genome.runs().to_vec().into_iter().enumerate() {
                    let split_position = (segment as i64) * old_segment_length + old_segment_length / 2;
                    let (low, high) = split_run(&run, &population.mutation_block, split_position, &mut cache);
                    new_runs.push(low);
                    new_runs.push(high);
                }
                genome.replace_runs(new_runs);
            }
        }
    }
}

/// Join every genome's run array pairwise back together, hash-consing
/// across genomes within this one pass.
fn join_all(population: &mut Population) {
    let mut cache = JoinCache::new();
    for subpop in &mut population.subpopulations {
        for individual in subpop.parents.iter_mut() {
            for genome in individual.genomes_mut() {
                let old_runs = genome.runs().to_vec();
                let mut new_runs = Vec::with_capacity(old_runs.len() / 2);
                for pair in old_runs.chunks(2) {
                    new_runs.push(join_runs(&pair[0], &pair[1], &mut cache));
                }
                genome.replace_runs(new_runs);
            }
        }
    }
}

fn all_mutation_sets(population: &Population) -> Vec<Vec<slim_core::MutationIndex>> {
    population
        .subpopulations
        .iter()
        .flat_map(|s| s.parents.iter())
        .flat_map(|i| i.genomes())
        .map(|g| g.sorted_mutation_indices())
        .collect()
}

#[test]
fn split_twice_then_join_twice_preserves_every_genome_and_increases_sharing() {
    let mut population = Population::new(catalog());
    let chromosome = chromosome(2);
    population
        .add_subpopulation(SubpopulationId(0), 100, &chromosome, false)
        .unwrap();

    // Scatter 10 mutations at distinct positions across the chromosome,
    // each carried by a handful of genomes so the runs actually share
    // backing allocations the way a real population's would.
    let positions = [10, 100, 300, 500, 520, 600, 700, 800, 900, 1000];
    for (i, &position) in positions.iter().enumerate() {
        for subpop in &mut population.subpopulations {
            for individual in subpop.parents.iter_mut().skip(i * 5).take(5) {
                for genome in individual.genomes_mut() {
                    let index = population
                        .mutation_block
                        .allocate(MutationTypeId(0), position, 0.1, 0, 1, None);
                    population.mutation_block.retain(index);
                    genome.add_mutation(&population.mutation_block, chromosome.mutrun_length(), index);
                }
            }
        }
    }
    population.retally();

    let before = all_mutation_sets(&population);

    // Split mutrun_count 2 -> 4 -> 8.
    let mut segment_length = chromosome.mutrun_length();
    for _ in 0..2 {
        split_all(&mut population, segment_length);
        segment_length /= 2;
    }

    // Join mutrun_count 8 -> 4 -> 2.
    for _ in 0..2 {
        join_all(&mut population);
    }

    let after = all_mutation_sets(&population);
    assert_eq!(before, after, "split-then-join must preserve every genome's mutation set");

    // Hash-consing after the joins can only increase (or hold steady)
    // the amount of sharing relative to the raw, un-consed allocation
    // count: it must never decrease it.
    let mut all_runs: Vec<_> = population
        .subpopulations
        .iter_mut()
        .flat_map(|s| s.parents.iter_mut())
        .flat_map(|i| i.genomes_mut())
        .flat_map(|g| g.runs_mut().to_vec())
        .collect();
    let before_cons = distinct_allocation_count(&all_runs);
    hash_cons_unique(&mut all_runs);
    let after_cons = distinct_allocation_count(&all_runs);
    assert!(after_cons <= before_cons, "hash-consing must not increase distinct allocations");
}
