//! Scenario C (spec §8): drive a mutation to frequency 1 across every
//! non-null genome, sweep the registry, and check that it is gone from
//! every run, present exactly once in the substitution list keyed by
//! its position, and that the next mutation recorded at that position
//! would see it.

use slim_core::individual::Sex;
use slim_core::mutation::mtype::{
    DominanceCoefficient, MutationType, MutationTypeId, SelectionCoefficientDistribution, StackingPolicy,
};
use slim_core::population::Population;
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

use slim_core::chromosome::{Chromosome, RateMap, SexSpecificMap};

fn chromosome() -> Chromosome {
    let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
    let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
    Chromosome::new(1024, recomb, mutr, 2).unwrap()
}

#[test]
fn fixed_mutation_becomes_a_substitution_and_leaves_every_run() {
    let mut population = Population::new(catalog());
    let chromosome = chromosome();
    population
        .add_subpopulation(SubpopulationId(0), 20, &chromosome, false)
        .unwrap();
    assert_eq!(population.subpopulation(SubpopulationId(0)).unwrap().parents[0].sex, Sex::Hermaphrodite);

    let position = 200;
    let index = population
        .mutation_block
        .allocate(MutationTypeId(0), position, 0.2, 0, 1, None);

    // Drive it to frequency 1 across every non-null genome.
    for individual in &mut population.subpopulations[0].parents {
        for genome in individual.genomes_mut() {
            population.mutation_block.retain(index);
            genome.add_mutation(&population.mutation_block, chromosome.mutrun_length(), index);
        }
    }
    population.retally();
    let total = population.total_non_null_genomes();
    assert_eq!(population.registry.count(index), total);

    let fixed = population.sweep_fixed_mutations().unwrap();
    assert_eq!(fixed, vec![index]);

    // Gone from every genome's runs.
    for individual in &population.subpopulations[0].parents {
        for genome in individual.genomes() {
            assert!(!genome.sorted_mutation_indices().contains(&index));
        }
    }

    // Present exactly once in the substitution list, keyed by position.
    let substitutions = population.substitutions.at_position(position);
    assert_eq!(substitutions.len(), 1);
    assert_eq!(substitutions[0].position, position);

    // The fixed index is released back to the block; a later mutation
    // recorded at the same position would see the substitution's id
    // (not the original mutation's index, which no longer resolves)
    // when a tree-sequence recorder concatenates derived state there —
    // `SubstitutionList::at_position` is exactly the lookup it uses.
    assert!(population.substitutions.contains_id(position, substitutions[0].id));
}
