//! [`LoggingHost`]: the default [`ScriptHost`] the CLI wires into the
//! generation cycle driver.
//!
//! Spec §6 treats the scripting-language interpreter as an external
//! collaborator the core only calls through a fixed contract; this
//! workspace doesn't implement one (SPEC_FULL.md explicitly scopes that
//! out), so this host can only run the two fast-path callback shapes
//! `slim-script` recognizes directly (spec §4.3): it applies
//! `Fitness`/`FitnessGlobal` fast-path callbacks to every individual the
//! block's subpop filter selects, multiplying the running fitness value
//! the way the interpreter's `relFitness` binding would see it. Anything
//! else is opaque source that would need a real interpreter; rather than
//! silently dropping it, this host logs once per callback per generation
//! so a user can see which callbacks had no effect.

use slim_core::population::Population;
use slim_error::Result;
use slim_script::block::{CallbackBody, FilterId};
use slim_script::{ScriptBlock, ScriptBlockType};
use tracing::warn;

use slim_engine::cycle::{ScriptHost, Stage};

/// A [`ScriptHost`] that evaluates fast-path callbacks directly and
/// warns about any opaque-source callback it cannot run.
#[derive(Debug, Default)]
pub struct LoggingHost;

impl ScriptHost for LoggingHost {
    fn dispatch(
        &mut self,
        stage: Stage,
        generation: i64,
        blocks: &[&ScriptBlock],
        population: &mut Population,
    ) -> Result<()> {
        for block in blocks {
            match &block.body {
                CallbackBody::FastPath(fast_path) if is_fitness(block.block_type) => {
                    for subpop in &mut population.subpopulations {
                        if !matches_subpop(&block.subpop_filter, subpop.id.0 as i32) {
                            continue;
                        }
                        for individual in subpop.parents.iter_mut().chain(subpop.children.iter_mut()) {
                            let tag_f = individual.tag_float.unwrap_or(0.0);
                            individual.fitness = fast_path.evaluate(tag_f, individual.fitness);
                        }
                    }
                }
                CallbackBody::FastPath(_) => {
                    // Fast-path bodies recognized for non-fitness callback
                    // types (none exist yet; §4.3 only recognizes the two
                    // fitness-callback shapes) fall through unapplied.
                }
                CallbackBody::Source(_) => {
                    warn!(
                        ?stage,
                        generation,
                        block_id = block.id.0,
                        "script block has no interpreter to run its source; skipping"
                    );
                }
            }
        }
        Ok(())
    }
}

fn is_fitness(block_type: ScriptBlockType) -> bool {
    matches!(block_type, ScriptBlockType::Fitness | ScriptBlockType::FitnessGlobal)
}

fn matches_subpop(filter: &FilterId, subpop_id: i32) -> bool {
    match filter {
        FilterId::Any => true,
        FilterId::NullMutationType => false,
        FilterId::Specific(id) => *id == subpop_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::chromosome::GenomeType;
    use slim_core::genome::Genome;
    use slim_core::individual::{Individual, PedigreeId, Sex};
    use slim_core::mutation::{MutationType, MutationTypeId};
    use slim_core::mutation::mtype::{DominanceCoefficient, SelectionCoefficientDistribution, StackingPolicy};
    use slim_core::subpopulation::{Subpopulation, SubpopulationId};
    use slim_script::block::ScriptBlockId;
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

    #[test]
    fn reciprocal_fitness_fast_path_scales_individual_fitness() {
        let mut population = Population::new(catalog());
        let mut subpop = Subpopulation::new(SubpopulationId(0));
        let genome1 = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let genome2 = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let mut individual = Individual::new(PedigreeId(0), genome1, genome2, Sex::Hermaphrodite);
        individual.fitness = 2.0;
        subpop.parents.push(individual);
        population.subpopulations.push(subpop);

        let block = ScriptBlock::new(ScriptBlockId(0), ScriptBlockType::Fitness, 1, 1, "{ return 3.0 / relFitness; }");
        let mut host = LoggingHost;
        host.dispatch(Stage::RecalculateFitness, 1, &[&block], &mut population).unwrap();

        assert_eq!(population.subpopulations[0].parents[0].fitness, 1.5);
    }
}
