//! [`Simulator`]: the top-level [`Engine`] that ties a [`Population`], a
//! [`slim_script::ScriptBlockRegistry`], the [`GenerationCycle`] driver,
//! and (optionally) the [`Experimenter`] together into one
//! epoch-per-generation loop.

use crate::cycle::{CycleReport, GenerationCycle, ScriptHost};
use crate::engine::Engine;
use crate::experimenter::Experimenter;
use slim_core::chromosome::Chromosome;
use slim_core::lineage::LineageRecorder;
use slim_core::population::Population;
use slim_core::run::{JoinCache, SplitCache, join_runs, split_run};
use slim_error::Result;
use slim_script::ScriptBlockRegistry;
use tracing::info;

/// One completed generation, as reported by [`Simulator::next`].
#[derive(Debug, Clone)]
pub struct SimulatorEpoch {
    pub generation: i64,
    pub report: CycleReport,
    /// `Some(new_count)` if the experimenter concluded an experiment
    /// this generation and the chromosome's `mutrun_count` changed as a
    /// result.
    pub mutrun_count_changed: Option<u32>,
}

pub struct Simulator<H: ScriptHost> {
    pub population: Population,
    pub registry: ScriptBlockRegistry,
    pub chromosome: Chromosome,
    cycle: GenerationCycle<H>,
    experimenter: Option<Experimenter>,
}

impl<H: ScriptHost> Simulator<H> {
    pub fn new(
        population: Population,
        registry: ScriptBlockRegistry,
        chromosome: Chromosome,
        model_type: slim_core::config::ModelType,
        sex_enabled: bool,
        host: H,
        experimenter: Option<Experimenter>,
    ) -> Self {
        Simulator {
            population,
            registry,
            chromosome,
            cycle: GenerationCycle::new(model_type, sex_enabled, host),
            experimenter,
        }
    }

    pub fn host_mut(&mut self) -> &mut H {
        self.cycle.host_mut()
    }

    pub fn experimenter(&self) -> Option<&Experimenter> {
        self.experimenter.as_ref()
    }

    /// Advance one generation the same way [`Engine::next`] does, but
    /// additionally reporting every genome/edge/mutation this
    /// generation's default mating scheme creates to `lineage` — the
    /// hook a caller that owns a tree-sequence recorder drives (spec
    /// §4.5/§4.6). [`Engine::next`] is equivalent to calling this with
    /// `None`.
    pub fn next_with_lineage(&mut self, lineage: Option<&mut dyn LineageRecorder>) -> Result<SimulatorEpoch> {
        self.advance_epoch(lineage)
    }

    fn advance_epoch(&mut self, lineage: Option<&mut dyn LineageRecorder>) -> Result<SimulatorEpoch> {
        let report = self.cycle.advance(&mut self.population, &mut self.registry, &self.chromosome, lineage)?;

        let mutrun_count_changed = if let Some(experimenter) = &mut self.experimenter {
            match experimenter.record_generation_time(report.elapsed) {
                Some(new_count) => {
                    info!(generation = report.generation, new_count, "experimenter changing mutrun_count");
                    self.resegment(new_count)?;
                    Some(new_count)
                }
                None => None,
            }
        } else {
            None
        };

        Ok(SimulatorEpoch {
            generation: report.generation,
            report,
            mutrun_count_changed,
        })
    }

    /// Resegment every genome in the population to `new_mutrun_count`. The
    /// experimenter only ever requests a power-of-two multiple or divisor
    /// of the chromosome's current count (spec §4.2: each step doubles or
    /// halves, and a direction reversal can skip straight past the
    /// baseline it's reversing from, two steps at once) — this walks that
    /// gap with one split or join pass per power-of-two step. Equal-
    /// content runs across genomes are hash-consed within each pass via
    /// [`SplitCache`]/[`JoinCache`], preserving (and often increasing)
    /// sharing, per spec §8's split-join-identity invariant.
    fn resegment(&mut self, new_mutrun_count: u32) -> Result<()> {
        let mut count = self.chromosome.mutrun_count();
        if new_mutrun_count == count {
            return Ok(());
        }

        if new_mutrun_count > count {
            if new_mutrun_count % count != 0 || !(new_mutrun_count / count).is_power_of_two() {
                slim_error::slim_bail!(
                    Internal:
                    "experimenter requested an unsupported mutrun_count transition: {count} -> {new_mutrun_count}"
                );
            }
            while count < new_mutrun_count {
                self.split_all(count)?;
                count *= 2;
            }
        } else {
            if count % new_mutrun_count != 0 || !(count / new_mutrun_count).is_power_of_two() {
                slim_error::slim_bail!(
                    Internal:
                    "experimenter requested an unsupported mutrun_count transition: {count} -> {new_mutrun_count}"
                );
            }
            while count > new_mutrun_count {
                count /= 2;
                self.join_all(count)?;
            }
        }

        self.chromosome.set_mutrun_count(new_mutrun_count)?;
        Ok(())
    }

    fn split_all(&mut self, old_count: u32) -> Result<()> {
        let old_segment_length = self.chromosome.length / old_count as i64;
        let mut cache = SplitCache::new();
        for subpop in &mut self.population.subpopulations {
            for individual in subpop.parents.iter_mut().chain(subpop.children.iter_mut()) {
                for genome in individual.genomes_mut() {
                    let mut new_runs = Vec::with_capacity(genome.runs().len() * 2);
                    for (segment, run) in genome.runs().to_vec().into_iter().enumerate() {
                        let split_position = (segment as i64) * old_segment_length + old_segment_length / 2;
                        let (low, high) = split_run(&run, &self.population.mutation_block, split_position, &mut cache);
                        new_runs.push(low);
                        new_runs.push(high);
                    }
                    genome.replace_runs(new_runs);
                }
            }
        }
        Ok(())
    }

    fn join_all(&mut self, new_count: u32) -> Result<()> {
        let mut cache = JoinCache::new();
        for subpop in &mut self.population.subpopulations {
            for individual in subpop.parents.iter_mut().chain(subpop.children.iter_mut()) {
                for genome in individual.genomes_mut() {
                    let old_runs = genome.runs().to_vec();
                    let mut new_runs = Vec::with_capacity(new_count as usize);
                    for pair in old_runs.chunks(2) {
                        new_runs.push(join_runs(&pair[0], &pair[1], &mut cache));
                    }
                    genome.replace_runs(new_runs);
                }
            }
        }
        Ok(())
    }
}

impl<H: ScriptHost> Engine for Simulator<H> {
    type Epoch = SimulatorEpoch;

    fn next(&mut self) -> Result<Self::Epoch> {
        self.advance_epoch(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::Stage;
    use crate::engine::EngineExt;
    use crate::experimenter::Experimenter;
    use slim_core::chromosome::{RateMap, SexSpecificMap};
    use slim_core::config::ModelType;
    use slim_core::mutation::mtype::{DominanceCoefficient, MutationType, MutationTypeId, SelectionCoefficientDistribution, StackingPolicy};
    use slim_core::subpopulation::SubpopulationId;
    use std::collections::HashMap;

    struct NullHost;
    impl ScriptHost for NullHost {
        fn dispatch(
            &mut self,
            _stage: Stage,
            _generation: i64,
            _blocks: &[&slim_script::ScriptBlock],
            _population: &mut Population,
        ) -> Result<()> {
            Ok(())
        }
    }

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

    #[test]
    fn simulator_runs_to_generation_limit() {
        let mut population = Population::new(catalog());
        population.add_subpopulation(SubpopulationId(0), 10, &chromosome(8), false).unwrap();

        let mut simulator = Simulator::new(
            population,
            ScriptBlockRegistry::new(),
            chromosome(8),
            ModelType::WrightFisher,
            false,
            NullHost,
            None,
        );

        let final_epoch = simulator.run(|epoch| epoch.generation >= 3);
        assert_eq!(final_epoch.generation, 3);
    }

    #[test]
    fn resegment_split_doubles_run_count_per_genome() {
        let mut population = Population::new(catalog());
        population.add_subpopulation(SubpopulationId(0), 1, &chromosome(4), false).unwrap();

        let mut simulator = Simulator::new(
            population,
            ScriptBlockRegistry::new(),
            chromosome(4),
            ModelType::WrightFisher,
            false,
            NullHost,
            Some(Experimenter::new(4, 1024)),
        );

        simulator.resegment(8).unwrap();
        assert_eq!(simulator.chromosome.mutrun_count(), 8);
        let individual = &simulator.population.subpopulations[0].parents[0];
        assert_eq!(individual.genome1.mutrun_count(), 8);
    }
}
