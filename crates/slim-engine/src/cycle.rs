//! The Generation Cycle Driver (spec §4.4): the ordered, observable stage
//! sequence for Wright-Fisher and non-Wright-Fisher models, dispatching
//! user callbacks at the right stage and sweeping deferred
//! deregistrations between stages.
//!
//! The scripting language itself is an external collaborator (spec §6):
//! this driver only decides *which* callbacks are live at each stage
//! (via [`slim_script::ScriptBlockRegistry::matching`]) and hands them to
//! a [`ScriptHost`] the caller supplies to actually run them. Everything
//! the driver itself performs directly — generation swap, fixed-mutation
//! sweep, periodic hash-consing, experimenter sampling, tree-seq
//! bookkeeping hooks — is the part of the cycle that has no scripting
//! hook at all.

use slim_core::chromosome::Chromosome;
use slim_core::config::ModelType;
use slim_core::lineage::LineageRecorder;
use slim_core::population::Population;
use slim_core::reproduction::generate_wf_offspring;
use slim_core::run::hash_cons_unique;
use slim_error::Result;
use slim_script::{FilterId, ScriptBlockRegistry, ScriptBlockType};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Every fixed ten-thousandth... no: every 100th generation a
/// mutation-run uniqueness pass runs (spec §4.4 WF stage 3 / nonWF
/// stage 5).
pub const UNIQUENESS_PASS_INTERVAL: i64 = 100;

/// The observable stage within one generation's cycle, used for logging
/// and for the debug-build cross-check gate (spec §4.4, "A debug build
/// may cross-check individual/genome integrity between every stage").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    EarlyEvents,
    GenerateOffspring,
    RemoveFixedMutations,
    SwapGenerations,
    LateEvents,
    RecalculateFitness,
    ViabilitySelection,
    AdvanceCounter,
}

/// Implemented by whatever owns the external interpreter: given the set
/// of callbacks the driver has decided apply at this stage, actually run
/// them (or evaluate their fast path) and report back anything the
/// driver needs to continue (e.g. whether a `Recombination` callback
/// signalled "I changed the intervals myself").
pub trait ScriptHost {
    /// Run every block in `blocks`, in order, at `stage`, with mutable
    /// access to `population` so that, e.g., a `Reproduction` callback
    /// can actually append offspring, or a `Recombination` callback can
    /// override the breakpoints the core would otherwise choose. Fast-path
    /// blocks (`CallbackBody::FastPath`) may be evaluated directly by
    /// the host without involving the interpreter at all.
    fn dispatch(
        &mut self,
        stage: Stage,
        generation: i64,
        blocks: &[&slim_script::ScriptBlock],
        population: &mut Population,
    ) -> Result<()>;
}

/// One completed generation's report, returned as the [`Engine`]
/// epoch.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub generation: i64,
    pub stages_run: Vec<Stage>,
    pub mutations_fixed: usize,
    pub uniqueness_pass_ran: bool,
    pub elapsed: Duration,
}

/// Drives the generation cycle for one [`Population`] against one
/// [`ScriptBlockRegistry`], dispatching through a caller-supplied
/// [`ScriptHost`].
pub struct GenerationCycle<H: ScriptHost> {
    model_type: ModelType,
    sex_enabled: bool,
    host: H,
}

impl<H: ScriptHost> GenerationCycle<H> {
    pub fn new(model_type: ModelType, sex_enabled: bool, host: H) -> Self {
        GenerationCycle { model_type, sex_enabled, host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Advance `population` and `registry` through one full generation
    /// cycle, returning the report the caller (typically
    /// [`crate::engine::EngineExt::run`]) uses to decide whether to
    /// continue.
    pub fn advance(
        &mut self,
        population: &mut Population,
        registry: &mut ScriptBlockRegistry,
        chromosome: &Chromosome,
        mut lineage: Option<&mut dyn LineageRecorder>,
    ) -> Result<CycleReport> {
        let start = Instant::now();
        let generation = population.generation;
        let report = match self.model_type {
            ModelType::WrightFisher => {
                self.advance_wf(population, registry, chromosome, lineage.as_deref_mut(), generation)?
            }
            ModelType::NonWrightFisher => {
                self.advance_nonwf(population, registry, chromosome, lineage.as_deref_mut(), generation)?
            }
        };
        population.generation += 1;

        Ok(CycleReport {
            elapsed: start.elapsed(),
            ..report
        })
    }

    fn dispatch_stage(
        &mut self,
        population: &mut Population,
        registry: &mut ScriptBlockRegistry,
        stage: Stage,
        block_type: ScriptBlockType,
        generation: i64,
    ) -> Result<usize> {
        let matched = registry.matching(generation, block_type, None, None, None);
        let count = matched.len();
        if count > 0 {
            self.host.dispatch(stage, generation, &matched, population)?;
        }
        Ok(count)
    }

    /// Dispatch a `Fitness`/`FitnessGlobal` stage, keeping blocks whose
    /// `mutation_type_filter` names a specific mutation type (they only
    /// apply when evaluating that type's per-mutation fitness effect)
    /// separate from every other block (which apply to an individual's
    /// overall fitness) so the two are never handed to the host in one
    /// concatenated dispatch (spec §4.3's NULL/non-NULL partition).
    fn dispatch_fitness_stage(
        &mut self,
        population: &mut Population,
        registry: &mut ScriptBlockRegistry,
        stage: Stage,
        block_type: ScriptBlockType,
        generation: i64,
    ) -> Result<()> {
        let matched = registry.matching(generation, block_type, None, None, None);
        let (specific, overall): (Vec<_>, Vec<_>) = matched
            .into_iter()
            .partition(|block| matches!(block.mutation_type_filter, FilterId::Specific(_)));
        if !overall.is_empty() {
            self.host.dispatch(stage, generation, &overall, population)?;
        }
        if !specific.is_empty() {
            self.host.dispatch(stage, generation, &specific, population)?;
        }
        Ok(())
    }

    fn sweep_between_stages(&self, registry: &mut ScriptBlockRegistry) {
        let removed = registry.sweep_deregistrations();
        if removed > 0 {
            trace!(removed, "swept deregistered script blocks between stages");
        }
    }

    fn cross_check_if_debug(&self, population: &Population, stage: Stage) -> Result<()> {
        if cfg!(debug_assertions) {
            // The chromosome itself isn't owned here (it lives alongside
            // the population in the facade's simulator state); callers
            // that want the full segment-placement check call
            // `Population::check_invariants` themselves with their
            // chromosome. This hook covers what's checkable without it.
            population.registry.check_against_block(&population.mutation_block).map_err(|e| {
                debug!(?stage, "integrity cross-check failed between stages");
                e
            })?;
        }
        Ok(())
    }

    fn run_uniqueness_pass_if_due(&self, population: &mut Population, generation: i64) -> bool {
        if generation % UNIQUENESS_PASS_INTERVAL != 0 {
            return false;
        }
        for subpop in &mut population.subpopulations {
            for individual in subpop.parents.iter_mut().chain(subpop.children.iter_mut()) {
                for genome in individual.genomes_mut() {
                    hash_cons_unique(genome.runs_mut());
                }
            }
        }
        debug!(generation, "ran mutation-run uniqueness pass");
        true
    }

    fn advance_wf(
        &mut self,
        population: &mut Population,
        registry: &mut ScriptBlockRegistry,
        chromosome: &Chromosome,
        mut lineage: Option<&mut dyn LineageRecorder>,
        generation: i64,
    ) -> Result<CycleReport> {
        let mut stages_run = Vec::with_capacity(7);

        // 1. Early events.
        self.dispatch_stage(population, registry, Stage::EarlyEvents, ScriptBlockType::EarlyEvent, generation)?;
        stages_run.push(Stage::EarlyEvents);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::EarlyEvents)?;

        // 2. Generate offspring: resolve the callback set and hand it to
        // the host; the host decides per-subpop whether a fast path (no
        // active callbacks) applies. The generation counter that the
        // tree-sequence recorder tracks is advanced here, once.
        self.dispatch_stage(population, registry, Stage::GenerateOffspring, ScriptBlockType::Reproduction, generation)?;
        self.dispatch_stage(population, registry, Stage::GenerateOffspring, ScriptBlockType::MateChoice, generation)?;
        self.dispatch_stage(population, registry, Stage::GenerateOffspring, ScriptBlockType::ModifyChild, generation)?;
        self.dispatch_stage(population, registry, Stage::GenerateOffspring, ScriptBlockType::Recombination, generation)?;
        self.dispatch_stage(population, registry, Stage::GenerateOffspring, ScriptBlockType::Mutation, generation)?;
        // A subpopulation with no active `Reproduction` callback gets no
        // help from the host above — `children` is still empty. Fall
        // back to the default Wright-Fisher mating scheme for exactly
        // those subpops, matching spec §4.4 stage 2's "the default
        // mating scheme applies wherever the user hasn't overridden it".
        for subpop in &mut population.subpopulations {
            let has_reproduction_callback = !registry
                .matching(generation, ScriptBlockType::Reproduction, None, None, Some(subpop.id.0 as i32))
                .is_empty();
            if has_reproduction_callback {
                continue;
            }
            let target_size = subpop.parents.len();
            generate_wf_offspring(
                subpop,
                target_size,
                chromosome,
                &mut population.mutation_block,
                &population.mutation_types,
                &population.pedigree_ids,
                self.sex_enabled,
                generation,
                lineage.as_deref_mut(),
            )?;
        }
        // Swap parental/child buffers. The outgoing parents (now in
        // `children`, about to be cleared) drop their `Rc<MutationRun>`
        // handles here, which is this crate's equivalent of "clear
        // parental mutation runs" — no explicit pool release is needed
        // since an unshared run's `Rc` simply deallocates.
        for subpop in &mut population.subpopulations {
            subpop.swap_generations();
        }
        stages_run.push(Stage::GenerateOffspring);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::GenerateOffspring)?;

        // 3. Remove fixed mutations; periodic uniqueness pass; invalidate
        // interactions; sweep deferred interaction-callback
        // deregistrations (folded into the generic sweep above).
        population.retally();
        let mutations_fixed = population.sweep_fixed_mutations()?.len();
        let uniqueness_pass_ran = self.run_uniqueness_pass_if_due(population, generation);
        self.dispatch_stage(population, registry, Stage::RemoveFixedMutations, ScriptBlockType::Interaction, generation)?;
        stages_run.push(Stage::RemoveFixedMutations);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::RemoveFixedMutations)?;

        // 4. Swap generations (already performed structurally in stage 2
        // for WF's child-buffer model; this stage is where the spec
        // observes the swap as complete and stable).
        stages_run.push(Stage::SwapGenerations);

        // 5. Late events.
        self.dispatch_stage(population, registry, Stage::LateEvents, ScriptBlockType::LateEvent, generation)?;
        stages_run.push(Stage::LateEvents);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::LateEvents)?;

        // 6. Recalculate fitness for the new parental generation.
        self.dispatch_fitness_stage(population, registry, Stage::RecalculateFitness, ScriptBlockType::Fitness, generation)?;
        self.dispatch_fitness_stage(population, registry, Stage::RecalculateFitness, ScriptBlockType::FitnessGlobal, generation)?;
        stages_run.push(Stage::RecalculateFitness);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::RecalculateFitness)?;

        // 7. Advance generation counter (handled by the caller after
        // `advance` returns, matching every other driver in this crate).
        stages_run.push(Stage::AdvanceCounter);

        Ok(CycleReport {
            generation,
            stages_run,
            mutations_fixed,
            uniqueness_pass_ran,
            elapsed: Duration::ZERO,
        })
    }

    fn advance_nonwf(
        &mut self,
        population: &mut Population,
        registry: &mut ScriptBlockRegistry,
        chromosome: &Chromosome,
        mut lineage: Option<&mut dyn LineageRecorder>,
        generation: i64,
    ) -> Result<CycleReport> {
        let mut stages_run = Vec::with_capacity(7);

        // 1. Generate offspring via reproduction callbacks; merge
        // offspring straight into the parental vector (nonWF has no
        // child-buffer swap); clear migrant flags and the frequency
        // cache. A subpop with no active `Reproduction` callback falls
        // back to the same default mating scheme WF uses, so an
        // unscripted nonWF subpop doesn't simply die out for want of
        // offspring.
        self.dispatch_stage(population, registry, Stage::GenerateOffspring, ScriptBlockType::Reproduction, generation)?;
        for subpop in &mut population.subpopulations {
            let has_reproduction_callback = !registry
                .matching(generation, ScriptBlockType::Reproduction, None, None, Some(subpop.id.0 as i32))
                .is_empty();
            if has_reproduction_callback {
                continue;
            }
            let target_size = subpop.parents.len();
            generate_wf_offspring(
                subpop,
                target_size,
                chromosome,
                &mut population.mutation_block,
                &population.mutation_types,
                &population.pedigree_ids,
                self.sex_enabled,
                generation,
                lineage.as_deref_mut(),
            )?;
        }
        for subpop in &mut population.subpopulations {
            subpop.parents.append(&mut subpop.children);
            for individual in &mut subpop.parents {
                individual.migrant = false;
            }
        }
        // The frequency cache is the mutation registry's tally, which is
        // recomputed wholesale in stage 5 below; there is nothing to
        // explicitly clear here beyond the migrant flags above.
        stages_run.push(Stage::GenerateOffspring);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::GenerateOffspring)?;

        // 2. Early events.
        self.dispatch_stage(population, registry, Stage::EarlyEvents, ScriptBlockType::EarlyEvent, generation)?;
        stages_run.push(Stage::EarlyEvents);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::EarlyEvents)?;

        // 3. Recalculate fitness; invalidate interactions.
        self.dispatch_fitness_stage(population, registry, Stage::RecalculateFitness, ScriptBlockType::Fitness, generation)?;
        self.dispatch_fitness_stage(population, registry, Stage::RecalculateFitness, ScriptBlockType::FitnessGlobal, generation)?;
        self.dispatch_stage(population, registry, Stage::RecalculateFitness, ScriptBlockType::Interaction, generation)?;
        stages_run.push(Stage::RecalculateFitness);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::RecalculateFitness)?;

        // 4. Viability selection: each individual's fitness becomes its
        // survival probability; survivors move forward, deaths free
        // their genomes (here: are dropped from `parents`, releasing the
        // only `Rc` handles their genomes' mutation runs held if
        // unshared).
        for subpop in &mut population.subpopulations {
            subpop.parents.retain(|individual| {
                slim_core::random::bernoulli(individual.fitness.clamp(0.0, 1.0))
            });
        }
        stages_run.push(Stage::ViabilitySelection);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::ViabilitySelection)?;

        // 5. Remove fixed mutations; periodic uniqueness pass.
        population.retally();
        let mutations_fixed = population.sweep_fixed_mutations()?.len();
        let uniqueness_pass_ran = self.run_uniqueness_pass_if_due(population, generation);
        stages_run.push(Stage::RemoveFixedMutations);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::RemoveFixedMutations)?;

        // 6. Late events; experimenter sample at end of stage (the
        // caller does the actual `record_generation_time` call, since it
        // owns the `Experimenter` instance and the wall-clock it's timing
        // typically spans the whole `advance` call, not just this
        // stage).
        self.dispatch_stage(population, registry, Stage::LateEvents, ScriptBlockType::LateEvent, generation)?;
        stages_run.push(Stage::LateEvents);
        self.sweep_between_stages(registry);
        self.cross_check_if_debug(population, Stage::LateEvents)?;

        // 7. Advance counter; increment ages; tree-seq maintenance as in
        // WF (ages and the tree-seq hook are driven by the caller, which
        // owns the recorder).
        for subpop in &mut population.subpopulations {
            for individual in &mut subpop.parents {
                individual.increment_age();
            }
        }
        stages_run.push(Stage::AdvanceCounter);

        Ok(CycleReport {
            generation,
            stages_run,
            mutations_fixed,
            uniqueness_pass_ran,
            elapsed: Duration::ZERO,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::chromosome::{Chromosome, RateMap, SexSpecificMap};
    use slim_core::mutation::mtype::{DominanceCoefficient, MutationType, MutationTypeId, SelectionCoefficientDistribution, StackingPolicy};
    use slim_core::subpopulation::SubpopulationId;
    use std::collections::HashMap;

    struct CountingHost {
        dispatches: usize,
    }

    impl ScriptHost for CountingHost {
        fn dispatch(
            &mut self,
            _stage: Stage,
            _generation: i64,
            blocks: &[&slim_script::ScriptBlock],
            _population: &mut Population,
        ) -> Result<()> {
            self.dispatches += blocks.len();
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

    fn chromosome() -> Chromosome {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
        Chromosome::new(1024, recomb, mutr, 8).unwrap()
    }

    #[test]
    fn wf_cycle_advances_generation_and_dispatches_early_events() {
        let mut population = slim_core::population::Population::new(catalog());
        population.add_subpopulation(SubpopulationId(0), 10, &chromosome(), false).unwrap();

        let mut registry = ScriptBlockRegistry::new();
        let id = registry.allocate_id();
        registry.register(slim_script::ScriptBlock::new(id, ScriptBlockType::EarlyEvent, 1, 100, "{ return 1.0; }"));

        let mut cycle = GenerationCycle::new(ModelType::WrightFisher, false, CountingHost { dispatches: 0 });
        let before_generation = population.generation;
        let report = cycle.advance(&mut population, &mut registry, &chromosome(), None).unwrap();

        assert_eq!(report.generation, before_generation);
        assert_eq!(population.generation, before_generation + 1);
        assert!(report.stages_run.contains(&Stage::EarlyEvents));
        assert_eq!(cycle.host().dispatches, 1);
    }

    #[test]
    fn nonwf_cycle_increments_ages() {
        let mut population = slim_core::population::Population::new(catalog());
        population.add_subpopulation(SubpopulationId(0), 5, &chromosome(), false).unwrap();
        for individual in &mut population.subpopulations[0].parents {
            individual.fitness = 1.0;
        }

        let mut registry = ScriptBlockRegistry::new();
        let mut cycle = GenerationCycle::new(ModelType::NonWrightFisher, false, CountingHost { dispatches: 0 });
        cycle.advance(&mut population, &mut registry, &chromosome(), None).unwrap();

        assert!(population.subpopulations[0].parents.iter().all(|i| i.age == Some(1)));
    }

    #[test]
    fn uniqueness_pass_runs_only_on_interval_generations() {
        let mut population = slim_core::population::Population::new(catalog());
        population.add_subpopulation(SubpopulationId(0), 1, &chromosome(), false).unwrap();
        population.generation = UNIQUENESS_PASS_INTERVAL;

        let mut registry = ScriptBlockRegistry::new();
        let mut cycle = GenerationCycle::new(ModelType::WrightFisher, false, CountingHost { dispatches: 0 });
        let report = cycle.advance(&mut population, &mut registry, &chromosome(), None).unwrap();
        assert!(report.uniqueness_pass_ran);
    }
}
