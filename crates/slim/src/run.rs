//! [`RunConfig`]: the JSON-deserializable description of one run that the
//! `slim` CLI binary loads from the path given as its script-file
//! argument (spec §6's "the scripting file is the first non-flag
//! argument" — here a typed configuration document stands in for a
//! parsed Eidos `initialize()` block, per `SPEC_FULL.md`'s note on the
//! external scripting collaborator being out of scope).

use crate::host::LoggingHost;
use slim_core::config::SimulationConfig;
use slim_core::population::Population;
use slim_core::subpopulation::SubpopulationId;
use slim_engine::engine::EngineExt;
use slim_engine::experimenter::Experimenter;
use slim_engine::simulator::Simulator;
use slim_error::Result;
use slim_script::block::ScriptBlockType;
use slim_script::{ScriptBlock, ScriptBlockRegistry};
use tracing::info;

/// One initial subpopulation: an id and a starting size. Mirrors the
/// handful of arguments a `sim.addSubpop()` call in an `initialize()`
/// callback would carry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct SubpopulationSpec {
    pub id: u32,
    pub size: usize,
}

/// One script-block callback, carried as opaque source text the way the
/// scripting front end would hand it to the registry (spec §3, "Script
/// Block"). `slim-script`'s `CallbackBody::parse` still gets first crack
/// at recognizing the two fast-path shapes; anything else is dispatched
/// through [`LoggingHost`] as opaque source.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CallbackSpec {
    pub block_type: CallbackTypeSpec,
    pub start_generation: i64,
    pub end_generation: i64,
    pub source: String,
}

/// A serializable mirror of [`slim_script::ScriptBlockType`] (which isn't
/// always built with the `serde` feature enabled in this workspace —
/// see `slim-script`'s feature table — so the facade's own config format
/// uses its own tag rather than assuming that feature is on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CallbackTypeSpec {
    EarlyEvent,
    LateEvent,
    Fitness,
    FitnessGlobal,
    Reproduction,
    ModifyChild,
    Recombination,
    Mutation,
    MateChoice,
}

impl From<CallbackTypeSpec> for ScriptBlockType {
    fn from(spec: CallbackTypeSpec) -> Self {
        match spec {
            CallbackTypeSpec::EarlyEvent => ScriptBlockType::EarlyEvent,
            CallbackTypeSpec::LateEvent => ScriptBlockType::LateEvent,
            CallbackTypeSpec::Fitness => ScriptBlockType::Fitness,
            CallbackTypeSpec::FitnessGlobal => ScriptBlockType::FitnessGlobal,
            CallbackTypeSpec::Reproduction => ScriptBlockType::Reproduction,
            CallbackTypeSpec::ModifyChild => ScriptBlockType::ModifyChild,
            CallbackTypeSpec::Recombination => ScriptBlockType::Recombination,
            CallbackTypeSpec::Mutation => ScriptBlockType::Mutation,
            CallbackTypeSpec::MateChoice => ScriptBlockType::MateChoice,
        }
    }
}

/// Whether the experimenter should be allowed to resegment the
/// chromosome at runtime (spec §4.2). Off by default: most recipes fix
/// `mutrun_count` deliberately and only opt into the adaptive search for
/// long runs where the wall-clock cost of experimenting pays for itself.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ExperimenterOptions {
    pub enabled: bool,
    pub max_mutrun_count: u32,
}

impl Default for ExperimenterOptions {
    fn default() -> Self {
        ExperimenterOptions {
            enabled: false,
            max_mutrun_count: 1024,
        }
    }
}

/// The full description of one run: the validated simulation
/// configuration, the initial subpopulations to create, and the
/// callback blocks to register before generation 1.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RunConfig {
    pub config: SimulationConfig,
    pub subpopulations: Vec<SubpopulationSpec>,
    #[serde(default)]
    pub callbacks: Vec<CallbackSpec>,
    #[serde(default)]
    pub experimenter: ExperimenterOptions,
}

/// Summary returned once a [`RunConfig`] has been driven to
/// `config.end_generation`.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_generation: i64,
    pub mutations_fixed_total: usize,
    pub modal_mutrun_count: Option<u32>,
}

/// Build a [`Simulator`] from `config`, run it to
/// `config.config.end_generation`, and return a summary report.
///
/// This is the CLI's only entry point into the engine; anything a real
/// front end would also want (periodic population dumps, tree-sequence
/// output, a progress callback) is layered around this call rather than
/// inside it, matching spec §1's framing of everything outside the
/// three core subsystems as a thin driver.
pub fn run(config: RunConfig) -> Result<RunReport> {
    config.config.validate()?;

    if let Some(seed) = config.config.seed {
        slim_core::random::set_seed(seed);
    }

    let mut population = Population::new(config.config.mutation_types.clone());
    for spec in &config.subpopulations {
        population.add_subpopulation(
            SubpopulationId(spec.id),
            spec.size,
            &config.config.chromosome,
            config.config.sex_enabled,
        )?;
    }

    let mut registry = ScriptBlockRegistry::new();
    for callback in &config.callbacks {
        let id = registry.allocate_id();
        let block = ScriptBlock::new(
            id,
            callback.block_type.into(),
            callback.start_generation,
            callback.end_generation,
            callback.source.clone(),
        );
        registry.register(block);
    }

    let experimenter = if config.experimenter.enabled {
        Some(Experimenter::new(
            config.config.chromosome.mutrun_count(),
            config.experimenter.max_mutrun_count,
        ))
    } else {
        None
    };

    let mut simulator = Simulator::new(
        population,
        registry,
        config.config.chromosome.clone(),
        config.config.model_type,
        config.config.sex_enabled,
        LoggingHost,
        experimenter,
    );

    let end_generation = config.config.end_generation;
    let final_epoch = simulator.run(|epoch| epoch.generation >= end_generation);

    info!(
        generation = final_epoch.generation,
        mutations_fixed = final_epoch.report.mutations_fixed,
        "run complete"
    );

    Ok(RunReport {
        final_generation: final_epoch.generation,
        mutations_fixed_total: final_epoch.report.mutations_fixed,
        modal_mutrun_count: simulator.experimenter().map(|e| e.modal_count()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::chromosome::{Chromosome, RateMap, SexSpecificMap};
    use slim_core::config::ModelType;
    use slim_core::mutation::mtype::{DominanceCoefficient, MutationType, MutationTypeId, SelectionCoefficientDistribution, StackingPolicy};
    use slim_core::config::TreeSequenceOptions;
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

    fn minimal_run_config() -> RunConfig {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
        let chromosome = Chromosome::new(1024, recomb, mutr, 8).unwrap();

        RunConfig {
            config: SimulationConfig {
                model_type: ModelType::WrightFisher,
                seed: Some(42),
                end_generation: 5,
                chromosome,
                mutation_types: catalog(),
                sex_enabled: false,
                tree_sequence: TreeSequenceOptions::default(),
            },
            subpopulations: vec![SubpopulationSpec { id: 0, size: 20 }],
            callbacks: Vec::new(),
            experimenter: ExperimenterOptions::default(),
        }
    }

    #[test]
    fn run_advances_to_end_generation() {
        let report = run(minimal_run_config()).unwrap();
        assert_eq!(report.final_generation, 5);
    }

    #[test]
    fn run_rejects_invalid_config() {
        let mut config = minimal_run_config();
        config.config.end_generation = 0;
        assert!(run(config).is_err());
    }

    #[test]
    fn run_with_fitness_callback_applies_fast_path() {
        let mut config = minimal_run_config();
        config.callbacks.push(CallbackSpec {
            block_type: CallbackTypeSpec::Fitness,
            start_generation: 1,
            end_generation: 5,
            source: "{ return 1.0 / relFitness; }".to_string(),
        });
        let report = run(config).unwrap();
        assert_eq!(report.final_generation, 5);
    }
}
