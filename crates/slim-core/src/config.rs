//! [`SimulationConfig`]: the parsed, validated configuration a run is
//! built from. Stands in for the external scripting-language front
//! end's initialization callback — in this crate the configuration
//! arrives already-parsed, typically deserialized from JSON via
//! `serde`, rather than through a `initialize()` callback block.

use crate::chromosome::Chromosome;
use crate::mutation::mtype::{MutationType, MutationTypeId};
use slim_error::{Result, slim_bail};
use std::collections::HashMap;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Wright-Fisher: discrete, non-overlapping generations.
    WrightFisher,
    /// Non-Wright-Fisher: overlapping generations, explicit survival and
    /// reproduction callbacks, individual `age`.
    NonWrightFisher,
}

/// Tree-sequence recording options (spec §5, §6). `crosscheck_interval`
/// mirrors the CLI's `-TSXC` flag (spec §7's "CLI surface").
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeSequenceOptions {
    pub enabled: bool,
    pub crosscheck_interval: Option<u64>,
}

impl Default for TreeSequenceOptions {
    fn default() -> Self {
        TreeSequenceOptions {
            enabled: false,
            crosscheck_interval: None,
        }
    }
}

/// The validated, fully-resolved configuration a [`crate::Population`]
/// is constructed from. Deserializable via `serde_json` so a CLI front
/// end (or a test) can load one from a file without re-deriving every
/// field by hand.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub model_type: ModelType,
    pub seed: Option<u64>,
    pub end_generation: i64,
    pub chromosome: Chromosome,
    pub mutation_types: HashMap<MutationTypeId, MutationType>,
    pub sex_enabled: bool,
    pub tree_sequence: TreeSequenceOptions,
}

impl SimulationConfig {
    /// Check the cross-field constraints the initialization stage would
    /// otherwise enforce piecemeal (spec §7, "Configuration error"):
    /// a nonWF model needs no extra checks here since age is opt-in per
    /// `Individual`, but a WF model must not be handed a configuration
    /// that presupposes per-individual age tracking, and every
    /// mutation-type stacking group referenced must resolve.
    pub fn validate(&self) -> Result<()> {
        if self.end_generation <= 0 {
            slim_bail!(Configuration: "end_generation must be positive, got {}", self.end_generation);
        }
        if self.mutation_types.is_empty() {
            slim_bail!(Configuration: "at least one mutation type must be defined");
        }
        for (&id, mutation_type) in &self.mutation_types {
            if mutation_type.id != id {
                slim_bail!(
                    Configuration:
                    "mutation type keyed at {:?} has mismatched id {:?}",
                    id,
                    mutation_type.id
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{RateMap, SexSpecificMap};
    use crate::mutation::mtype::{DominanceCoefficient, SelectionCoefficientDistribution, StackingPolicy};

    fn minimal_config() -> SimulationConfig {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
        let chromosome = Chromosome::new(1024, recomb, mutr, 8).unwrap();

        let mut mutation_types = HashMap::new();
        mutation_types.insert(
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

        SimulationConfig {
            model_type: ModelType::WrightFisher,
            seed: Some(1),
            end_generation: 100,
            chromosome,
            mutation_types,
            sex_enabled: false,
            tree_sequence: TreeSequenceOptions::default(),
        }
    }

    #[test]
    fn minimal_config_validates() {
        assert!(minimal_config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_end_generation() {
        let mut config = minimal_config();
        config.end_generation = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_mutation_type_catalog() {
        let mut config = minimal_config();
        config.mutation_types.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_mutation_type_key() {
        let mut config = minimal_config();
        let wrong_key = MutationTypeId(99);
        let existing = config.mutation_types.remove(&MutationTypeId(0)).unwrap();
        config.mutation_types.insert(wrong_key, existing);
        assert!(config.validate().is_err());
    }
}
