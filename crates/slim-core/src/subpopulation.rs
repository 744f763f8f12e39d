//! [`Subpopulation`]: a vector of parental (and, under WF, child)
//! individuals, fitness caches, and the selfing/cloning/migration
//! parameters that govern its reproduction (spec §3).

use crate::individual::Individual;
use slim_error::{Result, slim_bail};
use std::collections::HashMap;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubpopulationId(pub u32);

/// An axis-aligned spatial bound used to clamp or reflect offspring
/// positions. `None` means unbounded on that axis.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialBounds {
    pub x: Option<(f64, f64)>,
    pub y: Option<(f64, f64)>,
    pub z: Option<(f64, f64)>,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct Subpopulation {
    pub id: SubpopulationId,
    pub parents: Vec<Individual>,
    /// The WF child buffer, populated during offspring generation and
    /// swapped in at stage end (spec §4.4, stage 2/4). Always empty
    /// under a nonWF model, where offspring are appended straight into
    /// `parents`.
    pub children: Vec<Individual>,
    pub sex_ratio: f64,
    pub selfing_rate: f64,
    pub cloning_rate: f64,
    /// Incoming migration rate from each other subpopulation, keyed by
    /// source id; values must sum to `<= 1.0`.
    pub migration_rates: HashMap<SubpopulationId, f64>,
    pub bounds: SpatialBounds,
    /// Named spatial interaction/value maps, opaque at this layer (the
    /// spatial-interaction search structure itself is an external
    /// collaborator per spec §1).
    pub spatial_maps: HashMap<String, Vec<f64>>,
}

impl Subpopulation {
    pub fn new(id: SubpopulationId) -> Self {
        Subpopulation {
            id,
            parents: Vec::new(),
            children: Vec::new(),
            sex_ratio: 0.5,
            selfing_rate: 0.0,
            cloning_rate: 0.0,
            migration_rates: HashMap::new(),
            bounds: SpatialBounds::default(),
            spatial_maps: HashMap::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.parents.len()
    }

    pub fn set_migration_rate(&mut self, from: SubpopulationId, rate: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&rate) {
            slim_bail!(UserScript: "migration rate must be in [0, 1], got {rate}");
        }
        self.migration_rates.insert(from, rate);
        let total: f64 = self.migration_rates.values().sum();
        if total > 1.0 + 1e-9 {
            slim_bail!(UserScript: "total incoming migration rate {total} exceeds 1.0");
        }
        Ok(())
    }

    pub fn set_selfing_rate(&mut self, rate: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&rate) {
            slim_bail!(UserScript: "selfing rate must be in [0, 1], got {rate}");
        }
        self.selfing_rate = rate;
        Ok(())
    }

    pub fn set_cloning_rate(&mut self, rate: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&rate) {
            slim_bail!(UserScript: "cloning rate must be in [0, 1], got {rate}");
        }
        self.cloning_rate = rate;
        Ok(())
    }

    /// Swap the child buffer into the parent slot, clearing children
    /// (spec §4.4 WF stage 4).
    pub fn swap_generations(&mut self) {
        std::mem::swap(&mut self.parents, &mut self.children);
        self.children.clear();
    }

    /// Mean fitness of the parental generation, used for the Wright-Fisher
    /// relative-fitness normalization during mating.
    pub fn mean_parent_fitness(&self) -> f64 {
        if self.parents.is_empty() {
            return 0.0;
        }
        self.parents.iter().map(|i| i.fitness).sum::<f64>() / self.parents.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_rate_rejects_out_of_range() {
        let mut sub = Subpopulation::new(SubpopulationId(0));
        assert!(sub.set_migration_rate(SubpopulationId(1), 1.5).is_err());
        assert!(sub.set_migration_rate(SubpopulationId(1), -0.1).is_err());
    }

    #[test]
    fn migration_rates_cannot_sum_above_one() {
        let mut sub = Subpopulation::new(SubpopulationId(0));
        sub.set_migration_rate(SubpopulationId(1), 0.6).unwrap();
        assert!(sub.set_migration_rate(SubpopulationId(2), 0.6).is_err());
    }

    #[test]
    fn swap_generations_moves_children_into_parents() {
        use crate::genome::{Genome, GenomeType};
        use crate::individual::{Individual, PedigreeId, Sex};

        let mut sub = Subpopulation::new(SubpopulationId(0));
        sub.children.push(Individual::new(
            PedigreeId(0),
            Genome::new_empty(GenomeType::Autosome, 1, 0),
            Genome::new_empty(GenomeType::Autosome, 1, 0),
            Sex::Hermaphrodite,
        ));

        sub.swap_generations();
        assert_eq!(sub.parents.len(), 1);
        assert!(sub.children.is_empty());
    }
}
