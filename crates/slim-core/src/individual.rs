//! [`Individual`]: two genomes plus per-individual attributes (spec §3).

use crate::genome::Genome;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Hermaphrodite,
    Male,
    Female,
}

/// A process-... instance-wide unique id for an individual (spec's
/// "Pedigree id"; see `DESIGN.md` for the global-vs-instance-scoped
/// decision). Genome ids are derived as `2 * pedigree_id` and
/// `2 * pedigree_id + 1` (spec GLOSSARY).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PedigreeId(pub u64);

/// A monotonic counter that hands out fresh pedigree ids. Kept as a
/// small struct (rather than reusing a bare global, the way the
/// original's `gSLiM_next_pedigree_id` does) so a `Population` can own
/// one and tests can run several populations without racing on a shared
/// counter — see `DESIGN.md`'s note on instance-scoped process state.
#[derive(Debug, Default)]
pub struct PedigreeIdAllocator(AtomicU64);

impl PedigreeIdAllocator {
    pub fn new() -> Self {
        PedigreeIdAllocator(AtomicU64::new(0))
    }

    pub fn next(&self) -> PedigreeId {
        PedigreeId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpatialPosition {
    pub coordinates: [f64; 3],
    pub dimensionality: u8,
}

impl SpatialPosition {
    pub fn new(coordinates: &[f64]) -> Self {
        let mut out = [0.0; 3];
        for (slot, &value) in out.iter_mut().zip(coordinates) {
            *slot = value;
        }
        SpatialPosition {
            coordinates: out,
            dimensionality: coordinates.len() as u8,
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Individual {
    pub pedigree_id: PedigreeId,
    pub genome1: Genome,
    pub genome2: Genome,
    /// Only meaningful under a nonWF model; `None` under WF (spec §3,
    /// §7's "WF model given age information" configuration error).
    pub age: Option<i32>,
    pub sex: Sex,
    pub position: SpatialPosition,
    pub migrant: bool,
    pub fitness: f64,
    pub tag: Option<i64>,
    pub tag_float: Option<f64>,
}

impl Individual {
    pub fn new(pedigree_id: PedigreeId, genome1: Genome, genome2: Genome, sex: Sex) -> Self {
        Individual {
            pedigree_id,
            genome1,
            genome2,
            age: None,
            sex,
            position: SpatialPosition::default(),
            migrant: false,
            fitness: 1.0,
            tag: None,
            tag_float: None,
        }
    }

    pub fn genome_id_1(&self) -> u64 {
        2 * self.pedigree_id.0
    }

    pub fn genome_id_2(&self) -> u64 {
        2 * self.pedigree_id.0 + 1
    }

    pub fn genomes(&self) -> [&Genome; 2] {
        [&self.genome1, &self.genome2]
    }

    pub fn genomes_mut(&mut self) -> [&mut Genome; 2] {
        [&mut self.genome1, &mut self.genome2]
    }

    pub fn increment_age(&mut self) {
        self.age = Some(self.age.unwrap_or(0) + 1);
    }
}
