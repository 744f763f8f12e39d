//! Core data model for the simulator: the mutation block, mutation runs,
//! genomes, individuals, subpopulations, the chromosome's rate maps, and
//! the population that owns all of the above.
//!
//! This crate has no notion of a generation cycle or a scripting
//! language; those live in `slim-engine` and `slim-script` respectively.
//! It provides the data the rest of the workspace operates on, and the
//! invariants (§8 of the design doc) that operations on that data must
//! preserve.

pub mod chromosome;
pub mod config;
pub mod genome;
pub mod individual;
pub mod lineage;
pub mod mutation;
pub mod population;
pub mod random;
pub mod registry;
pub mod reproduction;
pub mod run;
pub mod stats;
pub mod subpopulation;

pub use chromosome::Chromosome;
pub use config::SimulationConfig;
pub use genome::{Genome, GenomeId, GenomeType};
pub use individual::{Individual, PedigreeId, Sex};
pub use lineage::{LineageRecorder, MutationLineageInfo};
pub use mutation::{Mutation, MutationBlock, MutationIndex, MutationType, MutationTypeId};
pub use mutation::substitution::{Substitution, SubstitutionList};
pub use population::Population;
pub use registry::MutationRegistry;
pub use reproduction::generate_wf_offspring;
pub use run::{MutationRun, RunPool};
pub use subpopulation::{Subpopulation, SubpopulationId};

pub type Result<T> = slim_error::Result<T>;
