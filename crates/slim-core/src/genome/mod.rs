//! [`Genome`]: a fixed-length array of mutation-run handles representing
//! one haploid chromosome copy (spec §3).

mod genome;

pub use genome::{Genome, GenomeId};
pub use crate::chromosome::GenomeType;
