//! Tree-sequence recording on top of the real `tskit` crate.
//!
//! [`Recorder`] owns a `tskit::TableCollection` and layers the
//! simulator-specific bookkeeping on top of it: node-per-genome and
//! edge-per-inherited-interval recording, derived-state mutation rows,
//! per-child scoped snapshot/rollback, a custom edge sort, adaptive
//! auto-simplification, coalescence testing, and a slow cross-check
//! against a variant iterator. None of the table storage itself is
//! reimplemented here; `tskit` owns the tables, we own when and what to
//! write into them.

pub mod crosscheck;
pub mod derived_state;
pub mod edgesort;
pub mod metadata;
pub mod recorder;
pub mod simplify;

pub use crosscheck::{CrossCheckGenome, cross_check, is_coalesced};
pub use derived_state::{decode_derived_state, encode_derived_state};
pub use metadata::{
    INDIVIDUAL_FLAG_ALIVE, INDIVIDUAL_FLAG_REMEMBERED, IndividualMeta, MutationEntry, MutationRowMetadata,
    SubpopulationMeta,
};
pub use recorder::{ChildSnapshot, MutationRecord, Recorder};
pub use simplify::{AutoSimplifyMode, SimplifyReport};
