//! Population file-format I/O (spec §4.6): the four persisted forms a
//! population can round-trip through, plus the reconstruction pipeline
//! that rebuilds live `slim-core` state from a loaded table collection.
//!
//! Detection (`format::detect_format`) tells the four formats apart by
//! magic bytes or directory shape; each format's own module owns its
//! read/write pair. `slim_binary`/`slim_text` read/write `Population`
//! directly. `tables_text`/`tables_binary` read/write the bare
//! `tskit::TableCollection`; turning that back into a `Population` is
//! the job of `reconstruct`, since it is nontrivial enough (spec's
//! ten-step pipeline) to deserve its own module rather than living
//! inline in either table-collection reader.

pub mod format;
pub mod reconstruct;
pub mod slim_binary;
pub mod slim_text;
pub mod tables_binary;
pub mod tables_text;

pub use format::{PopulationFileFormat, detect_format};
pub use reconstruct::{ReconstructedPopulation, TimeConvention, reconstruct_population};

pub type Result<T> = slim_error::Result<T>;
