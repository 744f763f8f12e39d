//! `slim`: the public facade over the workspace's data model
//! (`slim-core`), callback registry (`slim-script`), generation-cycle
//! engine (`slim-engine`), tree-sequence recorder (`slim-treeseq`), and
//! file-format I/O (`slim-io`), plus the `slim` CLI binary (spec §6).
//!
//! Grounded on `radiate`'s own facade crate (`crates/radiate/src/lib.rs`
//! in the teacher repo): a thin `pub use` of every satellite crate's
//! public surface, plus whatever glue the facade itself is best placed
//! to own because it is the only crate that depends on all the others.
//! Here that glue is [`RunConfig`] (the JSON-deserializable description
//! of one run, standing in for a parsed `initialize()` callback block)
//! and [`LoggingHost`] (a [`ScriptHost`] that evaluates fast-path
//! callbacks directly and logs, rather than silently dropping, any
//! callback body the external interpreter would have had to run).

pub use slim_core::*;
pub use slim_engine::*;
pub use slim_script::*;

pub use slim_error::SlimError;

#[cfg(feature = "treeseq")]
pub use slim_treeseq as treeseq;

#[cfg(feature = "io")]
pub use slim_io as io;

mod host;
mod run;

pub use host::LoggingHost;
pub use run::{RunConfig, RunReport, SubpopulationSpec, run};

/// The workspace's common error-result alias. An explicit item, rather
/// than one more `pub use crate::*`, because `slim-core`, `slim-script`
/// and `slim-engine` each re-export their own `Result<T> = slim_error::Result<T>`
/// alias and a fourth glob would make the name ambiguous; an explicit
/// local definition takes priority over the glob-imported ones instead.
pub type Result<T> = slim_error::Result<T>;
