//! The mutation-run storage engine: a shared, copy-on-write segmented
//! representation of one chromosome segment's mutation list (spec §4.1),
//! plus the split/join transitions the experimenter (`slim-engine`)
//! drives when it changes `mutrun_count`.

mod pool;
mod run;
mod splitjoin;

pub use pool::RunPool;
pub use run::{MutationRun, bump_operation_id, current_operation_id, emplace_back};
pub use splitjoin::{JoinCache, SplitCache, distinct_allocation_count, hash_cons_unique, join_runs, split_run};
