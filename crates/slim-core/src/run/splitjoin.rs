//! Split and join transitions for a chromosome's mutrun segmentation
//! (spec §4.2): increasing `mutrun_count` splits every run in two,
//! routing mutations by position; decreasing joins pairs of adjacent
//! runs back together. Both preserve mutation-run sharing: identical
//! input (pairs of) runs produce identical output runs via a
//! hash-consing map scoped to one split/join pass, so that genomes which
//! happened to share a run before the transition still share the
//! (newly split or joined) run after it.

use super::run::{MutationRun, emplace_back};
use crate::mutation::MutationBlock;
use hashbrown::HashMap;

/// Pointer identity of the run's backing allocation, used only as a
/// hash-consing key within one split/join pass — never compared across
/// passes or persisted.
fn identity_key(run: &MutationRun) -> usize {
    run.identity()
}

/// Caches the outputs of [`split_run`] within one experimenter-driven
/// split pass, so that two genomes sharing the same pre-split run end up
/// sharing the same two post-split runs rather than each producing an
/// independent (but content-equal) clone.
#[derive(Default)]
pub struct SplitCache(HashMap<usize, (MutationRun, MutationRun)>);

impl SplitCache {
    pub fn new() -> Self {
        SplitCache::default()
    }
}

/// Split `run` into a low half (positions `< split_position`) and a high
/// half (positions `>= split_position`), consulting/populating `cache`
/// so that repeated calls with a `Rc`-identical `run` return the same
/// two output runs.
pub fn split_run(
    run: &MutationRun,
    block: &MutationBlock,
    split_position: i64,
    cache: &mut SplitCache,
) -> (MutationRun, MutationRun) {
    let key = identity_key(run);
    if let Some(cached) = cache.0.get(&key) {
        return cached.clone();
    }

    let mut low = MutationRun::new();
    let mut high = MutationRun::new();
    for &index in run.indices() {
        if block.get(index).position < split_position {
            emplace_back(&mut low, block, index);
        } else {
            emplace_back(&mut high, block, index);
        }
    }

    cache.0.insert(key, (low.clone(), high.clone()));
    (low, high)
}

/// Caches the outputs of [`join_runs`] within one join pass, keyed by
/// the pointer-identity pair of the two inputs.
#[derive(Default)]
pub struct JoinCache(HashMap<(usize, usize), MutationRun>);

impl JoinCache {
    pub fn new() -> Self {
        JoinCache::default()
    }
}

/// Join two adjacent runs (`low` covering the lower half of a segment,
/// `high` the upper half) back into one run spanning both. Both inputs
/// are already position-sorted and non-overlapping by construction, so
/// the join is a concatenation, not a general merge.
pub fn join_runs(low: &MutationRun, high: &MutationRun, cache: &mut JoinCache) -> MutationRun {
    let key = (identity_key(low), identity_key(high));
    if let Some(cached) = cache.0.get(&key) {
        return cached.clone();
    }

    let mut indices = Vec::with_capacity(low.len() + high.len());
    indices.extend_from_slice(low.indices());
    indices.extend_from_slice(high.indices());
    let joined = MutationRun::from_sorted_indices(indices);

    cache.0.insert(key, joined.clone());
    joined
}

/// A hash-consing map used by the "every-100th-generation uniqueness
/// pass" (spec §4.4 stage 3): replaces content-identical runs scattered
/// across the population with a single shared instance, increasing
/// sharing without changing any genome's observable mutation set.
pub fn hash_cons_unique(runs: &mut [MutationRun]) {
    let mut seen: HashMap<Vec<crate::mutation::MutationIndex>, MutationRun> = HashMap::new();
    for run in runs.iter_mut() {
        let key = run.indices().to_vec();
        match seen.get(&key) {
            Some(canonical) => *run = canonical.clone(),
            None => {
                seen.insert(key, run.clone());
            }
        }
    }
}

/// Total number of distinct backing allocations among `runs`, used by
/// the split-join-identity test (spec §8.A) to assert that sharing is
/// non-decreasing after a join/uniqueness step.
pub fn distinct_allocation_count(runs: &[MutationRun]) -> usize {
    let mut seen = std::collections::HashSet::new();
    for run in runs {
        seen.insert(run.identity());
    }
    seen.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::mtype::MutationTypeId;
    use crate::run::emplace_back;

    fn make_block_and_run(positions: &[i64]) -> (MutationBlock, MutationRun) {
        let mut block = MutationBlock::new();
        let mut run = MutationRun::new();
        for &position in positions {
            let idx = block.allocate(MutationTypeId(0), position, 0.1, 0, 0, None);
            block.retain(idx);
            emplace_back(&mut run, &block, idx);
        }
        (block, run)
    }

    #[test]
    fn split_then_join_preserves_mutation_set() {
        let (block, run) = make_block_and_run(&[10, 40, 60, 90]);
        let original: Vec<_> = run.indices().to_vec();

        let mut split_cache = SplitCache::new();
        let (low, high) = split_run(&run, &block, 50, &mut split_cache);
        assert_eq!(low.indices(), &[original[0], original[1]]);
        assert_eq!(high.indices(), &[original[2], original[3]]);

        let mut join_cache = JoinCache::new();
        let rejoined = join_runs(&low, &high, &mut join_cache);
        assert_eq!(rejoined.indices(), original.as_slice());
    }

    #[test]
    fn split_cache_returns_identical_runs_for_identical_input() {
        let (block, run) = make_block_and_run(&[10, 60]);
        let mut cache = SplitCache::new();

        let (low1, high1) = split_run(&run, &block, 50, &mut cache);
        let (low2, high2) = split_run(&run, &block, 50, &mut cache);

        assert_eq!(low1.indices(), low2.indices());
        assert_eq!(high1.indices(), high2.indices());
    }

    #[test]
    fn hash_cons_unique_merges_identical_content() {
        let (_block, run_a) = make_block_and_run(&[10, 20]);
        let run_b = MutationRun::from_sorted_indices(run_a.indices().to_vec());
        let mut runs = vec![run_a.clone(), run_b];

        assert_eq!(distinct_allocation_count(&runs), 2);
        hash_cons_unique(&mut runs);
        assert_eq!(runs[0].indices(), runs[1].indices());
    }
}
