//! [`MutationRun`]: a reference-counted, ordered sequence of mutation
//! indices (spec §4.1). Copy-on-write is implemented directly with
//! `Rc::make_mut`, which is the idiomatic Rust expression of "clone if
//! shared, otherwise mutate in place" that the spec describes as an
//! explicit refcount check.

use crate::mutation::{MutationBlock, MutationIndex};
use crate::mutation::mtype::StackingPolicy;
use slim_error::{Result, slim_bail};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Bump the process-wide operation-id counter, invalidating every
/// mutation run's non-neutral cache. Called after any edit that could
/// change which indices are non-neutral (new mutation types defined,
/// fixation sweeps, etc).
pub fn bump_operation_id() -> u64 {
    OPERATION_ID.fetch_add(1, Ordering::Relaxed) + 1
}

pub fn current_operation_id() -> u64 {
    OPERATION_ID.load(Ordering::Relaxed)
}

#[derive(Debug, Clone, Default)]
struct NonNeutralCache {
    operation_id: u64,
    indices: Rc<[MutationIndex]>,
}

#[derive(Debug, Default)]
struct MutationRunData {
    indices: Vec<MutationIndex>,
    non_neutral_cache: RefCell<Option<NonNeutralCache>>,
}

impl Clone for MutationRunData {
    fn clone(&self) -> Self {
        // A fresh cache cell: the clone is a distinct run and must not
        // share cache state with its origin (only the index list is
        // actually duplicated, matching the spec's "shallow copy of
        // indices").
        MutationRunData {
            indices: self.indices.clone(),
            non_neutral_cache: RefCell::new(None),
        }
    }
}

impl PartialEq for MutationRunData {
    fn eq(&self, other: &Self) -> bool {
        self.indices == other.indices
    }
}

/// A reference-counted, ordered, shareable run of mutation indices
/// within one chromosome segment.
#[derive(Debug, Clone, Default)]
pub struct MutationRun(Rc<MutationRunData>);

impl PartialEq for MutationRun {
    fn eq(&self, other: &Self) -> bool {
        // Identical contents, not just pointer identity: two
        // independently-built runs covering the same mutations are
        // "the same run" for hash-consing purposes.
        self.0.indices == other.0.indices
    }
}

impl MutationRun {
    pub fn new() -> Self {
        MutationRun::default()
    }

    pub fn from_sorted_indices(indices: Vec<MutationIndex>) -> Self {
        debug_assert!(
            indices.windows(2).all(|w| w[0] != w[1]),
            "mutation run must not contain duplicate indices"
        );
        MutationRun(Rc::new(MutationRunData {
            indices,
            non_neutral_cache: RefCell::new(None),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.indices.is_empty()
    }

    pub fn indices(&self) -> &[MutationIndex] {
        &self.0.indices
    }

    /// True refcount > 1: the run is shared with at least one other
    /// genome's handle and must be copy-on-write before any mutation.
    pub fn is_shared(&self) -> bool {
        Rc::strong_count(&self.0) > 1
    }

    pub fn share_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// A stable identifier for this run's backing allocation: two
    /// handles return the same value iff they are `Rc`-clones of each
    /// other (i.e. genuinely the same run, not merely equal content).
    /// Used for hash-consing during split/join and for the
    /// split-join-identity test's sharing assertion.
    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    /// Append a new index, maintaining sort order. The caller guarantees
    /// `index`'s position is `>=` every existing index's position
    /// (spec §4.1's `emplace_back` contract); enforced with a
    /// `debug_assert` rather than a runtime check since callers compute
    /// this guarantee structurally.
    fn emplace_back(&mut self, block: &MutationBlock, index: MutationIndex) {
        let data = Rc::make_mut(&mut self.0);
        debug_assert!(
            data.indices
                .last()
                .is_none_or(|&last| block.get(last).position <= block.get(index).position),
            "emplace_back violates sort-by-position invariant"
        );
        data.indices.push(index);
        data.non_neutral_cache.replace(None);
    }

    /// Insert `index` respecting the stacking policy for mutations that
    /// land at the same position as an existing one. `KeepOld` is a
    /// no-op insertion (the caller should release `index` back to the
    /// block). `KeepNew` replaces the single existing mutation at that
    /// position. `KeepAll` inserts alongside.
    ///
    /// Returns the index that was evicted, if any, so the caller can
    /// release its reference in the mutation block.
    pub fn insert_with_stacking(
        &mut self,
        block: &MutationBlock,
        index: MutationIndex,
        policy: StackingPolicy,
    ) -> Result<Option<MutationIndex>> {
        let position = block.get(index).position;
        let data = Rc::make_mut(&mut self.0);

        let insertion_point = data
            .indices
            .partition_point(|&i| block.get(i).position <= position);

        // Find an existing occupant at the exact same position, if any.
        let existing_at_position = if insertion_point > 0
            && block.get(data.indices[insertion_point - 1]).position == position
        {
            Some(insertion_point - 1)
        } else {
            None
        };

        let evicted = match (policy, existing_at_position) {
            (StackingPolicy::KeepAll, _) | (_, None) => {
                data.indices.insert(insertion_point, index);
                None
            }
            (StackingPolicy::KeepOld, Some(_)) => Some(index),
            (StackingPolicy::KeepNew, Some(at)) => {
                let evicted = data.indices[at];
                data.indices[at] = index;
                Some(evicted)
            }
        };

        data.non_neutral_cache.replace(None);

        debug_assert!(
            data.indices.windows(2).all(|w| block.get(w[0]).position <= block.get(w[1]).position),
            "stacking insertion broke sort order"
        );

        Ok(evicted)
    }

    /// Remove every occurrence of `index` (used when a mutation is
    /// fixed/substituted and must be pulled out of every run that
    /// carries it).
    pub fn remove(&mut self, index: MutationIndex) -> bool {
        let data = Rc::make_mut(&mut self.0);
        let before = data.indices.len();
        data.indices.retain(|&i| i != index);
        let removed = data.indices.len() != before;
        if removed {
            data.non_neutral_cache.replace(None);
        }
        removed
    }

    pub fn contains(&self, index: MutationIndex) -> bool {
        self.0.indices.contains(&index)
    }

    /// The subset of this run's indices whose mutation has a non-zero
    /// selection coefficient, memoized against the process-wide
    /// operation-id counter.
    pub fn non_neutral(&self, block: &MutationBlock) -> Rc<[MutationIndex]> {
        let current = current_operation_id();
        if let Some(cache) = self.0.non_neutral_cache.borrow().as_ref() {
            if cache.operation_id == current {
                return cache.indices.clone();
            }
        }

        let indices: Rc<[MutationIndex]> = self
            .0
            .indices
            .iter()
            .copied()
            .filter(|&i| block.get(i).selection_coefficient != 0.0)
            .collect();

        *self.0.non_neutral_cache.borrow_mut() = Some(NonNeutralCache {
            operation_id: current,
            indices: indices.clone(),
        });

        indices
    }

    /// Reclaim this run for the [`crate::RunPool`] if it is not shared
    /// with any other handle, clearing its contents and cache in place
    /// so the backing allocation can be reused.
    pub fn recycle(mut self) -> Option<MutationRun> {
        if Rc::strong_count(&self.0) == 1 {
            let data = Rc::get_mut(&mut self.0).expect("strong_count checked above");
            data.indices.clear();
            data.non_neutral_cache.replace(None);
            Some(self)
        } else {
            None
        }
    }

    /// Validate the run's position-bucket invariant against its owning
    /// chromosome segment: every index's position must map to
    /// `expected_segment`.
    pub fn check_segment_invariant(
        &self,
        block: &MutationBlock,
        mutrun_length: i64,
        expected_segment: usize,
    ) -> Result<()> {
        for &index in &self.0.indices {
            let position = block.get(index).position;
            let segment = (position / mutrun_length) as usize;
            if segment != expected_segment {
                slim_bail!(
                    Internal:
                    "mutation {index} at position {position} belongs to segment {segment}, not {expected_segment}"
                );
            }
        }
        Ok(())
    }
}

impl Extend<MutationIndex> for MutationRunData {
    fn extend<T: IntoIterator<Item = MutationIndex>>(&mut self, iter: T) {
        self.indices.extend(iter);
    }
}

/// Append `index`, trusting the caller's sort-order guarantee. Exposed
/// as a free function (rather than a method taking `&mut self` plus
/// `&MutationBlock`) so callers driving bulk construction (e.g. the
/// file-format loader) can build a run without per-call borrow
/// juggling.
pub fn emplace_back(run: &mut MutationRun, block: &MutationBlock, index: MutationIndex) {
    run.emplace_back(block, index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::mtype::MutationTypeId;

    fn block_with(positions: &[(i64, f64)]) -> (MutationBlock, Vec<MutationIndex>) {
        let mut block = MutationBlock::new();
        let mut indices = Vec::new();
        for &(position, coeff) in positions {
            let idx = block.allocate(MutationTypeId(0), position, coeff, 0, 0, None);
            block.retain(idx);
            indices.push(idx);
        }
        (block, indices)
    }

    #[test]
    fn clone_on_write_only_when_shared() {
        let (block, indices) = block_with(&[(10, 0.1)]);
        let mut run = MutationRun::new();
        emplace_back(&mut run, &block, indices[0]);

        let clone = run.clone();
        assert!(run.is_shared());

        let (block2, indices2) = block_with(&[(20, 0.2)]);
        emplace_back(&mut run, &block2, indices2[0]);

        // The clone must be untouched by the mutation above.
        assert_eq!(clone.len(), 1);
        assert_eq!(run.len(), 2);
        assert!(!run.is_shared());
    }

    #[test]
    fn stacking_keep_new_evicts_old() {
        let (block, indices) = block_with(&[(10, 0.1), (10, 0.2)]);
        let mut run = MutationRun::new();
        emplace_back(&mut run, &block, indices[0]);

        let evicted = run
            .insert_with_stacking(&block, indices[1], StackingPolicy::KeepNew)
            .unwrap();

        assert_eq!(evicted, Some(indices[0]));
        assert_eq!(run.indices(), &[indices[1]]);
    }

    #[test]
    fn stacking_keep_old_evicts_incoming() {
        let (block, indices) = block_with(&[(10, 0.1), (10, 0.2)]);
        let mut run = MutationRun::new();
        emplace_back(&mut run, &block, indices[0]);

        let evicted = run
            .insert_with_stacking(&block, indices[1], StackingPolicy::KeepOld)
            .unwrap();

        assert_eq!(evicted, Some(indices[1]));
        assert_eq!(run.indices(), &[indices[0]]);
    }

    #[test]
    fn stacking_keep_all_inserts_both_sorted_by_position() {
        let (block, indices) = block_with(&[(10, 0.1), (5, 0.2)]);
        let mut run = MutationRun::new();
        emplace_back(&mut run, &block, indices[0]);

        run.insert_with_stacking(&block, indices[1], StackingPolicy::KeepAll)
            .unwrap();

        assert_eq!(run.indices(), &[indices[1], indices[0]]);
    }

    #[test]
    fn non_neutral_cache_reflects_only_nonzero_coefficients() {
        let (block, indices) = block_with(&[(10, 0.0), (20, 0.5)]);
        let mut run = MutationRun::new();
        emplace_back(&mut run, &block, indices[0]);
        emplace_back(&mut run, &block, indices[1]);

        let non_neutral = run.non_neutral(&block);
        assert_eq!(&*non_neutral, &[indices[1]]);
    }

    #[test]
    fn segment_invariant_detects_misplaced_mutation() {
        let (block, indices) = block_with(&[(150, 0.1)]);
        let mut run = MutationRun::new();
        emplace_back(&mut run, &block, indices[0]);

        assert!(run.check_segment_invariant(&block, 100, 1).is_ok());
        assert!(run.check_segment_invariant(&block, 100, 0).is_err());
    }
}
