use crate::chromosome::GenomeType;
use crate::mutation::{MutationBlock, MutationIndex, MutationType};
use crate::run::{MutationRun, RunPool, emplace_back};
use crate::subpopulation::SubpopulationId;
use slim_error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GenomeId(pub u64);

fn next_genome_id() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// One haploid chromosome copy: a fixed-length array of
/// [`MutationRun`] handles, one per chromosome segment.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Genome {
    pub id: GenomeId,
    pub genome_type: GenomeType,
    /// True for the absent homologous copy under sex-linked inheritance
    /// (e.g. the Y in an XY male's second genome slot). A null genome
    /// carries zero mutations by invariant (spec §8.4).
    pub is_null: bool,
    pub subpopulation: SubpopulationId,
    /// Row index into the tree-sequence node table; rewritten by
    /// simplification (GLOSSARY, "tsk-node-id").
    pub tsk_node_id: Option<i32>,
    runs: Vec<MutationRun>,
}

impl Genome {
    pub fn new_empty(genome_type: GenomeType, mutrun_count: u32, subpopulation: u32) -> Self {
        Genome {
            id: GenomeId(next_genome_id()),
            genome_type,
            is_null: false,
            subpopulation: SubpopulationId(subpopulation),
            tsk_node_id: None,
            runs: vec![MutationRun::new(); mutrun_count as usize],
        }
    }

    pub fn new_null(genome_type: GenomeType, mutrun_count: u32, subpopulation: u32) -> Self {
        let mut genome = Genome::new_empty(genome_type, mutrun_count, subpopulation);
        genome.is_null = true;
        genome
    }

    pub fn with_id(id: GenomeId, genome_type: GenomeType, mutrun_count: u32, subpopulation: u32) -> Self {
        let mut genome = Genome::new_empty(genome_type, mutrun_count, subpopulation);
        genome.id = id;
        genome
    }

    /// Construct a fresh genome under a new id that inherits `source`'s
    /// mutation runs, sharing the underlying allocations copy-on-write
    /// rather than deep-copying them. Every carried mutation is
    /// `retain`ed in `block`, since this genome is now one more
    /// reference to it. Used for cloning reproduction and for the
    /// unrecombined half of sex-linked inheritance (spec §4.4 stage 2).
    pub fn inherit(source: &Genome, block: &mut MutationBlock, subpopulation: u32) -> Genome {
        for run in source.runs() {
            for &index in run.indices() {
                block.retain(index);
            }
        }
        Genome {
            id: GenomeId(next_genome_id()),
            genome_type: source.genome_type,
            is_null: source.is_null,
            subpopulation: SubpopulationId(subpopulation),
            tsk_node_id: None,
            runs: source.runs.clone(),
        }
    }

    pub fn mutrun_count(&self) -> usize {
        self.runs.len()
    }

    pub fn run(&self, index: usize) -> &MutationRun {
        &self.runs[index]
    }

    pub fn runs(&self) -> &[MutationRun] {
        &self.runs
    }

    pub fn runs_mut(&mut self) -> &mut [MutationRun] {
        &mut self.runs
    }

    pub fn set_run(&mut self, index: usize, run: MutationRun) {
        self.runs[index] = run;
    }

    /// Replace the entire run array, changing `mutrun_count` if `runs`
    /// has a different length. Used by the experimenter-driven
    /// split/join transition (spec §4.2 "Transitions"), which doubles or
    /// halves the number of segments a genome is divided into; unlike
    /// [`Genome::set_run`], this can grow or shrink the array.
    pub fn replace_runs(&mut self, runs: Vec<MutationRun>) {
        self.runs = runs;
    }

    /// Total number of mutations carried across all runs.
    pub fn mutation_count(&self) -> usize {
        self.runs.iter().map(MutationRun::len).sum()
    }

    pub fn contains_mutation(&self, segment: usize, index: MutationIndex) -> bool {
        self.runs[segment].contains(index)
    }

    /// Append a new mutation to the run covering its chromosome segment,
    /// copy-on-writing that run first. The caller is responsible for
    /// having `retain`ed `index` in the block.
    pub fn add_mutation(&mut self, block: &MutationBlock, mutrun_length: i64, index: MutationIndex) {
        let position = block.get(index).position;
        let segment = (position / mutrun_length) as usize;
        emplace_back(&mut self.runs[segment], block, index);
    }

    /// Insert a mutation applying `mutation_type`'s stacking policy,
    /// returning any mutation index that stacking evicted so the caller
    /// can release it from the block.
    pub fn insert_mutation_with_stacking(
        &mut self,
        block: &MutationBlock,
        mutrun_length: i64,
        index: MutationIndex,
        mutation_type: &MutationType,
    ) -> Result<Option<MutationIndex>> {
        let position = block.get(index).position;
        let segment = (position / mutrun_length) as usize;
        self.runs[segment].insert_with_stacking(block, index, mutation_type.stacking_policy)
    }

    /// Remove every occurrence of `index` from every run, used when the
    /// registry sweep fixes a mutation (spec §4.4 stage 3).
    pub fn remove_mutation(&mut self, index: MutationIndex) -> bool {
        self.runs.iter_mut().any(|run| run.remove(index))
    }

    /// Release this genome's run handles back to `pool` (e.g. when
    /// clearing the parental generation's mutation runs at the WF swap,
    /// spec §4.4 stage 2), replacing each with a freshly-pooled empty
    /// run.
    pub fn clear_runs(&mut self, pool: &mut RunPool) {
        for run in &mut self.runs {
            let old = std::mem::replace(run, MutationRun::new());
            pool.release(old);
        }
        self.runs = (0..self.runs.len()).map(|_| pool.acquire()).collect();
    }

    /// Invariant check: a null genome must carry zero mutations in every
    /// run (spec §8.4).
    pub fn check_null_invariant(&self) -> Result<()> {
        if self.is_null && self.runs.iter().any(|r| !r.is_empty()) {
            slim_error::slim_bail!(Internal: "null genome {:?} carries mutations", self.id);
        }
        Ok(())
    }

    /// Sorted list of every mutation index this genome carries, across
    /// all runs, used by round-trip equality checks (spec §8.8).
    pub fn sorted_mutation_indices(&self) -> Vec<MutationIndex> {
        let mut all: Vec<_> = self.runs.iter().flat_map(|r| r.indices().to_vec()).collect();
        all.sort_unstable();
        all
    }
}
