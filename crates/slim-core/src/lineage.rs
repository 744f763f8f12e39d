//! A narrow, `tskit`-free recording seam the default mating scheme
//! reports genome/edge/mutation events through (spec §4.5). This crate
//! has no notion of a tree-sequence table collection — that lives in
//! `slim-treeseq`, a layer above this one — so [`LineageRecorder`] is
//! expressed entirely in terms of this crate's own types plus the raw
//! node-id convention [`crate::genome::Genome::tsk_node_id`] already
//! carries, letting a caller in a higher crate adapt it to whatever
//! table collection it owns without this crate depending on `tskit`.

use crate::genome::Genome;
use crate::mutation::mtype::MutationTypeId;
use crate::subpopulation::SubpopulationId;
use slim_error::Result;

/// The mutation-table-row fields spec §4.6 records alongside a
/// mutation's derived state, independent of any tree-sequence crate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationLineageInfo {
    pub mutation_type: MutationTypeId,
    pub selection_coefficient: f64,
    pub origin_subpop: i32,
    pub origin_generation: i64,
}

/// Implemented by whatever owns the tree-sequence tables (`slim-treeseq`'s
/// `Recorder`, in this workspace) so the default mating scheme in
/// [`crate::reproduction`] can report every genome it creates without
/// this crate knowing what a node table even is.
pub trait LineageRecorder {
    /// Assign `genome` a fresh tree-sequence node at `time`, setting its
    /// `tsk_node_id`.
    fn record_node(&mut self, genome: &mut Genome, time: f64, subpop: SubpopulationId) -> Result<()>;

    /// Record the alternating-parent edge sequence a child genome
    /// inherits; an empty `breakpoints` means the whole chromosome came
    /// from `parent_nodes[0]` (cloning, or the unrecombined half of
    /// sex-linked inheritance).
    fn record_breakpoints(
        &mut self,
        child_node: i32,
        parent_nodes: [i32; 2],
        breakpoints: &[i64],
        sequence_length: f64,
    ) -> Result<()>;

    /// Record one newly-arisen mutation at `node`/`position`.
    /// `derived_state_ids` is the full id list at that site in that
    /// genome (the new mutation plus whatever was already stacked
    /// there).
    fn record_mutation(&mut self, node: i32, position: f64, derived_state_ids: &[u64], info: &MutationLineageInfo) -> Result<()>;
}
