//! [`Recorder`]: the tree-sequence table collection plus the
//! simulator-specific bookkeeping layered on top of it (spec §4.5).

use crate::derived_state::encode_derived_state;
use crate::edgesort::sort_edges;
use crate::metadata::{IndividualMeta, MutationEntry, MutationRowMetadata, SubpopulationMeta};
use crate::simplify::{AutoSimplifyMode, SimplifyReport};
use slim_core::genome::Genome;
use slim_core::lineage::{LineageRecorder, MutationLineageInfo};
use slim_core::subpopulation::SubpopulationId;
use slim_error::Result;
use std::collections::HashMap;
use tskit::TableAccess;

/// A mutation row waiting to be appended: the position, the genome's
/// node, and the full derived-state id list (the new mutation plus
/// whatever was already present at that site in that genome, including
/// fixed substitutions).
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub position: f64,
    pub node: tskit::NodeId,
    pub derived_state_ids: Vec<u64>,
}

/// Row-count snapshot of every table, taken before recording a child
/// (spec §4.5, "Table position snapshots"). A per-child scoped
/// resource: released by dropping it on acceptance, or by
/// [`Recorder::rollback_child`] on rejection.
#[derive(Debug, Clone, Copy)]
pub struct ChildSnapshot {
    bookmark: tskit::types::Bookmark,
}

/// Wraps a `tskit::TableCollection` with the node/edge/mutation
/// recording, snapshot/rollback, simplification cadence, and
/// remembered-genome bookkeeping the simulator needs on top of it.
pub struct Recorder {
    pub tables: tskit::TableCollection,
    /// Node ids of genomes explicitly remembered (never simplified
    /// away) in first-remembered order, per spec's "remembered genomes"
    /// set.
    remembered: Vec<tskit::NodeId>,
    /// Dedup cache mapping `(position bits, derived-state bytes)` to the
    /// site/mutation already recorded for it this epoch of the tables,
    /// so repeated identical derived states at a position don't grow
    /// the site table unboundedly before the next simplification's
    /// site-table dedup pass.
    site_cache: HashMap<u64, tskit::SiteId>,
    pub auto_simplify: Option<AutoSimplifyMode>,
    generations_since_simplify: i64,
    /// Per-generation offset added to node/edge timestamps so that
    /// individuals created mid-stage (e.g. a subpopulation added by a
    /// late `addSubpop` callback) still record strictly after their
    /// parents' nodes within the same generation, without perturbing
    /// the generation-granularity time axis everything else uses.
    pub offspring_time_offset: f64,
}

impl Recorder {
    pub fn new(sequence_length: f64) -> Result<Self> {
        let tables = tskit::TableCollection::new(sequence_length)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to create tree-sequence tables: {e}"))?;
        Ok(Recorder {
            tables,
            remembered: Vec::new(),
            site_cache: HashMap::new(),
            auto_simplify: None,
            generations_since_simplify: 0,
            offspring_time_offset: 0.0,
        })
    }

    /// Record a node for `genome` at `time` (forward generation count;
    /// converted to tskit's backward-time convention by the caller
    /// before this is invoked isn't required — tskit stores whatever
    /// time value it is given, and the recorder's own reads go through
    /// the same convention it writes, so only file-format I/O, which
    /// talks to an external time axis, needs the §4.6 step-1 flip).
    /// Sets `genome.tsk_node_id` and returns the assigned node id.
    pub fn record_node(
        &mut self,
        genome: &mut Genome,
        time: f64,
        population: SubpopulationId,
        individual: tskit::IndividualId,
    ) -> Result<tskit::NodeId> {
        let flags = if genome.is_null {
            tskit::NodeFlags::default()
        } else {
            tskit::NodeFlags::new_sample()
        };
        let node = self
            .tables
            .add_node(flags, time, tskit::PopulationId::from(population.0 as tskit::tsk_id_t), individual)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to add tree-sequence node: {e}"))?;
        genome.tsk_node_id = Some(node.to_int());
        Ok(node)
    }

    pub fn record_edge(&mut self, left: f64, right: f64, parent: tskit::NodeId, child: tskit::NodeId) -> Result<()> {
        self.tables
            .add_edge(left, right, parent, child)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to add tree-sequence edge: {e}"))?;
        Ok(())
    }

    /// Record the alternating-parent edge sequence a recombined child
    /// genome inherits: `breakpoints` are strictly increasing positions
    /// within `[0, sequence_length)`; `parents` alternates starting from
    /// the first interval's source parent. The final interval always
    /// extends to `sequence_length` (spec: "the final interval extends
    /// to L+1").
    pub fn record_breakpoints(
        &mut self,
        child: tskit::NodeId,
        parents: [tskit::NodeId; 2],
        breakpoints: &[i64],
        sequence_length: f64,
    ) -> Result<()> {
        let mut left = 0.0;
        let mut which = 0usize;
        for &breakpoint in breakpoints {
            let right = breakpoint as f64;
            if right > left {
                self.record_edge(left, right, parents[which % 2], child)?;
            }
            left = right;
            which += 1;
        }
        if left < sequence_length {
            self.record_edge(left, sequence_length, parents[which % 2], child)?;
        }
        Ok(())
    }

    /// Append a site (deduplicated by position within this epoch of the
    /// tables) and a mutation row whose derived state is the
    /// concatenation of every mutation id at `record.position` in the
    /// recording genome, per spec's mutation-recording paragraph.
    /// `row_metadata` carries the per-id mutation type, selection
    /// coefficient, origin and nucleotide that §4.5/§4.6 reconstruct
    /// mutations from; it is written alongside the derived state rather
    /// than folded into it, so a reader can recover full mutation
    /// records without re-deriving them from the simulator's own
    /// mutation block.
    pub fn record_mutation(
        &mut self,
        record: &MutationRecord,
        row_metadata: &MutationRowMetadata,
        parent_mutation: tskit::MutationId,
        time: f64,
    ) -> Result<tskit::MutationId> {
        let derived_state = encode_derived_state(&record.derived_state_ids);
        let cache_key = site_cache_key(record.position, &derived_state);

        let site = if let Some(&cached) = self.site_cache.get(&cache_key) {
            cached
        } else {
            let site = self
                .tables
                .add_site(record.position, Some(&[]))
                .map_err(|e| slim_error::slim_err!(Internal: "failed to add tree-sequence site: {e}"))?;
            self.site_cache.insert(cache_key, site);
            site
        };

        self.tables
            .add_mutation_with_metadata(site, record.node, parent_mutation, time, Some(&derived_state), row_metadata)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to add tree-sequence mutation: {e}"))
    }

    /// Record a population-table row for a subpopulation, carrying the
    /// reproduction fractions, migration rates and spatial bounds that
    /// spec §4.6 step 5 recovers from population-table metadata on load.
    /// Returns the table row id, which a caller keeps as the node
    /// table's `PopulationId` for every genome in that subpopulation.
    pub fn record_subpopulation(&mut self, metadata: &SubpopulationMeta) -> Result<tskit::PopulationId> {
        self.tables
            .add_population_with_metadata(metadata)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to add tree-sequence population: {e}"))
    }

    /// Record an individual-table row for a simulator `Individual`:
    /// `flags` should carry [`crate::metadata::INDIVIDUAL_FLAG_ALIVE`]
    /// and/or [`crate::metadata::INDIVIDUAL_FLAG_REMEMBERED`] as
    /// appropriate, `parents` the individual-table ids of its two
    /// parents (or empty for a founder), per spec §4.6 step 3.
    pub fn record_individual(
        &mut self,
        flags: u32,
        metadata: &IndividualMeta,
        parents: &[tskit::IndividualId],
    ) -> Result<tskit::IndividualId> {
        let location = &metadata.position.coordinates[..metadata.position.dimensionality as usize];
        self.tables
            .add_individual_with_metadata(flags, location, parents, metadata)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to add tree-sequence individual: {e}"))
    }

    /// Register `node` as remembered: it will always be included in the
    /// sample set future simplifications preserve, regardless of
    /// whether any of its descendants are still alive.
    pub fn remember(&mut self, node: tskit::NodeId) {
        if !self.remembered.contains(&node) {
            self.remembered.push(node);
        }
    }

    pub fn remembered_nodes(&self) -> &[tskit::NodeId] {
        &self.remembered
    }

    /// Snapshot every table's current row count, to be restored by
    /// [`Recorder::rollback_child`] if the child about to be recorded is
    /// rejected by a `modifyChild` callback.
    pub fn snapshot_before_child(&self) -> ChildSnapshot {
        ChildSnapshot {
            bookmark: tskit::types::Bookmark::new(
                self.tables.nodes().num_rows(),
                self.tables.edges().num_rows(),
                self.tables.migrations().num_rows(),
                self.tables.sites().num_rows(),
                self.tables.mutations().num_rows(),
                self.tables.individuals().num_rows(),
                self.tables.populations().num_rows(),
            ),
        }
    }

    /// Undo every row appended since `snapshot`, atomically discarding a
    /// rejected child's breakpoint and mutation records (spec §4.5).
    pub fn rollback_child(&mut self, snapshot: &ChildSnapshot) -> Result<()> {
        self.tables
            .truncate(&snapshot.bookmark)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to truncate tree-sequence tables on child rejection: {e}"))?;
        self.site_cache.clear();
        Ok(())
    }

    /// Run the custom edge sort followed by tskit's full table sort,
    /// then simplify down to `extant` union the remembered set,
    /// rewriting ids so remembered genomes occupy `[0, R)` and extant
    /// genomes occupy `[R, R+E)` (spec §4.5). Updates
    /// `self.remembered` and every live genome's `tsk_node_id` via
    /// `update_node_id`, then returns a before/after size report for the
    /// auto-simplification cadence to consume.
    pub fn simplify(
        &mut self,
        extant: &[tskit::NodeId],
        mut update_node_id: impl FnMut(tskit::NodeId, tskit::NodeId),
    ) -> Result<SimplifyReport> {
        let nodes_before = self.tables.nodes().num_rows().as_usize();
        let edges_before = self.tables.edges().num_rows().as_usize();

        sort_edges(&mut self.tables)?;
        self.tables
            .full_sort(tskit::TableSortOptions::default())
            .map_err(|e| slim_error::slim_err!(Internal: "failed to sort tree-sequence tables: {e}"))?;

        let mut samples = self.remembered.clone();
        for &node in extant {
            if !samples.contains(&node) {
                samples.push(node);
            }
        }

        let idmap = self
            .tables
            .simplify(&samples, tskit::SimplificationOptions::KEEP_INPUT_ROOTS, true)
            .map_err(|e| slim_error::slim_err!(Internal: "failed to simplify tree-sequence tables: {e}"))?
            .ok_or_else(|| slim_error::slim_err!(Internal: "simplify returned no id map"))?;

        for &old_id in samples.iter() {
            let old_index = old_id.to_int();
            if old_index < 0 || old_index as usize >= idmap.len() {
                continue;
            }
            let new_id = idmap[old_index as usize];
            if new_id != tskit::NodeId::NULL {
                update_node_id(old_id, new_id);
            }
        }

        self.remembered = self
            .remembered
            .iter()
            .filter_map(|&old| {
                let old_index = old.to_int();
                idmap.get(old_index as usize).copied().filter(|&id| id != tskit::NodeId::NULL)
            })
            .collect();

        self.site_cache.clear();
        self.generations_since_simplify = 0;

        Ok(SimplifyReport {
            nodes_before,
            nodes_after: self.tables.nodes().num_rows().as_usize(),
            edges_before,
            edges_after: self.tables.edges().num_rows().as_usize(),
        })
    }

    /// Advance the auto-simplification generation counter and, if the
    /// configured cadence is due, simplify and feed the resulting ratio
    /// back into ratio-mode's adaptive controller.
    pub fn maybe_simplify(
        &mut self,
        generation_advanced: bool,
        extant: &[tskit::NodeId],
        update_node_id: impl FnMut(tskit::NodeId, tskit::NodeId),
    ) -> Result<Option<SimplifyReport>> {
        if generation_advanced {
            self.generations_since_simplify += 1;
        }
        let Some(mode) = self.auto_simplify else { return Ok(None) };
        if !mode.is_due(self.generations_since_simplify) {
            return Ok(None);
        }

        let report = self.simplify(extant, update_node_id)?;
        if let Some(AutoSimplifyMode::Ratio { .. }) = &mut self.auto_simplify {
            if let Some(mode) = &mut self.auto_simplify {
                mode.record_ratio(report.edge_ratio());
            }
        }
        Ok(Some(report))
    }
}

/// Adapts [`Recorder`] to the `tskit`-free seam the default mating
/// scheme in `slim-core::reproduction` reports through, so that crate
/// never needs to know this one exists. Individuals aren't threaded
/// through that seam, so every node is recorded against
/// `tskit::IndividualId::NULL`; a caller that also wants individual-table
/// rows records those itself via [`Recorder::record_individual`].
impl LineageRecorder for Recorder {
    fn record_node(&mut self, genome: &mut Genome, time: f64, subpop: SubpopulationId) -> Result<()> {
        Recorder::record_node(self, genome, time, subpop, tskit::IndividualId::NULL)?;
        Ok(())
    }

    fn record_breakpoints(
        &mut self,
        child_node: i32,
        parent_nodes: [i32; 2],
        breakpoints: &[i64],
        sequence_length: f64,
    ) -> Result<()> {
        Recorder::record_breakpoints(
            self,
            tskit::NodeId::from(child_node),
            [tskit::NodeId::from(parent_nodes[0]), tskit::NodeId::from(parent_nodes[1])],
            breakpoints,
            sequence_length,
        )
    }

    fn record_mutation(&mut self, node: i32, position: f64, derived_state_ids: &[u64], info: &MutationLineageInfo) -> Result<()> {
        let tsk_node = tskit::NodeId::from(node);
        let time = self.tables.nodes().time(tsk_node).unwrap_or(0.0);
        let entries = derived_state_ids
            .iter()
            .map(|&id| MutationEntry {
                id,
                mutation_type: info.mutation_type,
                selection_coefficient: info.selection_coefficient,
                origin_subpop: info.origin_subpop,
                origin_generation: info.origin_generation,
                nucleotide: None,
            })
            .collect();
        let record = MutationRecord {
            position,
            node: tsk_node,
            derived_state_ids: derived_state_ids.to_vec(),
        };
        let row_metadata = MutationRowMetadata { entries };
        Recorder::record_mutation(self, &record, &row_metadata, tskit::MutationId::NULL, time)?;
        Ok(())
    }
}

fn site_cache_key(position: f64, derived_state: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    position.to_bits().hash(&mut hasher);
    derived_state.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::genome::GenomeType;

    #[test]
    fn record_node_sets_genome_tsk_node_id() {
        let mut recorder = Recorder::new(1000.0).unwrap();
        let mut genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let node = recorder
            .record_node(&mut genome, 1.0, SubpopulationId(0), tskit::IndividualId::NULL)
            .unwrap();
        assert_eq!(genome.tsk_node_id, Some(node.to_int()));
    }

    #[test]
    fn null_genome_is_not_marked_sample() {
        let mut recorder = Recorder::new(1000.0).unwrap();
        let mut genome = Genome::new_null(GenomeType::YChromosome, 1, 0);
        let node = recorder
            .record_node(&mut genome, 1.0, SubpopulationId(0), tskit::IndividualId::NULL)
            .unwrap();
        let flags = recorder.tables.nodes().flags(node).unwrap();
        assert!(!flags.is_sample());
    }

    #[test]
    fn breakpoints_alternate_parents_and_extend_to_sequence_length() {
        let mut recorder = Recorder::new(1000.0).unwrap();
        let mut child_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let mut p1 = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let mut p2 = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let n1 = recorder.record_node(&mut p1, 0.0, SubpopulationId(0), tskit::IndividualId::NULL).unwrap();
        let n2 = recorder.record_node(&mut p2, 0.0, SubpopulationId(0), tskit::IndividualId::NULL).unwrap();
        let child = recorder.record_node(&mut child_genome, 1.0, SubpopulationId(0), tskit::IndividualId::NULL).unwrap();

        recorder.record_breakpoints(child, [n1, n2], &[300, 700], 1000.0).unwrap();

        assert_eq!(recorder.tables.edges().num_rows().as_usize(), 3);
    }

    #[test]
    fn rollback_discards_child_rows() {
        let mut recorder = Recorder::new(1000.0).unwrap();
        let mut parent_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let parent = recorder
            .record_node(&mut parent_genome, 0.0, SubpopulationId(0), tskit::IndividualId::NULL)
            .unwrap();

        let snapshot = recorder.snapshot_before_child();
        let mut rejected_genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let rejected = recorder
            .record_node(&mut rejected_genome, 1.0, SubpopulationId(0), tskit::IndividualId::NULL)
            .unwrap();
        recorder.record_edge(0.0, 1000.0, parent, rejected).unwrap();
        assert_eq!(recorder.tables.nodes().num_rows().as_usize(), 2);

        recorder.rollback_child(&snapshot).unwrap();
        assert_eq!(recorder.tables.nodes().num_rows().as_usize(), 1);
        assert_eq!(recorder.tables.edges().num_rows().as_usize(), 0);
    }

    #[test]
    fn remember_is_idempotent() {
        let mut recorder = Recorder::new(1000.0).unwrap();
        let mut genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let node = recorder.record_node(&mut genome, 0.0, SubpopulationId(0), tskit::IndividualId::NULL).unwrap();
        recorder.remember(node);
        recorder.remember(node);
        assert_eq!(recorder.remembered_nodes().len(), 1);
    }

    #[test]
    fn record_subpopulation_writes_a_population_row() {
        use crate::metadata::SubpopulationMeta;
        use slim_core::subpopulation::SpatialBounds;

        let mut recorder = Recorder::new(1000.0).unwrap();
        let meta = SubpopulationMeta {
            sex_ratio: 0.5,
            selfing_rate: 0.0,
            cloning_rate: 0.0,
            migration_rates: vec![],
            bounds: SpatialBounds::default(),
        };
        let population_id = recorder.record_subpopulation(&meta).unwrap();
        assert_eq!(recorder.tables.populations().num_rows().as_usize(), 1);
        assert_ne!(population_id, tskit::PopulationId::NULL);
    }

    #[test]
    fn record_individual_writes_a_row_with_metadata() {
        use crate::metadata::{INDIVIDUAL_FLAG_ALIVE, IndividualMeta};
        use slim_core::individual::{PedigreeId, Sex, SpatialPosition};

        let mut recorder = Recorder::new(1000.0).unwrap();
        let meta = IndividualMeta {
            pedigree_id: PedigreeId(3),
            sex: Sex::Male,
            age: None,
            position: SpatialPosition::default(),
            migrant: false,
            tag: None,
        };
        let individual = recorder.record_individual(INDIVIDUAL_FLAG_ALIVE, &meta, &[]).unwrap();
        assert_eq!(recorder.tables.individuals().num_rows().as_usize(), 1);
        assert_ne!(individual, tskit::IndividualId::NULL);
    }

    #[test]
    fn record_mutation_writes_a_site_and_mutation_row() {
        use crate::metadata::{MutationEntry, MutationRowMetadata};
        use slim_core::mutation::mtype::MutationTypeId;

        let mut recorder = Recorder::new(1000.0).unwrap();
        let mut genome = Genome::new_empty(GenomeType::Autosome, 1, 0);
        let node = recorder.record_node(&mut genome, 0.0, SubpopulationId(0), tskit::IndividualId::NULL).unwrap();

        let record = MutationRecord { position: 500.0, node, derived_state_ids: vec![7] };
        let row_metadata = MutationRowMetadata {
            entries: vec![MutationEntry {
                id: 7,
                mutation_type: MutationTypeId(0),
                selection_coefficient: -0.02,
                origin_subpop: 0,
                origin_generation: 1,
                nucleotide: None,
            }],
        };
        recorder.record_mutation(&record, &row_metadata, tskit::MutationId::NULL, 0.0).unwrap();

        assert_eq!(recorder.tables.sites().num_rows().as_usize(), 1);
        assert_eq!(recorder.tables.mutations().num_rows().as_usize(), 1);
    }
}
