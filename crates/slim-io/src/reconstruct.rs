//! Table-collection → live `Population` reconstruction (spec §4.6's
//! ten-step pipeline): the inverse of everything `slim_treeseq::Recorder`
//! writes. The writer owns per-row encoding; this module owns decoding a
//! loaded `TableCollection` back into `slim-core` state, since that
//! direction needs its own multi-pass algorithm (variant-iterator walks,
//! per-subpop tabulation) rather than a one-row-at-a-time mirror of the
//! writer.

use slim_core::chromosome::Chromosome;
use slim_core::genome::{Genome, GenomeType};
use slim_core::individual::{Individual, Sex};
use slim_core::mutation::{MutationIndex, MutationType, MutationTypeId, Substitution, SubstitutionList};
use slim_core::population::Population;
use slim_core::subpopulation::{Subpopulation, SubpopulationId};
use slim_error::Result;
use slim_treeseq::{INDIVIDUAL_FLAG_ALIVE, INDIVIDUAL_FLAG_REMEMBERED, IndividualMeta, MutationRowMetadata, SubpopulationMeta};
use std::collections::HashMap;
use tskit::TableAccess;
use tskit::metadata::{IndividualMetadata, MetadataError, MetadataRoundtrip, MutationMetadata, PopulationMetadata};

/// Carries a table row's metadata bytes through the time-flip rebuild
/// without decoding them, the same trick `tables_text.rs` uses for text
/// round-tripping: this pass only needs to move rows to a fresh table
/// collection, not interpret them.
struct RawMetadata(Vec<u8>);

impl MetadataRoundtrip for RawMetadata {
    fn encode(&self) -> std::result::Result<Vec<u8>, MetadataError> {
        Ok(self.0.clone())
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Self, MetadataError> {
        Ok(RawMetadata(bytes.to_vec()))
    }
}

impl IndividualMetadata for RawMetadata {}
impl MutationMetadata for RawMetadata {}
impl PopulationMetadata for RawMetadata {}

/// Whether the loaded tables' node times are already in forward
/// (simulator) time, or in tskit's native backwards-from-present
/// convention and still need the step-1 flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeConvention {
    Forward,
    TskitBackward,
}

/// Everything [`reconstruct_population`] recovers beyond the
/// `Population` itself.
pub struct ReconstructedPopulation {
    pub population: Population,
    /// Node ids of the remembered-genome set, restored to the leading
    /// rows of the node table (spec §4.6 step 9) in first-remembered
    /// order, so a caller can feed them straight back into a fresh
    /// `Recorder`.
    pub remembered_nodes: Vec<tskit::NodeId>,
    pub generation: i64,
}

struct AliveRow {
    subpop_id: u32,
    meta: IndividualMeta,
    remembered: bool,
    nodes: [tskit::NodeId; 2],
}

/// Rebuild a `Population` from a loaded `TableCollection`, following the
/// ten-step pipeline of spec §4.6. `chromosome` supplies the mutrun
/// geometry new genomes are built with; `mutation_types` is the
/// already-configured catalog mutations are cross-checked against.
pub fn reconstruct_population(
    tables: tskit::TableCollection,
    chromosome: &Chromosome,
    mutation_types: HashMap<MutationTypeId, MutationType>,
    generation: i64,
    time_convention: TimeConvention,
) -> Result<ReconstructedPopulation> {
    // Step 1: tskit's backward time axis counts down from the present;
    // the simulator's own axis counts forward from generation 0. Rebuild
    // the tables with every node time flipped rather than mutate in
    // place, matching this crate's read functions, which always
    // construct a fresh `TableCollection`.
    let tables = match time_convention {
        TimeConvention::Forward => tables,
        TimeConvention::TskitBackward => rebuild_with_flipped_node_times(&tables, generation)?,
    };

    // Step 2: build a tree-sequence handle for query access (variant
    // iteration in steps 6 and 8).
    let tree_sequence = tables
        .tree_sequence(tskit::TreeSequenceFlags::BUILD_INDEXES)
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to build tree sequence for reconstruction: {e}"))?;

    // Step 3: tabulate alive individuals (filter by ALIVE flag), finding
    // each one's two tree-sequence nodes via the node table's individual
    // column.
    let node_individuals = node_individual_map(&tables);
    let alive_rows = tabulate_alive_individuals(&tables, &node_individuals)?;

    // Step 4/5: create subpopulations sized to match, then configure
    // per-subpop parameters from population-table metadata.
    let mut population = Population::new(mutation_types.clone());
    let mut subpop_meta: HashMap<u32, SubpopulationMeta> = HashMap::new();
    let mut node_to_genome: HashMap<tskit::NodeId, (u32, usize, usize)> = HashMap::new();

    build_subpopulations(&tables, &alive_rows, chromosome, &mut population, &mut subpop_meta, &mut node_to_genome)?;
    apply_subpopulation_metadata(&mut population, &subpop_meta);

    // Step 6: tabulate mutations, walking the mutation table once to
    // learn every id's metadata and position, then a variant iterator
    // once to learn each id's refcount across the sampled nodes.
    let id_to_index = tabulate_mutation_metadata(&tables, &mut population)?;
    let id_to_refcount = tabulate_mutation_refcounts(&tree_sequence, &node_to_genome, &id_to_index)?;

    // Step 7: materialize mutations — fixed ones (refcount equals the
    // non-null genome count, and the type converts) become
    // substitutions; everything else stays a live mutation in the block.
    let total_non_null_genomes = population.total_non_null_genomes();
    let mut live_index_of_id: HashMap<u64, MutationIndex> = HashMap::new();
    let mut substitutions = SubstitutionList::new();
    for (&id, &index) in &id_to_index {
        let refcount = id_to_refcount.get(&id).copied().unwrap_or(0);
        let mutation = population.mutation_block.get(index).clone();
        let converts = mutation_types.get(&mutation.mutation_type).map(|t| t.convert_to_substitution).unwrap_or(true);

        if refcount == total_non_null_genomes && total_non_null_genomes > 0 && converts {
            substitutions.push(Substitution::from_fixed_mutation(&mutation, generation));
            population.mutation_block.release(index)?;
        } else {
            live_index_of_id.insert(id, index);
        }
    }
    population.substitutions = substitutions;

    // Step 8: walk variants a second time, appending each live mutation
    // index to the correct mutation run of the correct genome.
    append_mutations_to_genomes(&tree_sequence, &tables, &mut population, &live_index_of_id, &node_to_genome)?;

    // Step 9: restore the remembered-genomes set to the leading rows of
    // the node table (already guaranteed by construction order here,
    // since remembered rows are recorded first by the writer; this just
    // surfaces that set to the caller).
    let remembered_nodes = alive_rows.iter().filter(|row| row.remembered).flat_map(|row| row.nodes).collect();

    // Step 10: retally mutation reference counts, then on first load run
    // the debug cross-check that the registry and block still agree.
    population.retally();
    if cfg!(debug_assertions) {
        population.registry.check_against_block(&population.mutation_block)?;
    }

    Ok(ReconstructedPopulation { population, remembered_nodes, generation })
}

fn rebuild_with_flipped_node_times(tables: &tskit::TableCollection, generation: i64) -> Result<tskit::TableCollection> {
    let mut out = tskit::TableCollection::new(tables.sequence_length())
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to create table collection for time-flip rebuild: {e}"))?;

    let nodes = tables.nodes();
    for row in 0..nodes.num_rows().as_usize() {
        let id = tskit::NodeId::from(row as tskit::tsk_id_t);
        let flags = nodes.flags(id).unwrap_or_default();
        let time = generation as f64 - nodes.time(id).unwrap_or(0.0);
        let population = nodes.population(id).unwrap_or(tskit::PopulationId::NULL);
        let individual = nodes.individual(id).unwrap_or(tskit::IndividualId::NULL);
        out.add_node(flags, time, population, individual)
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add node row during time flip: {e}"))?;
    }

    let edges = tables.edges();
    for row in 0..edges.num_rows().as_usize() {
        let id = tskit::EdgeId::from(row as tskit::tsk_id_t);
        out.add_edge(
            edges.left(id).unwrap_or(0.0),
            edges.right(id).unwrap_or(0.0),
            edges.parent(id).unwrap_or(tskit::NodeId::NULL),
            edges.child(id).unwrap_or(tskit::NodeId::NULL),
        )
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add edge row during time flip: {e}"))?;
    }

    let sites = tables.sites();
    for row in 0..sites.num_rows().as_usize() {
        let id = tskit::SiteId::from(row as tskit::tsk_id_t);
        out.add_site(sites.position(id).unwrap_or(0.0), sites.ancestral_state(id))
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add site row during time flip: {e}"))?;
    }

    let mutations = tables.mutations();
    for row in 0..mutations.num_rows().as_usize() {
        let id = tskit::MutationId::from(row as tskit::tsk_id_t);
        out.add_mutation(
            mutations.site(id).unwrap_or(tskit::SiteId::NULL),
            mutations.node(id).unwrap_or(tskit::NodeId::NULL),
            mutations.parent(id).unwrap_or(tskit::MutationId::NULL),
            mutations.time(id).unwrap_or(f64::NAN),
            mutations.derived_state(id),
        )
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add mutation row during time flip: {e}"))?;
    }

    let individuals = tables.individuals();
    for row in 0..individuals.num_rows().as_usize() {
        let id = tskit::IndividualId::from(row as tskit::tsk_id_t);
        out.add_individual(
            individuals.flags(id).unwrap_or_default(),
            individuals.location(id).unwrap_or(&[]),
            individuals.parents(id).unwrap_or(&[]),
        )
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add individual row during time flip: {e}"))?;
    }

    for _ in 0..tables.populations().num_rows().as_usize() {
        out.add_population()
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add population row during time flip: {e}"))?;
    }

    Ok(out)
}

fn node_individual_map(tables: &tskit::TableCollection) -> HashMap<tskit::IndividualId, Vec<tskit::NodeId>> {
    let nodes = tables.nodes();
    let mut map: HashMap<tskit::IndividualId, Vec<tskit::NodeId>> = HashMap::new();
    for row in 0..nodes.num_rows().as_usize() {
        let node_id = tskit::NodeId::from(row as tskit::tsk_id_t);
        let individual = nodes.individual(node_id).unwrap_or(tskit::IndividualId::NULL);
        if individual != tskit::IndividualId::NULL {
            map.entry(individual).or_default().push(node_id);
        }
    }
    map
}

fn tabulate_alive_individuals(
    tables: &tskit::TableCollection,
    node_individuals: &HashMap<tskit::IndividualId, Vec<tskit::NodeId>>,
) -> Result<Vec<AliveRow>> {
    let individuals = tables.individuals();
    let nodes = tables.nodes();
    let mut rows = Vec::new();

    for row in 0..individuals.num_rows().as_usize() {
        let id = tskit::IndividualId::from(row as tskit::tsk_id_t);
        let flags = individuals.flags(id).unwrap_or_default();
        if flags.bits() & INDIVIDUAL_FLAG_ALIVE == 0 {
            continue;
        }

        let meta_bytes = individuals.metadata(id).unwrap_or(&[]);
        let meta = IndividualMeta::decode(meta_bytes)
            .map_err(|e| slim_error::slim_err!(FileFormat: "malformed individual metadata for row {row}: {e}"))?;

        let genome_nodes = node_individuals
            .get(&id)
            .ok_or_else(|| slim_error::slim_err!(FileFormat: "alive individual row {row} has no tree-sequence nodes"))?;
        if genome_nodes.len() != 2 {
            slim_error::slim_bail!(FileFormat: "alive individual row {row} has {} nodes, expected 2", genome_nodes.len());
        }
        let subpop_id = nodes
            .population(genome_nodes[0])
            .unwrap_or(tskit::PopulationId::NULL)
            .to_int();
        if subpop_id < 0 {
            slim_error::slim_bail!(FileFormat: "alive individual row {row} has no subpopulation");
        }

        rows.push(AliveRow {
            subpop_id: subpop_id as u32,
            remembered: flags.bits() & INDIVIDUAL_FLAG_REMEMBERED != 0,
            meta,
            nodes: [genome_nodes[0], genome_nodes[1]],
        });
    }
    Ok(rows)
}

fn build_subpopulations(
    tables: &tskit::TableCollection,
    alive_rows: &[AliveRow],
    chromosome: &Chromosome,
    population: &mut Population,
    subpop_meta: &mut HashMap<u32, SubpopulationMeta>,
    node_to_genome: &mut HashMap<tskit::NodeId, (u32, usize, usize)>,
) -> Result<()> {
    let populations = tables.populations();
    let nodes = tables.nodes();

    let mut by_subpop: HashMap<u32, Vec<&AliveRow>> = HashMap::new();
    for row in alive_rows {
        by_subpop.entry(row.subpop_id).or_default().push(row);
    }

    let mut subpop_ids: Vec<u32> = by_subpop.keys().copied().collect();
    subpop_ids.sort_unstable();

    for subpop_id in subpop_ids {
        let rows = &by_subpop[&subpop_id];
        let mut subpop = Subpopulation::new(SubpopulationId(subpop_id));

        for (index_in_subpop, row) in rows.iter().enumerate() {
            let genome_type_2 = if row.meta.sex == Sex::Male { GenomeType::YChromosome } else { GenomeType::Autosome };
            let is_null_2 = row.meta.sex == Sex::Male;

            let mut g1 = Genome::new_empty(GenomeType::Autosome, chromosome.mutrun_count(), subpop_id);
            g1.tsk_node_id = Some(row.nodes[0].to_int());
            let mut g2 = if is_null_2 {
                Genome::new_null(genome_type_2, chromosome.mutrun_count(), subpop_id)
            } else {
                Genome::new_empty(genome_type_2, chromosome.mutrun_count(), subpop_id)
            };
            g2.tsk_node_id = Some(row.nodes[1].to_int());

            node_to_genome.insert(row.nodes[0], (subpop_id, index_in_subpop, 0));
            node_to_genome.insert(row.nodes[1], (subpop_id, index_in_subpop, 1));

            let mut individual = Individual::new(row.meta.pedigree_id, g1, g2, row.meta.sex);
            individual.age = row.meta.age;
            individual.position = row.meta.position;
            individual.migrant = row.meta.migrant;
            individual.tag = row.meta.tag;
            subpop.parents.push(individual);
        }

        let population_row = nodes.population(rows[0].nodes[0]).unwrap_or(tskit::PopulationId::NULL);
        if population_row.to_int() >= 0 && (population_row.to_int() as usize) < populations.num_rows().as_usize() {
            if let Some(meta_bytes) = populations.metadata(population_row) {
                if let Ok(meta) = SubpopulationMeta::decode(meta_bytes) {
                    subpop_meta.insert(subpop_id, meta);
                }
            }
        }

        population.subpopulations.push(subpop);
    }

    population.subpopulations.sort_by_key(|s| s.id.0);
    Ok(())
}

fn apply_subpopulation_metadata(population: &mut Population, subpop_meta: &HashMap<u32, SubpopulationMeta>) {
    for subpop in &mut population.subpopulations {
        let Some(meta) = subpop_meta.get(&subpop.id.0) else { continue };
        subpop.sex_ratio = meta.sex_ratio;
        subpop.selfing_rate = meta.selfing_rate;
        subpop.cloning_rate = meta.cloning_rate;
        subpop.bounds = meta.bounds;
        for &(source, rate) in &meta.migration_rates {
            subpop.migration_rates.insert(SubpopulationId(source), rate);
        }
    }
}

/// Walk the mutation table once, decoding each row's metadata and
/// allocating a fresh block slot for every mutation id seen for the
/// first time. Returns the id → block-index map later passes key off of.
fn tabulate_mutation_metadata(tables: &tskit::TableCollection, population: &mut Population) -> Result<HashMap<u64, MutationIndex>> {
    let mut id_to_index = HashMap::new();
    let mutations = tables.mutations();
    let sites = tables.sites();

    for row in 0..mutations.num_rows().as_usize() {
        let mutation_id = tskit::MutationId::from(row as tskit::tsk_id_t);
        let meta_bytes = mutations.metadata(mutation_id).unwrap_or(&[]);
        let Ok(row_metadata) = MutationRowMetadata::decode(meta_bytes) else { continue };
        let site = mutations.site(mutation_id).unwrap_or(tskit::SiteId::NULL);
        let position = sites.position(site).unwrap_or(0.0) as i64;

        for entry in &row_metadata.entries {
            id_to_index.entry(entry.id).or_insert_with(|| {
                population.mutation_block.allocate(
                    entry.mutation_type,
                    position,
                    entry.selection_coefficient,
                    entry.origin_subpop,
                    entry.origin_generation,
                    entry.nucleotide,
                )
            });
        }
    }
    Ok(id_to_index)
}

/// Walk a variant iterator once, counting how many sampled nodes (those
/// present in `node_to_genome`, i.e. alive genomes) carry each mutation
/// id in their derived state.
fn tabulate_mutation_refcounts(
    tree_sequence: &tskit::TreeSequence,
    node_to_genome: &HashMap<tskit::NodeId, (u32, usize, usize)>,
    id_to_index: &HashMap<u64, MutationIndex>,
) -> Result<HashMap<u64, u32>> {
    let mut refcounts: HashMap<u64, u32> = id_to_index.keys().map(|&id| (id, 0)).collect();

    let mut variants = tree_sequence
        .variants()
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to build variant iterator for reconstruction: {e}"))?;
    while let Some(variant) = variants.next() {
        let variant = variant.map_err(|e| slim_error::slim_err!(FileFormat: "variant iterator failed during reconstruction: {e}"))?;
        let samples = variant.samples();
        let genotypes = variant.genotypes();
        let alleles = variant.alleles();
        for (sample_index, &node) in samples.iter().enumerate() {
            if !node_to_genome.contains_key(&node) {
                continue;
            }
            let allele_index = genotypes[sample_index];
            let allele_bytes = alleles[allele_index as usize].unwrap_or(&[]);
            for id in slim_treeseq::decode_derived_state(allele_bytes) {
                if let Some(count) = refcounts.get_mut(&id) {
                    *count += 1;
                }
            }
        }
    }
    Ok(refcounts)
}

/// Step 8: a second variant-iterator pass, this time appending each
/// live mutation index to the correct mutation run of the correct
/// genome rather than just counting.
fn append_mutations_to_genomes(
    tree_sequence: &tskit::TreeSequence,
    tables: &tskit::TableCollection,
    population: &mut Population,
    live_index_of_id: &HashMap<u64, MutationIndex>,
    node_to_genome: &HashMap<tskit::NodeId, (u32, usize, usize)>,
) -> Result<()> {
    let sequence_length = tables.sequence_length();
    let mut variants = tree_sequence
        .variants()
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to build variant iterator for mutation placement: {e}"))?;

    while let Some(variant) = variants.next() {
        let variant = variant.map_err(|e| slim_error::slim_err!(FileFormat: "variant iterator failed during mutation placement: {e}"))?;
        let samples = variant.samples();
        let genotypes = variant.genotypes();
        let alleles = variant.alleles();

        for (sample_index, &node) in samples.iter().enumerate() {
            let Some(&(subpop_id, individual_index, genome_slot)) = node_to_genome.get(&node) else { continue };
            let allele_index = genotypes[sample_index];
            let allele_bytes = alleles[allele_index as usize].unwrap_or(&[]);

            for id in slim_treeseq::decode_derived_state(allele_bytes) {
                let Some(&index) = live_index_of_id.get(&id) else { continue };

                let subpop = population
                    .subpopulations
                    .iter_mut()
                    .find(|s| s.id.0 == subpop_id)
                    .expect("subpopulation created in build_subpopulations");
                let individual = &mut subpop.parents[individual_index];
                let genome = if genome_slot == 0 { &mut individual.genome1 } else { &mut individual.genome2 };

                let mutrun_count = genome.mutrun_count().max(1) as i64;
                let mutrun_length = (sequence_length as i64 / mutrun_count).max(1);
                let position = population.mutation_block.get(index).position;
                let segment = (position / mutrun_length) as usize % genome.mutrun_count();
                if !genome.contains_mutation(segment, index) {
                    population.mutation_block.retain(index);
                    genome.add_mutation(&population.mutation_block, mutrun_length, index);
                }
            }
        }
    }
    Ok(())
}
