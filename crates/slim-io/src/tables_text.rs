//! Table-collection text format: a directory holding seven named files
//! (`nodes.txt`, `edges.txt`, `sites.txt`, `mutations.txt`,
//! `individuals.txt`, `populations.txt`, `provenances.txt`) plus an
//! optional `ReferenceSequence.txt`, one tab-separated row per table
//! row (spec §4.6).

use slim_error::Result;
use std::io::Write;
use std::path::Path;
use tskit::TableAccess;
use tskit::metadata::{IndividualMetadata, MetadataError, MetadataRoundtrip, MutationMetadata};

/// Carries a table row's metadata bytes through text round-tripping
/// without decoding them: the text format doesn't need to understand
/// `slim-treeseq`'s metadata layout, only preserve it verbatim the way
/// the binary kastore form already does natively via `dump`/`load`.
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

const FILES: &[&str] = &[
    "nodes.txt",
    "edges.txt",
    "sites.txt",
    "mutations.txt",
    "individuals.txt",
    "populations.txt",
    "provenances.txt",
];

pub fn write_tables_text(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    write_nodes(dir, tables)?;
    write_edges(dir, tables)?;
    write_sites(dir, tables)?;
    write_mutations(dir, tables)?;
    write_individuals(dir, tables)?;
    write_populations(dir, tables)?;
    write_provenances(dir, tables)?;

    if let Some(reference_sequence) = tables.reference_sequence() {
        if let Some(data) = reference_sequence.data() {
            std::fs::write(dir.join("ReferenceSequence.txt"), data)?;
        }
    }
    Ok(())
}

fn write_nodes(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("is_sample\ttime\tpopulation\tindividual\n");
    let nodes = tables.nodes();
    for row in 0..nodes.num_rows().as_usize() {
        let id = tskit::NodeId::from(row as tskit::tsk_id_t);
        let flags = nodes.flags(id).unwrap_or_default();
        let time = nodes.time(id).unwrap_or(0.0);
        let population = nodes.population(id).unwrap_or(tskit::PopulationId::NULL);
        let individual = nodes.individual(id).unwrap_or(tskit::IndividualId::NULL);
        out.push_str(&format!("{}\t{time}\t{}\t{}\n", flags.is_sample() as u8, population.to_int(), individual.to_int()));
    }
    std::fs::write(dir.join("nodes.txt"), out)?;
    Ok(())
}

fn write_edges(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("left\tright\tparent\tchild\n");
    let edges = tables.edges();
    for row in 0..edges.num_rows().as_usize() {
        let id = tskit::EdgeId::from(row as tskit::tsk_id_t);
        let left = edges.left(id).unwrap_or(0.0);
        let right = edges.right(id).unwrap_or(0.0);
        let parent = edges.parent(id).unwrap_or(tskit::NodeId::NULL);
        let child = edges.child(id).unwrap_or(tskit::NodeId::NULL);
        out.push_str(&format!("{left}\t{right}\t{}\t{}\n", parent.to_int(), child.to_int()));
    }
    std::fs::write(dir.join("edges.txt"), out)?;
    Ok(())
}

fn write_sites(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("position\tancestral_state\n");
    let sites = tables.sites();
    for row in 0..sites.num_rows().as_usize() {
        let id = tskit::SiteId::from(row as tskit::tsk_id_t);
        let position = sites.position(id).unwrap_or(0.0);
        let ancestral_state = sites.ancestral_state(id).unwrap_or(&[]);
        out.push_str(&format!("{position}\t{}\n", hex_encode(ancestral_state)));
    }
    std::fs::write(dir.join("sites.txt"), out)?;
    Ok(())
}

fn write_mutations(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("site\tnode\tparent\ttime\tderived_state\tmetadata\n");
    let mutations = tables.mutations();
    for row in 0..mutations.num_rows().as_usize() {
        let id = tskit::MutationId::from(row as tskit::tsk_id_t);
        let site = mutations.site(id).unwrap_or(tskit::SiteId::NULL);
        let node = mutations.node(id).unwrap_or(tskit::NodeId::NULL);
        let parent = mutations.parent(id).unwrap_or(tskit::MutationId::NULL);
        let time = mutations.time(id).unwrap_or(f64::NAN);
        let derived_state = mutations.derived_state(id).unwrap_or(&[]);
        let metadata = mutations.metadata(id).unwrap_or(&[]);
        out.push_str(&format!(
            "{}\t{}\t{}\t{time}\t{}\t{}\n",
            site.to_int(),
            node.to_int(),
            parent.to_int(),
            hex_encode(derived_state),
            hex_encode(metadata),
        ));
    }
    std::fs::write(dir.join("mutations.txt"), out)?;
    Ok(())
}

fn write_individuals(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("flags\tlocation\tparents\tmetadata\n");
    let individuals = tables.individuals();
    for row in 0..individuals.num_rows().as_usize() {
        let id = tskit::IndividualId::from(row as tskit::tsk_id_t);
        let flags = individuals.flags(id).unwrap_or_default();
        let location = individuals
            .location(id)
            .map(|loc| loc.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        let parents = individuals
            .parents(id)
            .map(|p| p.iter().map(|id| id.to_int().to_string()).collect::<Vec<_>>().join(","))
            .unwrap_or_default();
        let metadata = individuals.metadata(id).unwrap_or(&[]);
        out.push_str(&format!("{:#x}\t{location}\t{parents}\t{}\n", flags.bits(), hex_encode(metadata)));
    }
    std::fs::write(dir.join("individuals.txt"), out)?;
    Ok(())
}

fn write_populations(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("id\n");
    let populations = tables.populations();
    for row in 0..populations.num_rows().as_usize() {
        out.push_str(&format!("{row}\n"));
    }
    std::fs::write(dir.join("populations.txt"), out)?;
    Ok(())
}

fn write_provenances(dir: &Path, tables: &tskit::TableCollection) -> Result<()> {
    let mut out = String::from("timestamp\trecord\n");
    let provenances = tables.provenances();
    for row in 0..provenances.num_rows().as_usize() {
        let id = tskit::ProvenanceId::from(row as tskit::tsk_id_t);
        let timestamp = provenances.timestamp(id).unwrap_or_default();
        let record = provenances.record(id).unwrap_or_default();
        out.push_str(&format!("{timestamp}\t{record}\n"));
    }
    std::fs::write(dir.join("provenances.txt"), out)?;
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn hex_decode(s: &str) -> Vec<u8> {
    (0..s.len())
        .step_by(2)
        .filter_map(|i| s.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

/// Rebuild a `TableCollection` from a directory written by
/// [`write_tables_text`]. `sequence_length` must be supplied by the
/// caller since it is not itself one of the seven files (it is stored
/// alongside the table collection's own metadata in the binary form,
/// but the text form has no dedicated header row for it).
pub fn read_tables_text(dir: &Path, sequence_length: f64) -> Result<tskit::TableCollection> {
    let mut tables = tskit::TableCollection::new(sequence_length)
        .map_err(|e| slim_error::slim_err!(FileFormat: "failed to create table collection for text load: {e}"))?;

    for name in FILES {
        if !dir.join(name).exists() {
            slim_error::slim_bail!(FileFormat: "table-collection text directory {} is missing {name}", dir.display());
        }
    }

    for line in read_data_lines(&dir.join("nodes.txt"))? {
        let mut f = line.split('\t');
        let is_sample: u8 = parse(f.next())?;
        let time: f64 = parse(f.next())?;
        let population: i32 = parse(f.next())?;
        let individual: i32 = parse(f.next())?;
        let flags = if is_sample != 0 { tskit::NodeFlags::new_sample() } else { tskit::NodeFlags::default() };
        tables
            .add_node(flags, time, tskit::PopulationId::from(population), tskit::IndividualId::from(individual))
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add node row: {e}"))?;
    }

    for line in read_data_lines(&dir.join("edges.txt"))? {
        let mut f = line.split('\t');
        let left: f64 = parse(f.next())?;
        let right: f64 = parse(f.next())?;
        let parent: i32 = parse(f.next())?;
        let child: i32 = parse(f.next())?;
        tables
            .add_edge(left, right, tskit::NodeId::from(parent), tskit::NodeId::from(child))
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add edge row: {e}"))?;
    }

    for line in read_data_lines(&dir.join("sites.txt"))? {
        let mut f = line.split('\t');
        let position: f64 = parse(f.next())?;
        let ancestral_state = hex_decode(f.next().unwrap_or(""));
        tables
            .add_site(position, Some(&ancestral_state))
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add site row: {e}"))?;
    }

    for line in read_data_lines(&dir.join("mutations.txt"))? {
        let mut f = line.split('\t');
        let site: i32 = parse(f.next())?;
        let node: i32 = parse(f.next())?;
        let parent: i32 = parse(f.next())?;
        let time: f64 = parse(f.next())?;
        let derived_state = hex_decode(f.next().unwrap_or(""));
        let metadata = RawMetadata(hex_decode(f.next().unwrap_or("")));
        tables
            .add_mutation_with_metadata(
                tskit::SiteId::from(site),
                tskit::NodeId::from(node),
                tskit::MutationId::from(parent),
                time,
                Some(&derived_state),
                &metadata,
            )
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add mutation row: {e}"))?;
    }

    for line in read_data_lines(&dir.join("individuals.txt"))? {
        let mut f = line.split('\t');
        let flags_raw = f.next().unwrap_or("0x0");
        let flags_bits = u32::from_str_radix(flags_raw.trim_start_matches("0x"), 16).unwrap_or(0);
        let location: Vec<f64> = f
            .next()
            .unwrap_or("")
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        let parents: Vec<tskit::IndividualId> = f
            .next()
            .unwrap_or("")
            .split(',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse::<i32>().ok())
            .map(tskit::IndividualId::from)
            .collect();
        let metadata = RawMetadata(hex_decode(f.next().unwrap_or("")));
        tables
            .add_individual_with_metadata(tskit::IndividualFlags::from(flags_bits), &location, &parents, &metadata)
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add individual row: {e}"))?;
    }

    for _ in read_data_lines(&dir.join("populations.txt"))? {
        tables
            .add_population()
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add population row: {e}"))?;
    }

    for line in read_data_lines(&dir.join("provenances.txt"))? {
        let mut f = line.split('\t');
        let timestamp = f.next().unwrap_or_default();
        let record = f.next().unwrap_or_default();
        tables
            .add_provenance_with_timestamp(timestamp, record)
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to add provenance row: {e}"))?;
    }

    let reference_sequence_path = dir.join("ReferenceSequence.txt");
    if reference_sequence_path.exists() {
        let data = std::fs::read_to_string(&reference_sequence_path)?;
        tables
            .reference_sequence_mut()
            .set_data(data.as_bytes())
            .map_err(|e| slim_error::slim_err!(FileFormat: "failed to set reference sequence: {e}"))?;
    }

    Ok(tables)
}

fn read_data_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().skip(1).map(str::to_owned).collect())
}

fn parse<T: std::str::FromStr>(field: Option<&str>) -> Result<T> {
    field
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "missing column in table-collection text row"))?
        .parse()
        .map_err(|_| slim_error::slim_err!(FileFormat: "malformed column in table-collection text row"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let bytes = vec![0u8, 1, 255, 16];
        assert_eq!(hex_decode(&hex_encode(&bytes)), bytes);
    }

    #[test]
    fn writes_and_reads_back_a_minimal_table_collection() {
        let mut tables = tskit::TableCollection::new(100.0).unwrap();
        tables
            .add_node(tskit::NodeFlags::new_sample(), 0.0, tskit::PopulationId::NULL, tskit::IndividualId::NULL)
            .unwrap();

        let dir = std::env::temp_dir().join(format!("slim-io-tables-text-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        write_tables_text(&dir, &tables).unwrap();

        let reloaded = read_tables_text(&dir, 100.0).unwrap();
        assert_eq!(reloaded.nodes().num_rows().as_usize(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
