//! SLiM binary format: a 4-byte endianness marker, a typed-size header
//! for cross-build validation, a magic double check, then a sequence of
//! 16-bit-tagged sections (spec §4.6).
//!
//! Mutation-id references inside a genome's section use 16 bits when
//! the file's total mutation count fits, else 32 bits, trading file
//! size for the common case of small simulations.

use slim_core::chromosome::Chromosome;
use slim_core::genome::{Genome, GenomeType};
use slim_core::individual::{Individual, PedigreeId, Sex};
use slim_core::mutation::{MutationBlock, MutationType, MutationTypeId};
use slim_core::population::Population;
use slim_core::subpopulation::{Subpopulation, SubpopulationId};
use slim_error::{Result, slim_bail};
use std::collections::HashMap;
use std::path::Path;

use crate::format::SLIM_BINARY_MAGIC;

/// `1234567890.0987654321` reinterpreted as an IEEE-754 double, written
/// right after the header so a reader can detect a byte-order or
/// float-representation mismatch before trusting anything else in the
/// file.
const MAGIC_DOUBLE: f64 = 1234567890.0987654321;

const TAG_END: u16 = 0xFFFF;
const TAG_SUBPOP: u16 = 0x0001;
const TAG_MUTATION: u16 = 0x0002;
const TAG_NULL_GENOME: u16 = 0x1000;
const TAG_GENOME: u16 = 0x1001;

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }
    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            slim_bail!(FileFormat: "unexpected end of file at byte {} (wanted {n} more bytes)", self.pos);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }
    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }
    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
    fn f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }
}

const BINARY_VERSION: u32 = 1;

pub fn write_population_binary(
    path: &Path,
    population: &Population,
    chromosome: &Chromosome,
    generation: i64,
) -> Result<()> {
    let mut w = Writer::new();
    w.u32(SLIM_BINARY_MAGIC);
    w.u32(BINARY_VERSION);

    // Type-size header: lets a reader reject a file produced by a build
    // with incompatible integral widths before it trusts anything else.
    w.u8(std::mem::size_of::<i64>() as u8);
    w.u8(std::mem::size_of::<u32>() as u8);
    w.u8(std::mem::size_of::<f64>() as u8);
    w.u8(if chromosome.ancestral_sequence.is_some() { 1 } else { 0 });

    w.f64(MAGIC_DOUBLE);
    w.i64(generation);

    let mutation_indices = all_live_mutation_indices(population);
    let id_width: u8 = if mutation_indices.len() <= u16::MAX as usize { 2 } else { 4 };
    w.u8(id_width);

    w.u16(TAG_MUTATION);
    w.u32(mutation_indices.len() as u32);
    let mut mutation_local_id = HashMap::new();
    for (local_id, &index) in mutation_indices.iter().enumerate() {
        let mutation = population.mutation_block.get(index);
        w.u64(mutation.id);
        w.i64(mutation.mutation_type.0 as i64);
        w.i64(mutation.position);
        w.f64(mutation.selection_coefficient);
        w.i64(mutation.origin_subpop as i64);
        w.i64(mutation.origin_generation);
        mutation_local_id.insert(index, local_id as u32);
    }

    for subpop in &population.subpopulations {
        w.u16(TAG_SUBPOP);
        w.u32(subpop.id.0);
        w.u32(subpop.parents.len() as u32);
        w.f64(subpop.sex_ratio);
        w.f64(subpop.selfing_rate);
        w.f64(subpop.cloning_rate);

        for individual in &subpop.parents {
            w.u64(individual.pedigree_id.0);
            w.u8(sex_tag(individual.sex));
            w.i64(individual.age.unwrap_or(-1));
            for genome in individual.genomes() {
                write_genome(&mut w, genome, &mutation_local_id, id_width);
            }
        }
    }

    w.u16(TAG_END);
    std::fs::write(path, &w.buf)?;
    Ok(())
}

fn write_genome(w: &mut Writer, genome: &Genome, local_id: &HashMap<slim_core::mutation::MutationIndex, u32>, id_width: u8) {
    if genome.is_null {
        w.u16(TAG_NULL_GENOME);
        w.u8(genome_type_tag(genome.genome_type));
        return;
    }
    w.u16(TAG_GENOME);
    w.u8(genome_type_tag(genome.genome_type));
    let indices = genome.sorted_mutation_indices();
    w.u32(indices.len() as u32);
    for index in indices {
        let id = *local_id.get(&index).expect("every carried mutation was written to the mutation section");
        if id_width == 2 {
            w.u16(id as u16);
        } else {
            w.u32(id);
        }
    }
}

fn sex_tag(sex: Sex) -> u8 {
    match sex {
        Sex::Hermaphrodite => 0,
        Sex::Male => 1,
        Sex::Female => 2,
    }
}

fn parse_sex_tag(tag: u8) -> Result<Sex> {
    match tag {
        0 => Ok(Sex::Hermaphrodite),
        1 => Ok(Sex::Male),
        2 => Ok(Sex::Female),
        other => slim_bail!(FileFormat: "unrecognized sex tag {other:#x}"),
    }
}

fn genome_type_tag(genome_type: GenomeType) -> u8 {
    match genome_type {
        GenomeType::Autosome => 0,
        GenomeType::XChromosome => 1,
        GenomeType::YChromosome => 2,
    }
}

fn parse_genome_type_tag(tag: u8) -> Result<GenomeType> {
    match tag {
        0 => Ok(GenomeType::Autosome),
        1 => Ok(GenomeType::XChromosome),
        2 => Ok(GenomeType::YChromosome),
        other => slim_bail!(FileFormat: "unrecognized genome-type tag {other:#x}"),
    }
}

fn all_live_mutation_indices(population: &Population) -> Vec<slim_core::mutation::MutationIndex> {
    let mut indices: Vec<_> = population
        .subpopulations
        .iter()
        .flat_map(|s| s.parents.iter())
        .flat_map(|i| i.genomes())
        .flat_map(|g| g.sorted_mutation_indices())
        .collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

pub struct LoadedBinary {
    pub population: Population,
    pub generation: i64,
}

pub fn read_population_binary(
    path: &Path,
    chromosome: &Chromosome,
    mutation_types: &HashMap<MutationTypeId, MutationType>,
) -> Result<LoadedBinary> {
    let bytes = std::fs::read(path)?;
    let mut r = Reader::new(&bytes);

    let marker = r.u32()?;
    if marker != SLIM_BINARY_MAGIC {
        slim_bail!(FileFormat: "bad endianness marker {marker:#x} at byte 0, expected {SLIM_BINARY_MAGIC:#x}");
    }
    let version = r.u32()?;
    if version != BINARY_VERSION {
        slim_bail!(FileFormat: "unsupported SLiM binary version {version}");
    }

    let i64_size = r.u8()?;
    let u32_size = r.u8()?;
    let f64_size = r.u8()?;
    if i64_size as usize != std::mem::size_of::<i64>()
        || u32_size as usize != std::mem::size_of::<u32>()
        || f64_size as usize != std::mem::size_of::<f64>()
    {
        slim_bail!(FileFormat: "integral type sizes in file header ({i64_size}, {u32_size}, {f64_size}) do not match this build");
    }
    let _has_ancestral_sequence = r.u8()? != 0;

    let magic = r.f64()?;
    if (magic - MAGIC_DOUBLE).abs() > f64::EPSILON {
        slim_bail!(FileFormat: "magic double mismatch: got {magic}, expected {MAGIC_DOUBLE}");
    }

    let generation = r.i64()?;
    let id_width = r.u8()?;
    if id_width != 2 && id_width != 4 {
        slim_bail!(FileFormat: "unrecognized mutation-id width {id_width} bytes");
    }

    let tag = r.u16()?;
    if tag != TAG_MUTATION {
        slim_bail!(FileFormat: "expected mutation section tag {TAG_MUTATION:#06x}, found {tag:#06x}");
    }
    let mutation_count = r.u32()?;

    let mut block = MutationBlock::new();
    let mut local_to_index = Vec::with_capacity(mutation_count as usize);
    for _ in 0..mutation_count {
        let _id = r.u64()?;
        let mutation_type = MutationTypeId(r.i64()? as i32);
        let position = r.i64()?;
        let selection_coefficient = r.f64()?;
        let origin_subpop = r.i64()? as i32;
        let origin_generation = r.i64()?;
        if !mutation_types.contains_key(&mutation_type) {
            slim_bail!(FileFormat: "mutation references undefined mutation type m{}", mutation_type.0);
        }
        let index = block.allocate(mutation_type, position, selection_coefficient, origin_subpop, origin_generation, None);
        local_to_index.push(index);
    }

    let mut subpops = Vec::new();
    loop {
        let tag = r.u16()?;
        if tag == TAG_END {
            break;
        }
        if tag != TAG_SUBPOP {
            slim_bail!(FileFormat: "expected subpopulation tag {TAG_SUBPOP:#06x}, found {tag:#06x}");
        }
        let id = r.u32()?;
        let size = r.u32()?;
        let sex_ratio = r.f64()?;
        let selfing_rate = r.f64()?;
        let cloning_rate = r.f64()?;

        let mut subpop = Subpopulation::new(SubpopulationId(id));
        subpop.sex_ratio = sex_ratio;
        subpop.selfing_rate = selfing_rate;
        subpop.cloning_rate = cloning_rate;

        for _ in 0..size {
            let pedigree_id = PedigreeId(r.u64()?);
            let sex = parse_sex_tag(r.u8()?)?;
            let age_raw = r.i64()?;
            let age = if age_raw >= 0 { Some(age_raw as i32) } else { None };

            let g1 = read_genome(&mut r, &mut block, &local_to_index, chromosome, id_width)?;
            let g2 = read_genome(&mut r, &mut block, &local_to_index, chromosome, id_width)?;

            let mut individual = Individual::new(pedigree_id, g1, g2, sex);
            individual.age = age;
            subpop.parents.push(individual);
        }
        subpops.push(subpop);
    }

    let mut population = Population::new(mutation_types.clone());
    population.mutation_block = block;
    population.subpopulations = subpops;
    population.generation = generation;
    population.registry.retally(&population.subpopulations);

    Ok(LoadedBinary { population, generation })
}

fn read_genome(
    r: &mut Reader<'_>,
    block: &mut MutationBlock,
    local_to_index: &[slim_core::mutation::MutationIndex],
    chromosome: &Chromosome,
    id_width: u8,
) -> Result<Genome> {
    let tag = r.u16()?;
    match tag {
        TAG_NULL_GENOME => {
            let genome_type = parse_genome_type_tag(r.u8()?)?;
            Ok(Genome::new_null(genome_type, chromosome.mutrun_count(), 0))
        }
        TAG_GENOME => {
            let genome_type = parse_genome_type_tag(r.u8()?)?;
            let mut genome = Genome::new_empty(genome_type, chromosome.mutrun_count(), 0);
            let count = r.u32()?;
            for _ in 0..count {
                let local_id = if id_width == 2 {
                    r.u16()? as usize
                } else {
                    r.u32()? as usize
                };
                let index = *local_to_index
                    .get(local_id)
                    .ok_or_else(|| slim_error::slim_err!(FileFormat: "genome references out-of-range mutation id {local_id}"))?;
                block.retain(index);
                genome.add_mutation(block, chromosome.mutrun_length(), index);
            }
            Ok(genome)
        }
        other => slim_bail!(FileFormat: "expected a genome section tag, found {other:#06x}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slim_core::chromosome::{RateMap, SexSpecificMap};
    use slim_core::mutation::mtype::{DominanceCoefficient, SelectionCoefficientDistribution, StackingPolicy};

    fn test_chromosome() -> Chromosome {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
        Chromosome::new(1024, recomb, mutr, 4).unwrap()
    }

    fn test_mutation_types() -> HashMap<MutationTypeId, MutationType> {
        let mut types = HashMap::new();
        types.insert(
            MutationTypeId(0),
            MutationType {
                id: MutationTypeId(0),
                dominance: DominanceCoefficient::Fixed(0.5),
                distribution: SelectionCoefficientDistribution::Fixed(0.0),
                stacking_group: 0,
                stacking_policy: StackingPolicy::KeepAll,
                convert_to_substitution: true,
            },
        );
        types
    }

    #[test]
    fn round_trips_a_population() {
        let chromosome = test_chromosome();
        let mutation_types = test_mutation_types();
        let mut population = Population::new(mutation_types.clone());
        population.add_subpopulation(SubpopulationId(0), 4, &chromosome, false).unwrap();

        let dir = std::env::temp_dir().join(format!("slim-io-bin-rt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pop.bin");

        write_population_binary(&path, &population, &chromosome, 7).unwrap();
        let loaded = read_population_binary(&path, &chromosome, &mutation_types).unwrap();

        assert_eq!(loaded.generation, 7);
        assert_eq!(loaded.population.subpopulations[0].parents.len(), 4);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_wrong_magic_marker() {
        let dir = std::env::temp_dir().join(format!("slim-io-bin-badmagic-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("pop.bin");
        std::fs::write(&path, 0xDEADBEEFu32.to_le_bytes()).unwrap();

        let chromosome = test_chromosome();
        let mutation_types = test_mutation_types();
        assert!(read_population_binary(&path, &chromosome, &mutation_types).is_err());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
