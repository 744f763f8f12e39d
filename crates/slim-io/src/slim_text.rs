//! SLiM text format: leading magic `#OUT`, line-oriented sections
//! `Populations / Mutations / Individuals / Genomes / Ancestral
//! sequence`, with a `Version:` line negotiating which columns are
//! present (spec §4.6). Supported text versions are 1 through 6; flag
//! bits on the version line record whether age and pedigree-id columns
//! are present.

use slim_core::chromosome::Chromosome;
use slim_core::genome::{Genome, GenomeType};
use slim_core::individual::{Individual, PedigreeId, PedigreeIdAllocator, Sex, SpatialPosition};
use slim_core::mutation::{MutationBlock, MutationType, MutationTypeId};
use slim_core::population::Population;
use slim_core::subpopulation::{Subpopulation, SubpopulationId};
use slim_error::{Result, slim_bail};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

pub const MIN_SUPPORTED_VERSION: u8 = 1;
pub const MAX_SUPPORTED_VERSION: u8 = 6;
/// At or below this version the reader must recompute every
/// individual's fitness from its genome after load rather than trust a
/// stored column, since those versions predate fitness persistence
/// (see `DESIGN.md`'s note on the `file_version <= 2` behavior).
pub const FITNESS_RECOMPUTE_MAX_VERSION: u8 = 2;

#[derive(Debug, Clone, Copy)]
pub struct SlimTextVersion {
    pub number: u8,
    pub has_age: bool,
    pub has_pedigree_ids: bool,
}

impl SlimTextVersion {
    pub fn current() -> Self {
        SlimTextVersion { number: MAX_SUPPORTED_VERSION, has_age: true, has_pedigree_ids: true }
    }

    fn for_number(number: u8) -> Result<Self> {
        if !(MIN_SUPPORTED_VERSION..=MAX_SUPPORTED_VERSION).contains(&number) {
            slim_bail!(FileFormat: "unsupported SLiM text version {number}; supported range is {MIN_SUPPORTED_VERSION}-{MAX_SUPPORTED_VERSION}");
        }
        Ok(SlimTextVersion {
            number,
            has_age: number >= 3,
            has_pedigree_ids: number >= 4,
        })
    }
}

/// Everything the text reader recovers beyond `Population` itself.
pub struct LoadedText {
    pub population: Population,
    pub generation: i64,
    pub random_seed: Option<u64>,
    pub needs_fitness_recompute: bool,
    /// `Some` if the file carried an `Ancestral sequence:` section;
    /// applying it to the chromosome used for reconstruction is the
    /// caller's responsibility since the chromosome is borrowed here,
    /// not owned by the population.
    pub ancestral_sequence: Option<slim_core::chromosome::AncestralSequence>,
}

pub fn write_population_text(
    path: &Path,
    population: &Population,
    chromosome: &Chromosome,
    generation: i64,
    random_seed: u64,
) -> Result<()> {
    let mut out = Vec::new();
    writeln!(out, "#OUT: {generation} {random_seed}")?;
    writeln!(out, "Version: {}", MAX_SUPPORTED_VERSION)?;

    writeln!(out, "Populations:")?;
    for subpop in &population.subpopulations {
        writeln!(
            out,
            "p{} {} {} {}",
            subpop.id.0,
            subpop.parents.len(),
            subpop.sex_ratio,
            subpop.selfing_rate,
        )?;
    }

    writeln!(out, "Mutations:")?;
    for index in all_live_mutation_indices(population) {
        let mutation = population.mutation_block.get(index);
        writeln!(
            out,
            "{} m{} {} {} {} {} {}",
            mutation.id,
            mutation.mutation_type.0,
            mutation.position,
            mutation.selection_coefficient,
            mutation.origin_subpop,
            mutation.origin_generation,
            population.mutation_block.refcount(index),
        )?;
    }

    writeln!(out, "Individuals:")?;
    for subpop in &population.subpopulations {
        for individual in &subpop.parents {
            writeln!(
                out,
                "p{}:{} {} {} {} {} {} {} {}",
                subpop.id.0,
                individual.pedigree_id.0,
                sex_code(individual.sex),
                individual.age.unwrap_or(-1),
                individual.position.coordinates[0],
                individual.position.coordinates[1],
                individual.position.coordinates[2],
                individual.fitness,
                individual.migrant as u8,
            )?;
        }
    }

    writeln!(out, "Genomes:")?;
    for subpop in &population.subpopulations {
        for individual in &subpop.parents {
            for genome in individual.genomes() {
                write_genome_line(&mut out, population, genome)?;
            }
        }
    }

    writeln!(out, "Ancestral sequence:")?;
    if let Some(ancestral) = &chromosome.ancestral_sequence {
        writeln!(out, "{}", ancestral.to_ascii())?;
    }

    std::fs::write(path, out)?;
    Ok(())
}

fn write_genome_line(out: &mut Vec<u8>, population: &Population, genome: &Genome) -> Result<()> {
    write!(out, "{} {} {}", genome.id.0, genome_type_code(genome.genome_type), genome.is_null as u8)?;
    if !genome.is_null {
        for index in genome.sorted_mutation_indices() {
            write!(out, " {}", population.mutation_block.get(index).id)?;
        }
    }
    writeln!(out)?;
    Ok(())
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

fn sex_code(sex: Sex) -> char {
    match sex {
        Sex::Hermaphrodite => 'H',
        Sex::Male => 'M',
        Sex::Female => 'F',
    }
}

fn parse_sex(code: &str) -> Result<Sex> {
    match code {
        "H" => Ok(Sex::Hermaphrodite),
        "M" => Ok(Sex::Male),
        "F" => Ok(Sex::Female),
        other => slim_bail!(FileFormat: "unrecognized sex code '{other}'"),
    }
}

fn genome_type_code(genome_type: GenomeType) -> char {
    match genome_type {
        GenomeType::Autosome => 'A',
        GenomeType::XChromosome => 'X',
        GenomeType::YChromosome => 'Y',
    }
}

fn parse_genome_type(code: &str) -> Result<GenomeType> {
    match code {
        "A" => Ok(GenomeType::Autosome),
        "X" => Ok(GenomeType::XChromosome),
        "Y" => Ok(GenomeType::YChromosome),
        other => slim_bail!(FileFormat: "unrecognized genome-type code '{other}'"),
    }
}

/// Read a population previously written by [`write_population_text`].
/// `mutation_types` is the already-configured catalog; a version at or
/// below 2 that predates per-row dominance columns is cross-checked
/// against it rather than overriding it (spec: "dominance coefficients
/// must match the configured mutation-type").
pub fn read_population_text(
    path: &Path,
    chromosome: &Chromosome,
    mutation_types: &HashMap<MutationTypeId, MutationType>,
) -> Result<LoadedText> {
    let file = std::fs::File::open(path)?;
    let mut lines = BufReader::new(file).lines();

    let header = lines
        .next()
        .transpose()?
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "{} is empty", path.display()))?;
    let header = header
        .strip_prefix("#OUT: ")
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "missing '#OUT:' magic header"))?;
    let mut header_fields = header.split_whitespace();
    let generation: i64 = parse_field(header_fields.next(), "generation")?;
    let random_seed: Option<u64> = header_fields.next().map(|s| s.parse()).transpose().ok().flatten();

    let version_line = lines
        .next()
        .transpose()?
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "missing 'Version:' line"))?;
    let version_number: u8 = version_line
        .strip_prefix("Version: ")
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed 'Version:' line: {version_line}"))?
        .trim()
        .parse()
        .map_err(|_| slim_error::slim_err!(FileFormat: "non-numeric version in '{version_line}'"))?;
    let version = SlimTextVersion::for_number(version_number)?;

    let mut block = MutationBlock::new();
    let mut mutation_id_to_index = HashMap::new();
    let mut subpops: HashMap<u32, Subpopulation> = HashMap::new();
    let mut pedigree_alloc = PedigreeIdAllocator::new();
    let mut pending_individuals: Vec<(u32, PedigreeId, Sex, Option<i32>, SpatialPosition, f64, bool)> = Vec::new();
    let mut genomes_by_id: HashMap<u64, Genome> = HashMap::new();
    let mut ancestral_sequence: Option<slim_core::chromosome::AncestralSequence> = None;

    let mut section = "";
    for line in lines {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        if let Some(name) = line.strip_suffix(':') {
            section = match name {
                "Populations" | "Mutations" | "Individuals" | "Genomes" | "Ancestral sequence" => name,
                _ => section,
            };
            if section == name {
                continue;
            }
        }

        match section {
            "Populations" => {
                let mut fields = line.split_whitespace();
                let tag = fields.next().ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed Populations row: {line}"))?;
                let id: u32 = tag
                    .strip_prefix('p')
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed subpopulation tag '{tag}'"))?;
                let _size: usize = parse_field(fields.next(), "subpop size")?;
                let sex_ratio: f64 = parse_field(fields.next(), "sex ratio")?;
                let selfing_rate: f64 = parse_field(fields.next(), "selfing rate")?;
                let mut subpop = Subpopulation::new(SubpopulationId(id));
                subpop.sex_ratio = sex_ratio;
                subpop.selfing_rate = selfing_rate;
                subpops.insert(id, subpop);
            }
            "Mutations" => {
                let mut fields = line.split_whitespace();
                let id: u64 = parse_field(fields.next(), "mutation id")?;
                let type_tag = fields.next().ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed Mutations row: {line}"))?;
                let mutation_type = parse_mutation_type_tag(type_tag)?;
                let position: i64 = parse_field(fields.next(), "mutation position")?;
                let selection_coefficient: f64 = parse_field(fields.next(), "selection coefficient")?;
                let origin_subpop: i32 = parse_field(fields.next(), "origin subpop")?;
                let origin_generation: i64 = parse_field(fields.next(), "origin generation")?;
                let _refcount: u32 = parse_field(fields.next(), "refcount")?;

                if version.number <= FITNESS_RECOMPUTE_MAX_VERSION && !mutation_types.contains_key(&mutation_type) {
                    slim_bail!(FileFormat: "mutation {id} references undefined mutation type m{}", mutation_type.0);
                }

                let index = block.allocate(mutation_type, position, selection_coefficient, origin_subpop, origin_generation, None);
                mutation_id_to_index.insert(id, index);
            }
            "Individuals" => {
                let mut fields = line.split_whitespace();
                let tag = fields.next().ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed Individuals row: {line}"))?;
                let (subpop_id, pedigree_raw) = tag
                    .strip_prefix('p')
                    .and_then(|rest| rest.split_once(':'))
                    .ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed individual tag '{tag}'"))?;
                let subpop_id: u32 = subpop_id.parse().map_err(|_| slim_error::slim_err!(FileFormat: "malformed subpop id in '{tag}'"))?;
                let pedigree_id = if version.has_pedigree_ids {
                    PedigreeId(pedigree_raw.parse().map_err(|_| slim_error::slim_err!(FileFormat: "malformed pedigree id in '{tag}'"))?)
                } else {
                    pedigree_alloc.next()
                };
                let sex = parse_sex(fields.next().ok_or_else(|| slim_error::slim_err!(FileFormat: "missing sex column"))?)?;
                let age_raw: i32 = parse_field(fields.next(), "age")?;
                let age = if version.has_age && age_raw >= 0 { Some(age_raw) } else { None };
                let x: f64 = parse_field(fields.next(), "x")?;
                let y: f64 = parse_field(fields.next(), "y")?;
                let z: f64 = parse_field(fields.next(), "z")?;
                let fitness: f64 = parse_field(fields.next(), "fitness")?;
                let migrant: u8 = parse_field(fields.next(), "migrant")?;

                pending_individuals.push((
                    subpop_id,
                    pedigree_id,
                    sex,
                    age,
                    SpatialPosition::new(&[x, y, z]),
                    fitness,
                    migrant != 0,
                ));
            }
            "Genomes" => {
                let mut fields = line.split_whitespace();
                let genome_id: u64 = parse_field(fields.next(), "genome id")?;
                let type_code = fields.next().ok_or_else(|| slim_error::slim_err!(FileFormat: "missing genome type column"))?;
                let genome_type = parse_genome_type(type_code)?;
                let is_null: u8 = parse_field(fields.next(), "is_null")?;

                let mut genome = Genome::new_empty(genome_type, chromosome.mutrun_count(), 0);
                if is_null != 0 {
                    genome.is_null = true;
                } else {
                    for token in fields {
                        let mutation_id: u64 = token
                            .parse()
                            .map_err(|_| slim_error::slim_err!(FileFormat: "malformed mutation id '{token}' in genome row"))?;
                        let index = *mutation_id_to_index
                            .get(&mutation_id)
                            .ok_or_else(|| slim_error::slim_err!(FileFormat: "genome references undefined mutation {mutation_id}"))?;
                        block.retain(index);
                        genome.add_mutation(&block, chromosome.mutrun_length(), index);
                    }
                }
                genomes_by_id.insert(genome_id, genome);
            }
            "Ancestral sequence" => {
                ancestral_sequence = Some(slim_core::chromosome::AncestralSequence::from_ascii(&line)?);
            }
            _ => {}
        }
    }

    let mut genomes_by_id = genomes_by_id;
    for (subpop_id, pedigree_id, sex, age, position, fitness, migrant) in pending_individuals {
        let g1 = genomes_by_id
            .remove(&(2 * pedigree_id.0))
            .ok_or_else(|| slim_error::slim_err!(FileFormat: "missing genome for pedigree id {}", pedigree_id.0))?;
        let g2 = genomes_by_id
            .remove(&(2 * pedigree_id.0 + 1))
            .ok_or_else(|| slim_error::slim_err!(FileFormat: "missing second genome for pedigree id {}", pedigree_id.0))?;

        let mut individual = Individual::new(pedigree_id, g1, g2, sex);
        individual.age = age;
        individual.position = position;
        individual.fitness = fitness;
        individual.migrant = migrant;

        let subpop = subpops
            .get_mut(&subpop_id)
            .ok_or_else(|| slim_error::slim_err!(FileFormat: "individual references undefined subpopulation p{subpop_id}"))?;
        subpop.parents.push(individual);
    }

    let mut subpops: Vec<_> = subpops.into_values().collect();
    subpops.sort_by_key(|s| s.id.0);

    let mut population = Population::new(mutation_types.clone());
    population.mutation_block = block;
    population.subpopulations = subpops;
    population.generation = generation;
    population.registry.retally(&population.subpopulations);

    Ok(LoadedText {
        needs_fitness_recompute: version.number <= FITNESS_RECOMPUTE_MAX_VERSION,
        population,
        generation,
        random_seed,
        ancestral_sequence,
    })
}

fn parse_mutation_type_tag(tag: &str) -> Result<MutationTypeId> {
    tag.strip_prefix('m')
        .and_then(|s| s.parse().ok())
        .map(MutationTypeId)
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "malformed mutation-type tag '{tag}'"))
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, name: &str) -> Result<T> {
    field
        .ok_or_else(|| slim_error::slim_err!(FileFormat: "missing {name} field"))?
        .parse()
        .map_err(|_| slim_error::slim_err!(FileFormat: "malformed {name} field"))
}
