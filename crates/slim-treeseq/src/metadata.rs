//! Row metadata for the individual and mutation tables.
//!
//! Follows the same hand-rolled fixed-width packing as
//! [`crate::derived_state`] rather than pulling in a metadata-schema
//! crate: every field here is a primitive the simulator already has a
//! natural binary representation for, and `tskit`'s metadata columns are
//! just opaque `&[u8]`, so there is nothing a schema layer would buy us
//! that a direct encode/decode pair doesn't already give.

use slim_core::individual::{PedigreeId, Sex, SpatialPosition};
use slim_core::mutation::mtype::MutationTypeId;
use slim_core::subpopulation::SpatialBounds;
use tskit::metadata::{IndividualMetadata, MetadataError, MetadataRoundtrip, MutationMetadata, PopulationMetadata};

/// Bit set on an individual table row's flags for "this individual was
/// alive (in some subpopulation's parental generation) at the moment it
/// was recorded" — the flag the §4.6 reconstruction pipeline's step 3
/// filters on.
pub const INDIVIDUAL_FLAG_ALIVE: u32 = 1 << 0;
/// Bit set for "this individual's genomes are in the remembered-genomes
/// set" — distinguishing a remembered ancestor from an ordinary row the
/// way §4.6 step 9 requires ("remembered-ness is indicated by a flag
/// bit").
pub const INDIVIDUAL_FLAG_REMEMBERED: u32 = 1 << 1;

fn sex_code(sex: Sex) -> u8 {
    match sex {
        Sex::Hermaphrodite => 0,
        Sex::Female => 1,
        Sex::Male => 2,
    }
}

fn sex_from_code(code: u8) -> Result<Sex, MetadataError> {
    match code {
        0 => Ok(Sex::Hermaphrodite),
        1 => Ok(Sex::Female),
        2 => Ok(Sex::Male),
        other => Err(MetadataError::RoundtripError {
            value: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("unrecognized sex code {other}"),
            )),
        }),
    }
}

/// Everything about an [`slim_core::individual::Individual`] that isn't
/// already a table column (pedigree id, sex, age, spatial position,
/// migrant flag, tag), packed into the individual table's metadata
/// column (spec §4.6 step 3's "pedigree ids, ages, spatial positions,
/// flags").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndividualMeta {
    pub pedigree_id: PedigreeId,
    pub sex: Sex,
    pub age: Option<i32>,
    pub position: SpatialPosition,
    pub migrant: bool,
    pub tag: Option<i64>,
}

impl MetadataRoundtrip for IndividualMeta {
    fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.pedigree_id.0.to_le_bytes());
        buf.push(sex_code(self.sex));
        buf.push(self.migrant as u8);
        buf.extend_from_slice(&self.age.unwrap_or(-1).to_le_bytes());
        buf.push(self.position.dimensionality);
        for coordinate in self.position.coordinates {
            buf.extend_from_slice(&coordinate.to_le_bytes());
        }
        let tag = self.tag.unwrap_or(i64::MIN);
        buf.extend_from_slice(&tag.to_le_bytes());
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Self, MetadataError>
    where
        Self: Sized,
    {
        let mut cursor = 0usize;
        let mut take = |n: usize| -> Result<&[u8], MetadataError> {
            let slice = bytes.get(cursor..cursor + n).ok_or_else(|| MetadataError::RoundtripError {
                value: Box::new(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "individual metadata truncated")),
            })?;
            cursor += n;
            Ok(slice)
        };

        let pedigree_id = PedigreeId(u64::from_le_bytes(take(8)?.try_into().unwrap()));
        let sex = sex_from_code(take(1)?[0])?;
        let migrant = take(1)?[0] != 0;
        let age_raw = i32::from_le_bytes(take(4)?.try_into().unwrap());
        let age = (age_raw >= 0).then_some(age_raw);
        let dimensionality = take(1)?[0];
        let mut coordinates = [0.0f64; 3];
        for slot in &mut coordinates {
            *slot = f64::from_le_bytes(take(8)?.try_into().unwrap());
        }
        let tag_raw = i64::from_le_bytes(take(8)?.try_into().unwrap());
        let tag = (tag_raw != i64::MIN).then_some(tag_raw);

        Ok(IndividualMeta {
            pedigree_id,
            sex,
            age,
            position: SpatialPosition { coordinates, dimensionality },
            migrant,
            tag,
        })
    }
}

impl IndividualMetadata for IndividualMeta {}

/// One mutation id's metadata within a (possibly stacked) mutation
/// table row's derived state (spec §4.5, "Metadata ... is written
/// alongside each mutation id").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationEntry {
    pub id: u64,
    pub mutation_type: MutationTypeId,
    pub selection_coefficient: f64,
    pub origin_subpop: i32,
    pub origin_generation: i64,
    pub nucleotide: Option<u8>,
}

/// The full metadata payload for one mutation-table row: one
/// [`MutationEntry`] per id in the row's derived state, in the same
/// order (spec's "derived state is the concatenation of all mutation
/// ids currently at that position").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationRowMetadata {
    pub entries: Vec<MutationEntry>,
}

impl MetadataRoundtrip for MutationRowMetadata {
    fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let mut buf = Vec::with_capacity(self.entries.len() * 32);
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for entry in &self.entries {
            buf.extend_from_slice(&entry.id.to_le_bytes());
            buf.extend_from_slice(&entry.mutation_type.0.to_le_bytes());
            buf.extend_from_slice(&entry.selection_coefficient.to_le_bytes());
            buf.extend_from_slice(&entry.origin_subpop.to_le_bytes());
            buf.extend_from_slice(&entry.origin_generation.to_le_bytes());
            buf.push(entry.nucleotide.map(|n| n + 1).unwrap_or(0));
        }
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Self, MetadataError>
    where
        Self: Sized,
    {
        let mut cursor = 0usize;
        let mut take = |n: usize| -> Result<&[u8], MetadataError> {
            let slice = bytes.get(cursor..cursor + n).ok_or_else(|| MetadataError::RoundtripError {
                value: Box::new(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "mutation metadata truncated")),
            })?;
            cursor += n;
            Ok(slice)
        };

        let count = u32::from_le_bytes(take(4)?.try_into().unwrap()) as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let id = u64::from_le_bytes(take(8)?.try_into().unwrap());
            let mutation_type = MutationTypeId(i32::from_le_bytes(take(4)?.try_into().unwrap()));
            let selection_coefficient = f64::from_le_bytes(take(8)?.try_into().unwrap());
            let origin_subpop = i32::from_le_bytes(take(4)?.try_into().unwrap());
            let origin_generation = i64::from_le_bytes(take(8)?.try_into().unwrap());
            let nucleotide_raw = take(1)?[0];
            let nucleotide = (nucleotide_raw > 0).then_some(nucleotide_raw - 1);
            entries.push(MutationEntry {
                id,
                mutation_type,
                selection_coefficient,
                origin_subpop,
                origin_generation,
                nucleotide,
            });
        }
        Ok(MutationRowMetadata { entries })
    }
}

impl MutationMetadata for MutationRowMetadata {}

fn encode_bound(buf: &mut Vec<u8>, bound: Option<(f64, f64)>) {
    match bound {
        Some((lo, hi)) => {
            buf.push(1);
            buf.extend_from_slice(&lo.to_le_bytes());
            buf.extend_from_slice(&hi.to_le_bytes());
        }
        None => buf.push(0),
    }
}

fn decode_bound(bytes: &[u8], cursor: &mut usize) -> Result<Option<(f64, f64)>, MetadataError> {
    let present = *bytes.get(*cursor).ok_or_else(|| MetadataError::RoundtripError {
        value: Box::new(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "spatial bounds truncated")),
    })?;
    *cursor += 1;
    if present == 0 {
        return Ok(None);
    }
    let lo = f64::from_le_bytes(bytes[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    let hi = f64::from_le_bytes(bytes[*cursor..*cursor + 8].try_into().unwrap());
    *cursor += 8;
    Ok(Some((lo, hi)))
}

/// The subpopulation-level configuration that isn't recoverable from
/// table structure alone: reproduction fractions, incoming migration
/// rates, and spatial bounds (spec §4.6 step 5).
#[derive(Debug, Clone, PartialEq)]
pub struct SubpopulationMeta {
    pub sex_ratio: f64,
    pub selfing_rate: f64,
    pub cloning_rate: f64,
    pub migration_rates: Vec<(u32, f64)>,
    pub bounds: SpatialBounds,
}

impl MetadataRoundtrip for SubpopulationMeta {
    fn encode(&self) -> Result<Vec<u8>, MetadataError> {
        let mut buf = Vec::with_capacity(32 + self.migration_rates.len() * 12);
        buf.extend_from_slice(&self.sex_ratio.to_le_bytes());
        buf.extend_from_slice(&self.selfing_rate.to_le_bytes());
        buf.extend_from_slice(&self.cloning_rate.to_le_bytes());
        encode_bound(&mut buf, self.bounds.x);
        encode_bound(&mut buf, self.bounds.y);
        encode_bound(&mut buf, self.bounds.z);
        buf.extend_from_slice(&(self.migration_rates.len() as u32).to_le_bytes());
        for &(source, rate) in &self.migration_rates {
            buf.extend_from_slice(&source.to_le_bytes());
            buf.extend_from_slice(&rate.to_le_bytes());
        }
        Ok(buf)
    }

    fn decode(bytes: &[u8]) -> Result<Self, MetadataError>
    where
        Self: Sized,
    {
        let mut cursor = 0usize;
        let sex_ratio = f64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let selfing_rate = f64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let cloning_rate = f64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let x = decode_bound(bytes, &mut cursor)?;
        let y = decode_bound(bytes, &mut cursor)?;
        let z = decode_bound(bytes, &mut cursor)?;
        let count = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap()) as usize;
        cursor += 4;
        let mut migration_rates = Vec::with_capacity(count);
        for _ in 0..count {
            let source = u32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            let rate = f64::from_le_bytes(bytes[cursor..cursor + 8].try_into().unwrap());
            cursor += 8;
            migration_rates.push((source, rate));
        }
        Ok(SubpopulationMeta {
            sex_ratio,
            selfing_rate,
            cloning_rate,
            migration_rates,
            bounds: SpatialBounds { x, y, z },
        })
    }
}

impl PopulationMetadata for SubpopulationMeta {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_metadata_round_trips() {
        let meta = IndividualMeta {
            pedigree_id: PedigreeId(42),
            sex: Sex::Female,
            age: Some(3),
            position: SpatialPosition::new(&[1.0, 2.0, 3.0]),
            migrant: true,
            tag: Some(-7),
        };
        let encoded = meta.encode().unwrap();
        assert_eq!(IndividualMeta::decode(&encoded).unwrap(), meta);
    }

    #[test]
    fn individual_metadata_round_trips_with_no_age_or_tag() {
        let meta = IndividualMeta {
            pedigree_id: PedigreeId(1),
            sex: Sex::Hermaphrodite,
            age: None,
            position: SpatialPosition::default(),
            migrant: false,
            tag: None,
        };
        let encoded = meta.encode().unwrap();
        let decoded = IndividualMeta::decode(&encoded).unwrap();
        assert_eq!(decoded.age, None);
        assert_eq!(decoded.tag, None);
    }

    #[test]
    fn mutation_row_metadata_round_trips_a_stacked_row() {
        let meta = MutationRowMetadata {
            entries: vec![
                MutationEntry {
                    id: 1,
                    mutation_type: MutationTypeId(0),
                    selection_coefficient: -0.01,
                    origin_subpop: 0,
                    origin_generation: 5,
                    nucleotide: None,
                },
                MutationEntry {
                    id: 2,
                    mutation_type: MutationTypeId(1),
                    selection_coefficient: 0.0,
                    origin_subpop: 1,
                    origin_generation: 9,
                    nucleotide: Some(2),
                },
            ],
        };
        let encoded = meta.encode().unwrap();
        assert_eq!(MutationRowMetadata::decode(&encoded).unwrap(), meta);
    }

    #[test]
    fn subpopulation_metadata_round_trips_with_bounds_and_migration() {
        let meta = SubpopulationMeta {
            sex_ratio: 0.5,
            selfing_rate: 0.1,
            cloning_rate: 0.0,
            migration_rates: vec![(1, 0.01), (2, 0.02)],
            bounds: SpatialBounds { x: Some((0.0, 100.0)), y: None, z: None },
        };
        let encoded = meta.encode().unwrap();
        assert_eq!(SubpopulationMeta::decode(&encoded).unwrap(), meta);
    }
}
