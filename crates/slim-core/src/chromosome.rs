//! The chromosome's recombination/mutation rate maps, mutrun
//! segmentation parameters, and ancestral nucleotide sequence (spec §3,
//! "Chromosome").

use slim_error::{Result, slim_bail};

/// `mutrun_count` may never exceed this compile-time bound (spec §4.2).
pub const MAX_MUTRUN_COUNT: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenomeType {
    Autosome,
    XChromosome,
    YChromosome,
}

/// A breakpoint-rate map: ascending end-positions paired with the rate
/// that applies up to (and including) that position. The last entry's
/// end-position must equal the chromosome's last base.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RateMap {
    ends: Vec<i64>,
    rates: Vec<f64>,
}

impl RateMap {
    pub fn new(ends: Vec<i64>, rates: Vec<f64>) -> Result<Self> {
        if ends.is_empty() || ends.len() != rates.len() {
            slim_bail!(Configuration: "rate map ends/rates must be non-empty and equal length");
        }
        if !ends.windows(2).all(|w| w[0] < w[1]) {
            slim_bail!(Configuration: "rate map end-positions must be strictly ascending");
        }
        if rates.iter().any(|&r| r < 0.0) {
            slim_bail!(Configuration: "rate map rates must be non-negative");
        }
        Ok(RateMap { ends, rates })
    }

    pub fn uniform(length: i64, rate: f64) -> Result<Self> {
        RateMap::new(vec![length - 1], vec![rate])
    }

    /// The rate that applies at `position`.
    pub fn rate_at(&self, position: i64) -> f64 {
        let idx = self.ends.partition_point(|&end| end < position);
        self.rates[idx.min(self.rates.len() - 1)]
    }

    pub fn last_position(&self) -> i64 {
        *self.ends.last().unwrap()
    }

    pub fn ends(&self) -> &[i64] {
        &self.ends
    }

    pub fn rates(&self) -> &[f64] {
        &self.rates
    }

    /// Mean rate per base over the whole chromosome, used to estimate
    /// the expected number of events per meiosis.
    pub fn mean_rate(&self) -> f64 {
        let mut total = 0.0;
        let mut prev_end = -1i64;
        for (&end, &rate) in self.ends.iter().zip(&self.rates) {
            let span = (end - prev_end) as f64;
            total += span * rate;
            prev_end = end;
        }
        total / (self.last_position() + 1) as f64
    }
}

/// Separate maps for each sex plus an optional combined (non-sex-aware)
/// map, matching spec's "H/M/F variants" for both recombination and
/// mutation rate.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum SexSpecificMap {
    Combined(RateMap),
    BySex { male: RateMap, female: RateMap },
}

impl SexSpecificMap {
    pub fn for_sex(&self, sex: crate::individual::Sex) -> &RateMap {
        match (self, sex) {
            (SexSpecificMap::Combined(map), _) => map,
            (SexSpecificMap::BySex { male, .. }, crate::individual::Sex::Male) => male,
            (SexSpecificMap::BySex { female, .. }, _) => female,
        }
    }
}

/// A hotspot multiplier map layered on top of the base mutation rate for
/// nucleotide-based models: each region's rate is `base_rate *
/// multiplier`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct HotspotMap {
    ends: Vec<i64>,
    multipliers: Vec<f64>,
}

impl HotspotMap {
    pub fn uniform(length: i64) -> Self {
        HotspotMap {
            ends: vec![length - 1],
            multipliers: vec![1.0],
        }
    }

    pub fn multiplier_at(&self, position: i64) -> f64 {
        let idx = self.ends.partition_point(|&end| end < position);
        self.multipliers[idx.min(self.multipliers.len() - 1)]
    }
}

/// Packed 2-bit ancestral nucleotide sequence (`A=0, C=1, G=2, T=3`).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AncestralSequence {
    length: i64,
    packed: Vec<u8>,
}

impl AncestralSequence {
    pub fn new(length: i64) -> Self {
        AncestralSequence {
            length,
            packed: vec![0u8; ((length as usize) + 3) / 4],
        }
    }

    pub fn len(&self) -> i64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn get(&self, position: i64) -> u8 {
        debug_assert!(position >= 0 && position < self.length);
        let byte = self.packed[(position / 4) as usize];
        (byte >> ((position % 4) * 2)) & 0b11
    }

    pub fn set(&mut self, position: i64, nucleotide: u8) {
        debug_assert!(position >= 0 && position < self.length);
        debug_assert!(nucleotide < 4);
        let byte_index = (position / 4) as usize;
        let shift = (position % 4) * 2;
        let byte = &mut self.packed[byte_index];
        *byte = (*byte & !(0b11 << shift)) | (nucleotide << shift);
    }

    /// ASCII round-trip for the text file formats: each base is one of
    /// `A C G T`.
    pub fn to_ascii(&self) -> String {
        const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];
        (0..self.length)
            .map(|p| BASES[self.get(p) as usize] as char)
            .collect()
    }

    pub fn from_ascii(ascii: &str) -> Result<Self> {
        let mut seq = AncestralSequence::new(ascii.len() as i64);
        for (position, base) in ascii.bytes().enumerate() {
            let nucleotide = match base {
                b'A' => 0,
                b'C' => 1,
                b'G' => 2,
                b'T' => 3,
                other => slim_bail!(FileFormat: "invalid ancestral-sequence base {:?}", other as char),
            };
            seq.set(position as i64, nucleotide);
        }
        Ok(seq)
    }

    pub fn packed_bytes(&self) -> &[u8] {
        &self.packed
    }
}

/// Per-chromosome configuration: rate maps, the mutrun segmentation, and
/// the ancestral sequence for nucleotide-based models.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone)]
pub struct Chromosome {
    pub length: i64,
    pub recombination_rate: SexSpecificMap,
    pub mutation_rate: SexSpecificMap,
    pub hotspot_map: Option<HotspotMap>,
    mutrun_count: u32,
    mutrun_length: i64,
    pub ancestral_sequence: Option<AncestralSequence>,
}

impl Chromosome {
    pub fn new(
        length: i64,
        recombination_rate: SexSpecificMap,
        mutation_rate: SexSpecificMap,
        mutrun_count: u32,
    ) -> Result<Self> {
        let mut chromosome = Chromosome {
            length,
            recombination_rate,
            mutation_rate,
            hotspot_map: None,
            mutrun_count: 1,
            mutrun_length: length,
            ancestral_sequence: None,
        };
        chromosome.set_mutrun_count(mutrun_count)?;
        Ok(chromosome)
    }

    pub fn mutrun_count(&self) -> u32 {
        self.mutrun_count
    }

    pub fn mutrun_length(&self) -> i64 {
        self.mutrun_length
    }

    /// Change the segmentation, enforcing the power-of-two and bound
    /// invariants (spec §4.2): both `mutrun_count` and `mutrun_length`
    /// must be powers of two, `mutrun_count <= MAX_MUTRUN_COUNT`, and
    /// `mutrun_count * mutrun_length == length` (the chromosome length
    /// itself must therefore be a power of two for this to hold
    /// exactly; the file-format loader is responsible for rounding up
    /// user-specified lengths when constructing a `Chromosome`).
    pub fn set_mutrun_count(&mut self, mutrun_count: u32) -> Result<()> {
        if mutrun_count == 0 || !mutrun_count.is_power_of_two() {
            slim_bail!(Configuration: "mutrun_count {mutrun_count} must be a power of two");
        }
        if mutrun_count > MAX_MUTRUN_COUNT {
            slim_bail!(Configuration: "mutrun_count {mutrun_count} exceeds MAX_MUTRUN_COUNT ({MAX_MUTRUN_COUNT})");
        }
        if self.length % mutrun_count as i64 != 0 {
            slim_bail!(Configuration: "chromosome length {} is not divisible by mutrun_count {mutrun_count}", self.length);
        }
        let mutrun_length = self.length / mutrun_count as i64;
        if !mutrun_length.is_power_of_two() && mutrun_length != 0 {
            slim_bail!(Configuration: "mutrun_length {mutrun_length} must be a power of two");
        }
        self.mutrun_count = mutrun_count;
        self.mutrun_length = mutrun_length.max(1);
        Ok(())
    }

    pub fn segment_of(&self, position: i64) -> usize {
        (position / self.mutrun_length) as usize
    }

    pub fn recombination_rate_at(&self, position: i64, sex: crate::individual::Sex) -> f64 {
        self.recombination_rate.for_sex(sex).rate_at(position)
    }

    pub fn mutation_rate_at(&self, position: i64, sex: crate::individual::Sex) -> f64 {
        let base = self.mutation_rate.for_sex(sex).rate_at(position);
        match &self.hotspot_map {
            Some(hotspots) => base * hotspots.multiplier_at(position),
            None => base,
        }
    }

    pub fn expected_mutations_per_meiosis(&self, sex: crate::individual::Sex) -> f64 {
        self.mutation_rate.for_sex(sex).mean_rate() * self.length as f64
    }

    pub fn expected_crossovers_per_meiosis(&self, sex: crate::individual::Sex) -> f64 {
        self.recombination_rate.for_sex(sex).mean_rate() * self.length as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::individual::Sex;

    fn uniform_chromosome(length: i64, mutrun_count: u32) -> Chromosome {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(length, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(length, 1e-7).unwrap());
        Chromosome::new(length, recomb, mutr, mutrun_count).unwrap()
    }

    #[test]
    fn segment_of_respects_mutrun_length() {
        let chromosome = uniform_chromosome(1024, 8);
        assert_eq!(chromosome.mutrun_length(), 128);
        assert_eq!(chromosome.segment_of(0), 0);
        assert_eq!(chromosome.segment_of(127), 0);
        assert_eq!(chromosome.segment_of(128), 1);
        assert_eq!(chromosome.segment_of(1023), 7);
    }

    #[test]
    fn rejects_non_power_of_two_mutrun_count() {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-7).unwrap());
        assert!(Chromosome::new(1024, recomb, mutr, 3).is_err());
    }

    #[test]
    fn rejects_count_above_max() {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(4096, 1e-8).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(4096, 1e-7).unwrap());
        assert!(Chromosome::new(4096, recomb, mutr, 2048).is_err());
    }

    #[test]
    fn boundary_mutrun_counts_both_valid() {
        assert!(uniform_chromosome(1024, 1).mutrun_count() == 1);
        assert!(uniform_chromosome(1024, 1024).mutrun_count() == 1024);
    }

    #[test]
    fn ancestral_sequence_round_trips_through_ascii() {
        let mut seq = AncestralSequence::new(4);
        seq.set(0, 0);
        seq.set(1, 1);
        seq.set(2, 2);
        seq.set(3, 3);
        assert_eq!(seq.to_ascii(), "ACGT");

        let parsed = AncestralSequence::from_ascii("ACGT").unwrap();
        assert_eq!(parsed, seq);
    }

    #[test]
    fn rate_map_sex_dispatch() {
        let male = RateMap::uniform(100, 1e-8).unwrap();
        let female = RateMap::uniform(100, 2e-8).unwrap();
        let map = SexSpecificMap::BySex { male, female };
        assert_eq!(map.for_sex(Sex::Male).rate_at(0), 1e-8);
        assert_eq!(map.for_sex(Sex::Female).rate_at(0), 2e-8);
    }
}
