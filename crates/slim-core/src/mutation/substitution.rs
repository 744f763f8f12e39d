//! A mutation that has fixed: reached frequency 1 in every non-null
//! genome, been removed from every mutation run, and appended to the
//! process-wide substitution list (spec §3, "Substitution"). Stored in a
//! multimap keyed by position so the tree-sequence recorder can find
//! every substitution at a site with `equal_range`-style iteration.

use super::block::Mutation;
use std::collections::BTreeMap;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Substitution {
    pub id: u64,
    pub mutation_type: super::mtype::MutationTypeId,
    pub position: i64,
    pub selection_coefficient: f64,
    pub origin_subpop: i32,
    pub origin_generation: i64,
    pub fixation_generation: i64,
    pub nucleotide: Option<u8>,
}

impl Substitution {
    pub fn from_fixed_mutation(mutation: &Mutation, fixation_generation: i64) -> Self {
        Substitution {
            id: mutation.id,
            mutation_type: mutation.mutation_type,
            position: mutation.position,
            selection_coefficient: mutation.selection_coefficient,
            origin_subpop: mutation.origin_subpop,
            origin_generation: mutation.origin_generation,
            fixation_generation,
            nucleotide: mutation.nucleotide,
        }
    }
}

/// An append-only, position-keyed collection of [`Substitution`]s.
/// Grows monotonically within a run (spec §5): nothing is ever removed,
/// so iteration over a position's substitutions via
/// [`SubstitutionList::at_position`] is stable across concurrent
/// mutation-recording calls within the same generation.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct SubstitutionList {
    by_position: BTreeMap<i64, Vec<Substitution>>,
    count: usize,
}

impl SubstitutionList {
    pub fn new() -> Self {
        SubstitutionList::default()
    }

    pub fn push(&mut self, substitution: Substitution) {
        self.by_position
            .entry(substitution.position)
            .or_default()
            .push(substitution);
        self.count += 1;
    }

    pub fn at_position(&self, position: i64) -> &[Substitution] {
        self.by_position
            .get(&position)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_id(&self, position: i64, id: u64) -> bool {
        self.at_position(position).iter().any(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Substitution> {
        self.by_position.values().flatten()
    }

    pub fn positions(&self) -> impl Iterator<Item = i64> + '_ {
        self.by_position.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::mtype::MutationTypeId;

    fn sub(position: i64, id: u64) -> Substitution {
        Substitution {
            id,
            mutation_type: MutationTypeId(0),
            position,
            selection_coefficient: 0.1,
            origin_subpop: 0,
            origin_generation: 0,
            fixation_generation: 10,
            nucleotide: None,
        }
    }

    #[test]
    fn keyed_by_position_exactly_once() {
        let mut list = SubstitutionList::new();
        list.push(sub(100, 1));
        list.push(sub(100, 2));
        list.push(sub(200, 3));

        assert_eq!(list.len(), 3);
        assert_eq!(list.at_position(100).len(), 2);
        assert_eq!(list.at_position(200).len(), 1);
        assert!(list.contains_id(100, 1));
        assert!(!list.contains_id(200, 1));
    }
}
