//! The Wright-Fisher default mating scheme (spec §4.4 stage 2's "fast
//! path"): fitness-proportional parent selection, recombination-
//! breakpoint-driven crossover, and new-mutation generation, used
//! whenever a subpopulation has no active `Reproduction` callback for
//! the current generation. A `Reproduction`/`MateChoice`/`ModifyChild`
//! callback, where registered, takes over this subpopulation's offspring
//! generation entirely; this module never runs alongside one.

use crate::chromosome::{Chromosome, RateMap};
use crate::genome::Genome;
use crate::individual::{Individual, PedigreeIdAllocator, Sex};
use crate::lineage::{LineageRecorder, MutationLineageInfo};
use crate::mutation::{MutationBlock, MutationType, MutationTypeId};
use crate::run::MutationRun;
use crate::subpopulation::{Subpopulation, SubpopulationId};
use slim_error::{Result, slim_bail};
use std::collections::HashMap;

/// Draw a single position from `map`, weighting each of its intervals by
/// `span * rate` so that a uniform map degenerates to a uniform draw.
fn weighted_position(map: &RateMap) -> i64 {
    let ends = map.ends();
    let rates = map.rates();

    let mut weights = Vec::with_capacity(ends.len());
    let mut prev_end = -1i64;
    for (&end, &rate) in ends.iter().zip(rates) {
        weights.push((end - prev_end) as f64 * rate);
        prev_end = end;
    }
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return map.last_position();
    }

    let mut remaining = crate::random::unit_f64() * total;
    let mut prev_end = -1i64;
    for (i, &end) in ends.iter().enumerate() {
        if remaining < weights[i] {
            return crate::random::range_i64(prev_end + 1, end + 1);
        }
        remaining -= weights[i];
        prev_end = end;
    }
    *ends.last().unwrap()
}

/// Recombination breakpoints for one meiosis: a Poisson-distributed
/// count (mean = expected crossovers over the whole chromosome) of
/// positions, each drawn from the recombination map, sorted and
/// deduplicated.
fn draw_breakpoints(chromosome: &Chromosome, sex: Sex) -> Vec<i64> {
    let expected = chromosome.expected_crossovers_per_meiosis(sex);
    let count = crate::random::poisson(expected);
    if count == 0 {
        return Vec::new();
    }
    let map = chromosome.recombination_rate.for_sex(sex);
    let mut breakpoints: Vec<i64> = (0..count).map(|_| weighted_position(map)).collect();
    breakpoints.sort_unstable();
    breakpoints.dedup();
    breakpoints
}

/// Build one recombined gamete from `strand0`/`strand1`, the two
/// haploid copies of one parent's chromosome. If either copy is a null
/// genome (the absent homolog under sex-linked inheritance), the gamete
/// is simply an inherited copy of the other, since there is nothing to
/// recombine with.
fn meiosis(
    parent: &Individual,
    chromosome: &Chromosome,
    mutation_block: &mut MutationBlock,
    mutation_types: &HashMap<MutationTypeId, MutationType>,
    origin_subpop: i32,
    generation: i64,
    mut lineage: Option<&mut dyn LineageRecorder>,
) -> Result<Genome> {
    let [strand0, strand1] = parent.genomes();

    if strand0.is_null || strand1.is_null {
        let source = if strand0.is_null { strand1 } else { strand0 };
        return inherit_unrecombined(
            source,
            mutation_block,
            origin_subpop as u32,
            chromosome,
            mutation_types,
            parent.sex,
            generation,
            lineage,
        );
    }

    let mutrun_count = strand0.mutrun_count();
    let mutrun_length = chromosome.mutrun_length();
    let breakpoints = draw_breakpoints(chromosome, parent.sex);

    let mut boundaries = Vec::with_capacity(breakpoints.len() + 2);
    boundaries.push(0i64);
    boundaries.extend_from_slice(&breakpoints);
    boundaries.push(chromosome.length);

    let starting_strand = usize::from(crate::random::bernoulli(0.5));
    let strands = [strand0, strand1];

    let mut genome = Genome::new_empty(strand0.genome_type, mutrun_count as u32, origin_subpop as u32);

    for segment in 0..mutrun_count {
        let seg_start = segment as i64 * mutrun_length;
        let seg_end = seg_start + mutrun_length;

        let mut seg_indices = Vec::new();
        let mut active = starting_strand;
        for window in boundaries.windows(2) {
            let (lo, hi) = (window[0].max(seg_start), window[1].min(seg_end));
            if lo < hi {
                for &index in strands[active].run(segment).indices() {
                    let position = mutation_block.get(index).position;
                    if position >= lo && position < hi {
                        seg_indices.push(index);
                    }
                }
            }
            active = 1 - active;
        }

        for &index in &seg_indices {
            mutation_block.retain(index);
        }
        genome.set_run(segment, MutationRun::from_sorted_indices(seg_indices));
    }

    if let Some(recorder) = lineage.as_deref_mut() {
        recorder.record_node(&mut genome, generation as f64, SubpopulationId(origin_subpop as u32))?;
    }
    apply_new_mutations(
        &mut genome,
        chromosome,
        mutation_block,
        mutation_types,
        parent.sex,
        origin_subpop,
        generation,
        lineage.as_deref_mut(),
    )?;
    if let Some(recorder) = lineage.as_deref_mut() {
        let child_node = genome.tsk_node_id.unwrap_or(-1);
        let parent_nodes = [strand0.tsk_node_id.unwrap_or(-1), strand1.tsk_node_id.unwrap_or(-1)];
        recorder.record_breakpoints(child_node, parent_nodes, &breakpoints, chromosome.length as f64)?;
    }
    Ok(genome)
}

/// The unrecombined half of sex-linked inheritance: a father's single X
/// passed to a daughter, or (via the null-genome branch above) his Y
/// passed to a son. Still eligible for new mutations, matching the
/// original's "new mutations can land on any transmitted strand".
fn inherit_unrecombined(
    source: &Genome,
    mutation_block: &mut MutationBlock,
    subpopulation: u32,
    chromosome: &Chromosome,
    mutation_types: &HashMap<MutationTypeId, MutationType>,
    sex: Sex,
    generation: i64,
    mut lineage: Option<&mut dyn LineageRecorder>,
) -> Result<Genome> {
    let mut genome = Genome::inherit(source, mutation_block, subpopulation);
    if let Some(recorder) = lineage.as_deref_mut() {
        recorder.record_node(&mut genome, generation as f64, SubpopulationId(subpopulation))?;
    }
    if !genome.is_null {
        apply_new_mutations(
            &mut genome,
            chromosome,
            mutation_block,
            mutation_types,
            sex,
            subpopulation as i32,
            generation,
            lineage.as_deref_mut(),
        )?;
    }
    if let Some(recorder) = lineage.as_deref_mut() {
        let child_node = genome.tsk_node_id.unwrap_or(-1);
        let parent_node = source.tsk_node_id.unwrap_or(-1);
        recorder.record_breakpoints(child_node, [parent_node, parent_node], &[], chromosome.length as f64)?;
    }
    Ok(genome)
}

fn apply_new_mutations(
    genome: &mut Genome,
    chromosome: &Chromosome,
    mutation_block: &mut MutationBlock,
    mutation_types: &HashMap<MutationTypeId, MutationType>,
    sex: Sex,
    origin_subpop: i32,
    generation: i64,
    mut lineage: Option<&mut dyn LineageRecorder>,
) -> Result<()> {
    if mutation_types.is_empty() {
        return Ok(());
    }
    let expected = chromosome.expected_mutations_per_meiosis(sex);
    let count = crate::random::poisson(expected);
    if count == 0 {
        return Ok(());
    }

    let type_ids: Vec<MutationTypeId> = mutation_types.keys().copied().collect();
    let map = chromosome.mutation_rate.for_sex(sex);
    let mutrun_length = chromosome.mutrun_length();

    for _ in 0..count {
        let position = weighted_position(map);
        let mutation_type_id = type_ids[crate::random::below(type_ids.len())];
        let mutation_type = &mutation_types[&mutation_type_id];
        let selection_coefficient = mutation_type.distribution.draw();

        let index = mutation_block.allocate(mutation_type_id, position, selection_coefficient, origin_subpop, generation, None);
        mutation_block.retain(index);

        match genome.insert_mutation_with_stacking(mutation_block, mutrun_length, index, mutation_type) {
            Ok(Some(evicted)) => {
                let _ = mutation_block.release(evicted);
                if let Some(recorder) = lineage.as_deref_mut() {
                    if let Some(node) = genome.tsk_node_id {
                        let info = MutationLineageInfo {
                            mutation_type: mutation_type_id,
                            selection_coefficient,
                            origin_subpop,
                            origin_generation: generation,
                        };
                        recorder.record_mutation(node, position as f64, &[index as u64], &info)?;
                    }
                }
            }
            Ok(None) => {
                if let Some(recorder) = lineage.as_deref_mut() {
                    if let Some(node) = genome.tsk_node_id {
                        let info = MutationLineageInfo {
                            mutation_type: mutation_type_id,
                            selection_coefficient,
                            origin_subpop,
                            origin_generation: generation,
                        };
                        recorder.record_mutation(node, position as f64, &[index as u64], &info)?;
                    }
                }
            }
            Err(_) => {
                // Position fell outside every segment this genome has
                // (shouldn't happen: `weighted_position` is bounded by
                // the chromosome's own length); drop the allocation
                // rather than leave a dangling retained index.
                let _ = mutation_block.release(index);
            }
        }
    }
    Ok(())
}

fn fitness_weights(parents: &[Individual], indices: &[usize]) -> (Vec<f64>, f64) {
    let mut cumulative = Vec::with_capacity(indices.len());
    let mut total = 0.0;
    for &i in indices {
        total += parents[i].fitness.max(0.0);
        cumulative.push(total);
    }
    (cumulative, total)
}

fn weighted_choice(indices: &[usize], cumulative: &[f64], total: f64) -> usize {
    if total <= 0.0 {
        return indices[crate::random::below(indices.len())];
    }
    let draw = crate::random::unit_f64() * total;
    let position = cumulative.partition_point(|&c| c < draw);
    indices[position.min(indices.len() - 1)]
}

/// Generate `target_size` offspring into `subpop.children` via the
/// default Wright-Fisher mating scheme: fitness-proportional parent
/// selection (respecting `selfing_rate`/`cloning_rate` when sex is not
/// enabled), one recombined gamete from each parent, and new mutations
/// inserted per the chromosome's mutation-rate map.
pub fn generate_wf_offspring(
    subpop: &mut Subpopulation,
    target_size: usize,
    chromosome: &Chromosome,
    mutation_block: &mut MutationBlock,
    mutation_types: &HashMap<MutationTypeId, MutationType>,
    pedigree_ids: &PedigreeIdAllocator,
    sex_enabled: bool,
    generation: i64,
    mut lineage: Option<&mut dyn LineageRecorder>,
) -> Result<()> {
    if target_size == 0 || subpop.parents.is_empty() {
        return Ok(());
    }

    let origin_subpop = subpop.id.0 as i32;

    let (female_indices, male_indices): (Vec<usize>, Vec<usize>) = if sex_enabled {
        (
            subpop.parents.iter().enumerate().filter(|(_, i)| i.sex != Sex::Male).map(|(i, _)| i).collect(),
            subpop.parents.iter().enumerate().filter(|(_, i)| i.sex == Sex::Male).map(|(i, _)| i).collect(),
        )
    } else {
        let all: Vec<usize> = (0..subpop.parents.len()).collect();
        (all.clone(), all)
    };

    if female_indices.is_empty() || male_indices.is_empty() {
        slim_bail!(Internal: "subpopulation {:?} has no viable mating pair (sex_enabled={sex_enabled})", subpop.id);
    }

    let (female_cumulative, female_total) = fitness_weights(&subpop.parents, &female_indices);
    let (male_cumulative, male_total) = fitness_weights(&subpop.parents, &male_indices);

    subpop.children.reserve(target_size);
    for _ in 0..target_size {
        let mother_idx = weighted_choice(&female_indices, &female_cumulative, female_total);

        let is_cloning = !sex_enabled && crate::random::bernoulli(subpop.cloning_rate);
        let is_selfing = !sex_enabled && !is_cloning && crate::random::bernoulli(subpop.selfing_rate);

        let father_idx = if sex_enabled {
            weighted_choice(&male_indices, &male_cumulative, male_total)
        } else if is_cloning || is_selfing {
            mother_idx
        } else {
            weighted_choice(&male_indices, &male_cumulative, male_total)
        };

        let child_sex = if sex_enabled {
            if crate::random::bernoulli(subpop.sex_ratio) { Sex::Male } else { Sex::Female }
        } else {
            Sex::Hermaphrodite
        };

        let (genome1, genome2) = if is_cloning {
            let parent = &subpop.parents[mother_idx];
            let parent_node1 = parent.genome1.tsk_node_id.unwrap_or(-1);
            let parent_node2 = parent.genome2.tsk_node_id.unwrap_or(-1);
            let mut g1 = Genome::inherit(&parent.genome1, mutation_block, origin_subpop as u32);
            let mut g2 = Genome::inherit(&parent.genome2, mutation_block, origin_subpop as u32);
            if let Some(recorder) = lineage.as_deref_mut() {
                recorder.record_node(&mut g1, generation as f64, SubpopulationId(origin_subpop as u32))?;
                let child_node1 = g1.tsk_node_id.unwrap_or(-1);
                recorder.record_breakpoints(child_node1, [parent_node1, parent_node1], &[], chromosome.length as f64)?;
                recorder.record_node(&mut g2, generation as f64, SubpopulationId(origin_subpop as u32))?;
                let child_node2 = g2.tsk_node_id.unwrap_or(-1);
                recorder.record_breakpoints(child_node2, [parent_node2, parent_node2], &[], chromosome.length as f64)?;
            }
            (g1, g2)
        } else {
            let mother = &subpop.parents[mother_idx];
            let father = &subpop.parents[father_idx];
            let maternal = meiosis(mother, chromosome, mutation_block, mutation_types, origin_subpop, generation, lineage.as_deref_mut())?;
            let paternal = if sex_enabled {
                let (source, parent_node) = match child_sex {
                    Sex::Male => (&father.genome2, father.genome2.tsk_node_id.unwrap_or(-1)),
                    _ => (&father.genome1, father.genome1.tsk_node_id.unwrap_or(-1)),
                };
                let mut genome = Genome::inherit(source, mutation_block, origin_subpop as u32);
                if let Some(recorder) = lineage.as_deref_mut() {
                    recorder.record_node(&mut genome, generation as f64, SubpopulationId(origin_subpop as u32))?;
                    let child_node = genome.tsk_node_id.unwrap_or(-1);
                    recorder.record_breakpoints(child_node, [parent_node, parent_node], &[], chromosome.length as f64)?;
                }
                genome
            } else {
                meiosis(father, chromosome, mutation_block, mutation_types, origin_subpop, generation, lineage.as_deref_mut())?
            };
            (maternal, paternal)
        };

        let pedigree_id = pedigree_ids.next();
        subpop.children.push(Individual::new(pedigree_id, genome1, genome2, child_sex));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::{GenomeType, SexSpecificMap};
    use crate::mutation::mtype::{DominanceCoefficient, SelectionCoefficientDistribution, StackingPolicy};
    use crate::subpopulation::SubpopulationId;

    fn catalog() -> HashMap<MutationTypeId, MutationType> {
        let mut types = HashMap::new();
        types.insert(
            MutationTypeId(0),
            MutationType {
                id: MutationTypeId(0),
                dominance: DominanceCoefficient::Fixed(0.5),
                distribution: SelectionCoefficientDistribution::Fixed(0.1),
                stacking_group: 0,
                stacking_policy: StackingPolicy::KeepAll,
                convert_to_substitution: true,
            },
        );
        types
    }

    fn chromosome() -> Chromosome {
        let recomb = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-3).unwrap());
        let mutr = SexSpecificMap::Combined(RateMap::uniform(1024, 1e-3).unwrap());
        Chromosome::new(1024, recomb, mutr, 8).unwrap()
    }

    fn populated_subpop(size: usize) -> (Subpopulation, MutationBlock) {
        let block = MutationBlock::new();
        let mut subpop = Subpopulation::new(SubpopulationId(0));
        for _ in 0..size {
            let g1 = Genome::new_empty(GenomeType::Autosome, 8, 0);
            let g2 = Genome::new_empty(GenomeType::Autosome, 8, 0);
            subpop.parents.push(Individual::new(crate::individual::PedigreeId(0), g1, g2, Sex::Hermaphrodite));
        }
        (subpop, block)
    }

    #[test]
    fn generate_wf_offspring_fills_children_to_target_size() {
        let (mut subpop, mut block) = populated_subpop(20);
        let chromosome = chromosome();
        let types = catalog();
        let pedigree_ids = PedigreeIdAllocator::new();

        crate::random::set_seed(7);
        generate_wf_offspring(&mut subpop, 20, &chromosome, &mut block, &types, &pedigree_ids, false, 1, None).unwrap();

        assert_eq!(subpop.children.len(), 20);
        block.check_invariants().unwrap();
    }

    #[test]
    fn cloning_rate_one_reproduces_parent_genomes_exactly() {
        let (mut subpop, mut block) = populated_subpop(5);
        subpop.cloning_rate = 1.0;
        let idx = block.allocate(MutationTypeId(0), 10, 0.1, 0, 0, None);
        block.retain(idx);
        subpop.parents[0].genome1.add_mutation(&block, 128, idx);

        let chromosome = chromosome();
        let types = catalog();
        let pedigree_ids = PedigreeIdAllocator::new();

        crate::random::set_seed(11);
        generate_wf_offspring(&mut subpop, 5, &chromosome, &mut block, &types, &pedigree_ids, false, 1, None).unwrap();

        assert_eq!(subpop.children.len(), 5);
        assert!(block.refcount(idx) >= 2, "cloned children should retain the parent's mutation");
    }

    #[test]
    fn no_viable_mates_under_sex_is_an_error() {
        let (mut subpop, mut block) = populated_subpop(3);
        // All-hermaphrodite parents have no `Male`s, so a sex-enabled run
        // has no viable father pool.
        let chromosome = chromosome();
        let types = catalog();
        let pedigree_ids = PedigreeIdAllocator::new();

        assert!(generate_wf_offspring(&mut subpop, 3, &chromosome, &mut block, &types, &pedigree_ids, true, 1, None).is_err());
    }
}
