//! The Script Block Registry: cached, typed lists of user callbacks with
//! `matching()` dispatch and deferred deregistration (spec §4.3).

use crate::block::{FilterId, ScriptBlock, ScriptBlockId, ScriptBlockType};
use hashbrown::HashMap;

/// A registered callback plus everything `matching()` needs to select
/// it, returned by reference so callers can read the (possibly
/// fast-path) body without cloning it.
pub type Matched<'a> = &'a ScriptBlock;

#[derive(Debug, Default)]
pub struct ScriptBlockRegistry {
    blocks: Vec<ScriptBlock>,
    /// Per-type cache of indices into `blocks`, rebuilt lazily whenever
    /// the block set changes (spec §4.3: "rebuilt lazily when the set of
    /// blocks changes").
    by_type: HashMap<ScriptBlockType, Vec<usize>>,
    /// Global-fitness callbacks whose range names exactly one
    /// generation, keyed by that generation (spec §4.3's "multimap keyed
    /// by generation").
    global_fitness_single_gen: HashMap<i64, Vec<usize>>,
    /// Global-fitness callbacks spanning more than one generation.
    global_fitness_multi_gen: Vec<usize>,
    dirty: bool,
    /// Blocks requested for removal but not yet swept (spec §4.3,
    /// "Deregistration is deferred ... so that dispatch never observes a
    /// hole").
    pending_removal: Vec<ScriptBlockId>,
    next_id: u32,
}

impl ScriptBlockRegistry {
    pub fn new() -> Self {
        ScriptBlockRegistry::default()
    }

    pub fn allocate_id(&mut self) -> ScriptBlockId {
        let id = ScriptBlockId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn register(&mut self, block: ScriptBlock) {
        self.blocks.push(block);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Mark `id` for removal. The block remains live (and dispatchable)
    /// until [`ScriptBlockRegistry::sweep_deregistrations`] is called
    /// between stages.
    pub fn request_removal(&mut self, id: ScriptBlockId) {
        self.pending_removal.push(id);
    }

    /// Actually remove every block requested for removal since the last
    /// sweep. Called between generation-cycle stages, never mid-stage, so
    /// that `matching()` never observes a block disappearing out from
    /// under an in-progress dispatch.
    pub fn sweep_deregistrations(&mut self) -> usize {
        if self.pending_removal.is_empty() {
            return 0;
        }
        let before = self.blocks.len();
        let pending = std::mem::take(&mut self.pending_removal);
        self.blocks.retain(|b| !pending.contains(&b.id));
        self.dirty = true;
        before - self.blocks.len()
    }

    fn rebuild_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        self.by_type.clear();
        self.global_fitness_single_gen.clear();
        self.global_fitness_multi_gen.clear();

        for (index, block) in self.blocks.iter().enumerate() {
            self.by_type.entry(block.block_type).or_default().push(index);

            if block.block_type == ScriptBlockType::FitnessGlobal {
                if block.is_single_generation() {
                    self.global_fitness_single_gen
                        .entry(block.start_generation)
                        .or_default()
                        .push(index);
                } else {
                    self.global_fitness_multi_gen.push(index);
                }
            }
        }
        self.dirty = false;
    }

    /// Return every active callback of `block_type` that applies at
    /// `generation` and whose subpop/mutation-type/interaction-type
    /// filters accept the given candidates (`-1` to mean "don't care
    /// about this filter", matching spec's "any" convention for a
    /// dispatch site that doesn't have e.g. an interaction type to
    /// offer).
    ///
    /// For `FitnessGlobal`, per spec §4.3/§5, single-generation callbacks
    /// active at `generation` are concatenated ahead of multi-generation
    /// callbacks; order across global-fitness callbacks is otherwise
    /// unspecified since they are order-independent by contract.
    pub fn matching(
        &mut self,
        generation: i64,
        block_type: ScriptBlockType,
        mutation_type: Option<i32>,
        interaction_type: Option<i32>,
        subpop_id: Option<i32>,
    ) -> Vec<Matched<'_>> {
        self.rebuild_if_dirty();

        let candidate_indices: Vec<usize> = if block_type == ScriptBlockType::FitnessGlobal {
            let mut indices = self
                .global_fitness_single_gen
                .get(&generation)
                .cloned()
                .unwrap_or_default();
            indices.extend(self.global_fitness_multi_gen.iter().copied());
            indices
        } else {
            self.by_type.get(&block_type).cloned().unwrap_or_default()
        };

        candidate_indices
            .into_iter()
            .map(|index| &self.blocks[index])
            .filter(|block| block.applies_to_generation(generation))
            .filter(|block| {
                mutation_type.is_none_or(|mt| block.mutation_type_filter.matches(mt))
            })
            .filter(|block| {
                interaction_type.is_none_or(|it| block.interaction_type_filter.matches(it))
            })
            .filter(|block| subpop_id.is_none_or(|sp| block.subpop_filter.matches(sp)))
            .collect()
    }

    pub fn blocks(&self) -> &[ScriptBlock] {
        &self.blocks
    }

    pub fn find(&self, id: ScriptBlockId) -> Option<&ScriptBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn find_mut(&mut self, id: ScriptBlockId) -> Option<&mut ScriptBlock> {
        self.dirty = true;
        self.blocks.iter_mut().find(|b| b.id == id)
    }
}

/// A convenience constructor used by dispatch sites that don't have a
/// subpopulation/mutation-type/interaction-type filter to narrow by
/// (passing [`FilterId::Any`] is the structural equivalent of `-1`).
pub fn any_filter() -> FilterId {
    FilterId::Any
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::ScriptBlock;

    fn block(registry: &mut ScriptBlockRegistry, block_type: ScriptBlockType, start: i64, end: i64) -> ScriptBlockId {
        let id = registry.allocate_id();
        registry.register(ScriptBlock::new(id, block_type, start, end, "{ return 1.0; }"));
        id
    }

    #[test]
    fn matching_respects_generation_range() {
        let mut registry = ScriptBlockRegistry::new();
        block(&mut registry, ScriptBlockType::EarlyEvent, 5, 10);

        assert!(registry.matching(4, ScriptBlockType::EarlyEvent, None, None, None).is_empty());
        assert_eq!(registry.matching(7, ScriptBlockType::EarlyEvent, None, None, None).len(), 1);
        assert!(registry.matching(11, ScriptBlockType::EarlyEvent, None, None, None).is_empty());
    }

    #[test]
    fn deregistration_is_deferred_until_swept() {
        let mut registry = ScriptBlockRegistry::new();
        let id = block(&mut registry, ScriptBlockType::LateEvent, 1, 100);

        registry.request_removal(id);
        assert_eq!(registry.matching(1, ScriptBlockType::LateEvent, None, None, None).len(), 1);

        let removed = registry.sweep_deregistrations();
        assert_eq!(removed, 1);
        assert!(registry.matching(1, ScriptBlockType::LateEvent, None, None, None).is_empty());
    }

    #[test]
    fn global_fitness_concatenates_single_then_multi_generation() {
        let mut registry = ScriptBlockRegistry::new();
        let multi = block(&mut registry, ScriptBlockType::FitnessGlobal, 1, 100);
        let single = block(&mut registry, ScriptBlockType::FitnessGlobal, 10, 10);

        let matched = registry.matching(10, ScriptBlockType::FitnessGlobal, None, None, None);
        let ids: Vec<_> = matched.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![single, multi]);
    }

    #[test]
    fn mutation_type_filter_narrows_dispatch() {
        let mut registry = ScriptBlockRegistry::new();
        let id = registry.allocate_id();
        let mut fitness_block = ScriptBlock::new(id, ScriptBlockType::Fitness, 1, 100, "{ return 1.0; }");
        fitness_block.mutation_type_filter = FilterId::Specific(2);
        registry.register(fitness_block);

        assert!(registry.matching(1, ScriptBlockType::Fitness, Some(1), None, None).is_empty());
        assert_eq!(registry.matching(1, ScriptBlockType::Fitness, Some(2), None, None).len(), 1);
    }
}
