//! [`ScriptBlock`]: one user-authored callback (spec §3, "Script Block").
//!
//! The scripting language itself (tokenizer, AST, interpreter) is an
//! external collaborator per spec §6; this crate never parses or
//! evaluates script source. What it owns is the callback's *envelope* —
//! its type tag, active generation range, and optional filter ids — plus,
//! for the two recognized fast-path shapes, a precomputed numeric
//! evaluator that bypasses the (external) interpreter entirely on the hot
//! path (spec §4.3).

use crate::fastpath::FastPath;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptBlockId(pub u32);

/// The eleven callback shapes a block may declare (spec §3). `Initialize`
/// and `UserFunction` blocks are registered but never dispatched through
/// `matching()` — they run once, respectively, before generation 1 and on
/// explicit call.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptBlockType {
    EarlyEvent,
    LateEvent,
    Initialize,
    Fitness,
    FitnessGlobal,
    Interaction,
    MateChoice,
    ModifyChild,
    Recombination,
    Mutation,
    Reproduction,
    UserFunction,
}

/// Filter-id convention shared by `mutation_type`, `interaction_type`, and
/// (in spirit) any other optional block filter: spec §4.3, "`-1` means
/// 'any'; `-2` means 'the NULL mutation-type'".
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterId {
    Any,
    NullMutationType,
    Specific(i32),
}

impl FilterId {
    pub fn matches(&self, candidate: i32) -> bool {
        match self {
            FilterId::Any => true,
            FilterId::NullMutationType => candidate == -2,
            FilterId::Specific(id) => *id == candidate,
        }
    }
}

/// The callback body: either unevaluated script source (dispatched
/// through the external interpreter by the caller) or one of the two
/// precomputed fast-path evaluators.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackBody {
    Source(String),
    FastPath(FastPath),
}

impl CallbackBody {
    /// Parse `source`, trying the fast-path recognizers first (spec
    /// §4.3's two recognized shapes) and falling back to opaque source
    /// that the caller must hand to the external interpreter.
    pub fn parse(source: impl Into<String>) -> Self {
        let source = source.into();
        match FastPath::recognize(&source) {
            Some(fast_path) => CallbackBody::FastPath(fast_path),
            None => CallbackBody::Source(source),
        }
    }

    pub fn is_fast_path(&self) -> bool {
        matches!(self, CallbackBody::FastPath(_))
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBlock {
    pub id: ScriptBlockId,
    pub block_type: ScriptBlockType,
    pub start_generation: i64,
    pub end_generation: i64,
    pub subpop_filter: FilterId,
    pub mutation_type_filter: FilterId,
    pub interaction_type_filter: FilterId,
    pub active: bool,
    pub body: CallbackBody,
}

impl ScriptBlock {
    pub fn new(
        id: ScriptBlockId,
        block_type: ScriptBlockType,
        start_generation: i64,
        end_generation: i64,
        body: impl Into<String>,
    ) -> Self {
        ScriptBlock {
            id,
            block_type,
            start_generation,
            end_generation,
            subpop_filter: FilterId::Any,
            mutation_type_filter: FilterId::Any,
            interaction_type_filter: FilterId::Any,
            active: true,
            body: CallbackBody::parse(body),
        }
    }

    pub fn applies_to_generation(&self, generation: i64) -> bool {
        self.active && generation >= self.start_generation && generation <= self.end_generation
    }

    /// True for a block whose range names exactly one generation — the
    /// split spec §4.3 uses to route global-fitness callbacks into the
    /// single-generation multimap rather than the multi-generation
    /// vector.
    pub fn is_single_generation(&self) -> bool {
        self.start_generation == self.end_generation
    }
}
