//! The Mutation Block: a process-... actually instance-wide pool (see
//! `DESIGN.md` for why this was changed from a global to an
//! owner-scoped pool) that allocates mutation records by dense 32-bit
//! index, plus the mutation-type catalog and the substitution list.

pub mod block;
pub mod mtype;
pub mod substitution;

pub use block::{Mutation, MutationBlock, MutationIndex};
pub use mtype::{DominanceCoefficient, MutationType, MutationTypeId, StackingPolicy};
pub use substitution::{Substitution, SubstitutionList};
