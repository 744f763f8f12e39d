//! The Script Block Registry: registration, typed/generation-indexed
//! dispatch, deferred deregistration, and the two recognized fast-path
//! callback shapes (spec §4.3).
//!
//! The scripting language itself — tokenizer, AST, symbol table,
//! interpreter — is an external collaborator (spec §6); this crate only
//! manages the callback envelopes and the generation-cycle driver
//! (`slim-engine`) consumes `matching()` to decide which callbacks to
//! invoke at each stage.

pub mod block;
pub mod fastpath;
pub mod registry;

pub use block::{CallbackBody, FilterId, ScriptBlock, ScriptBlockId, ScriptBlockType};
pub use fastpath::FastPath;
pub use registry::{ScriptBlockRegistry, any_filter};

pub type Result<T> = slim_error::Result<T>;
