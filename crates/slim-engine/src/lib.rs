//! The mutation-run experimenter (spec §4.2) and the generation-cycle
//! driver (spec §4.4), wired together behind an `Engine`/`EngineExt`
//! trait pair ported from `radiate_core::engine`: stepping the
//! simulation one generation at a time is "advance to the next epoch",
//! exactly the shape that trait already describes for an evolutionary
//! algorithm's generation loop.

pub mod cycle;
pub mod engine;
pub mod experimenter;
pub mod simulator;

pub use cycle::{CycleReport, GenerationCycle, ScriptHost, Stage, UNIQUENESS_PASS_INTERVAL};
pub use engine::{Engine, EngineExt};
pub use experimenter::{Decision, Direction, EXPERIMENT_WINDOW, Experimenter, Outcome};
pub use simulator::{Simulator, SimulatorEpoch};

pub type Result<T> = slim_error::Result<T>;
