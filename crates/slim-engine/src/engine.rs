//! The core engine abstraction driving the generation cycle forward.
//!
//! Ported from `radiate_core::engine`: [`Engine`] is intentionally an
//! iterator in spirit — implementors decide how one epoch (here, one
//! generation) is produced, and [`EngineExt::run`] supplies the loop
//! that drives repeated epochs against a caller-chosen termination
//! condition (typically `epoch.generation >= end_generation`, spec
//! §4's "Advance generation counter").

use slim_error::Result;

/// A type that can advance itself one epoch at a time, reporting what
/// happened in that epoch.
pub trait Engine {
    /// The report produced by one call to [`Engine::next`].
    type Epoch;

    /// Advance the engine by exactly one epoch.
    fn next(&mut self) -> Result<Self::Epoch>;
}

/// Extension methods for running an [`Engine`] to completion under a
/// caller-supplied termination condition.
pub trait EngineExt<E: Engine> {
    /// Step `self` via [`Engine::next`] until `limit` returns `true` for
    /// the produced epoch, returning that final epoch.
    fn run<F>(&mut self, limit: F) -> E::Epoch
    where
        F: Fn(&E::Epoch) -> bool;
}

impl<E> EngineExt<E> for E
where
    E: Engine,
{
    fn run<F>(&mut self, limit: F) -> E::Epoch
    where
        F: Fn(&E::Epoch) -> bool,
    {
        loop {
            match self.next() {
                Ok(epoch) => {
                    if limit(&epoch) {
                        return epoch;
                    }
                }
                Err(e) => panic!("{e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        generation: i64,
    }

    impl Engine for Counter {
        type Epoch = i64;

        fn next(&mut self) -> Result<Self::Epoch> {
            self.generation += 1;
            Ok(self.generation)
        }
    }

    #[test]
    fn run_stops_at_limit() {
        let mut counter = Counter::default();
        let final_epoch = counter.run(|&generation| generation >= 5);
        assert_eq!(final_epoch, 5);
    }
}
