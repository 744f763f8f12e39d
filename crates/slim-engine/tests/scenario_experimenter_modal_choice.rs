//! Scenario F (spec §8): when one `mutrun_count` is clearly and
//! consistently faster than every neighbor, the experimenter's
//! end-of-run modal count must converge on it, and the search must not
//! wander past the chromosome's maximum.

use slim_engine::Experimenter;
use std::time::Duration;

/// A synthetic per-generation cost: minimized at `optimal`, increasing
/// with distance from it on a log scale (mirroring the real tradeoff
/// between too-few and too-many mutation runs).
fn synthetic_cost(mutrun_count: u32, optimal: u32) -> f64 {
    let distance = (mutrun_count as f64).log2() - (optimal as f64).log2();
    0.01 + 0.01 * distance * distance
}

fn run_to_completion(optimal: u32, max: u32, generations: u32) -> Experimenter {
    let mut experimenter = Experimenter::new(4, max);
    for _ in 0..generations {
        let cost = synthetic_cost(experimenter.current_mutrun_count(), optimal);
        experimenter.record_generation_time(Duration::from_secs_f64(cost));
    }
    experimenter
}

#[test]
fn modal_count_converges_on_the_consistently_fastest_candidate() {
    let experimenter = run_to_completion(8, 1024, 1000);
    assert_eq!(experimenter.modal_count(), Some(8));
}

#[test]
fn search_never_exceeds_the_configured_maximum() {
    // With no clear optimum below the ceiling, repeated doubling must
    // still respect `max_mutrun_count`.
    let experimenter = run_to_completion(4096, 64, 1000);
    assert!(experimenter.current_mutrun_count() <= 64);
    if let Some(modal) = experimenter.modal_count() {
        assert!(modal <= 64);
    }
}

#[test]
fn history_is_recorded_for_every_concluded_experiment() {
    let experimenter = run_to_completion(8, 1024, 300);
    assert!(!experimenter.history().is_empty());
    for decision in experimenter.history() {
        assert!(decision.p_value >= 0.0 && decision.p_value <= 1.0);
    }
}
