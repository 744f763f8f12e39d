//! The Mutation-Run Experimenter (spec §4.2): a paired-experiment
//! scheduler that adaptively chooses a chromosome's `mutrun_count` by
//! comparing measured per-generation wall-times with Welch's t-test.

use slim_core::stats::{Statistic, welch_t_test};
use std::time::Duration;
use tracing::debug;

/// Number of per-generation samples a full experiment collects before a
/// conclusive (non-early-terminated) comparison (spec §4.2).
pub const EXPERIMENT_WINDOW: u32 = 50;
/// Minimum samples before early termination is even considered.
pub const EARLY_TERMINATION_MIN_SAMPLES: u32 = 10;
/// `p` threshold for early termination on a conclusive loss.
pub const EARLY_TERMINATION_ALPHA: f64 = 0.01;
/// `p` threshold below which a non-stasis comparison is "conclusive".
pub const CONTINUE_ALPHA: f64 = 0.05;
/// Initial stasis significance threshold and confirmation count (spec
/// §4.2: "initially 0.01" / the implicit default confirm count of 5).
pub const INITIAL_STASIS_ALPHA: f64 = 0.01;
pub const INITIAL_STASIS_CONFIRMS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Increasing,
    Decreasing,
}

impl Direction {
    fn reversed(self) -> Direction {
        match self {
            Direction::Increasing => Direction::Decreasing,
            Direction::Decreasing => Direction::Increasing,
        }
    }

    fn step(self, count: u32, max: u32) -> u32 {
        match self {
            Direction::Increasing => (count * 2).min(max),
            Direction::Decreasing => (count / 2).max(1),
        }
    }
}

#[derive(Debug, Clone)]
struct Experiment {
    mutrun_count: u32,
    samples: Statistic,
}

impl Experiment {
    fn new(mutrun_count: u32) -> Self {
        Experiment { mutrun_count, samples: Statistic::default() }
    }

    fn record(&mut self, seconds: f64) {
        self.samples.add(seconds);
    }

    fn is_full(&self) -> bool {
        self.samples.count() >= EXPERIMENT_WINDOW
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    Win,
    Loss,
    Inconclusive,
}

/// One entry in the experimenter's decision history, used for the
/// end-of-run modal-count report (spec §4.2, "All decisions are recorded
/// in a history vector").
#[derive(Debug, Clone)]
pub struct Decision {
    pub candidate_count: u32,
    pub baseline_count: u32,
    pub p_value: f64,
    pub outcome: Outcome,
    pub terminated_early: bool,
}

#[derive(Debug, Clone)]
enum Phase {
    /// No comparison has been made yet; the very next experiment is
    /// unconditionally `mutrun_count * 2` (spec §4.2, "First
    /// experiment").
    First,
    /// Actively searching in `direction`, with `baseline` as the
    /// experiment the current one is compared against (which may be an
    /// older experiment than `previous` if a noisy "continue, but don't
    /// update baseline" decision was made, per spec §4.2's non-stasis
    /// rules).
    Searching { direction: Direction, baseline: Experiment, reversed_once: bool },
    /// Confirming `held_count` against `baseline` for `confirms_remaining`
    /// more experiments (spec §4.2, "Stasis").
    Stasis {
        held_count: u32,
        baseline: Experiment,
        confirms_remaining: u32,
        confirms_total: u32,
        alpha: f64,
    },
}

/// The paired-experiment scheduler described in spec §4.2. Construct one
/// per chromosome (bounded by that chromosome's length, since
/// `mutrun_count` must divide it evenly) and feed it one
/// [`Experimenter::record_generation_time`] call per generation.
#[derive(Debug, Clone)]
pub struct Experimenter {
    max_mutrun_count: u32,
    current: Experiment,
    phase: Phase,
    history: Vec<Decision>,
    /// The last two *distinct* stasis counts entered, used to detect
    /// re-entering the same stasis count twice (spec §4.2's tightening
    /// rule).
    recent_stasis_counts: Vec<u32>,
}

impl Experimenter {
    pub fn new(initial_mutrun_count: u32, max_mutrun_count: u32) -> Self {
        Experimenter {
            max_mutrun_count,
            current: Experiment::new(initial_mutrun_count),
            phase: Phase::First,
            history: Vec::new(),
            recent_stasis_counts: Vec::new(),
        }
    }

    pub fn current_mutrun_count(&self) -> u32 {
        self.current.mutrun_count
    }

    pub fn history(&self) -> &[Decision] {
        &self.history
    }

    /// The most commonly chosen `mutrun_count` across every concluded
    /// experiment (a win, or the count held during a confirmed stasis),
    /// used for the end-of-run report (spec §4.2).
    pub fn modal_count(&self) -> Option<u32> {
        use std::collections::HashMap;
        let mut tally: HashMap<u32, u32> = HashMap::new();
        for decision in &self.history {
            if decision.outcome == Outcome::Win {
                *tally.entry(decision.candidate_count).or_insert(0) += 1;
            }
        }
        tally.into_iter().max_by_key(|&(_, count)| count).map(|(count, _)| count)
    }

    /// Record one generation's wall-clock time, returning `Some(new_count)`
    /// if this sample concluded an experiment and changed the chromosome's
    /// `mutrun_count` (the caller is responsible for actually performing
    /// the split/join transition).
    pub fn record_generation_time(&mut self, elapsed: Duration) -> Option<u32> {
        self.current.record(elapsed.as_secs_f64());

        let baseline = match &self.phase {
            Phase::First => None,
            Phase::Searching { baseline, .. } => Some(baseline),
            Phase::Stasis { baseline, .. } => Some(baseline),
        };

        let terminated_early = if let Some(baseline) = baseline {
            self.current.samples.count() >= EARLY_TERMINATION_MIN_SAMPLES
                && {
                    let result = welch_t_test(&self.current.samples, &baseline.samples);
                    result.p_value < EARLY_TERMINATION_ALPHA && self.current.mean_is_worse_than(baseline)
                }
        } else {
            false
        };

        if terminated_early || self.current.is_full() {
            Some(self.conclude(terminated_early))
        } else {
            None
        }
    }

    fn conclude(&mut self, terminated_early: bool) -> u32 {
        match std::mem::replace(&mut self.phase, Phase::First) {
            Phase::First => self.conclude_first(),
            Phase::Searching { direction, baseline, reversed_once } => {
                self.conclude_searching(direction, baseline, reversed_once, terminated_early)
            }
            Phase::Stasis { held_count, baseline, confirms_remaining, confirms_total, alpha } => {
                self.conclude_stasis(held_count, baseline, confirms_remaining, confirms_total, alpha, terminated_early)
            }
        }
    }

    fn conclude_first(&mut self) -> u32 {
        let baseline = self.current.clone();
        let next_count = Direction::Increasing.step(baseline.mutrun_count, self.max_mutrun_count);
        self.history.push(Decision {
            candidate_count: baseline.mutrun_count,
            baseline_count: baseline.mutrun_count,
            p_value: 1.0,
            outcome: Outcome::Win,
            terminated_early: false,
        });
        self.phase = Phase::Searching { direction: Direction::Increasing, baseline, reversed_once: false };
        self.current = Experiment::new(next_count);
        next_count
    }

    fn conclude_searching(
        &mut self,
        direction: Direction,
        baseline: Experiment,
        reversed_once: bool,
        terminated_early: bool,
    ) -> u32 {
        let result = welch_t_test(&self.current.samples, &baseline.samples);
        let current_better = self.current.mean_is_better_than(&baseline);
        let conclusive_loss = !current_better && result.p_value < CONTINUE_ALPHA;

        if current_better {
            debug!(candidate = self.current.mutrun_count, baseline = baseline.mutrun_count, p = result.p_value, "experimenter: win, continuing");
            let new_baseline = self.current.clone();
            let next_count = direction.step(new_baseline.mutrun_count, self.max_mutrun_count);
            self.history.push(Decision {
                candidate_count: new_baseline.mutrun_count,
                baseline_count: baseline.mutrun_count,
                p_value: result.p_value,
                outcome: Outcome::Win,
                terminated_early,
            });
            self.phase = Phase::Searching { direction, baseline: new_baseline, reversed_once };
            self.current = Experiment::new(next_count);
            next_count
        } else if !conclusive_loss {
            // Noisy non-loss (p >= CONTINUE_ALPHA): continue in the same
            // direction. If that direction increases the count, compare
            // the *next* experiment against the same (older) baseline
            // rather than this noisy one, per spec §4.2, to avoid being
            // pushed up by noise.
            debug!(candidate = self.current.mutrun_count, baseline = baseline.mutrun_count, p = result.p_value, "experimenter: inconclusive, continuing direction");
            let next_count = direction.step(self.current.mutrun_count, self.max_mutrun_count);
            self.history.push(Decision {
                candidate_count: self.current.mutrun_count,
                baseline_count: baseline.mutrun_count,
                p_value: result.p_value,
                outcome: Outcome::Inconclusive,
                terminated_early,
            });
            let next_baseline = match direction {
                Direction::Increasing => baseline,
                Direction::Decreasing => self.current.clone(),
            };
            self.phase = Phase::Searching { direction, baseline: next_baseline, reversed_once };
            self.current = Experiment::new(next_count);
            next_count
        } else {
            // Conclusive loss: reverse direction, or (if already
            // reversed once) settle into stasis at the better count.
            self.history.push(Decision {
                candidate_count: self.current.mutrun_count,
                baseline_count: baseline.mutrun_count,
                p_value: result.p_value,
                outcome: Outcome::Loss,
                terminated_early,
            });

            if reversed_once {
                debug!(held_count = baseline.mutrun_count, "experimenter: entering stasis");
                let held_count = baseline.mutrun_count;
                self.enter_stasis(held_count, baseline, INITIAL_STASIS_ALPHA, INITIAL_STASIS_CONFIRMS);
                held_count
            } else {
                // Reverse and jump straight to half of the baseline
                // (skipping a retest of the baseline itself), which may
                // be two power-of-two steps away from the count we were
                // just testing. `Simulator::resegment` walks that gap
                // with repeated split/join passes, so returning the same
                // count we're about to test next (not `baseline`'s) keeps
                // the caller's chromosome state and our own `current` in
                // sync.
                let reversed = direction.reversed();
                let next_count = reversed.step(baseline.mutrun_count, self.max_mutrun_count);
                debug!(from = self.current.mutrun_count, to = next_count, "experimenter: reversing direction");
                self.phase = Phase::Searching { direction: reversed, baseline: baseline.clone(), reversed_once: true };
                self.current = Experiment::new(next_count);
                next_count
            }
        }
    }

    fn enter_stasis(&mut self, held_count: u32, baseline: Experiment, alpha: f64, confirms_total: u32) {
        self.phase = Phase::Stasis {
            held_count,
            baseline,
            confirms_remaining: confirms_total,
            confirms_total,
            alpha,
        };
        self.current = Experiment::new(held_count);
    }

    fn conclude_stasis(
        &mut self,
        held_count: u32,
        baseline: Experiment,
        confirms_remaining: u32,
        confirms_total: u32,
        alpha: f64,
        terminated_early: bool,
    ) -> u32 {
        let result = welch_t_test(&self.current.samples, &baseline.samples);

        if result.p_value < alpha {
            // The stasis count broke down against its own baseline;
            // resume searching from here.
            debug!(held_count, p = result.p_value, "experimenter: breaking stasis");
            self.history.push(Decision {
                candidate_count: held_count,
                baseline_count: baseline.mutrun_count,
                p_value: result.p_value,
                outcome: Outcome::Loss,
                terminated_early,
            });
            let direction = if self.current.mean_is_better_than(&baseline) {
                Direction::Increasing
            } else {
                Direction::Decreasing
            };
            let next_count = direction.step(held_count, self.max_mutrun_count);
            self.phase = Phase::Searching { direction, baseline: self.current.clone(), reversed_once: false };
            self.current = Experiment::new(next_count);
            return next_count;
        }

        self.history.push(Decision {
            candidate_count: held_count,
            baseline_count: baseline.mutrun_count,
            p_value: result.p_value,
            outcome: Outcome::Win,
            terminated_early,
        });

        if confirms_remaining > 1 {
            self.phase = Phase::Stasis { held_count, baseline, confirms_remaining: confirms_remaining - 1, confirms_total, alpha };
            self.current = Experiment::new(held_count);
            return held_count;
        }

        // Stasis confirmed. Track re-entry of the same held count to
        // decide whether to tighten the confirmation criteria.
        if self.recent_stasis_counts.last() != Some(&held_count) {
            self.recent_stasis_counts.push(held_count);
            if self.recent_stasis_counts.len() > 2 {
                self.recent_stasis_counts.remove(0);
            }
        }

        let reentered_twice = self.recent_stasis_counts.len() == 2
            && self.recent_stasis_counts[0] == self.recent_stasis_counts[1];

        let (next_alpha, next_confirms) = if reentered_twice {
            debug!(held_count, "experimenter: tightening stasis criteria on re-entry");
            (alpha / 2.0, confirms_total * 2)
        } else {
            (alpha, confirms_total)
        };

        self.enter_stasis(held_count, baseline, next_alpha, next_confirms);
        held_count
    }
}

impl Experiment {
    fn mean_is_better_than(&self, other: &Experiment) -> bool {
        self.samples.mean() < other.samples.mean()
    }

    fn mean_is_worse_than(&self, other: &Experiment) -> bool {
        self.samples.mean() > other.samples.mean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(experimenter: &mut Experimenter, seconds: impl Iterator<Item = f64>) {
        for s in seconds {
            experimenter.record_generation_time(Duration::from_secs_f64(s));
        }
    }

    #[test]
    fn first_experiment_is_always_followed_by_doubling() {
        let mut experimenter = Experimenter::new(4, 1024);
        feed(&mut experimenter, std::iter::repeat(1.0).take(EXPERIMENT_WINDOW as usize));
        assert_eq!(experimenter.current_mutrun_count(), 8);
    }

    #[test]
    fn clearly_faster_candidate_keeps_searching_in_direction() {
        let mut experimenter = Experimenter::new(4, 1024);
        feed(&mut experimenter, std::iter::repeat(1.0).take(EXPERIMENT_WINDOW as usize));
        assert_eq!(experimenter.current_mutrun_count(), 8);

        // 8 is clearly faster than 4's baseline of 1.0s: keep doubling.
        feed(&mut experimenter, std::iter::repeat(0.5).take(EXPERIMENT_WINDOW as usize));
        assert_eq!(experimenter.current_mutrun_count(), 16);
    }

    #[test]
    fn clearly_slower_candidate_reverses_then_enters_stasis() {
        let mut experimenter = Experimenter::new(4, 1024);
        // count=4 baseline at 1.0s.
        feed(&mut experimenter, std::iter::repeat(1.0).take(EXPERIMENT_WINDOW as usize));
        assert_eq!(experimenter.current_mutrun_count(), 8);

        // count=8 is clearly slower: conclusive loss, reverse toward 2.
        feed(&mut experimenter, std::iter::repeat(2.0).take(EXPERIMENT_WINDOW as usize));
        assert_eq!(experimenter.current_mutrun_count(), 2);

        // count=2 is also clearly slower than the baseline (4 @ 1.0s):
        // second conclusive loss while already reversed enters stasis at 4.
        feed(&mut experimenter, std::iter::repeat(3.0).take(EXPERIMENT_WINDOW as usize));
        assert_eq!(experimenter.current_mutrun_count(), 4);
    }

    #[test]
    fn modal_count_reflects_the_most_frequent_win() {
        let mut experimenter = Experimenter::new(8, 1024);
        feed(&mut experimenter, std::iter::repeat(1.0).take(EXPERIMENT_WINDOW as usize));
        feed(&mut experimenter, std::iter::repeat(2.0).take(EXPERIMENT_WINDOW as usize));
        feed(&mut experimenter, std::iter::repeat(2.0).take(EARLY_TERMINATION_MIN_SAMPLES as usize + 1));
        assert_eq!(experimenter.modal_count(), Some(8));
    }
}
