//! Auto-simplification cadence (spec §4.5): either a fixed generation
//! interval, or a ratio-mode controller that adapts the interval to how
//! fast ancestry accumulates.

/// How often [`crate::Recorder::maybe_simplify`] is asked to simplify.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AutoSimplifyMode {
    /// Simplify every `interval` generations, unconditionally.
    Interval { interval: i64 },
    /// Simplify every `interval` generations, then adjust `interval`
    /// after each simplification based on how much the tables shrank,
    /// chasing a target shrink `ratio`.
    Ratio { interval: f64, target: f64 },
}

impl AutoSimplifyMode {
    pub fn interval_mode(interval: i64) -> Self {
        AutoSimplifyMode::Interval { interval }
    }

    pub fn ratio_mode(target: f64) -> Self {
        AutoSimplifyMode::Ratio { interval: 1.0, target }
    }

    /// Whether `generations_since_last` have elapsed since the previous
    /// simplification under the current cadence.
    pub fn is_due(&self, generations_since_last: i64) -> bool {
        match self {
            AutoSimplifyMode::Interval { interval } => generations_since_last >= *interval,
            AutoSimplifyMode::Ratio { interval, .. } => generations_since_last as f64 >= *interval,
        }
    }

    /// Adjust a ratio-mode interval after observing `ratio = old / new`
    /// table size. No-op under interval mode.
    ///
    /// `ratio < target` means we simplified too early (the tables barely
    /// shrank): widen the interval, capped at 1000 generations. `ratio >
    /// target` means we waited too long (the tables shrank a lot):
    /// narrow the interval, floored at 1 generation.
    pub fn record_ratio(&mut self, ratio: f64) {
        if let AutoSimplifyMode::Ratio { interval, target } = self {
            if ratio < *target {
                *interval = (*interval * 1.2).min(1000.0);
            } else if ratio > *target {
                *interval = (*interval / 1.2).max(1.0);
            }
        }
    }
}

/// Outcome of one simplification pass, reported by
/// [`crate::Recorder::simplify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyReport {
    pub nodes_before: usize,
    pub nodes_after: usize,
    pub edges_before: usize,
    pub edges_after: usize,
}

impl SimplifyReport {
    /// The shrink ratio the ratio-mode cadence tracks, computed from
    /// edge-table size (the table that dominates growth between
    /// simplifications).
    pub fn edge_ratio(&self) -> f64 {
        if self.edges_after == 0 {
            1.0
        } else {
            self.edges_before as f64 / self.edges_after as f64
        }
    }
}
