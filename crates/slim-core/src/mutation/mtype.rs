//! Mutation type catalog: the per-type selection-coefficient
//! distribution, dominance coefficient, and stacking policy that the
//! mutation run consults when inserting a new mutation at a position
//! that already carries one.

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MutationTypeId(pub i32);

impl MutationTypeId {
    /// Sentinel used by global-fitness callbacks to mean "not tied to a
    /// mutation type" (spec §4.3: `-2` means "the NULL mutation-type").
    pub const NULL: MutationTypeId = MutationTypeId(-2);
    /// Sentinel meaning "any mutation type" in a dispatch filter.
    pub const ANY: MutationTypeId = MutationTypeId(-1);
}

/// How a mutation run resolves a newly-generated mutation landing at a
/// position that already carries a mutation of the same stacking group.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackingPolicy {
    /// Keep every mutation at the position (the default).
    KeepAll,
    /// Discard the incoming mutation, keeping only what was already
    /// there.
    KeepOld,
    /// Discard what was already there, keeping only the incoming
    /// mutation.
    KeepNew,
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DominanceCoefficient {
    /// A fixed dominance coefficient applied to every heterozygous
    /// mutation of this type.
    Fixed(f64),
}

impl DominanceCoefficient {
    pub fn value(&self) -> f64 {
        match self {
            DominanceCoefficient::Fixed(h) => *h,
        }
    }
}

/// One user-defined mutation type: a distribution the selection
/// coefficient is drawn from at the moment of mutation, a dominance
/// coefficient, a stacking group and policy, and whether mutations of
/// this type convert to a [`crate::Substitution`] upon fixation rather
/// than simply being removed.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MutationType {
    pub id: MutationTypeId,
    pub dominance: DominanceCoefficient,
    pub distribution: SelectionCoefficientDistribution,
    pub stacking_group: i32,
    pub stacking_policy: StackingPolicy,
    pub convert_to_substitution: bool,
}

/// The distribution a new mutation's selection coefficient is drawn
/// from. Only the shapes needed by the test scenarios in spec §8 are
/// implemented; this is intentionally not a general distribution DSL
/// (that belongs to the external scripting-language collaborator).
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionCoefficientDistribution {
    Fixed(f64),
    Exponential { mean: f64 },
    Normal { mean: f64, sd: f64 },
    Gamma { mean: f64, shape: f64 },
}

impl SelectionCoefficientDistribution {
    pub fn draw(&self) -> f64 {
        use crate::random;
        match *self {
            SelectionCoefficientDistribution::Fixed(s) => s,
            SelectionCoefficientDistribution::Exponential { mean } => {
                // Inverse-CDF sampling: -mean * ln(U), U in (0, 1].
                let u = (1.0 - random::unit_f64()).max(f64::MIN_POSITIVE);
                -mean * u.ln()
            }
            SelectionCoefficientDistribution::Normal { mean, sd } => {
                mean + sd * standard_normal()
            }
            SelectionCoefficientDistribution::Gamma { mean, shape } => {
                // Marsaglia-Tsang for shape >= 1; falls back to a boosted
                // sample for shape < 1.
                gamma_sample(shape) * (mean / shape.max(f64::MIN_POSITIVE))
            }
        }
    }
}

fn standard_normal() -> f64 {
    use crate::random;
    // Box-Muller; only one of the pair is used, which is wasteful but
    // simple and matches the small-n calling pattern here.
    let u1 = random::unit_f64().max(f64::MIN_POSITIVE);
    let u2 = random::unit_f64();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

fn gamma_sample(shape: f64) -> f64 {
    use crate::random;
    if shape < 1.0 {
        let u = random::unit_f64().max(f64::MIN_POSITIVE);
        return gamma_sample(shape + 1.0) * u.powf(1.0 / shape);
    }

    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let mut x;
        let mut v;
        loop {
            x = standard_normal();
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        v = v * v * v;
        let u = random::unit_f64();
        if u < 1.0 - 0.0331 * x.powi(4) || u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

impl Default for MutationType {
    fn default() -> Self {
        MutationType {
            id: MutationTypeId(0),
            dominance: DominanceCoefficient::Fixed(0.5),
            distribution: SelectionCoefficientDistribution::Fixed(0.0),
            stacking_group: 0,
            stacking_policy: StackingPolicy::KeepAll,
            convert_to_substitution: true,
        }
    }
}
