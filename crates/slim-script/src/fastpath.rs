//! Recognizers for the two callback shapes spec §4.3 singles out for a
//! precomputed numeric evaluator that skips the (external) interpreter
//! entirely:
//!
//! - `{ return D + dnorm(individual.tagF [± A], 0, B) / C; }`, cached as
//!   coefficients `(A, B, C, D)`.
//! - `{ return A / relFitness; }`, cached as a reciprocal with numerator
//!   `A`.
//!
//! Per the design notes (§9, "Runtime reflection substitute"), this is
//! structured as a small recognizer that pattern-matches on shape and
//! returns a tagged evaluator — here, string-structural matching over the
//! callback's source text stands in for the AST-shape match the original
//! performs, since the AST itself is the external interpreter's.

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FastPath {
    /// `D + dnorm(individual.tagF + offset, 0, B) / C`.
    Dnorm1 { offset: f64, b: f64, c: f64, d: f64 },
    /// `A / relFitness`.
    Reciprocal { numerator: f64 },
}

impl FastPath {
    pub fn evaluate(&self, tag_f: f64, rel_fitness: f64) -> f64 {
        match *self {
            FastPath::Dnorm1 { offset, b, c, d } => d + dnorm(tag_f + offset, 0.0, b) / c,
            FastPath::Reciprocal { numerator } => numerator / rel_fitness,
        }
    }

    /// Attempt both recognizers against `source`, stripping the
    /// enclosing braces and the trailing `return ... ;` boilerplate
    /// first so the remaining pattern match only has to deal with the
    /// expression itself.
    pub fn recognize(source: &str) -> Option<FastPath> {
        let body = strip_return_block(source)?;
        recognize_reciprocal(&body).or_else(|| recognize_dnorm1(&body))
    }
}

fn dnorm(x: f64, mean: f64, sd: f64) -> f64 {
    let z = (x - mean) / sd;
    (-0.5 * z * z).exp() / (sd * (2.0 * std::f64::consts::PI).sqrt())
}

/// `{ return <expr>; }`, with arbitrary whitespace, to `<expr>` trimmed.
fn strip_return_block(source: &str) -> Option<String> {
    let trimmed = source.trim();
    let inner = trimmed.strip_prefix('{')?.strip_suffix('}')?.trim();
    let expr = inner.strip_prefix("return")?.trim();
    let expr = expr.strip_suffix(';')?.trim();
    Some(expr.to_string())
}

/// `A / relFitness`.
fn recognize_reciprocal(expr: &str) -> Option<FastPath> {
    let (numerator_text, rest) = expr.split_once('/')?;
    if rest.trim() != "relFitness" {
        return None;
    }
    let numerator: f64 = numerator_text.trim().parse().ok()?;
    Some(FastPath::Reciprocal { numerator })
}

/// `D + dnorm(individual.tagF [+|- A], 0, B) / C`.
fn recognize_dnorm1(expr: &str) -> Option<FastPath> {
    let (d_text, rest) = expr.split_once('+')?;
    let d: f64 = d_text.trim().parse().ok()?;

    let rest = rest.trim().strip_prefix("dnorm(")?;
    let (args_and_div_c, close_paren_rest) = rest.split_once(')')?;
    let c_text = close_paren_rest.trim().strip_prefix('/')?;
    let c: f64 = c_text.trim().parse().ok()?;

    let mut args = args_and_div_c.splitn(3, ',');
    let x_arg = args.next()?.trim();
    let mean_arg = args.next()?.trim();
    let sd_arg = args.next()?.trim();

    if mean_arg != "0" {
        return None;
    }
    let b: f64 = sd_arg.parse().ok()?;

    let offset = if let Some(stripped) = x_arg.strip_prefix("individual.tagF") {
        let stripped = stripped.trim();
        if stripped.is_empty() {
            0.0
        } else if let Some(value) = stripped.strip_prefix('+') {
            value.trim().parse().ok()?
        } else if let Some(value) = stripped.strip_prefix('-') {
            -value.trim().parse::<f64>().ok()?
        } else {
            return None;
        }
    } else {
        return None;
    };

    Some(FastPath::Dnorm1 { offset, b, c, d })
}
