//! Shared floating-point comparison used by every rule.
//!
//! Threshold boundary behavior is pinned per comparator: a strict `>` must
//! not fire on a value equal to the threshold, `>=` must. Equality is
//! epsilon-aware so values that differ only by accumulated rounding are
//! treated as equal.

use std::fmt;

/// Relative epsilon for threshold equality, scaled by magnitude with an
/// absolute floor of 1.0 so comparisons near zero stay sane.
pub const EPSILON: f64 = 1e-9;

pub fn approx_eq(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= EPSILON * scale
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl Comparator {
    pub fn evaluate(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold && !approx_eq(value, threshold),
            Comparator::GreaterOrEqual => value > threshold || approx_eq(value, threshold),
            Comparator::LessThan => value < threshold && !approx_eq(value, threshold),
            Comparator::LessOrEqual => value < threshold || approx_eq(value, threshold),
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparator::GreaterThan => ">",
            Comparator::GreaterOrEqual => ">=",
            Comparator::LessThan => "<",
            Comparator::LessOrEqual => "<=",
        };
        write!(f, "{}", symbol)
    }
}
