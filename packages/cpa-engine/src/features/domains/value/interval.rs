//! Integer intervals
//!
//! Closed interval `[lower, upper]` over i64; a missing bound is infinite.
//! Open bounds never arise on integers, they are tightened to closed ones.
//! Arithmetic that overflows loses the affected bound.

use serde::Serialize;
use std::fmt;

use crate::shared::models::{apply_binary, BinaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Interval {
    /// Lower bound (inclusive), None = -∞
    pub lower: Option<i64>,
    /// Upper bound (inclusive), None = +∞
    pub upper: Option<i64>,
}

impl Interval {
    /// (-∞, +∞)
    pub fn top() -> Self {
        Self::default()
    }

    pub fn bounded(lower: i64, upper: i64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    pub fn constant(value: i64) -> Self {
        Self::bounded(value, value)
    }

    /// [lower, +∞)
    pub fn at_least(lower: i64) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
        }
    }

    /// (-∞, upper]
    pub fn at_most(upper: i64) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
        }
    }

    /// Value of a C boolean: `[0, 1]`
    pub fn boolean() -> Self {
        Self::bounded(0, 1)
    }

    pub fn is_top(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }

    /// Contradiction (lower > upper)
    pub fn is_empty(&self) -> bool {
        matches!((self.lower, self.upper), (Some(l), Some(u)) if l > u)
    }

    pub fn as_constant(&self) -> Option<i64> {
        match (self.lower, self.upper) {
            (Some(l), Some(u)) if l == u => Some(l),
            _ => None,
        }
    }

    pub fn contains(&self, value: i64) -> bool {
        self.lower.map_or(true, |l| value >= l) && self.upper.map_or(true, |u| value <= u)
    }

    /// `self ⊆ other`
    pub fn is_subset_of(&self, other: &Interval) -> bool {
        let lower_ok = match (self.lower, other.lower) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a >= b,
        };
        let upper_ok = match (self.upper, other.upper) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        };
        lower_ok && upper_ok
    }

    /// Intersection (may be empty)
    pub fn meet(&self, other: &Interval) -> Interval {
        Interval {
            lower: max_bound(self.lower, other.lower),
            upper: min_bound(self.upper, other.upper),
        }
    }

    /// Smallest interval containing both
    pub fn join(&self, other: &Interval) -> Interval {
        Interval {
            lower: match (self.lower, other.lower) {
                (Some(a), Some(b)) => Some(a.min(b)),
                _ => None,
            },
            upper: match (self.upper, other.upper) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            },
        }
    }

    /// Standard widening: unstable bounds jump to infinity
    pub fn widen(&self, next: &Interval) -> Interval {
        Interval {
            lower: match (self.lower, next.lower) {
                (Some(a), Some(b)) if b >= a => Some(a),
                _ => None,
            },
            upper: match (self.upper, next.upper) {
                (Some(a), Some(b)) if b <= a => Some(a),
                _ => None,
            },
        }
    }

    pub fn neg(&self) -> Interval {
        Interval {
            lower: self.upper.and_then(i64::checked_neg),
            upper: self.lower.and_then(i64::checked_neg),
        }
    }

    pub fn add(&self, other: &Interval) -> Interval {
        Interval {
            lower: self.lower.zip(other.lower).and_then(|(a, b)| a.checked_add(b)),
            upper: self.upper.zip(other.upper).and_then(|(a, b)| a.checked_add(b)),
        }
    }

    pub fn sub(&self, other: &Interval) -> Interval {
        self.add(&other.neg())
    }

    pub fn mul(&self, other: &Interval) -> Interval {
        if self.as_constant() == Some(0) || other.as_constant() == Some(0) {
            return Interval::constant(0);
        }
        match (self.lower, self.upper, other.lower, other.upper) {
            (Some(a), Some(b), Some(c), Some(d)) => {
                let products = [a.checked_mul(c), a.checked_mul(d), b.checked_mul(c), b.checked_mul(d)];
                if products.iter().any(|p| p.is_none()) {
                    return Interval::top();
                }
                let values = products.iter().flatten();
                Interval {
                    lower: values.clone().min().copied(),
                    upper: values.max().copied(),
                }
            }
            _ => Interval::top(),
        }
    }

    /// Truncating division by a constant divisor; anything else is top
    pub fn div(&self, other: &Interval) -> Interval {
        match other.as_constant() {
            Some(0) | None => Interval::top(),
            Some(d) => {
                let lo = self.lower.and_then(|l| l.checked_div(d));
                let hi = self.upper.and_then(|u| u.checked_div(d));
                if d > 0 {
                    Interval { lower: lo, upper: hi }
                } else {
                    Interval { lower: hi, upper: lo }
                }
            }
        }
    }

    /// Remainder by a constant divisor (sign follows the dividend)
    pub fn rem(&self, other: &Interval) -> Interval {
        match other.as_constant() {
            Some(0) | None => Interval::top(),
            Some(d) => {
                let bound = d.checked_abs().map(|m| m - 1);
                let Some(m) = bound else {
                    return Interval::top();
                };
                let non_negative = self.lower.is_some_and(|l| l >= 0);
                let non_positive = self.upper.is_some_and(|u| u <= 0);
                if non_negative {
                    Interval::bounded(0, self.upper.map_or(m, |u| u.min(m)))
                } else if non_positive {
                    Interval::bounded(self.lower.map_or(-m, |l| l.max(-m)), 0)
                } else {
                    Interval::bounded(-m, m)
                }
            }
        }
    }

    /// Truth of `self OP other` for every pair of members, if decided
    pub fn compare(&self, op: BinaryOp, other: &Interval) -> Option<bool> {
        if let (Some(a), Some(b)) = (self.as_constant(), other.as_constant()) {
            return apply_binary(op, a, b).map(|v| v != 0);
        }
        let lt = |x: &Interval, y: &Interval| -> Option<bool> {
            // x < y for all members / for no members
            if let (Some(xu), Some(yl)) = (x.upper, y.lower) {
                if xu < yl {
                    return Some(true);
                }
            }
            if let (Some(xl), Some(yu)) = (x.lower, y.upper) {
                if xl >= yu {
                    return Some(false);
                }
            }
            None
        };
        let disjoint = self.meet(other).is_empty();
        match op {
            BinaryOp::Lt => lt(self, other),
            BinaryOp::Gt => lt(other, self),
            BinaryOp::Le => lt(other, self).map(|b| !b),
            BinaryOp::Ge => lt(self, other).map(|b| !b),
            BinaryOp::Eq => disjoint.then_some(false),
            BinaryOp::Ne => disjoint.then_some(true),
            _ => None,
        }
    }

    /// Truthiness (non-zero) if decided
    pub fn truthiness(&self) -> Option<bool> {
        if self.as_constant() == Some(0) {
            Some(false)
        } else if !self.contains(0) {
            Some(true)
        } else {
            None
        }
    }
}

fn max_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

fn min_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.min(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(c) = self.as_constant() {
            return write!(f, "{}", c);
        }
        match self.lower {
            Some(l) => write!(f, "[{}", l)?,
            None => write!(f, "(-inf")?,
        }
        match self.upper {
            Some(u) => write!(f, ", {}]", u),
            None => write!(f, ", +inf)"),
        }
    }
}
