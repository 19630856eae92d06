//! Linear integer arithmetic
//!
//! `LinearExpr` is `Σ aᵢ·xᵢ + c`; a `Constraint` relates it to zero.
//! Constraints are kept normalized (gcd-reduced, integer-tightened,
//! sign-canonical) so structurally equal constraints are equal values and
//! can serve as predicates.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::shared::models::{BinaryOp, Expr, UnaryOp};

/// Variable assignment (variable → integer)
pub type Model = BTreeMap<String, i64>;

/// `Σ aᵢ·xᵢ + c` with checked arithmetic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct LinearExpr {
    /// Non-zero coefficients only
    pub coeffs: BTreeMap<String, i64>,
    pub constant: i64,
}

impl LinearExpr {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: i64) -> Self {
        Self {
            coeffs: BTreeMap::new(),
            constant: value,
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        let mut coeffs = BTreeMap::new();
        coeffs.insert(name.into(), 1);
        Self {
            coeffs,
            constant: 0,
        }
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn coeff(&self, var: &str) -> i64 {
        self.coeffs.get(var).copied().unwrap_or(0)
    }

    pub fn mentions(&self, var: &str) -> bool {
        self.coeffs.contains_key(var)
    }

    pub fn vars(&self) -> impl Iterator<Item = &String> {
        self.coeffs.keys()
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let mut coeffs = self.coeffs.clone();
        for (var, c) in &other.coeffs {
            let entry = coeffs.entry(var.clone()).or_insert(0);
            *entry = entry.checked_add(*c)?;
            if *entry == 0 {
                coeffs.remove(var);
            }
        }
        Some(Self {
            coeffs,
            constant: self.constant.checked_add(other.constant)?,
        })
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.checked_add(&other.checked_neg()?)
    }

    pub fn checked_neg(&self) -> Option<Self> {
        self.checked_scale(-1)
    }

    pub fn checked_scale(&self, factor: i64) -> Option<Self> {
        if factor == 0 {
            return Some(Self::zero());
        }
        let mut coeffs = BTreeMap::new();
        for (var, c) in &self.coeffs {
            coeffs.insert(var.clone(), c.checked_mul(factor)?);
        }
        Some(Self {
            coeffs,
            constant: self.constant.checked_mul(factor)?,
        })
    }

    /// Replace `var` by `replacement`
    pub fn substitute(&self, var: &str, replacement: &LinearExpr) -> Option<Self> {
        let c = self.coeff(var);
        if c == 0 {
            return Some(self.clone());
        }
        let mut rest = self.clone();
        rest.coeffs.remove(var);
        rest.checked_add(&replacement.checked_scale(c)?)
    }

    /// Rename every variable
    pub fn rename(&self, f: &impl Fn(&str) -> String) -> Self {
        let mut coeffs = BTreeMap::new();
        for (var, c) in &self.coeffs {
            let entry = coeffs.entry(f(var)).or_insert(0i64);
            *entry = entry.saturating_add(*c);
        }
        coeffs.retain(|_, c| *c != 0);
        Self {
            coeffs,
            constant: self.constant,
        }
    }

    /// Value under `model` (None if a variable is missing or on overflow)
    pub fn eval(&self, model: &Model) -> Option<i64> {
        let mut acc = self.constant;
        for (var, c) in &self.coeffs {
            let v = model.get(var)?;
            acc = acc.checked_add(c.checked_mul(*v)?)?;
        }
        Some(acc)
    }

    /// Greatest common divisor of the coefficients (0 for constants)
    pub fn content(&self) -> i64 {
        self.coeffs.values().fold(0, |g, c| gcd(g, c.saturating_abs()))
    }

    /// Linear view of an expression (None for non-linear or opaque terms)
    pub fn from_expr(expr: &Expr) -> Option<Self> {
        match expr {
            Expr::Int(v) => Some(Self::constant(*v)),
            Expr::Var(name) => Some(Self::var(name.clone())),
            Expr::Unary(UnaryOp::Neg, inner) => Self::from_expr(inner)?.checked_neg(),
            Expr::Binary(BinaryOp::Add, lhs, rhs) => {
                Self::from_expr(lhs)?.checked_add(&Self::from_expr(rhs)?)
            }
            Expr::Binary(BinaryOp::Sub, lhs, rhs) => {
                Self::from_expr(lhs)?.checked_sub(&Self::from_expr(rhs)?)
            }
            Expr::Binary(BinaryOp::Mul, lhs, rhs) => {
                let l = Self::from_expr(lhs)?;
                let r = Self::from_expr(rhs)?;
                if l.is_constant() {
                    r.checked_scale(l.constant)
                } else if r.is_constant() {
                    l.checked_scale(r.constant)
                } else {
                    None
                }
            }
            Expr::Binary(BinaryOp::Div | BinaryOp::Rem, _, _) => {
                expr.eval_constant().map(Self::constant)
            }
            _ => None,
        }
    }
}

impl fmt::Display for LinearExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_terms(f, &self.coeffs)?;
        if self.coeffs.is_empty() {
            write!(f, "{}", self.constant)
        } else if self.constant > 0 {
            write!(f, " + {}", self.constant)
        } else if self.constant < 0 {
            write!(f, " - {}", self.constant.unsigned_abs())
        } else {
            Ok(())
        }
    }
}

fn write_terms(f: &mut fmt::Formatter<'_>, coeffs: &BTreeMap<String, i64>) -> fmt::Result {
    for (i, (var, c)) in coeffs.iter().enumerate() {
        let magnitude = c.unsigned_abs();
        if i == 0 {
            if *c < 0 {
                write!(f, "-")?;
            }
        } else if *c < 0 {
            write!(f, " - ")?;
        } else {
            write!(f, " + ")?;
        }
        if magnitude == 1 {
            write!(f, "{}", var)?;
        } else {
            write!(f, "{}*{}", magnitude, var)?;
        }
    }
    Ok(())
}

pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.saturating_abs(), b.saturating_abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Relation of a constraint's expression to zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Relation {
    Eq,
    Ne,
    Le,
}

/// Normalized linear constraint `expr REL 0`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Constraint {
    pub expr: LinearExpr,
    pub relation: Relation,
}

impl Constraint {
    /// Build and normalize `expr REL 0`
    pub fn new(expr: LinearExpr, relation: Relation) -> Self {
        normalize(expr, relation)
    }

    /// Trivially true or false constraint
    pub fn constant(holds: bool) -> Self {
        Self {
            expr: LinearExpr::constant(if holds { 0 } else { 1 }),
            relation: Relation::Le,
        }
    }

    /// `lhs OP rhs` for a comparison operator
    pub fn compare(op: BinaryOp, lhs: &LinearExpr, rhs: &LinearExpr) -> Option<Self> {
        let diff = lhs.checked_sub(rhs)?;
        let one = LinearExpr::constant(1);
        Some(match op {
            BinaryOp::Eq => Self::new(diff, Relation::Eq),
            BinaryOp::Ne => Self::new(diff, Relation::Ne),
            BinaryOp::Le => Self::new(diff, Relation::Le),
            BinaryOp::Lt => Self::new(diff.checked_add(&one)?, Relation::Le),
            BinaryOp::Ge => Self::new(diff.checked_neg()?, Relation::Le),
            BinaryOp::Gt => Self::new(diff.checked_neg()?.checked_add(&one)?, Relation::Le),
            _ => return None,
        })
    }

    /// Truth value for variable-free constraints
    pub fn truth_value(&self) -> Option<bool> {
        if !self.expr.is_constant() {
            return None;
        }
        let c = self.expr.constant;
        Some(match self.relation {
            Relation::Eq => c == 0,
            Relation::Ne => c != 0,
            Relation::Le => c <= 0,
        })
    }

    /// Integer complement
    pub fn negate(&self) -> Option<Self> {
        Some(match self.relation {
            Relation::Eq => Self::new(self.expr.clone(), Relation::Ne),
            Relation::Ne => Self::new(self.expr.clone(), Relation::Eq),
            // ¬(e ≤ 0) ⇔ -e + 1 ≤ 0
            Relation::Le => Self::new(
                self.expr
                    .checked_neg()?
                    .checked_add(&LinearExpr::constant(1))?,
                Relation::Le,
            ),
        })
    }

    pub fn substitute(&self, var: &str, replacement: &LinearExpr) -> Option<Self> {
        Some(Self::new(
            self.expr.substitute(var, replacement)?,
            self.relation,
        ))
    }

    pub fn rename(&self, f: &impl Fn(&str) -> String) -> Self {
        Self::new(self.expr.rename(f), self.relation)
    }

    pub fn mentions(&self, var: &str) -> bool {
        self.expr.mentions(var)
    }

    pub fn vars(&self) -> BTreeSet<String> {
        self.expr.vars().cloned().collect()
    }

    /// Does the constraint hold under `model`?
    pub fn holds_in(&self, model: &Model) -> Option<bool> {
        let v = self.expr.eval(model)?;
        Some(match self.relation {
            Relation::Eq => v == 0,
            Relation::Ne => v != 0,
            Relation::Le => v <= 0,
        })
    }

    /// Predicate form: an `Eq` or a `Le` with positive leading coefficient,
    /// plus the polarity under which it is equivalent to `self`.
    /// Variable-free constraints have no predicate form.
    pub fn canonical(&self) -> Option<(Constraint, bool)> {
        if self.expr.is_constant() {
            return None;
        }
        match self.relation {
            Relation::Eq => Some((self.clone(), true)),
            Relation::Ne => Some((Self::new(self.expr.clone(), Relation::Eq), false)),
            Relation::Le => {
                let leading = self.expr.coeffs.values().next().copied().unwrap_or(0);
                if leading > 0 {
                    Some((self.clone(), true))
                } else {
                    Some((self.negate()?, false))
                }
            }
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(holds) = self.truth_value() {
            return write!(f, "{}", holds);
        }
        write_terms(f, &self.expr.coeffs)?;
        let op = match self.relation {
            Relation::Eq => "==",
            Relation::Ne => "!=",
            Relation::Le => "<=",
        };
        match self.expr.constant.checked_neg() {
            Some(rhs) => write!(f, " {} {}", op, rhs),
            None => write!(f, " {} {}", op, self.expr.constant.unsigned_abs()),
        }
    }
}

fn normalize(mut expr: LinearExpr, relation: Relation) -> Constraint {
    expr.coeffs.retain(|_, c| *c != 0);
    if expr.coeffs.is_empty() {
        let probe = Constraint { expr, relation };
        return Constraint::constant(probe.truth_value().unwrap_or(true));
    }

    let g = expr.content();
    match relation {
        Relation::Le => {
            if g > 1 {
                for c in expr.coeffs.values_mut() {
                    *c /= g;
                }
                // Σ g·bᵢxᵢ + c ≤ 0  ⇔  Σ bᵢxᵢ + ⌈c/g⌉ ≤ 0 over the integers
                let q = expr.constant.div_euclid(g);
                expr.constant = if expr.constant.rem_euclid(g) != 0 { q + 1 } else { q };
            }
        }
        Relation::Eq | Relation::Ne => {
            if expr.constant % g != 0 {
                return Constraint::constant(relation == Relation::Ne);
            }
            if g > 1 {
                for c in expr.coeffs.values_mut() {
                    *c /= g;
                }
                expr.constant /= g;
            }
            let leading = expr.coeffs.values().next().copied().unwrap_or(0);
            if leading < 0 {
                if let Some(flipped) = expr.checked_neg() {
                    expr = flipped;
                }
            }
        }
    }
    Constraint { expr, relation }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lin(text: &str) -> LinearExpr {
        LinearExpr::from_expr(&Expr::parse(text).unwrap()).unwrap()
    }

    #[test]
    fn test_from_expr_linear_and_nonlinear() {
        let e = lin("2 * x - (y - 3) + x");
        assert_eq!(e.coeff("x"), 3);
        assert_eq!(e.coeff("y"), -1);
        assert_eq!(e.constant, 3);
        assert!(LinearExpr::from_expr(&Expr::parse("x * y").unwrap()).is_none());
        assert!(LinearExpr::from_expr(&Expr::parse("nondet()").unwrap()).is_none());
        assert!(LinearExpr::from_expr(&Expr::parse("*p").unwrap()).is_none());
    }

    #[test]
    fn test_normalization_tightens() {
        // 2x + 3 <= 0  ⇔  x <= -2 over integers
        let c = Constraint::new(lin("2 * x + 3"), Relation::Le);
        assert_eq!(c.expr.coeff("x"), 1);
        assert_eq!(c.expr.constant, 2);
        assert_eq!(c.to_string(), "x <= -2");

        // 2x == 3 has no integer solution
        let c = Constraint::new(lin("2 * x - 3"), Relation::Eq);
        assert_eq!(c.truth_value(), Some(false));
    }

    #[test]
    fn test_equalities_are_sign_canonical() {
        let a = Constraint::compare(BinaryOp::Eq, &lin("i"), &lin("j")).unwrap();
        let b = Constraint::compare(BinaryOp::Eq, &lin("j"), &lin("i")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "i - j == 0");
    }

    #[test]
    fn test_negation_and_canonical() {
        let lt = Constraint::compare(BinaryOp::Lt, &lin("i"), &lin("n")).unwrap();
        assert_eq!(lt.to_string(), "i - n <= -1");
        let ge = lt.negate().unwrap();
        assert_eq!(ge.to_string(), "-i + n <= 0");

        let (pred, polarity) = ge.canonical().unwrap();
        assert_eq!(pred, lt);
        assert!(!polarity);

        let ne = Constraint::compare(BinaryOp::Ne, &lin("i"), &lin("j + 1")).unwrap();
        let (pred, polarity) = ne.canonical().unwrap();
        assert_eq!(pred.to_string(), "i - j == 1");
        assert!(!polarity);
    }

    #[test]
    fn test_substitute_and_eval() {
        let c = Constraint::compare(BinaryOp::Le, &lin("x + y"), &lin("10")).unwrap();
        let c = c.substitute("x", &lin("y + 1")).unwrap();
        assert_eq!(c.to_string(), "y <= 4");

        let mut model = Model::new();
        model.insert("y".to_string(), 4);
        assert_eq!(c.holds_in(&model), Some(true));
        model.insert("y".to_string(), 5);
        assert_eq!(c.holds_in(&model), Some(false));
    }

    #[test]
    fn test_overflow_is_detected() {
        let big = LinearExpr::constant(i64::MAX);
        assert!(big.checked_add(&LinearExpr::constant(1)).is_none());
        assert!(LinearExpr::var("x").checked_scale(i64::MIN).is_some());
        assert!(LinearExpr::var("x")
            .checked_scale(i64::MIN)
            .unwrap()
            .checked_neg()
            .is_none());
    }
}
