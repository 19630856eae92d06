//! Value-domain state

use std::collections::BTreeMap;

use super::interval::Interval;
use crate::features::oracle::domain::{Constraint, Formula, LinearExpr, Relation};
use crate::shared::models::{owner_function, BinaryOp, Expr, UnaryOp, VarName};

/// Intervals of tracked variables plus truth values of precision predicates.
///
/// A variable without an entry is unconstrained; a predicate without an entry
/// has unknown truth value. Both maps only ever hold informative entries, so
/// structurally equal states are equal abstract values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ValueState {
    pub values: BTreeMap<VarName, Interval>,
    pub predicates: BTreeMap<Constraint, bool>,
}

impl ValueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(&self, var: &str) -> Interval {
        self.values.get(var).copied().unwrap_or_default()
    }

    pub fn set_interval(&mut self, var: &str, interval: Interval) {
        if interval.is_top() {
            self.values.remove(var);
        } else {
            self.values.insert(var.to_string(), interval);
        }
    }

    pub fn predicate(&self, predicate: &Constraint) -> Option<bool> {
        self.predicates.get(predicate).copied()
    }

    pub fn set_predicate(&mut self, predicate: Constraint, truth: Option<bool>) {
        match truth {
            Some(t) => {
                self.predicates.insert(predicate, t);
            }
            None => {
                self.predicates.remove(&predicate);
            }
        }
    }

    /// Forget everything about `var`
    pub fn havoc(&mut self, var: &str) {
        self.values.remove(var);
        self.predicates.retain(|p, _| !p.mentions(var));
    }

    /// Forget every local of `function` except those in `keep`
    pub fn forget_locals(&mut self, function: &str, keep: &[&str]) {
        let doomed = |v: &str| owner_function(v) == Some(function) && !keep.contains(&v);
        self.values.retain(|v, _| !doomed(v.as_str()));
        self.predicates
            .retain(|p, _| !p.expr.vars().any(|v| doomed(v.as_str())));
    }

    /// Everything the state knows, as a conjunction of linear atoms
    pub fn knowledge(&self) -> Formula {
        let mut parts = Vec::new();
        for (var, interval) in &self.values {
            if let Some(u) = interval.upper {
                // x - u <= 0
                let expr = LinearExpr::var(var.clone()).checked_sub(&LinearExpr::constant(u));
                if let Some(e) = expr {
                    parts.push(Formula::atom(Constraint::new(e, Relation::Le)));
                }
            }
            if let Some(l) = interval.lower {
                // l - x <= 0
                let expr = LinearExpr::constant(l).checked_sub(&LinearExpr::var(var.clone()));
                if let Some(e) = expr {
                    parts.push(Formula::atom(Constraint::new(e, Relation::Le)));
                }
            }
        }
        for (predicate, truth) in &self.predicates {
            let literal = if *truth {
                Some(predicate.clone())
            } else {
                predicate.negate()
            };
            if let Some(c) = literal {
                parts.push(Formula::atom(c));
            }
        }
        Formula::and(parts)
    }

    /// Interval of `expr` under this state
    pub fn eval(&self, expr: &Expr) -> Interval {
        match expr {
            Expr::Int(v) => Interval::constant(*v),
            Expr::Var(name) => self.interval(name),
            Expr::Nondet | Expr::Deref(_) => Interval::top(),
            Expr::Unary(UnaryOp::Neg, inner) => self.eval(inner).neg(),
            Expr::Unary(UnaryOp::Not, inner) => match self.eval(inner).truthiness() {
                Some(t) => Interval::constant(if t { 0 } else { 1 }),
                None => Interval::boolean(),
            },
            Expr::Binary(op, lhs, rhs) => {
                let l = self.eval(lhs);
                let r = self.eval(rhs);
                match op {
                    BinaryOp::Add => l.add(&r),
                    BinaryOp::Sub => l.sub(&r),
                    BinaryOp::Mul => l.mul(&r),
                    BinaryOp::Div => l.div(&r),
                    BinaryOp::Rem => l.rem(&r),
                    BinaryOp::And => match (l.truthiness(), r.truthiness()) {
                        (Some(false), _) | (_, Some(false)) => Interval::constant(0),
                        (Some(true), Some(true)) => Interval::constant(1),
                        _ => Interval::boolean(),
                    },
                    BinaryOp::Or => match (l.truthiness(), r.truthiness()) {
                        (Some(true), _) | (_, Some(true)) => Interval::constant(1),
                        (Some(false), Some(false)) => Interval::constant(0),
                        _ => Interval::boolean(),
                    },
                    cmp => match l.compare(*cmp, &r) {
                        Some(t) => Interval::constant(if t { 1 } else { 0 }),
                        None => Interval::boolean(),
                    },
                }
            }
        }
    }

    /// Tighten intervals of tracked variables with a single-variable
    /// constraint (after substituting variables with a known constant).
    /// Returns false if some interval becomes empty.
    pub fn restrict(&mut self, constraint: &Constraint, is_tracked: impl Fn(&str) -> bool) -> bool {
        let mut c = constraint.clone();
        for var in constraint.vars() {
            if let Some(k) = self.interval(&var).as_constant() {
                match c.substitute(&var, &LinearExpr::constant(k)) {
                    Some(next) => c = next,
                    None => return true,
                }
            }
        }
        if let Some(holds) = c.truth_value() {
            return holds;
        }
        let vars = c.vars();
        let Some(var) = vars.iter().next().filter(|_| vars.len() == 1) else {
            return true;
        };
        if !is_tracked(var.as_str()) {
            return true;
        }
        let a = c.expr.coeff(var);
        let k = c.expr.constant;
        // a·x + k REL 0 with a = ±1 after normalization
        let bound = match (a, k.checked_neg()) {
            (1, Some(neg_k)) => Some(neg_k),
            (-1, _) => Some(k),
            _ => None,
        };
        let Some(b) = bound else {
            return true;
        };
        let current = self.interval(var);
        let restricted = match c.relation {
            Relation::Eq => current.meet(&Interval::constant(b)),
            Relation::Le if a > 0 => current.meet(&Interval::at_most(b)),
            Relation::Le => current.meet(&Interval::at_least(b)),
            Relation::Ne => {
                if current.lower == Some(b) {
                    Interval {
                        lower: b.checked_add(1),
                        upper: current.upper,
                    }
                } else if current.upper == Some(b) {
                    Interval {
                        lower: current.lower,
                        upper: b.checked_sub(1),
                    }
                } else {
                    current
                }
            }
        };
        if restricted.is_empty() {
            return false;
        }
        self.set_interval(var, restricted);
        true
    }

    /// Least upper bound
    pub fn join(&self, other: &ValueState) -> ValueState {
        let mut out = ValueState::new();
        for (var, a) in &self.values {
            if let Some(b) = other.values.get(var) {
                out.set_interval(var, a.join(b));
            }
        }
        for (p, t) in &self.predicates {
            if other.predicates.get(p) == Some(t) {
                out.predicates.insert(p.clone(), *t);
            }
        }
        out
    }

    /// Widening of `self` (older) by `next`
    pub fn widen(&self, next: &ValueState) -> ValueState {
        let mut out = self.join(next);
        for (var, a) in &self.values {
            if let Some(b) = next.values.get(var) {
                out.set_interval(var, a.widen(&a.join(b)));
            }
        }
        out
    }

    /// `self ⊑ other`
    pub fn is_less_or_equal(&self, other: &ValueState) -> bool {
        other.values.iter().all(|(var, i2)| {
            self.values
                .get(var)
                .is_some_and(|i1| i1.is_subset_of(i2))
        }) && other
            .predicates
            .iter()
            .all(|(p, t)| self.predicates.get(p) == Some(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(text: &str) -> Constraint {
        let f = Formula::from_condition(&Expr::parse(text).unwrap(), true).unwrap();
        match f {
            Formula::Atom(c) => c,
            other => panic!("not an atom: {}", other),
        }
    }

    #[test]
    fn test_eval_intervals() {
        let mut s = ValueState::new();
        s.set_interval("x", Interval::bounded(1, 3));
        assert_eq!(s.eval(&Expr::parse("x + 2").unwrap()), Interval::bounded(3, 5));
        assert_eq!(s.eval(&Expr::parse("x > 0").unwrap()), Interval::constant(1));
        assert_eq!(s.eval(&Expr::parse("x > y").unwrap()), Interval::boolean());
        assert_eq!(s.eval(&Expr::parse("!x").unwrap()), Interval::constant(0));
        assert!(s.eval(&Expr::parse("nondet()").unwrap()).is_top());
    }

    #[test]
    fn test_restrict_with_constants() {
        let mut s = ValueState::new();
        s.set_interval("n", Interval::constant(10));
        assert!(s.restrict(&constraint("x < n"), |_| true));
        assert_eq!(s.interval("x"), Interval::at_most(9));
        assert!(s.restrict(&constraint("x >= 9"), |_| true));
        assert_eq!(s.interval("x"), Interval::constant(9));
        assert!(!s.restrict(&constraint("x != 9"), |_| true));
    }

    #[test]
    fn test_restrict_skips_untracked() {
        let mut s = ValueState::new();
        assert!(s.restrict(&constraint("y <= 3"), |v| v != "y"));
        assert!(s.interval("y").is_top());
    }

    #[test]
    fn test_join_and_order() {
        let p = constraint("i == j");
        let mut a = ValueState::new();
        a.set_interval("x", Interval::constant(0));
        a.set_predicate(p.clone(), Some(true));
        let mut b = ValueState::new();
        b.set_interval("x", Interval::constant(1));
        b.set_predicate(p.clone(), Some(false));

        let j = a.join(&b);
        assert_eq!(j.interval("x"), Interval::bounded(0, 1));
        assert_eq!(j.predicate(&p), None);
        assert!(a.is_less_or_equal(&j));
        assert!(b.is_less_or_equal(&j));
        assert!(!j.is_less_or_equal(&a));
        assert_eq!(a.widen(&b).interval("x"), Interval::at_least(0));
    }

    #[test]
    fn test_knowledge_and_forget() {
        let mut s = ValueState::new();
        s.set_interval("f::x", Interval::bounded(0, 4));
        s.set_interval("f::__retval", Interval::constant(1));
        s.set_predicate(constraint("f::x == g"), Some(false));
        assert_eq!(s.knowledge().atoms().len(), 5);

        s.forget_locals("f", &["f::__retval"]);
        assert!(s.interval("f::x").is_top());
        assert!(s.predicates.is_empty());
        assert_eq!(s.interval("f::__retval"), Interval::constant(1));
    }
}
