//! Quantifier-free formulas over linear constraints
//!
//! Formulas are kept in negation normal form: negation only exists inside
//! atoms, so every formula is monotone in its atoms.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use super::linear::{Constraint, LinearExpr, Model, Relation};
use crate::shared::models::{BinaryOp, Expr, UnaryOp};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Formula {
    True,
    False,
    Atom(Constraint),
    And(Vec<Formula>),
    Or(Vec<Formula>),
}

impl Formula {
    /// Atom, folding variable-free constraints
    pub fn atom(constraint: Constraint) -> Self {
        match constraint.truth_value() {
            Some(true) => Formula::True,
            Some(false) => Formula::False,
            None => Formula::Atom(constraint),
        }
    }

    /// Flattening conjunction
    pub fn and(parts: Vec<Formula>) -> Self {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Formula::True => {}
                Formula::False => return Formula::False,
                Formula::And(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        dedup(&mut out);
        match out.len() {
            0 => Formula::True,
            1 => out.pop().unwrap_or(Formula::True),
            _ => Formula::And(out),
        }
    }

    /// Flattening disjunction
    pub fn or(parts: Vec<Formula>) -> Self {
        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Formula::False => {}
                Formula::True => return Formula::True,
                Formula::Or(inner) => out.extend(inner),
                other => out.push(other),
            }
        }
        dedup(&mut out);
        match out.len() {
            0 => Formula::False,
            1 => out.pop().unwrap_or(Formula::False),
            _ => Formula::Or(out),
        }
    }

    /// Formula for "`condition` evaluates to `truth`" under C truthiness.
    /// None if the condition is not expressible in linear arithmetic.
    ///
    /// # Example
    /// ```
    /// use cpa_engine::features::oracle::domain::Formula;
    /// use cpa_engine::shared::models::Expr;
    ///
    /// let f = Formula::from_condition(&Expr::parse("i < n && i != j").unwrap(), false).unwrap();
    /// assert_eq!(f.to_string(), "(-i + n <= 0 || i - j == 0)");
    /// ```
    pub fn from_condition(condition: &Expr, truth: bool) -> Option<Formula> {
        match condition {
            Expr::Int(v) => Some(if (*v != 0) == truth {
                Formula::True
            } else {
                Formula::False
            }),
            Expr::Unary(UnaryOp::Not, inner) => Self::from_condition(inner, !truth),
            Expr::Binary(op @ (BinaryOp::And | BinaryOp::Or), lhs, rhs) => {
                let l = Self::from_condition(lhs, truth)?;
                let r = Self::from_condition(rhs, truth)?;
                // De Morgan when the condition is negated
                let conjunctive = (*op == BinaryOp::And) == truth;
                Some(if conjunctive {
                    Formula::and(vec![l, r])
                } else {
                    Formula::or(vec![l, r])
                })
            }
            Expr::Binary(op, lhs, rhs) if op.is_comparison() => {
                let l = LinearExpr::from_expr(lhs)?;
                let r = LinearExpr::from_expr(rhs)?;
                let c = Constraint::compare(*op, &l, &r)?;
                let c = if truth { c } else { c.negate()? };
                Some(Formula::atom(c))
            }
            other => {
                let e = LinearExpr::from_expr(other)?;
                let relation = if truth { Relation::Ne } else { Relation::Eq };
                Some(Formula::atom(Constraint::new(e, relation)))
            }
        }
    }

    /// Negation (stays in NNF)
    pub fn negate(&self) -> Option<Formula> {
        Some(match self {
            Formula::True => Formula::False,
            Formula::False => Formula::True,
            Formula::Atom(c) => Formula::atom(c.negate()?),
            Formula::And(parts) => Formula::or(
                parts
                    .iter()
                    .map(|p| p.negate())
                    .collect::<Option<Vec<_>>>()?,
            ),
            Formula::Or(parts) => Formula::and(
                parts
                    .iter()
                    .map(|p| p.negate())
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }

    /// Replace `var` by `replacement` everywhere
    pub fn substitute(&self, var: &str, replacement: &LinearExpr) -> Option<Formula> {
        Some(match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Atom(c) => Formula::atom(c.substitute(var, replacement)?),
            Formula::And(parts) => Formula::and(
                parts
                    .iter()
                    .map(|p| p.substitute(var, replacement))
                    .collect::<Option<Vec<_>>>()?,
            ),
            Formula::Or(parts) => Formula::or(
                parts
                    .iter()
                    .map(|p| p.substitute(var, replacement))
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }

    /// Forget `var`: atoms mentioning it become `True`.
    /// Over-approximates `∃var. self` because the formula is monotone.
    pub fn havoc(&self, var: &str) -> Formula {
        self.forget(&|c| c.mentions(var))
    }

    /// Replace every atom matching `pred` by `True`
    pub fn forget(&self, pred: &impl Fn(&Constraint) -> bool) -> Formula {
        match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Atom(c) => {
                if pred(c) {
                    Formula::True
                } else {
                    self.clone()
                }
            }
            Formula::And(parts) => Formula::and(parts.iter().map(|p| p.forget(pred)).collect()),
            Formula::Or(parts) => Formula::or(parts.iter().map(|p| p.forget(pred)).collect()),
        }
    }

    pub fn rename(&self, f: &impl Fn(&str) -> String) -> Formula {
        match self {
            Formula::True | Formula::False => self.clone(),
            Formula::Atom(c) => Formula::atom(c.rename(f)),
            Formula::And(parts) => Formula::and(parts.iter().map(|p| p.rename(f)).collect()),
            Formula::Or(parts) => Formula::or(parts.iter().map(|p| p.rename(f)).collect()),
        }
    }

    /// Distinct atoms in first-occurrence order
    pub fn atoms(&self) -> Vec<&Constraint> {
        let mut out = Vec::new();
        self.collect_atoms(&mut out);
        out
    }

    fn collect_atoms<'a>(&'a self, out: &mut Vec<&'a Constraint>) {
        match self {
            Formula::True | Formula::False => {}
            Formula::Atom(c) => {
                if !out.contains(&c) {
                    out.push(c);
                }
            }
            Formula::And(parts) | Formula::Or(parts) => {
                for p in parts {
                    p.collect_atoms(out);
                }
            }
        }
    }

    pub fn vars(&self) -> BTreeSet<String> {
        self.atoms().into_iter().flat_map(|c| c.vars()).collect()
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Formula::True)
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Formula::False)
    }

    /// Truth under a total model
    pub fn eval(&self, model: &Model) -> Option<bool> {
        match self {
            Formula::True => Some(true),
            Formula::False => Some(false),
            Formula::Atom(c) => c.holds_in(model),
            Formula::And(parts) => {
                for p in parts {
                    if !p.eval(model)? {
                        return Some(false);
                    }
                }
                Some(true)
            }
            Formula::Or(parts) => {
                for p in parts {
                    if p.eval(model)? {
                        return Some(true);
                    }
                }
                Some(false)
            }
        }
    }
}

fn dedup(parts: &mut Vec<Formula>) {
    let mut seen = Vec::with_capacity(parts.len());
    parts.retain(|p| {
        if seen.contains(p) {
            false
        } else {
            seen.push(p.clone());
            true
        }
    });
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, parts: &[Formula], sep: &str| {
            write!(f, "(")?;
            for (i, p) in parts.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", p)?;
            }
            write!(f, ")")
        };
        match self {
            Formula::True => write!(f, "true"),
            Formula::False => write!(f, "false"),
            Formula::Atom(c) => write!(f, "{}", c),
            Formula::And(parts) => join(f, parts, "&&"),
            Formula::Or(parts) => join(f, parts, "||"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(text: &str, truth: bool) -> Formula {
        Formula::from_condition(&Expr::parse(text).unwrap(), truth).unwrap()
    }

    #[test]
    fn test_from_condition_c_truthiness() {
        assert_eq!(cond("x", true).to_string(), "x != 0");
        assert_eq!(cond("x", false).to_string(), "x == 0");
        assert_eq!(cond("1", true), Formula::True);
        assert_eq!(cond("0", true), Formula::False);
        assert_eq!(cond("!(x < 3)", true).to_string(), "-x <= -3");
    }

    #[test]
    fn test_from_condition_rejects_nonlinear() {
        assert!(Formula::from_condition(&Expr::parse("x * y > 0").unwrap(), true).is_none());
        assert!(Formula::from_condition(&Expr::parse("*p == 0").unwrap(), true).is_none());
    }

    #[test]
    fn test_negate_de_morgan() {
        let f = cond("a == 1 || b == 2", true);
        let n = f.negate().unwrap();
        assert_eq!(n.to_string(), "(a != 1 && b != 2)");
    }

    #[test]
    fn test_substitute_folds_constants() {
        let f = cond("i != j", true);
        let f = f.substitute("i", &LinearExpr::constant(0)).unwrap();
        let f = f.substitute("j", &LinearExpr::constant(0)).unwrap();
        assert!(f.is_false());
    }

    #[test]
    fn test_havoc_forgets_atoms() {
        let f = cond("x > 0 && y > 0", true);
        let h = f.havoc("x");
        assert_eq!(h.to_string(), "-y <= -1");
        assert!(cond("x > 0", true).havoc("x").is_true());
    }

    #[test]
    fn test_eval() {
        let f = cond("x < y || x == 5", true);
        let mut model = Model::new();
        model.insert("x".to_string(), 5);
        model.insert("y".to_string(), 1);
        assert_eq!(f.eval(&model), Some(true));
        model.insert("x".to_string(), 6);
        assert_eq!(f.eval(&model), Some(false));
    }
}
