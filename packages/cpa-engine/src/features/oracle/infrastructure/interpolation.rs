//! Weakest-precondition interpolation
//!
//! For an infeasible path `e₀ … eₙ₋₁`, walk backwards from `φₙ = true`
//! computing `φⱼ = wp(eⱼ, φⱼ₊₁)`: the states at position `j` from which the
//! rest of the path can still execute. The atoms of `φⱼ` are the predicates
//! needed at position `j` to rule the path out again.
//!
//! Havocs (nondeterministic or non-linear assignments, external call
//! results, fresh callee locals) forget the atoms over the havocked variable,
//! which over-approximates `∃x. φ` because formulas are in NNF.

use std::collections::BTreeSet;
use std::time::Instant;

use crate::features::oracle::domain::{Constraint, Formula, Interpolants, LinearExpr, PathStep};
use crate::features::oracle::ports::ConstraintSolver;
use crate::shared::models::{owner_function, return_variable, EdgeKind, Expr, LValue};

/// Backward weakest-precondition interpolator
pub struct WpInterpolator<'a> {
    solver: &'a dyn ConstraintSolver,
}

impl<'a> WpInterpolator<'a> {
    pub fn new(solver: &'a dyn ConstraintSolver) -> Self {
        Self { solver }
    }

    /// One predicate set per path node; None when the deadline passes
    pub fn interpolate(&self, steps: &[PathStep], deadline: Option<Instant>) -> Option<Interpolants> {
        let n = steps.len();
        let mut positions = vec![BTreeSet::new(); n + 1];
        let mut phi = Formula::True;

        for j in (0..n).rev() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return None;
            }
            phi = wp(&steps[j], &phi);
            if !phi.is_false() && !phi.is_true() && self.solver.check(&phi, deadline).is_unsat() {
                phi = Formula::False;
            }
            positions[j] = predicates_of(&phi);
        }

        Some(Interpolants::new(positions))
    }
}

/// Canonical predicates of every atom
pub fn predicates_of(formula: &Formula) -> BTreeSet<Constraint> {
    formula
        .atoms()
        .into_iter()
        .filter_map(|c| c.canonical().map(|(p, _)| p))
        .collect()
}

/// `wp(step, post)` in the feasibility sense
pub fn wp(step: &PathStep, post: &Formula) -> Formula {
    match &step.kind {
        EdgeKind::Blank => post.clone(),
        EdgeKind::Assume { condition, truth } => match Formula::from_condition(condition, *truth) {
            Some(c) => Formula::and(vec![c, post.clone()]),
            None => post.clone(),
        },
        EdgeKind::Assign {
            target: LValue::Deref(_),
            ..
        } => post.clone(),
        EdgeKind::Assign {
            target: LValue::Var(x),
            value,
        } => assign_wp(x, value, post),
        EdgeKind::Call { result, .. } => match result {
            Some(r) => post.havoc(r),
            None => post.clone(),
        },
        EdgeKind::FunctionCall {
            function, bindings, ..
        } => {
            let params: BTreeSet<&str> = bindings.iter().map(|(p, _)| p.as_str()).collect();
            // Callee locals other than parameters start undefined
            let post = post.forget(&|c: &Constraint| {
                c.expr
                    .vars()
                    .any(|v| owner_function(v) == Some(function.as_str()) && !params.contains(v.as_str()))
            });
            // Simultaneous substitution through temporaries
            let temp = |i: usize| format!("#bind{}", i);
            let mut phi = post.rename(&|v: &str| {
                match bindings.iter().position(|(p, _)| p == v) {
                    Some(i) => temp(i),
                    None => v.to_string(),
                }
            });
            for (i, (_, value)) in bindings.iter().enumerate() {
                let name = temp(i);
                phi = match LinearExpr::from_expr(value).and_then(|e| phi.substitute(&name, &e)) {
                    Some(f) => f,
                    None => phi.havoc(&name),
                };
            }
            phi
        }
        EdgeKind::FunctionReturn { function } => {
            if step.recursive_return {
                let retval = return_variable(function);
                post.forget(&|c: &Constraint| {
                    c.expr
                        .vars()
                        .any(|v| owner_function(v) == Some(function.as_str()) && *v != retval)
                })
            } else {
                post.clone()
            }
        }
    }
}

fn assign_wp(x: &str, value: &Expr, post: &Formula) -> Formula {
    if !post.vars().contains(x) {
        return post.clone();
    }
    if let Some(e) = LinearExpr::from_expr(value) {
        return post.substitute(x, &e).unwrap_or_else(|| post.havoc(x));
    }
    // Boolean-valued: x becomes 1 or 0
    let split = (|| {
        let holds = Formula::from_condition(value, true)?;
        let fails = Formula::from_condition(value, false)?;
        let one = post.substitute(x, &LinearExpr::constant(1))?;
        let zero = post.substitute(x, &LinearExpr::constant(0))?;
        Some(Formula::or(vec![
            Formula::and(vec![holds, one]),
            Formula::and(vec![fails, zero]),
        ]))
    })();
    split.unwrap_or_else(|| post.havoc(x))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::oracle::infrastructure::FourierMotzkinSolver;

    fn assign(x: &str, e: &str) -> PathStep {
        PathStep::new(EdgeKind::Assign {
            target: LValue::Var(x.to_string()),
            value: Expr::parse(e).unwrap(),
        })
    }

    fn assume(c: &str, truth: bool) -> PathStep {
        PathStep::new(EdgeKind::Assume {
            condition: Expr::parse(c).unwrap(),
            truth,
        })
    }

    fn texts(set: &BTreeSet<Constraint>) -> Vec<String> {
        set.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_lockstep_counters() {
        // n = nondet; i = 0; j = 0; [!(i < n)]; [i != j]
        let steps = vec![
            assign("n", "nondet()"),
            assign("i", "0"),
            assign("j", "0"),
            assume("i < n", false),
            assume("i != j", true),
        ];
        let solver = FourierMotzkinSolver::new();
        let itp = WpInterpolator::new(&solver).interpolate(&steps, None).unwrap();

        assert_eq!(itp.positions.len(), 6);
        assert!(itp.positions[0].is_empty());
        assert!(itp.positions[1].is_empty());
        assert!(itp.positions[2].iter().any(|c| c.to_string() == "i == 0"));
        assert_eq!(texts(&itp.positions[4]), vec!["i - j == 0"]);
        assert!(itp.positions[5].is_empty());
    }

    #[test]
    fn test_wp_assignment_substitutes() {
        let post = Formula::from_condition(&Expr::parse("x > 3").unwrap(), true).unwrap();
        let pre = wp(&assign("x", "y + 1"), &post);
        assert_eq!(pre.to_string(), "-y <= -3");
        let pre = wp(&assign("x", "nondet()"), &post);
        assert!(pre.is_true());
    }

    #[test]
    fn test_wp_call_binding_is_simultaneous() {
        // f(b, a) with params f::a := b, f::b := a
        let step = PathStep::new(EdgeKind::FunctionCall {
            function: "f".to_string(),
            bindings: vec![
                ("f::a".to_string(), Expr::parse("b").unwrap()),
                ("f::b".to_string(), Expr::parse("a").unwrap()),
            ],
            return_site: crate::shared::models::CfaNodeId(0),
        });
        let post = Formula::from_condition(&Expr::parse("f::a < f::b").unwrap(), true).unwrap();
        let pre = wp(&step, &post);
        assert_eq!(pre.to_string(), "-a + b <= -1");
    }
}
