//! Fourier–Motzkin Elimination for Linear Integer Arithmetic
//!
//! Decides quantifier-free formulas over linear constraints:
//!
//! ## Algorithm
//!
//! 1. Expand the formula into disjunctive normal form (bounded)
//! 2. Per cube: solve equalities by substitution on a unit coefficient
//! 3. Eliminate remaining variables pairwise (Fourier–Motzkin), tightening
//!    every derived bound to integers (`⌈c/g⌉`)
//! 4. A derived `c ≤ 0` with `c > 0` ⇒ UNSAT
//! 5. Otherwise back-substitute the recorded bounds to build an integer model
//! 6. `!=` constraints are handled lazily: if the model violates `e != 0`,
//!    branch on `e ≤ -1` / `e ≥ 1`
//!
//! UNSAT answers are exact for integers. A satisfiable real relaxation with
//! an integer gap during back-substitution is reported as `Unknown`.
//!
//! ## Example
//!
//! ```text
//! Constraints:
//!   x <= y
//!   y <= z
//!   z <= x - 1
//!
//! Eliminate y:  x <= z
//! Eliminate z:  x <= x - 1  →  1 <= 0  →  UNSAT
//! ```

use std::time::Instant;

use crate::features::oracle::domain::{Constraint, Formula, LinearExpr, Model, Relation};
use crate::features::oracle::ports::{ConstraintSolver, SolverResult};

/// Bounded Fourier–Motzkin solver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FourierMotzkinSolver {
    /// Maximum cubes produced by DNF expansion
    max_disjuncts: usize,

    /// Maximum `!=` case splits per cube
    max_branches: usize,

    /// Maximum constraints alive during elimination
    max_constraints: usize,
}

impl Default for FourierMotzkinSolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Recorded elimination, replayed in reverse to build a model
#[derive(Debug)]
enum Elimination {
    /// `var = value`
    Equal { var: String, value: LinearExpr },
    /// `lower`: `-b·var + r ≤ 0`, `upper`: `a·var + r ≤ 0` (a, b > 0)
    Bounds {
        var: String,
        lower: Vec<(i64, LinearExpr)>,
        upper: Vec<(i64, LinearExpr)>,
    },
}

impl FourierMotzkinSolver {
    pub fn new() -> Self {
        Self {
            max_disjuncts: 256,
            max_branches: 256,
            max_constraints: 2000,
        }
    }

    pub fn with_limits(max_disjuncts: usize, max_branches: usize, max_constraints: usize) -> Self {
        Self {
            max_disjuncts,
            max_branches,
            max_constraints,
        }
    }

    fn solve_cube(
        &self,
        cube: &[Constraint],
        deadline: Option<Instant>,
        budget: &mut usize,
    ) -> SolverResult {
        let base: Vec<Constraint> = cube
            .iter()
            .filter(|c| c.relation != Relation::Ne)
            .cloned()
            .collect();
        let nes: Vec<Constraint> = cube
            .iter()
            .filter(|c| c.relation == Relation::Ne)
            .cloned()
            .collect();
        self.branch(base, &nes, cube, deadline, budget)
    }

    fn branch(
        &self,
        base: Vec<Constraint>,
        nes: &[Constraint],
        cube: &[Constraint],
        deadline: Option<Instant>,
        budget: &mut usize,
    ) -> SolverResult {
        if *budget == 0 {
            return SolverResult::Unknown;
        }
        *budget -= 1;

        let mut model = match self.solve_conjunction(&base, deadline) {
            SolverResult::Sat(Some(model)) => model,
            SolverResult::Sat(None) => Model::new(),
            other => return other,
        };
        for c in cube {
            fill_missing(&mut model, &c.expr);
        }

        let violated = nes
            .iter()
            .position(|ne| ne.holds_in(&model) != Some(true));
        let Some(index) = violated else {
            if cube.iter().all(|c| c.holds_in(&model) == Some(true)) {
                return SolverResult::Sat(Some(model));
            }
            return SolverResult::Unknown;
        };

        // e != 0  ⇔  e ≤ -1  ∨  -e ≤ -1
        let ne = &nes[index];
        let rest: Vec<Constraint> = nes
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, c)| c.clone())
            .collect();
        let one = LinearExpr::constant(1);
        let below = ne.expr.checked_add(&one);
        let above = ne.expr.checked_neg().and_then(|e| e.checked_add(&one));
        let (Some(below), Some(above)) = (below, above) else {
            return SolverResult::Unknown;
        };

        let mut saw_unknown = false;
        for side in [below, above] {
            let mut next = base.clone();
            next.push(Constraint::new(side, Relation::Le));
            match self.branch(next, &rest, cube, deadline, budget) {
                SolverResult::Sat(m) => return SolverResult::Sat(m),
                SolverResult::Unsat => {}
                SolverResult::Unknown => saw_unknown = true,
                SolverResult::Timeout => return SolverResult::Timeout,
            }
        }
        if saw_unknown {
            SolverResult::Unknown
        } else {
            SolverResult::Unsat
        }
    }

    /// Conjunction of `==` and `<=` constraints
    fn solve_conjunction(&self, constraints: &[Constraint], deadline: Option<Instant>) -> SolverResult {
        let mut eqs = Vec::new();
        let mut les = Vec::new();
        for c in constraints {
            match c.truth_value() {
                Some(false) => return SolverResult::Unsat,
                Some(true) => continue,
                None => {}
            }
            match c.relation {
                Relation::Eq => eqs.push(c.clone()),
                Relation::Le => les.push(c.clone()),
                Relation::Ne => {}
            }
        }

        let mut steps = Vec::new();

        // 1. Equalities with a unit coefficient: substitute away
        while let Some(pos) = eqs
            .iter()
            .position(|c| c.expr.coeffs.values().any(|a| a.abs() == 1))
        {
            let eq = eqs.swap_remove(pos);
            let Some((var, a)) = eq
                .expr
                .coeffs
                .iter()
                .find(|(_, a)| a.abs() == 1)
                .map(|(v, a)| (v.clone(), *a))
            else {
                continue;
            };
            // a·var + rest = 0  ⇒  var = -a·rest  (a = ±1)
            let mut rest = eq.expr.clone();
            rest.coeffs.remove(&var);
            let Some(value) = rest.checked_scale(-a) else {
                return SolverResult::Unknown;
            };

            for pool in [&mut eqs, &mut les] {
                let mut next = Vec::with_capacity(pool.len());
                for c in pool.iter() {
                    let Some(s) = c.substitute(&var, &value) else {
                        return SolverResult::Unknown;
                    };
                    match s.truth_value() {
                        Some(false) => return SolverResult::Unsat,
                        Some(true) => {}
                        None => next.push(s),
                    }
                }
                *pool = next;
            }
            steps.push(Elimination::Equal { var, value });
        }

        // 2. Remaining equalities become two inequalities
        for eq in eqs {
            let Some(neg) = eq.expr.checked_neg() else {
                return SolverResult::Unknown;
            };
            les.push(Constraint::new(eq.expr.clone(), Relation::Le));
            les.push(Constraint::new(neg, Relation::Le));
        }

        // 3. Fourier–Motzkin elimination
        loop {
            if expired(deadline) {
                return SolverResult::Timeout;
            }
            let mut live = Vec::with_capacity(les.len());
            for c in les {
                match c.truth_value() {
                    Some(false) => return SolverResult::Unsat,
                    Some(true) => {}
                    None => live.push(c),
                }
            }
            live.sort();
            live.dedup();
            les = live;

            let Some(var) = pick_variable(&les) else {
                break;
            };

            let mut lower = Vec::new();
            let mut upper = Vec::new();
            let mut others = Vec::new();
            for c in &les {
                let a = c.expr.coeff(&var);
                let mut rest = c.expr.clone();
                rest.coeffs.remove(&var);
                if a > 0 {
                    upper.push((a, rest));
                } else if a < 0 {
                    lower.push((-a, rest));
                } else {
                    others.push(c.clone());
                }
            }

            // a·x + r1 ≤ 0  ∧  -b·x + r2 ≤ 0  ⇒  b·r1 + a·r2 ≤ 0
            for (a, r1) in &upper {
                for (b, r2) in &lower {
                    let combined = r1
                        .checked_scale(*b)
                        .and_then(|l| r2.checked_scale(*a).and_then(|r| l.checked_add(&r)));
                    match combined {
                        Some(e) => others.push(Constraint::new(e, Relation::Le)),
                        None => return SolverResult::Unknown,
                    }
                }
            }
            if others.len() > self.max_constraints {
                tracing::debug!(
                    "Fourier-Motzkin: {} constraints after eliminating {}, giving up",
                    others.len(),
                    var
                );
                return SolverResult::Unknown;
            }

            steps.push(Elimination::Bounds { var, lower, upper });
            les = others;
        }

        // 4. Back-substitution
        let mut model = Model::new();
        for step in steps.iter().rev() {
            match step {
                Elimination::Equal { var, value } => {
                    fill_missing(&mut model, value);
                    match value.eval(&model) {
                        Some(v) => {
                            model.insert(var.clone(), v);
                        }
                        None => return SolverResult::Unknown,
                    }
                }
                Elimination::Bounds { var, lower, upper } => {
                    let mut lo: Option<i64> = None;
                    let mut hi: Option<i64> = None;
                    for (b, r) in lower {
                        fill_missing(&mut model, r);
                        // -b·x + r ≤ 0  ⇒  x ≥ ⌈r/b⌉
                        let Some(v) = r.eval(&model) else {
                            return SolverResult::Unknown;
                        };
                        let bound = ceil_div(v, *b);
                        lo = Some(lo.map_or(bound, |l| l.max(bound)));
                    }
                    for (a, r) in upper {
                        fill_missing(&mut model, r);
                        // a·x + r ≤ 0  ⇒  x ≤ ⌊-r/a⌋
                        let Some(v) = r.eval(&model).and_then(|v| v.checked_neg()) else {
                            return SolverResult::Unknown;
                        };
                        let bound = v.div_euclid(*a);
                        hi = Some(hi.map_or(bound, |h| h.min(bound)));
                    }
                    let value = match (lo, hi) {
                        (Some(l), Some(h)) if l > h => return SolverResult::Unknown,
                        (Some(l), _) if l > 0 => l,
                        (_, Some(h)) if h < 0 => h,
                        _ => 0,
                    };
                    model.insert(var.clone(), value);
                }
            }
        }

        SolverResult::Sat(Some(model))
    }
}

impl ConstraintSolver for FourierMotzkinSolver {
    fn name(&self) -> &'static str {
        "fourier-motzkin"
    }

    fn check(&self, formula: &Formula, deadline: Option<Instant>) -> SolverResult {
        let Some(cubes) = dnf(formula, self.max_disjuncts) else {
            return SolverResult::Unknown;
        };

        let mut saw_unknown = false;
        for cube in cubes {
            if expired(deadline) {
                return SolverResult::Timeout;
            }
            let mut budget = self.max_branches;
            match self.solve_cube(&cube, deadline, &mut budget) {
                SolverResult::Sat(model) => return SolverResult::Sat(model),
                SolverResult::Unsat => {}
                SolverResult::Unknown => saw_unknown = true,
                SolverResult::Timeout => return SolverResult::Timeout,
            }
        }

        if saw_unknown {
            SolverResult::Unknown
        } else {
            SolverResult::Unsat
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Variable with the fewest generated pairs (ties: smallest name)
fn pick_variable(constraints: &[Constraint]) -> Option<String> {
    let mut counts: std::collections::BTreeMap<&str, (usize, usize)> = Default::default();
    for c in constraints {
        for (var, a) in &c.expr.coeffs {
            let entry = counts.entry(var.as_str()).or_default();
            if *a > 0 {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }
    counts
        .into_iter()
        .min_by_key(|(_, (pos, neg))| pos * neg)
        .map(|(var, _)| var.to_string())
}

fn ceil_div(n: i64, d: i64) -> i64 {
    let q = n.div_euclid(d);
    if n.rem_euclid(d) != 0 {
        q + 1
    } else {
        q
    }
}

fn fill_missing(model: &mut Model, expr: &LinearExpr) {
    for var in expr.vars() {
        if !model.contains_key(var) {
            model.insert(var.clone(), 0);
        }
    }
}

/// Disjunctive normal form, None if more than `cap` cubes
fn dnf(formula: &Formula, cap: usize) -> Option<Vec<Vec<Constraint>>> {
    match formula {
        Formula::True => Some(vec![Vec::new()]),
        Formula::False => Some(Vec::new()),
        Formula::Atom(c) => Some(vec![vec![c.clone()]]),
        Formula::Or(parts) => {
            let mut out = Vec::new();
            for p in parts {
                out.extend(dnf(p, cap)?);
                if out.len() > cap {
                    return None;
                }
            }
            Some(out)
        }
        Formula::And(parts) => {
            let mut acc: Vec<Vec<Constraint>> = vec![Vec::new()];
            for p in parts {
                let cubes = dnf(p, cap)?;
                let mut next = Vec::with_capacity(acc.len() * cubes.len());
                for a in &acc {
                    for b in &cubes {
                        let mut cube = a.clone();
                        cube.extend(b.iter().cloned());
                        next.push(cube);
                    }
                }
                if next.len() > cap {
                    return None;
                }
                acc = next;
            }
            Some(acc)
        }
    }
}
