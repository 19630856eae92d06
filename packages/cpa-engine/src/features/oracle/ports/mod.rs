/*
 * Oracle Ports
 *
 * Seams for external decision procedures:
 * - ConstraintSolver: satisfiability of linear formulas
 * - FeasibilityOracle: feasibility of whole paths + interpolants
 */

use std::time::{Duration, Instant};

use crate::features::oracle::domain::{Constraint, Formula, Model, OracleVerdict, PathFormula};

/// Solver result
#[derive(Debug, Clone, PartialEq)]
pub enum SolverResult {
    /// Satisfiable (with optional model)
    Sat(Option<Model>),

    /// Unsatisfiable
    Unsat,

    /// Incomplete reasoning (integer gap, size limit, overflow)
    Unknown,

    /// Deadline exceeded
    Timeout,
}

impl SolverResult {
    pub fn is_unsat(&self) -> bool {
        matches!(self, SolverResult::Unsat)
    }

    pub fn is_sat(&self) -> bool {
        matches!(self, SolverResult::Sat(_))
    }
}

/// Decision procedure for quantifier-free linear integer formulas
pub trait ConstraintSolver: Send + Sync {
    /// Name of this solver
    fn name(&self) -> &'static str;

    /// Decide `formula`
    fn check(&self, formula: &Formula, deadline: Option<Instant>) -> SolverResult;

    /// Does `premise` imply `conclusion`? Only a definite `Unsat` of
    /// `premise ∧ ¬conclusion` counts as entailment.
    fn entails(&self, premise: &Formula, conclusion: &Constraint) -> bool {
        if let Some(holds) = conclusion.truth_value() {
            return holds || self.check(premise, None).is_unsat();
        }
        match conclusion.negate() {
            Some(negated) => {
                let query = Formula::and(vec![premise.clone(), Formula::atom(negated)]);
                self.check(&query, None).is_unsat()
            }
            None => false,
        }
    }
}

/// Path feasibility oracle consumed by the CEGAR loop
///
/// Implement this trait to plug in an external SMT backend.
pub trait FeasibilityOracle: Send + Sync {
    /// Name of this oracle
    fn name(&self) -> &'static str;

    /// Decide whether the path is executable.
    /// An `Infeasible` answer must carry one interpolant set per path node.
    fn check_feasible(&self, path: &PathFormula, timeout: Option<Duration>) -> OracleVerdict;
}
