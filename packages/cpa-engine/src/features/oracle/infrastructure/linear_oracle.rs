//! Built-in feasibility oracle (linear integer arithmetic)

use std::time::{Duration, Instant};

use super::fourier_motzkin::FourierMotzkinSolver;
use super::interpolation::WpInterpolator;
use crate::features::oracle::domain::{OracleVerdict, PathFormula};
use crate::features::oracle::ports::{ConstraintSolver, FeasibilityOracle, SolverResult};

/// Decides path feasibility with [`FourierMotzkinSolver`] and produces
/// weakest-precondition interpolants for infeasible paths.
///
/// A satisfiable formula only proves feasibility when every step was encoded
/// exactly; otherwise the answer is `Unknown`.
#[derive(Debug, Default, Clone)]
pub struct LinearArithmeticOracle {
    solver: FourierMotzkinSolver,
}

impl LinearArithmeticOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(solver: FourierMotzkinSolver) -> Self {
        Self { solver }
    }
}

impl FeasibilityOracle for LinearArithmeticOracle {
    fn name(&self) -> &'static str {
        "linear-arithmetic"
    }

    fn check_feasible(&self, path: &PathFormula, timeout: Option<Duration>) -> OracleVerdict {
        let deadline = timeout.map(|t| Instant::now() + t);

        match self.solver.check(&path.conjunction(), deadline) {
            SolverResult::Sat(model) => {
                if path.is_exact() {
                    OracleVerdict::Feasible(model.unwrap_or_default())
                } else {
                    OracleVerdict::Unknown(format!(
                        "path formula is satisfiable but over-approximated: {}",
                        path.inexact_reasons().join("; ")
                    ))
                }
            }
            SolverResult::Unsat => {
                match WpInterpolator::new(&self.solver).interpolate(path.steps(), deadline) {
                    Some(interpolants) => OracleVerdict::Infeasible(interpolants),
                    None => OracleVerdict::Timeout,
                }
            }
            SolverResult::Unknown => {
                OracleVerdict::Unknown("linear solver could not decide the path formula".to_string())
            }
            SolverResult::Timeout => OracleVerdict::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::oracle::domain::PathStep;
    use crate::shared::models::{EdgeKind, Expr, LValue};

    fn assign(x: &str, e: &str) -> PathStep {
        PathStep::new(EdgeKind::Assign {
            target: LValue::Var(x.to_string()),
            value: Expr::parse(e).unwrap(),
        })
    }

    fn assume(c: &str) -> PathStep {
        PathStep::new(EdgeKind::Assume {
            condition: Expr::parse(c).unwrap(),
            truth: true,
        })
    }

    #[test]
    fn test_feasible_path_yields_model() {
        let path = PathFormula::new(vec![assign("x", "nondet()"), assume("x > 10")]);
        match LinearArithmeticOracle::new().check_feasible(&path, None) {
            OracleVerdict::Feasible(model) => assert!(model["x@1"] > 10),
            other => panic!("expected feasible, got {:?}", other),
        }
    }

    #[test]
    fn test_infeasible_path_yields_interpolants() {
        let path = PathFormula::new(vec![assign("x", "5"), assume("x > 10")]);
        match LinearArithmeticOracle::new().check_feasible(&path, None) {
            OracleVerdict::Infeasible(itp) => {
                assert_eq!(itp.positions.len(), 3);
                assert!(!itp.positions[1].is_empty());
            }
            other => panic!("expected infeasible, got {:?}", other),
        }
    }

    #[test]
    fn test_inexact_sat_is_unknown() {
        let path = PathFormula::new(vec![assign("x", "y * y"), assume("x < 0")]);
        assert!(matches!(
            LinearArithmeticOracle::new().check_feasible(&path, None),
            OracleVerdict::Unknown(_)
        ));
    }

    #[test]
    fn test_zero_timeout() {
        let path = PathFormula::new(vec![assign("x", "nondet()"), assume("x > 10")]);
        let verdict = LinearArithmeticOracle::new().check_feasible(&path, Some(Duration::ZERO));
        assert_eq!(verdict, OracleVerdict::Timeout);
    }
}
