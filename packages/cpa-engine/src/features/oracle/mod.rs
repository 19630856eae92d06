/*
 * Feasibility Oracle
 *
 * Decides whether an abstract counterexample is executable:
 * - Domain: linear constraints, formulas, SSA path formulas, verdicts
 * - Infrastructure: Fourier–Motzkin solver, wp interpolation, built-in oracle
 * - Ports: ConstraintSolver, FeasibilityOracle traits
 *
 * The CEGAR loop only talks to `FeasibilityOracle`; an external SMT backend
 * can replace the built-in linear-arithmetic oracle.
 */

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{
    Constraint, Formula, Interpolants, LinearExpr, Model, OracleVerdict, PathFormula, PathStep,
    Relation,
};
pub use infrastructure::{FourierMotzkinSolver, LinearArithmeticOracle, WpInterpolator};
pub use ports::{ConstraintSolver, FeasibilityOracle, SolverResult};
