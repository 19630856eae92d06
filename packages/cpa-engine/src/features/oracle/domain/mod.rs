//! Oracle domain models: linear constraints, formulas, path formulas, verdicts

pub mod formula;
pub mod linear;
pub mod path_formula;

pub use formula::Formula;
pub use linear::{gcd, Constraint, LinearExpr, Model, Relation};
pub use path_formula::{PathFormula, PathStep};

use serde::Serialize;
use std::collections::BTreeSet;

/// Per-position refinement predicates of an infeasible path.
///
/// `positions[j]` belongs to the j-th node of the path (0 = root), so there
/// is one more position than there are edges. Every predicate is in
/// canonical form (see [`Constraint::canonical`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Interpolants {
    pub positions: Vec<BTreeSet<Constraint>>,
}

impl Interpolants {
    pub fn new(positions: Vec<BTreeSet<Constraint>>) -> Self {
        Self { positions }
    }

    pub fn at(&self, position: usize) -> Option<&BTreeSet<Constraint>> {
        self.positions.get(position)
    }

    /// Union over all positions
    pub fn all(&self) -> BTreeSet<Constraint> {
        self.positions.iter().flatten().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.iter().all(|p| p.is_empty())
    }
}

/// Result of a feasibility query
#[derive(Debug, Clone, PartialEq)]
pub enum OracleVerdict {
    /// Path is executable; SSA model witnessing it
    Feasible(Model),
    /// Path is spurious
    Infeasible(Interpolants),
    /// Deadline exceeded
    Timeout,
    /// Oracle could not decide
    Unknown(String),
}
