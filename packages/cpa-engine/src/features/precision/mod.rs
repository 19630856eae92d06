//! Analysis precision
//!
//! Per-domain abstraction granularity. Only the refiner changes it and only
//! by adding to it; every change bumps `version`, and each ARG node keeps the
//! precision it was computed under.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::config::ValueConfig;
use crate::errors::{CpaError, Result};
use crate::features::oracle::domain::{Constraint, Formula};
use crate::shared::models::{Expr, VarName};

/// Value-domain precision: variables with explicit intervals, and predicates
/// whose truth value is tracked
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ValuePrecision {
    pub tracked: BTreeSet<VarName>,
    pub predicates: BTreeSet<Constraint>,
}

impl ValuePrecision {
    pub fn is_tracked(&self, var: &str) -> bool {
        self.tracked.contains(var)
    }

    pub fn has_predicate(&self, predicate: &Constraint) -> bool {
        self.predicates.contains(predicate)
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty() && self.predicates.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Precision {
    pub value: ValuePrecision,
    version: u32,
}

impl Precision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial precision from the value-domain configuration
    pub fn seeded(config: &ValueConfig) -> Result<Self> {
        let mut precision = Self::new();
        precision.value.tracked = config.tracked_variables.iter().cloned().collect();
        for text in &config.predicates {
            let expr = Expr::parse(text)?;
            let formula = Formula::from_condition(&expr, true).ok_or_else(|| {
                CpaError::malformed(format!("predicate '{}' is not linear", text))
            })?;
            for atom in formula.atoms() {
                if let Some((predicate, _)) = atom.canonical() {
                    precision.value.predicates.insert(predicate);
                }
            }
        }
        Ok(precision)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Add predicates (canonicalized); returns how many were new
    pub fn add_predicates<'a>(&mut self, predicates: impl IntoIterator<Item = &'a Constraint>) -> usize {
        let mut added = 0;
        for p in predicates {
            if let Some((canonical, _)) = p.canonical() {
                if self.value.predicates.insert(canonical) {
                    added += 1;
                }
            }
        }
        if added > 0 {
            self.version += 1;
        }
        added
    }

    /// Add tracked variables; returns how many were new
    pub fn add_tracked<'a>(&mut self, vars: impl IntoIterator<Item = &'a VarName>) -> usize {
        let mut added = 0;
        for v in vars {
            if self.value.tracked.insert(v.clone()) {
                added += 1;
            }
        }
        if added > 0 {
            self.version += 1;
        }
        added
    }

    /// Every predicate in `predicates` is already tracked
    pub fn includes_predicates(&self, predicates: &BTreeSet<Constraint>) -> bool {
        predicates.iter().all(|p| self.value.has_predicate(p))
    }

    /// Every variable in `vars` is already tracked
    pub fn includes_tracked(&self, vars: &BTreeSet<VarName>) -> bool {
        vars.iter().all(|v| self.value.is_tracked(v))
    }

    /// `self` refines `other` (has everything `other` has)
    pub fn includes(&self, other: &Precision) -> bool {
        self.value.tracked.is_superset(&other.value.tracked)
            && self.value.predicates.is_superset(&other.value.predicates)
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preds: Vec<String> = self.value.predicates.iter().map(|p| p.to_string()).collect();
        let vars: Vec<&str> = self.value.tracked.iter().map(|v| v.as_str()).collect();
        write!(
            f,
            "v{} tracked={{{}}} predicates={{{}}}",
            self.version,
            vars.join(", "),
            preds.join(", ")
        )
    }
}
