//! SSA path formula
//!
//! A path of CFA edges is turned into one constraint per step over SSA
//! variables (`x@k`). Locals of a callee get a fresh frame suffix
//! (`f::x#3@k`) on every call, so recursive calls do not alias the caller.
//!
//! Steps the linear theory cannot express (non-linear arithmetic, reads
//! through pointers) are over-approximated by a havoc and recorded in
//! `inexact`: an unsatisfiable formula still proves the path infeasible, a
//! satisfiable one no longer proves it feasible. A havocked value that no
//! later constraint reads cannot make the path spuriously satisfiable, so it
//! is not recorded.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use super::formula::Formula;
use super::linear::{Constraint, LinearExpr, Model, Relation};
use crate::shared::models::{
    owner_function, return_variable, Cfa, CfaEdgeId, EdgeKind, Expr, LValue, VarName,
};

/// One executed edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub edge: Option<CfaEdgeId>,
    pub kind: EdgeKind,
    /// Return into another activation of the same function
    pub recursive_return: bool,
}

impl PathStep {
    pub fn new(kind: EdgeKind) -> Self {
        Self {
            edge: None,
            kind,
            recursive_return: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PathFormula {
    #[serde(skip)]
    steps: Vec<PathStep>,
    constraints: Vec<Formula>,
    /// Per position (0 = before the first step): program variable → SSA name
    #[serde(skip)]
    snapshots: Vec<BTreeMap<VarName, String>>,
    inexact: Vec<String>,
}

impl PathFormula {
    /// Formula for a path of CFA edges (root to target)
    pub fn from_path(cfa: &Cfa, edges: &[CfaEdgeId]) -> Self {
        let steps = edges
            .iter()
            .map(|id| {
                let edge = cfa.edge(*id);
                PathStep {
                    edge: Some(*id),
                    kind: edge.kind.clone(),
                    recursive_return: cfa.is_recursive_return(edge),
                }
            })
            .collect();
        Self::new(steps)
    }

    pub fn new(steps: Vec<PathStep>) -> Self {
        let mut program_vars = BTreeSet::new();
        for step in &steps {
            collect_step_vars(&step.kind, &mut program_vars);
        }

        let mut ssa = SsaState::default();
        let mut constraints = Vec::with_capacity(steps.len());
        let mut snapshots = Vec::with_capacity(steps.len() + 1);
        // (reason, havocked SSA variable)
        let mut pending: Vec<(String, Option<String>)> = Vec::new();

        snapshots.push(ssa.snapshot(&program_vars));
        for (i, step) in steps.iter().enumerate() {
            let formula = ssa.encode(&step.kind, &mut |reason: String, havoc: Option<String>| {
                pending.push((format!("step {}: {}", i, reason), havoc))
            });
            constraints.push(formula);
            snapshots.push(ssa.snapshot(&program_vars));
        }

        let constrained: BTreeSet<String> = constraints.iter().flat_map(|f| f.vars()).collect();
        let inexact = pending
            .into_iter()
            .filter(|(_, havoc)| havoc.as_ref().map_or(true, |v| constrained.contains(v)))
            .map(|(reason, _)| reason)
            .collect();

        Self {
            steps,
            constraints,
            snapshots,
            inexact,
        }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Per-step constraints
    pub fn constraints(&self) -> &[Formula] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Every step was encoded exactly
    pub fn is_exact(&self) -> bool {
        self.inexact.is_empty()
    }

    pub fn inexact_reasons(&self) -> &[String] {
        &self.inexact
    }

    /// Conjunction of all step constraints
    pub fn conjunction(&self) -> Formula {
        Formula::and(self.constraints.clone())
    }

    /// Program-level valuation at `position` (0 = path start) under an SSA model
    pub fn valuation_at(&self, model: &Model, position: usize) -> BTreeMap<VarName, i64> {
        let mut out = BTreeMap::new();
        if let Some(snapshot) = self.snapshots.get(position) {
            for (var, ssa_name) in snapshot {
                if let Some(v) = model.get(ssa_name) {
                    out.insert(var.clone(), *v);
                }
            }
        }
        out
    }
}

fn collect_step_vars(kind: &EdgeKind, out: &mut BTreeSet<VarName>) {
    match kind {
        EdgeKind::Blank => {}
        EdgeKind::Assume { condition, .. } => out.extend(condition.vars()),
        EdgeKind::Assign { target, value } => {
            out.insert(target.name().to_string());
            out.extend(value.vars());
        }
        EdgeKind::Call { args, result, .. } => {
            for a in args {
                out.extend(a.vars());
            }
            if let Some(r) = result {
                out.insert(r.clone());
            }
        }
        EdgeKind::FunctionCall { bindings, .. } => {
            for (param, value) in bindings {
                out.insert(param.clone());
                out.extend(value.vars());
            }
        }
        EdgeKind::FunctionReturn { function } => {
            out.insert(return_variable(function));
        }
    }
}

#[derive(Debug, Default)]
struct SsaState {
    indices: BTreeMap<String, u32>,
    /// Active activations: (function, frame id)
    frames: Vec<(String, u32)>,
    next_frame: u32,
}

impl SsaState {
    fn scoped(&self, var: &str) -> String {
        if let Some(function) = owner_function(var) {
            if let Some((_, id)) = self.frames.iter().rev().find(|(f, _)| f == function) {
                return format!("{}#{}", var, id);
            }
        }
        var.to_string()
    }

    fn current(&self, var: &str) -> String {
        let scoped = self.scoped(var);
        let k = self.indices.get(&scoped).copied().unwrap_or(0);
        format!("{}@{}", scoped, k)
    }

    fn fresh(&mut self, var: &str) -> String {
        let scoped = self.scoped(var);
        let k = self.indices.entry(scoped.clone()).or_insert(0);
        *k += 1;
        format!("{}@{}", scoped, k)
    }

    fn snapshot(&self, vars: &BTreeSet<VarName>) -> BTreeMap<VarName, String> {
        vars.iter().map(|v| (v.clone(), self.current(v))).collect()
    }

    fn linear(&self, expr: &Expr) -> Option<LinearExpr> {
        LinearExpr::from_expr(expr).map(|e| e.rename(&|v| self.current(v)))
    }

    fn condition(&self, expr: &Expr, truth: bool) -> Option<Formula> {
        if *expr == Expr::Nondet {
            return Some(Formula::True);
        }
        Formula::from_condition(expr, truth).map(|f| f.rename(&|v| self.current(v)))
    }

    /// Formula defining `var_ssa` as the value of `value`, if expressible
    fn definition(&self, var_ssa: &str, value: &Expr) -> Option<Formula> {
        let target = LinearExpr::var(var_ssa);
        if let Some(e) = self.linear(value) {
            let diff = target.checked_sub(&e)?;
            return Some(Formula::atom(Constraint::new(diff, Relation::Eq)));
        }
        // Boolean-valued expression: 1 when it holds, 0 otherwise
        let holds = self.condition(value, true)?;
        let fails = self.condition(value, false)?;
        let is_one = Formula::atom(Constraint::new(
            target.checked_sub(&LinearExpr::constant(1))?,
            Relation::Eq,
        ));
        let is_zero = Formula::atom(Constraint::new(target, Relation::Eq));
        Some(Formula::or(vec![
            Formula::and(vec![holds, is_one]),
            Formula::and(vec![fails, is_zero]),
        ]))
    }

    /// Constraint for one step; `inexact` receives what could not be encoded
    /// and the SSA variable left unconstrained by it, if any
    fn encode(
        &mut self,
        kind: &EdgeKind,
        inexact: &mut impl FnMut(String, Option<String>),
    ) -> Formula {
        match kind {
            EdgeKind::Blank => Formula::True,
            EdgeKind::Assume { condition, truth } => match self.condition(condition, *truth) {
                Some(f) => f,
                None => {
                    inexact(format!("condition '{}' is not linear", condition), None);
                    Formula::True
                }
            },
            EdgeKind::Assign {
                target: LValue::Deref(_),
                ..
            } => Formula::True,
            EdgeKind::Assign {
                target: LValue::Var(x),
                value,
            } => {
                if *value == Expr::Nondet {
                    self.fresh(x);
                    return Formula::True;
                }
                // Evaluate in the pre-state before bumping the SSA index
                let next = self.peek_fresh(x);
                let definition = self.definition(&next, value);
                self.fresh(x);
                match definition {
                    Some(f) => f,
                    None => {
                        inexact(
                            format!("assignment '{} = {}' is not linear", x, value),
                            Some(next),
                        );
                        Formula::True
                    }
                }
            }
            EdgeKind::Call { result, .. } => {
                if let Some(r) = result {
                    self.fresh(r);
                }
                Formula::True
            }
            EdgeKind::FunctionCall {
                function, bindings, ..
            } => {
                // Values in the caller's frame, definitions in the new frame
                let values: Vec<(&VarName, &Expr, Option<LinearExpr>)> = bindings
                    .iter()
                    .map(|(p, v)| (p, v, self.linear(v)))
                    .collect();
                self.next_frame += 1;
                self.frames.push((function.clone(), self.next_frame));

                let mut parts = Vec::new();
                for (param, value, linear) in values {
                    let name = self.fresh(param);
                    if *value == Expr::Nondet {
                        continue;
                    }
                    match linear.and_then(|e| LinearExpr::var(name.as_str()).checked_sub(&e)) {
                        Some(diff) => parts.push(Formula::atom(Constraint::new(diff, Relation::Eq))),
                        None => inexact(
                            format!("argument '{}' of {} is not linear", value, function),
                            Some(name),
                        ),
                    }
                }
                Formula::and(parts)
            }
            EdgeKind::FunctionReturn { function } => {
                let retval = return_variable(function);
                let inner = self.current(&retval);
                if let Some(pos) = self.frames.iter().rposition(|(f, _)| f == function) {
                    self.frames.truncate(pos);
                }
                let outer = self.fresh(&retval);
                let diff = LinearExpr::var(outer).checked_sub(&LinearExpr::var(inner));
                match diff {
                    Some(d) => Formula::atom(Constraint::new(d, Relation::Eq)),
                    None => Formula::True,
                }
            }
        }
    }

    fn peek_fresh(&self, var: &str) -> String {
        let scoped = self.scoped(var);
        let k = self.indices.get(&scoped).copied().unwrap_or(0);
        format!("{}@{}", scoped, k + 1)
    }
}
