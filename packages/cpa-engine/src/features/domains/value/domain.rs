//! Value domain: intervals for tracked variables + Cartesian predicate
//! abstraction over the precision's predicates.
//!
//! Predicate truth values are decided by entailment from the predecessor's
//! knowledge (its predicate literals and interval bounds) with the linear
//! solver. Anything the solver cannot decide stays unknown.

use std::collections::{BTreeMap, BTreeSet};

use super::interval::Interval;
use super::state::ValueState;
use crate::config::ValueConfig;
use crate::features::domains::ports::{AbstractDomain, Transfer};
use crate::features::oracle::domain::{Constraint, Formula, LinearExpr};
use crate::features::oracle::infrastructure::FourierMotzkinSolver;
use crate::features::oracle::ports::ConstraintSolver;
use crate::features::precision::Precision;
use crate::shared::models::{
    owner_function, return_variable, Cfa, CfaEdge, CfaNode, EdgeKind, Expr, LValue, VarName,
};

#[derive(Debug, Clone, Default)]
pub struct ValueDomain {
    solver: FourierMotzkinSolver,
    widening: bool,
}

impl ValueDomain {
    pub fn new(config: &ValueConfig) -> Self {
        Self {
            solver: FourierMotzkinSolver::with_limits(
                config.solver_max_disjuncts,
                config.solver_max_branches,
                config.solver_max_constraints,
            ),
            widening: config.widening,
        }
    }

    /// Truth value of `q` under `knowledge`, if entailed either way
    fn decide(&self, knowledge: &Formula, q: &Constraint) -> Option<bool> {
        if let Some(t) = q.truth_value() {
            return Some(t);
        }
        let known = knowledge.vars();
        if q.vars().iter().all(|v| !known.contains(v)) {
            return None;
        }
        if self.solver.entails(knowledge, q) {
            return Some(true);
        }
        match q.negate() {
            Some(neg) if self.solver.entails(knowledge, &neg) => Some(false),
            _ => None,
        }
    }

    fn assume(
        &self,
        state: &ValueState,
        condition: &Expr,
        truth: bool,
        precision: &Precision,
    ) -> Transfer<ValueState> {
        if state.eval(condition).truthiness() == Some(!truth) {
            return Transfer::Bottom;
        }
        let Some(formula) = Formula::from_condition(condition, truth) else {
            return Transfer::Next(state.clone());
        };
        if formula.is_false() {
            return Transfer::Bottom;
        }
        if formula.is_true() {
            return Transfer::Next(state.clone());
        }

        let mut next = state.clone();
        // Conjuncts that are plain atoms narrow intervals directly
        let conjuncts: Vec<&Constraint> = match &formula {
            Formula::Atom(c) => vec![c],
            Formula::And(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    Formula::Atom(c) => Some(c),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        for c in conjuncts {
            if !next.restrict(c, |v| precision.value.is_tracked(v)) {
                return Transfer::Bottom;
            }
        }

        let knowledge = Formula::and(vec![state.knowledge(), formula]);
        let relevant = !state.predicates.is_empty()
            || !state.values.is_empty()
            || !precision.value.predicates.is_empty();
        if relevant && self.solver.check(&knowledge, None).is_unsat() {
            return Transfer::Bottom;
        }

        for p in &precision.value.predicates {
            if next.predicate(p).is_none() {
                let truth = self.decide(&knowledge, p);
                next.set_predicate(p.clone(), truth);
            }
        }
        Transfer::Next(next)
    }

    fn assign(&self, state: &ValueState, x: &str, value: &Expr, precision: &Precision) -> ValueState {
        let mut next = state.clone();
        if precision.value.is_tracked(x) {
            next.set_interval(x, state.eval(value));
        } else {
            next.values.remove(x);
        }

        let linear = LinearExpr::from_expr(value);
        let knowledge = state.knowledge();
        for p in precision.value.predicates.iter().filter(|p| p.mentions(x)) {
            let truth = linear
                .as_ref()
                .and_then(|e| p.substitute(x, e))
                .and_then(|q| self.decide(&knowledge, &q));
            next.set_predicate(p.clone(), truth);
        }
        next
    }

    /// Enter `function`: bindings are evaluated in `state`, then the callee's
    /// locals start fresh
    fn call(
        &self,
        state: &ValueState,
        function: &str,
        bindings: &[(VarName, Expr)],
        precision: &Precision,
    ) -> ValueState {
        let mut next = state.clone();
        next.forget_locals(function, &[]);

        for (param, value) in bindings {
            if precision.value.is_tracked(param) {
                next.set_interval(param, state.eval(value));
            }
        }

        let params: BTreeSet<&str> = bindings.iter().map(|(p, _)| p.as_str()).collect();
        let knowledge = state.knowledge();
        let callee_local = |v: &str| owner_function(v) == Some(function);
        for p in &precision.value.predicates {
            if !p.expr.vars().any(|v| callee_local(v.as_str())) {
                continue;
            }
            if p
                .expr
                .vars()
                .any(|v| callee_local(v.as_str()) && !params.contains(v.as_str()))
            {
                next.set_predicate(p.clone(), None);
                continue;
            }
            let truth = bind_parameters(p, bindings).and_then(|q| self.decide(&knowledge, &q));
            next.set_predicate(p.clone(), truth);
        }
        next
    }
}

/// `p` with every parameter replaced by its binding value, simultaneously
fn bind_parameters(p: &Constraint, bindings: &[(VarName, Expr)]) -> Option<Constraint> {
    let temp = |i: usize| format!("#bind{}", i);
    let mut q = p.rename(&|v: &str| match bindings.iter().position(|(param, _)| param == v) {
        Some(i) => temp(i),
        None => v.to_string(),
    });
    for (i, (_, value)) in bindings.iter().enumerate() {
        let name = temp(i);
        if q.mentions(&name) {
            q = q.substitute(&name, &LinearExpr::from_expr(value)?)?;
        }
    }
    Some(q)
}

impl AbstractDomain for ValueDomain {
    type State = ValueState;

    fn name(&self) -> &'static str {
        "value"
    }

    fn initial_state(&self, _cfa: &Cfa, _precision: &Precision) -> ValueState {
        ValueState::new()
    }

    fn transfer(
        &self,
        state: &ValueState,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Transfer<ValueState> {
        match &edge.kind {
            EdgeKind::Blank => Transfer::Next(state.clone()),
            EdgeKind::Assume { condition, truth } => {
                self.assume(state, condition, *truth, precision)
            }
            EdgeKind::Assign {
                target: LValue::Var(x),
                value,
            } => Transfer::Next(self.assign(state, x, value, precision)),
            // Pointers never hold addresses of program variables
            EdgeKind::Assign {
                target: LValue::Deref(_),
                ..
            } => Transfer::Next(state.clone()),
            EdgeKind::Call { result, .. } => {
                let mut next = state.clone();
                if let Some(r) = result {
                    next.havoc(r);
                }
                Transfer::Next(next)
            }
            EdgeKind::FunctionCall {
                function, bindings, ..
            } => Transfer::Next(self.call(state, function, bindings, precision)),
            EdgeKind::FunctionReturn { function } => {
                // The returning activation's locals are dead; an outer
                // activation of the same function had them clobbered
                let mut next = state.clone();
                let retval = return_variable(function);
                next.forget_locals(function, &[retval.as_str()]);
                Transfer::Next(next)
            }
        }
    }

    fn merge(
        &self,
        new: &ValueState,
        existing: &ValueState,
        location: &CfaNode,
    ) -> Option<ValueState> {
        let joined = new.join(existing);
        if self.widening && location.is_loop_head {
            Some(existing.widen(&joined))
        } else {
            Some(joined)
        }
    }

    fn is_less_or_equal(&self, lhs: &ValueState, rhs: &ValueState) -> bool {
        lhs.is_less_or_equal(rhs)
    }

    fn adjust_precision(&self, state: &ValueState, precision: &Precision) -> ValueState {
        let mut next = state.clone();
        next.values.retain(|v, _| precision.value.is_tracked(v));
        next.predicates
            .retain(|p, _| precision.value.has_predicate(p));
        next
    }

    fn valuation(&self, state: &ValueState) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (var, interval) in &state.values {
            out.insert(var.clone(), interval.to_string());
        }
        for (p, truth) in &state.predicates {
            out.insert(p.to_string(), truth.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{CfaBuilder, CfaNodeId};

    fn predicate(text: &str) -> Constraint {
        let f = Formula::from_condition(&Expr::parse(text).unwrap(), true).unwrap();
        f.atoms()[0].canonical().unwrap().0
    }

    fn precision(preds: &[&str], tracked: &[&str]) -> Precision {
        let mut p = Precision::new();
        let preds: Vec<Constraint> = preds.iter().map(|t| predicate(t)).collect();
        p.add_predicates(preds.iter());
        let tracked: Vec<VarName> = tracked.iter().map(|t| t.to_string()).collect();
        p.add_tracked(tracked.iter());
        p
    }

    fn edge(kind: EdgeKind) -> CfaEdge {
        CfaEdge {
            id: crate::shared::models::CfaEdgeId(0),
            source: CfaNodeId(0),
            target: CfaNodeId(1),
            kind,
        }
    }

    fn assign(x: &str, e: &str) -> CfaEdge {
        edge(EdgeKind::Assign {
            target: LValue::Var(x.to_string()),
            value: Expr::parse(e).unwrap(),
        })
    }

    fn assume(c: &str, truth: bool) -> CfaEdge {
        edge(EdgeKind::Assume {
            condition: Expr::parse(c).unwrap(),
            truth,
        })
    }

    fn next(domain: &ValueDomain, s: &ValueState, e: &CfaEdge, p: &Precision) -> ValueState {
        match domain.transfer(s, e, p) {
            Transfer::Next(s) => s,
            other => panic!("expected successor, got {:?}", other),
        }
    }

    #[test]
    fn test_solver_limits_come_from_config() {
        let config = ValueConfig::default()
            .solver_max_disjuncts(8)
            .solver_max_branches(3)
            .solver_max_constraints(100);
        assert_eq!(
            ValueDomain::new(&config).solver,
            FourierMotzkinSolver::with_limits(8, 3, 100)
        );
    }

    #[test]
    fn test_predicates_follow_assignments() {
        let domain = ValueDomain::default();
        let p = precision(&["i == 0", "i == j"], &[]);
        let s = ValueState::new();
        let s = next(&domain, &s, &assign("i", "0"), &p);
        assert_eq!(s.predicate(&predicate("i == 0")), Some(true));
        assert_eq!(s.predicate(&predicate("i == j")), None);

        let s = next(&domain, &s, &assign("j", "0"), &p);
        assert_eq!(s.predicate(&predicate("i == j")), Some(true));

        let s = next(&domain, &s, &assign("i", "i + 1"), &p);
        assert_eq!(s.predicate(&predicate("i == 0")), Some(false));
        assert_eq!(s.predicate(&predicate("i == j")), Some(false));
    }

    #[test]
    fn test_assume_prunes_with_predicates() {
        let domain = ValueDomain::default();
        let p = precision(&["i == j"], &[]);
        let mut s = ValueState::new();
        s.set_predicate(predicate("i == j"), Some(true));
        assert!(domain.transfer(&s, &assume("i != j", true), &p).is_bottom());
        assert!(!domain.transfer(&s, &assume("i != j", false), &p).is_bottom());
    }

    #[test]
    fn test_assume_decides_unknown_predicates() {
        let domain = ValueDomain::default();
        let p = precision(&["i < n"], &[]);
        let s = next(&domain, &ValueState::new(), &assume("i < n", false), &p);
        assert_eq!(s.predicate(&predicate("i < n")), Some(false));
    }

    #[test]
    fn test_intervals_for_tracked_variables() {
        let domain = ValueDomain::default();
        let p = precision(&[], &["x"]);
        let s = next(&domain, &ValueState::new(), &assign("x", "5"), &p);
        assert_eq!(s.interval("x"), Interval::constant(5));
        assert!(domain.transfer(&s, &assume("x > 10", true), &p).is_bottom());

        let s = next(&domain, &s, &assign("y", "x + 1"), &p);
        assert!(s.interval("y").is_top());
    }

    #[test]
    fn test_untracked_constant_conditions_still_prune() {
        let domain = ValueDomain::default();
        let p = Precision::new();
        assert!(domain.transfer(&ValueState::new(), &assume("1 == 0", true), &p).is_bottom());
        assert!(!domain.transfer(&ValueState::new(), &assume("x > 0", true), &p).is_bottom());
    }

    #[test]
    fn test_call_binds_parameters_in_caller_state() {
        let domain = ValueDomain::default();
        let p = precision(&["f::n == 0"], &["f::n"]);
        let mut s = ValueState::new();
        s.set_interval("f::n", Interval::constant(1));
        let call = edge(EdgeKind::FunctionCall {
            function: "f".to_string(),
            bindings: vec![("f::n".to_string(), Expr::parse("f::n - 1").unwrap())],
            return_site: CfaNodeId(3),
        });
        let s = next(&domain, &s, &call, &p);
        assert_eq!(s.interval("f::n"), Interval::constant(0));
        assert_eq!(s.predicate(&predicate("f::n == 0")), Some(true));

        let ret = edge(EdgeKind::FunctionReturn {
            function: "f".to_string(),
        });
        let s = next(&domain, &s, &ret, &p);
        assert!(s.interval("f::n").is_top());
    }

    #[test]
    fn test_merge_widens_at_loop_heads() {
        let mut b = CfaBuilder::new();
        let entry = b.function("main", &[]);
        let head = b.node("main");
        b.blank(entry, head);
        b.blank(head, head);
        let cfa = b.build().unwrap();

        let domain = ValueDomain {
            widening: true,
            ..ValueDomain::default()
        };
        let mut old = ValueState::new();
        old.set_interval("x", Interval::constant(0));
        let mut new = ValueState::new();
        new.set_interval("x", Interval::constant(1));
        let merged = domain.merge(&new, &old, cfa.node(head)).unwrap();
        assert_eq!(merged.interval("x"), Interval::at_least(0));
        let merged = domain.merge(&new, &old, cfa.node(entry)).unwrap();
        assert_eq!(merged.interval("x"), Interval::bounded(0, 1));
    }

    #[test]
    fn test_adjust_precision_drops_untracked() {
        let domain = ValueDomain::default();
        let mut s = ValueState::new();
        s.set_interval("x", Interval::constant(1));
        s.set_predicate(predicate("y == 0"), Some(true));
        let adjusted = domain.adjust_precision(&s, &precision(&["y == 0"], &[]));
        assert!(adjusted.values.is_empty());
        assert_eq!(adjusted.predicates.len(), 1);
    }
}
