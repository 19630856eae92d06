//! Shape / memory-safety domain
//!
//! Tracks heap regions created by allocator calls and the pointer variables
//! referring to them. A violation of a checked property turns the successor
//! into a target; a violation of an unchecked property is undefined behavior
//! and prunes the path. Leaks are not undefined behavior and are only
//! reported when checked.

use std::collections::{BTreeMap, BTreeSet};

use super::state::{
    MemoryProperty, MemoryViolation, PointsTo, RegionId, RegionStatus, ShapeState,
};
use crate::config::ShapeConfig;
use crate::features::domains::ports::{AbstractDomain, TargetReason, Transfer};
use crate::features::precision::Precision;
use crate::shared::models::{
    return_variable, BinaryOp, Cfa, CfaEdge, EdgeKind, Expr, LValue, UnaryOp, VarName,
};

#[derive(Debug, Clone)]
pub struct ShapeDomain {
    properties: BTreeSet<MemoryProperty>,
    allocators: BTreeSet<String>,
    deallocators: BTreeSet<String>,
}

impl Default for ShapeDomain {
    fn default() -> Self {
        Self::new(&ShapeConfig::default())
    }
}

impl ShapeDomain {
    pub fn new(config: &ShapeConfig) -> Self {
        Self {
            properties: config.properties.iter().copied().collect(),
            allocators: config.allocators.iter().cloned().collect(),
            deallocators: config.deallocators.iter().cloned().collect(),
        }
    }

    pub fn checks(&self, property: MemoryProperty) -> bool {
        self.properties.contains(&property)
    }

    fn violate(
        &self,
        mut state: ShapeState,
        property: MemoryProperty,
        detail: String,
    ) -> Transfer<ShapeState> {
        if !self.checks(property) {
            if property == MemoryProperty::MemoryLeak {
                return Transfer::Next(state);
            }
            tracing::debug!("Pruning path on unchecked {}: {}", property, detail);
            return Transfer::Bottom;
        }
        state.violation = Some(MemoryViolation { property, detail });
        Transfer::Next(state)
    }

    /// Definite invalid dereference among the edge's memory accesses
    fn invalid_deref(&self, state: &ShapeState, edge: &CfaEdge) -> Option<String> {
        let mut operands: Vec<&Expr> = Vec::new();
        let mut pointers: Vec<&str> = Vec::new();
        match &edge.kind {
            EdgeKind::Blank | EdgeKind::FunctionReturn { .. } => {}
            EdgeKind::Assume { condition, .. } => operands.extend(condition.dereferenced()),
            EdgeKind::Assign { target, value } => {
                operands.extend(value.dereferenced());
                if let LValue::Deref(p) = target {
                    pointers.push(p);
                }
            }
            EdgeKind::Call { args, .. } => {
                for a in args {
                    operands.extend(a.dereferenced());
                }
            }
            EdgeKind::FunctionCall { bindings, .. } => {
                for (_, v) in bindings {
                    operands.extend(v.dereferenced());
                }
            }
        }
        pointers.extend(operands.into_iter().filter_map(|e| e.as_var()));

        for p in pointers {
            let Some(targets) = state.targets(p) else {
                continue;
            };
            if targets.is_empty() {
                continue;
            }
            if targets.iter().all(|t| *t == PointsTo::Null) {
                return Some(format!("null dereference of '{}' at '{}'", p, edge));
            }
            if targets.iter().all(|t| *t == PointsTo::Invalid) {
                return Some(format!("'{}' is not a valid pointer at '{}'", p, edge));
            }
            let freed = targets.iter().all(|t| match t {
                PointsTo::Region(id) => state
                    .region(*id)
                    .is_some_and(|r| r.status == RegionStatus::Freed),
                _ => false,
            });
            if freed {
                return Some(format!("use after free of '{}' at '{}'", p, edge));
            }
        }
        None
    }

    /// Pointer value of an expression; None if not a pointer the domain tracks
    fn pointer_value(state: &ShapeState, value: &Expr) -> Option<BTreeSet<PointsTo>> {
        match value {
            Expr::Int(0) => Some([PointsTo::Null].into()),
            Expr::Int(_) => Some([PointsTo::Invalid].into()),
            Expr::Var(q) => state.targets(q).cloned(),
            _ => None,
        }
    }

    fn assign_pointer(state: &mut ShapeState, x: &str, value: Option<BTreeSet<PointsTo>>) {
        match value {
            Some(targets) => {
                state.pointers.insert(x.to_string(), targets);
            }
            None => {
                state.pointers.remove(x);
            }
        }
    }

    fn free(&self, mut state: ShapeState, arg: Option<&Expr>, edge: &CfaEdge) -> Transfer<ShapeState> {
        let (name, targets) = match arg {
            Some(Expr::Var(p)) => match state.targets(p) {
                Some(t) => (p.clone(), t.clone()),
                None => return Transfer::Next(state),
            },
            Some(Expr::Int(0)) => return Transfer::Next(state),
            Some(Expr::Int(_)) => {
                let detail = format!("free of a non-pointer constant at '{}'", edge);
                return self.violate(state, MemoryProperty::InvalidFree, detail);
            }
            _ => return Transfer::Next(state),
        };

        let non_null: Vec<PointsTo> = targets
            .iter()
            .copied()
            .filter(|t| *t != PointsTo::Null)
            .collect();
        if non_null.is_empty() {
            return Transfer::Next(state);
        }
        if non_null.iter().all(|t| *t == PointsTo::Invalid) {
            let detail = format!("'{}' is not a heap pointer at '{}'", name, edge);
            return self.violate(state, MemoryProperty::InvalidFree, detail);
        }
        let status = |t: &PointsTo| match t {
            PointsTo::Region(id) => state.region(*id).map(|r| r.status),
            _ => None,
        };
        if non_null.iter().all(|t| status(t) == Some(RegionStatus::Freed)) {
            let detail = format!("'{}' freed twice at '{}'", name, edge);
            return self.violate(state, MemoryProperty::DoubleFree, detail);
        }

        let must = non_null.len() == 1 && targets.len() == 1;
        let updates: Vec<(RegionId, RegionStatus)> = non_null
            .iter()
            .filter_map(|t| match t {
                PointsTo::Region(id) => Some(*id),
                _ => None,
            })
            .map(|id| {
                let next = match status(&PointsTo::Region(id)) {
                    _ if must => RegionStatus::Freed,
                    Some(RegionStatus::Freed) => RegionStatus::Freed,
                    _ => RegionStatus::MaybeFreed,
                };
                (id, next)
            })
            .collect();
        for (id, next) in updates {
            state.set_status(id, next);
        }
        // After a successful free the pointer cannot have been null
        if must {
            state.pointers.insert(name, non_null_set(&targets));
        }
        Transfer::Next(state)
    }

    fn assume(state: ShapeState, condition: &Expr, truth: bool) -> Transfer<ShapeState> {
        let Some((p, null_branch)) = null_test(condition, truth) else {
            return Transfer::Next(state);
        };
        let mut next = state;
        let refined: BTreeSet<PointsTo> = match next.targets(p) {
            None if null_branch => [PointsTo::Null].into(),
            None => return Transfer::Next(next),
            Some(targets) if null_branch => targets
                .iter()
                .copied()
                .filter(|t| *t == PointsTo::Null)
                .collect(),
            Some(targets) => non_null_set(targets),
        };
        if refined.is_empty() {
            return Transfer::Bottom;
        }
        next.pointers.insert(p.to_string(), refined);
        Transfer::Next(next)
    }

    fn effect(&self, state: &ShapeState, edge: &CfaEdge) -> Transfer<ShapeState> {
        let mut next = state.clone();
        match &edge.kind {
            EdgeKind::Blank => Transfer::Next(next),
            EdgeKind::Assume { condition, truth } => Self::assume(next, condition, *truth),
            EdgeKind::Assign {
                target: LValue::Var(x),
                value,
            } => {
                let v = Self::pointer_value(state, value);
                Self::assign_pointer(&mut next, x, v);
                Transfer::Next(next)
            }
            EdgeKind::Assign {
                target: LValue::Deref(_),
                value,
            } => {
                if let Some(q) = value.as_var() {
                    next.escape(q);
                }
                Transfer::Next(next)
            }
            EdgeKind::Call {
                function,
                args,
                result,
            } => {
                if self.allocators.contains(function) {
                    let region = next.allocate();
                    if let Some(r) = result {
                        next.pointers
                            .insert(r.clone(), [PointsTo::Region(region)].into());
                    }
                    return Transfer::Next(next);
                }
                if self.deallocators.contains(function) {
                    let freed = self.free(next, args.first(), edge);
                    return match (freed, result) {
                        (Transfer::Next(mut s), Some(r)) => {
                            s.pointers.remove(r);
                            Transfer::Next(s)
                        }
                        (other, _) => other,
                    };
                }
                for a in args {
                    if let Some(q) = a.as_var() {
                        next.escape(q);
                    }
                }
                if let Some(r) = result {
                    next.pointers.remove(r);
                }
                Transfer::Next(next)
            }
            EdgeKind::FunctionCall {
                function, bindings, ..
            } => {
                let values: Vec<(VarName, Option<BTreeSet<PointsTo>>)> = bindings
                    .iter()
                    .map(|(param, value)| (param.clone(), Self::pointer_value(state, value)))
                    .collect();
                next.forget_locals(function, &[]);
                for (param, value) in values {
                    Self::assign_pointer(&mut next, &param, value);
                }
                Transfer::Next(next)
            }
            EdgeKind::FunctionReturn { function } => {
                let retval = return_variable(function);
                next.forget_locals(function, &[retval.as_str()]);
                Transfer::Next(next)
            }
        }
    }
}

fn non_null_set(targets: &BTreeSet<PointsTo>) -> BTreeSet<PointsTo> {
    targets
        .iter()
        .copied()
        .filter(|t| *t != PointsTo::Null)
        .collect()
}

/// `(pointer, branch asserts null)` for conditions `p`, `!p`, `p == 0`, `p != 0`
fn null_test(condition: &Expr, truth: bool) -> Option<(&str, bool)> {
    match condition {
        Expr::Var(p) => Some((p, !truth)),
        Expr::Unary(UnaryOp::Not, inner) => null_test(inner, !truth),
        Expr::Binary(op @ (BinaryOp::Eq | BinaryOp::Ne), lhs, rhs) => {
            let p = match (lhs.as_ref(), rhs.as_ref()) {
                (Expr::Var(p), Expr::Int(0)) | (Expr::Int(0), Expr::Var(p)) => p,
                _ => return None,
            };
            let asserts_null = (*op == BinaryOp::Eq) == truth;
            Some((p, asserts_null))
        }
        _ => None,
    }
}

impl AbstractDomain for ShapeDomain {
    type State = ShapeState;

    fn name(&self) -> &'static str {
        "shape"
    }

    fn initial_state(&self, _cfa: &Cfa, _precision: &Precision) -> ShapeState {
        ShapeState::new()
    }

    fn transfer(
        &self,
        state: &ShapeState,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Transfer<ShapeState> {
        if state.violation.is_some() {
            return Transfer::Next(state.clone());
        }
        if let Some(detail) = self.invalid_deref(state, edge) {
            return self.violate(state.clone(), MemoryProperty::InvalidDeref, detail);
        }
        match self.effect(state, edge) {
            Transfer::Next(mut next) => {
                let leaked = next.collect_garbage();
                if leaked && next.violation.is_none() {
                    let detail = format!("allocated memory unreachable after '{}'", edge);
                    return self.violate(next, MemoryProperty::MemoryLeak, detail);
                }
                Transfer::Next(next)
            }
            other => other,
        }
    }

    fn is_less_or_equal(&self, lhs: &ShapeState, rhs: &ShapeState) -> bool {
        lhs == rhs
    }

    fn target_reason(&self, state: &ShapeState) -> Option<TargetReason> {
        state.violation.as_ref().map(|v| TargetReason::MemorySafety {
            property: v.property,
            detail: v.detail.clone(),
        })
    }

    fn valuation(&self, state: &ShapeState) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (var, targets) in &state.pointers {
            out.insert(var.clone(), state.describe(targets));
        }
        if let Some(v) = &state.violation {
            out.insert("violation".to_string(), v.property.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::{CfaEdgeId, CfaNodeId};

    fn edge(kind: EdgeKind) -> CfaEdge {
        CfaEdge {
            id: CfaEdgeId(0),
            source: CfaNodeId(0),
            target: CfaNodeId(1),
            kind,
        }
    }

    fn call(function: &str, args: &[&str], result: Option<&str>) -> CfaEdge {
        edge(EdgeKind::Call {
            function: function.to_string(),
            args: args.iter().map(|a| Expr::parse(a).unwrap()).collect(),
            result: result.map(|r| r.to_string()),
        })
    }

    fn assign(lhs: &str, rhs: &str) -> CfaEdge {
        edge(EdgeKind::Assign {
            target: LValue::parse(lhs).unwrap(),
            value: Expr::parse(rhs).unwrap(),
        })
    }

    fn run(domain: &ShapeDomain, edges: &[CfaEdge]) -> Transfer<ShapeState> {
        let precision = Precision::new();
        let mut state = ShapeState::new();
        for e in edges {
            match domain.transfer(&state, e, &precision) {
                Transfer::Next(s) => state = s,
                other => return other,
            }
        }
        Transfer::Next(state)
    }

    fn violation(t: &Transfer<ShapeState>) -> Option<MemoryProperty> {
        match t {
            Transfer::Next(s) => s.violation.as_ref().map(|v| v.property),
            _ => None,
        }
    }

    #[test]
    fn test_double_free() {
        let domain = ShapeDomain::default();
        let t = run(
            &domain,
            &[
                call("malloc", &["4"], Some("p")),
                call("free", &["p"], None),
                call("free", &["p"], None),
            ],
        );
        assert_eq!(violation(&t), Some(MemoryProperty::DoubleFree));
    }

    #[test]
    fn test_free_through_alias() {
        let domain = ShapeDomain::default();
        let t = run(
            &domain,
            &[
                call("malloc", &["4"], Some("p")),
                assign("q", "p"),
                call("free", &["q"], None),
                assign("x", "*p"),
            ],
        );
        assert_eq!(violation(&t), Some(MemoryProperty::InvalidDeref));
    }

    #[test]
    fn test_null_checks() {
        let domain = ShapeDomain::default();
        let t = run(&domain, &[assign("p", "0"), assign("*p", "1")]);
        assert_eq!(violation(&t), Some(MemoryProperty::InvalidDeref));

        let t = run(&domain, &[assign("p", "0"), call("free", &["p"], None)]);
        assert_eq!(violation(&t), None);

        // if (p != 0) on a definitely-null pointer is infeasible
        let cond = edge(EdgeKind::Assume {
            condition: Expr::parse("p != 0").unwrap(),
            truth: true,
        });
        let t = run(&domain, &[assign("p", "0"), cond]);
        assert!(t.is_bottom());
    }

    #[test]
    fn test_invalid_free_and_unchecked_properties() {
        let domain = ShapeDomain::default();
        let t = run(&domain, &[assign("p", "12"), call("free", &["p"], None)]);
        assert_eq!(violation(&t), Some(MemoryProperty::InvalidFree));

        let only_leaks = ShapeDomain::new(&ShapeConfig {
            properties: vec![MemoryProperty::MemoryLeak],
            ..ShapeConfig::default()
        });
        let t = run(&only_leaks, &[assign("p", "12"), call("free", &["p"], None)]);
        assert!(t.is_bottom());
    }

    #[test]
    fn test_leak_detection() {
        let checked = ShapeDomain::new(&ShapeConfig {
            properties: MemoryProperty::all(),
            ..ShapeConfig::default()
        });
        let t = run(&checked, &[call("malloc", &["4"], Some("p")), assign("p", "0")]);
        assert_eq!(violation(&t), Some(MemoryProperty::MemoryLeak));

        let t = run(
            &checked,
            &[call("malloc", &["4"], Some("p")), call("free", &["p"], None), assign("p", "0")],
        );
        assert_eq!(violation(&t), None);

        // Stored into memory: no longer tracked, not a leak
        let t = run(
            &checked,
            &[
                call("malloc", &["4"], Some("p")),
                call("malloc", &["4"], Some("q")),
                assign("*q", "p"),
                assign("p", "0"),
            ],
        );
        assert_eq!(violation(&t), None);
    }

    #[test]
    fn test_loop_allocation_states_repeat() {
        let domain = ShapeDomain::default();
        let body = [call("malloc", &["4"], Some("p")), call("free", &["p"], None)];
        let Transfer::Next(once) = run(&domain, &body) else {
            panic!("expected successor");
        };
        let mut state = once.clone();
        for e in &body {
            if let Transfer::Next(s) = domain.transfer(&state, e, &Precision::new()) {
                state = s;
            }
        }
        assert_eq!(state, once);
    }
}
