/*
 * Taint Domain (explicit information flow)
 *
 * Two-point confidentiality lattice: Public ⊑ Secret.
 *
 * Example:
 * ```text
 * secret = nondet();   // Secret (declared secret variable)
 * public = secret;     // leak: Secret → Public sink
 * ```
 *
 * Labels flow through assignments, call arguments and call results. Memory
 * is one weakly updated summary cell: `*p = e` joins the label of `e` into
 * it, and any expression reading through a pointer joins it back in. Secret
 * arguments to an unknown function may be stored anywhere, so they taint the
 * summary too. Branch conditions do not taint the variables assigned under
 * them (no implicit flows).
 */

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::config::TaintConfig;
use crate::features::domains::ports::{AbstractDomain, TargetReason, Transfer};
use crate::features::precision::Precision;
use crate::shared::models::{
    owner_function, return_variable, Cfa, CfaEdge, CfaNode, EdgeKind, Expr, LValue, VarName,
};

/// Confidentiality label
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SecurityLabel {
    #[default]
    Public,
    Secret,
}

impl SecurityLabel {
    /// Join (least upper bound): ⊔
    pub fn join(&self, other: &Self) -> Self {
        (*self).max(*other)
    }

    /// Data at level `self` may flow to level `other`
    pub fn flows_to(&self, other: &Self) -> bool {
        self <= other
    }
}

impl fmt::Display for SecurityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLabel::Public => write!(f, "public"),
            SecurityLabel::Secret => write!(f, "secret"),
        }
    }
}

/// Secret data reached a public sink
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaintLeak {
    pub sink: String,
    pub detail: String,
}

/// Variables currently holding secret data; everything else is public
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TaintState {
    pub secret: BTreeSet<VarName>,
    /// Summary label of all heap memory
    pub heap: SecurityLabel,
    pub leak: Option<TaintLeak>,
}

impl TaintState {
    pub fn label(&self, var: &str) -> SecurityLabel {
        if self.secret.contains(var) {
            SecurityLabel::Secret
        } else {
            SecurityLabel::Public
        }
    }

    /// Label of an expression: join over every variable it reads, plus the
    /// heap summary if it reads memory
    pub fn label_of(&self, expr: &Expr) -> SecurityLabel {
        let vars = expr
            .vars()
            .iter()
            .map(|v| self.label(v))
            .fold(SecurityLabel::Public, |acc, l| acc.join(&l));
        if expr.dereferenced().is_empty() {
            vars
        } else {
            vars.join(&self.heap)
        }
    }

    fn set_label(&mut self, var: &str, label: SecurityLabel) {
        match label {
            SecurityLabel::Secret => {
                self.secret.insert(var.to_string());
            }
            SecurityLabel::Public => {
                self.secret.remove(var);
            }
        }
    }
}

/// Sources, sinks and sanitizers
#[derive(Debug, Clone, Default)]
pub struct TaintPolicy {
    /// Always secret, whatever is assigned to them
    pub secret_variables: BTreeSet<VarName>,
    /// Functions whose result is secret
    pub secret_sources: BTreeSet<String>,
    /// Functions whose result is public
    pub sanitizers: BTreeSet<String>,
    /// Variables that must never hold secret data
    pub public_sinks: BTreeSet<VarName>,
    /// Functions that must never receive secret arguments
    pub sink_functions: BTreeSet<String>,
}

impl TaintPolicy {
    pub fn from_config(config: &TaintConfig) -> Self {
        let set = |v: &[String]| v.iter().cloned().collect::<BTreeSet<_>>();
        Self {
            secret_variables: set(&config.secret_variables),
            secret_sources: set(&config.secret_sources),
            sanitizers: set(&config.sanitizers),
            public_sinks: set(&config.public_sinks),
            sink_functions: set(&config.sink_functions),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaintDomain {
    policy: TaintPolicy,
}

impl TaintDomain {
    pub fn new(config: &TaintConfig) -> Self {
        Self {
            policy: TaintPolicy::from_config(config),
        }
    }

    pub fn with_policy(policy: TaintPolicy) -> Self {
        Self { policy }
    }

    /// Write `label` into `var`, recording a leak on a public sink
    fn write(&self, state: &mut TaintState, var: &str, label: SecurityLabel, edge: &CfaEdge) {
        if self.policy.secret_variables.contains(var) {
            state.set_label(var, SecurityLabel::Secret);
            return;
        }
        if self.policy.public_sinks.contains(var) && !label.flows_to(&SecurityLabel::Public) {
            state.leak.get_or_insert_with(|| TaintLeak {
                sink: var.to_string(),
                detail: format!("'{}' copies secret data into '{}'", edge, var),
            });
        }
        state.set_label(var, label);
    }

    fn forget_locals(state: &mut TaintState, function: &str, keep: Option<&str>) {
        state
            .secret
            .retain(|v| owner_function(v) != Some(function) || Some(v.as_str()) == keep);
    }
}

impl AbstractDomain for TaintDomain {
    type State = TaintState;

    fn name(&self) -> &'static str {
        "taint"
    }

    fn initial_state(&self, _cfa: &Cfa, _precision: &Precision) -> TaintState {
        TaintState {
            secret: self.policy.secret_variables.clone(),
            ..TaintState::default()
        }
    }

    fn transfer(
        &self,
        state: &TaintState,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Transfer<TaintState> {
        let mut next = state.clone();
        match &edge.kind {
            EdgeKind::Blank | EdgeKind::Assume { .. } => {}
            EdgeKind::Assign {
                target: LValue::Var(x),
                value,
            } => {
                let label = state.label_of(value);
                self.write(&mut next, x, label, edge);
            }
            EdgeKind::Assign {
                target: LValue::Deref(_),
                value,
            } => {
                next.heap = state.heap.join(&state.label_of(value));
            }
            EdgeKind::Call {
                function,
                args,
                result,
            } => {
                let args_label = args
                    .iter()
                    .map(|a| state.label_of(a))
                    .fold(SecurityLabel::Public, |acc, l| acc.join(&l));
                if self.policy.sink_functions.contains(function)
                    && args_label == SecurityLabel::Secret
                {
                    next.leak.get_or_insert_with(|| TaintLeak {
                        sink: function.clone(),
                        detail: format!("'{}' passes secret data to '{}'", edge, function),
                    });
                }
                if !self.policy.sanitizers.contains(function) {
                    next.heap = next.heap.join(&args_label);
                }
                if let Some(r) = result {
                    let label = if self.policy.secret_sources.contains(function) {
                        SecurityLabel::Secret
                    } else if self.policy.sanitizers.contains(function) {
                        SecurityLabel::Public
                    } else {
                        args_label
                    };
                    self.write(&mut next, r, label, edge);
                }
            }
            EdgeKind::FunctionCall {
                function, bindings, ..
            } => {
                let labels: Vec<(&VarName, SecurityLabel)> = bindings
                    .iter()
                    .map(|(param, value)| (param, state.label_of(value)))
                    .collect();
                Self::forget_locals(&mut next, function, None);
                for (param, label) in labels {
                    self.write(&mut next, param, label, edge);
                }
            }
            EdgeKind::FunctionReturn { function } => {
                let retval = return_variable(function);
                Self::forget_locals(&mut next, function, Some(retval.as_str()));
            }
        }
        Transfer::Next(next)
    }

    fn merge(&self, new: &TaintState, existing: &TaintState, _location: &CfaNode) -> Option<TaintState> {
        if new.leak != existing.leak {
            return None;
        }
        Some(TaintState {
            secret: new.secret.union(&existing.secret).cloned().collect(),
            heap: new.heap.join(&existing.heap),
            leak: existing.leak.clone(),
        })
    }

    fn is_less_or_equal(&self, lhs: &TaintState, rhs: &TaintState) -> bool {
        lhs.leak == rhs.leak && lhs.secret.is_subset(&rhs.secret) && lhs.heap.flows_to(&rhs.heap)
    }

    fn target_reason(&self, state: &TaintState) -> Option<TargetReason> {
        state.leak.as_ref().map(|l| TargetReason::TaintLeak {
            sink: l.sink.clone(),
            detail: l.detail.clone(),
        })
    }

    fn valuation(&self, state: &TaintState) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = state
            .secret
            .iter()
            .map(|v| (v.clone(), SecurityLabel::Secret.to_string()))
            .collect();
        if state.heap == SecurityLabel::Secret {
            out.insert("*".to_string(), SecurityLabel::Secret.to_string());
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

    fn assign(lhs: &str, rhs: &str) -> CfaEdge {
        edge(EdgeKind::Assign {
            target: LValue::parse(lhs).unwrap(),
            value: Expr::parse(rhs).unwrap(),
        })
    }

    fn call(function: &str, args: &[&str], result: Option<&str>) -> CfaEdge {
        edge(EdgeKind::Call {
            function: function.to_string(),
            args: args.iter().map(|a| Expr::parse(a).unwrap()).collect(),
            result: result.map(|r| r.to_string()),
        })
    }

    fn domain() -> TaintDomain {
        TaintDomain::new(&TaintConfig {
            secret_variables: vec!["secret".to_string()],
            secret_sources: vec!["read_password".to_string()],
            sanitizers: vec!["hash".to_string()],
            public_sinks: vec!["public".to_string()],
            sink_functions: vec!["print".to_string()],
        })
    }

    fn run(domain: &TaintDomain, edges: &[CfaEdge]) -> TaintState {
        let precision = Precision::new();
        let mut state = TaintState {
            secret: domain.policy.secret_variables.clone(),
            ..TaintState::default()
        };
        for e in edges {
            if let Transfer::Next(s) = domain.transfer(&state, e, &precision) {
                state = s;
            }
        }
        state
    }

    #[test]
    fn test_secret_assignment_to_public_leaks() {
        let d = domain();
        let state = run(&d, &[assign("secret", "nondet()"), assign("public", "secret")]);
        assert_eq!(state.leak.as_ref().map(|l| l.sink.as_str()), Some("public"));
        assert!(d.target_reason(&state).is_some());
    }

    #[test]
    fn test_labels_propagate_through_temporaries() {
        let d = domain();
        let state = run(&d, &[assign("t", "secret + 1"), assign("u", "t * 2")]);
        assert_eq!(state.label("u"), SecurityLabel::Secret);
        assert!(state.leak.is_none());

        // Overwriting with public data clears the label
        let state = run(&d, &[assign("t", "secret"), assign("t", "0")]);
        assert_eq!(state.label("t"), SecurityLabel::Public);
    }

    #[test]
    fn test_sources_sanitizers_and_sink_functions() {
        let d = domain();
        let state = run(
            &d,
            &[call("read_password", &[], Some("pw")), call("hash", &["pw"], Some("h"))],
        );
        assert_eq!(state.label("pw"), SecurityLabel::Secret);
        assert_eq!(state.label("h"), SecurityLabel::Public);

        let state = run(&d, &[call("print", &["secret"], None)]);
        assert_eq!(state.leak.map(|l| l.sink), Some("print".to_string()));
    }

    #[test]
    fn test_no_implicit_flows() {
        let d = domain();
        let branch = edge(EdgeKind::Assume {
            condition: Expr::parse("secret > 0").unwrap(),
            truth: true,
        });
        let state = run(&d, &[branch, assign("public", "1")]);
        assert!(state.leak.is_none());
    }

    #[test]
    fn test_merge_unions_secret_sets() {
        let d = domain();
        let a = run(&d, &[assign("x", "secret")]);
        let b = run(&d, &[assign("y", "secret")]);
        let node = CfaNode {
            id: CfaNodeId(0),
            function: "main".to_string(),
            label: None,
            is_loop_head: false,
            loop_depth: 0,
            rpo: 0,
        };
        let merged = d.merge(&a, &b, &node).unwrap();
        assert!(d.is_less_or_equal(&a, &merged));
        assert!(d.is_less_or_equal(&b, &merged));
    }

    #[test]
    fn test_secret_round_trips_through_memory() {
        let d = domain();
        let state = run(
            &d,
            &[
                call("malloc", &["4"], Some("p")),
                assign("*p", "secret"),
                assign("public", "*p"),
            ],
        );
        assert_eq!(state.heap, SecurityLabel::Secret);
        assert_eq!(state.label("p"), SecurityLabel::Public);
        assert_eq!(state.leak.map(|l| l.sink), Some("public".to_string()));

        // Public writes never clear the summary
        let state = run(&d, &[assign("*p", "secret"), assign("*p", "0"), assign("t", "*p + 1")]);
        assert_eq!(state.label("t"), SecurityLabel::Secret);
    }

    #[test]
    fn test_unknown_call_taints_memory() {
        let d = domain();
        let state = run(&d, &[call("store", &["q", "secret"], None), assign("t", "*q")]);
        assert_eq!(state.label("t"), SecurityLabel::Secret);

        let state = run(&d, &[call("hash", &["secret"], None), assign("t", "*q")]);
        assert_eq!(state.label("t"), SecurityLabel::Public);
    }
}
