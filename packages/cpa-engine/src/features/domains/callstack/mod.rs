//! Call-stack domain
//!
//! Keeps the chain of active calls so that a `FunctionReturn` only flows back
//! to the return site of the call that entered the function. Recursion is
//! bounded by `max_depth`: a call beyond it truncates the branch, which makes
//! the run incomplete instead of diverging.
//!
//! Procedure summaries keyed by call-site abstraction would plug in here as an
//! alternative to explicit stacks.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::CallStackConfig;
use crate::features::domains::ports::{AbstractDomain, Transfer};
use crate::features::precision::Precision;
use crate::shared::models::{Cfa, CfaEdge, CfaNodeId, EdgeKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallFrame {
    pub function: String,
    pub return_site: CfaNodeId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CallStackState {
    pub frames: Vec<CallFrame>,
}

impl CallStackState {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl fmt::Display for CallStackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let frames: Vec<String> = self
            .frames
            .iter()
            .map(|fr| format!("{}@{}", fr.function, fr.return_site))
            .collect();
        write!(f, "[{}]", frames.join(" > "))
    }
}

#[derive(Debug, Clone)]
pub struct CallStackDomain {
    max_depth: usize,
}

impl Default for CallStackDomain {
    fn default() -> Self {
        Self::new(&CallStackConfig::default())
    }
}

impl CallStackDomain {
    pub fn new(config: &CallStackConfig) -> Self {
        Self {
            max_depth: config.max_depth,
        }
    }
}

impl AbstractDomain for CallStackDomain {
    type State = CallStackState;

    fn name(&self) -> &'static str {
        "callstack"
    }

    fn initial_state(&self, _cfa: &Cfa, _precision: &Precision) -> CallStackState {
        CallStackState::default()
    }

    fn transfer(
        &self,
        state: &CallStackState,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Transfer<CallStackState> {
        match &edge.kind {
            EdgeKind::FunctionCall {
                function,
                return_site,
                ..
            } => {
                if state.depth() >= self.max_depth {
                    tracing::warn!(
                        "Call to '{}' exceeds call depth bound {}; branch truncated",
                        function,
                        self.max_depth
                    );
                    return Transfer::Truncated(format!(
                        "call depth bound {} exceeded at call to '{}'",
                        self.max_depth, function
                    ));
                }
                let mut next = state.clone();
                next.frames.push(CallFrame {
                    function: function.clone(),
                    return_site: *return_site,
                });
                Transfer::Next(next)
            }
            EdgeKind::FunctionReturn { function } => match state.frames.last() {
                Some(top) if top.function == *function && top.return_site == edge.target => {
                    let mut next = state.clone();
                    next.frames.pop();
                    Transfer::Next(next)
                }
                _ => Transfer::Bottom,
            },
            _ => Transfer::Next(state.clone()),
        }
    }

    fn is_less_or_equal(&self, lhs: &CallStackState, rhs: &CallStackState) -> bool {
        lhs == rhs
    }

    fn valuation(&self, state: &CallStackState) -> BTreeMap<String, String> {
        BTreeMap::from([("stack".to_string(), state.to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::CfaEdgeId;

    fn call(function: &str, return_site: u32) -> CfaEdge {
        CfaEdge {
            id: CfaEdgeId(0),
            source: CfaNodeId(0),
            target: CfaNodeId(1),
            kind: EdgeKind::FunctionCall {
                function: function.to_string(),
                bindings: vec![],
                return_site: CfaNodeId(return_site),
            },
        }
    }

    fn ret(function: &str, target: u32) -> CfaEdge {
        CfaEdge {
            id: CfaEdgeId(1),
            source: CfaNodeId(2),
            target: CfaNodeId(target),
            kind: EdgeKind::FunctionReturn {
                function: function.to_string(),
            },
        }
    }

    fn next(d: &CallStackDomain, s: &CallStackState, e: &CfaEdge) -> Transfer<CallStackState> {
        d.transfer(s, e, &Precision::new())
    }

    #[test]
    fn test_return_matches_call_site() {
        let d = CallStackDomain::default();
        let Transfer::Next(inside) = next(&d, &CallStackState::default(), &call("f", 5)) else {
            panic!("expected successor");
        };
        assert_eq!(inside.depth(), 1);
        assert!(matches!(next(&d, &inside, &ret("f", 5)), Transfer::Next(s) if s.depth() == 0));
        assert!(next(&d, &inside, &ret("f", 9)).is_bottom());
        assert!(next(&d, &CallStackState::default(), &ret("f", 5)).is_bottom());
    }

    #[test]
    fn test_depth_bound_truncates() {
        let d = CallStackDomain::new(&CallStackConfig { max_depth: 2 });
        let mut state = CallStackState::default();
        for _ in 0..2 {
            match next(&d, &state, &call("rec", 3)) {
                Transfer::Next(s) => state = s,
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(next(&d, &state, &call("rec", 3)), Transfer::Truncated(_)));
    }
}
