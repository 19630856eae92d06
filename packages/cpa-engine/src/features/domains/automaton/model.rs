/*
 * Specification Automaton Model
 *
 * A monitor automaton observed synchronously with the program:
 * - states, one initial state
 * - error states (entering one makes the composite state a target)
 * - sink states (entering one prunes the path)
 * - ordered transitions guarded by edge triggers
 *
 * The first transition out of the current state whose trigger matches the
 * CFA edge fires. No match: the automaton stays where it is.
 */

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::shared::models::{CfaEdge, EdgeKind, Expr, LValue};

/// Edge pattern guarding a transition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    /// Call of `function` (library call or call into a body)
    Call { function: String },
    /// Return from the body of `function`
    Return { function: String },
    /// Assignment to `variable` (including a call result)
    Assign { variable: String },
    /// Branch on exactly `condition`
    Assume {
        condition: Expr,
        #[serde(default = "default_truth")]
        truth: bool,
    },
    /// Any non-blank edge
    Any,
}

fn default_truth() -> bool {
    true
}

impl Trigger {
    pub fn call(function: impl Into<String>) -> Self {
        Trigger::Call {
            function: function.into(),
        }
    }

    pub fn matches(&self, edge: &CfaEdge) -> bool {
        match (self, &edge.kind) {
            (Trigger::Any, EdgeKind::Blank) => false,
            (Trigger::Any, _) => true,
            (Trigger::Call { function }, EdgeKind::Call { function: f, .. })
            | (Trigger::Call { function }, EdgeKind::FunctionCall { function: f, .. }) => {
                function == f
            }
            (Trigger::Return { function }, EdgeKind::FunctionReturn { function: f }) => function == f,
            (Trigger::Assign { variable }, EdgeKind::Assign { target, .. }) => {
                matches!(target, LValue::Var(v) if v == variable)
            }
            (Trigger::Assign { variable }, EdgeKind::Call { result, .. }) => {
                result.as_deref() == Some(variable.as_str())
            }
            (
                Trigger::Assume { condition, truth },
                EdgeKind::Assume {
                    condition: c,
                    truth: t,
                },
            ) => condition == c && truth == t,
            _ => false,
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Call { function } => write!(f, "call {}", function),
            Trigger::Return { function } => write!(f, "return {}", function),
            Trigger::Assign { variable } => write!(f, "assign {}", variable),
            Trigger::Assume { condition, truth } => {
                if *truth {
                    write!(f, "assume {}", condition)
                } else {
                    write!(f, "assume !({})", condition)
                }
            }
            Trigger::Any => write!(f, "any"),
        }
    }
}

/// Transition between two state indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: usize,
    pub to: usize,
    pub trigger: Trigger,
}

/// Validated monitor automaton (built by [`AutomatonParser`](super::AutomatonParser)
/// or [`AutomatonBuilder`])
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecificationAutomaton {
    pub name: String,
    pub states: Vec<String>,
    pub initial: usize,
    pub error_states: Vec<usize>,
    pub sink_states: Vec<usize>,
    pub transitions: Vec<Transition>,
}

impl SpecificationAutomaton {
    pub fn state_index(&self, name: &str) -> Option<usize> {
        self.states.iter().position(|s| s == name)
    }

    pub fn state_name(&self, index: usize) -> &str {
        self.states.get(index).map_or("?", |s| s.as_str())
    }

    pub fn is_error(&self, state: usize) -> bool {
        self.error_states.contains(&state)
    }

    pub fn is_sink(&self, state: usize) -> bool {
        self.sink_states.contains(&state)
    }

    /// Successor of `state` on `edge` (first matching transition wins)
    pub fn step(&self, state: usize, edge: &CfaEdge) -> usize {
        self.transitions
            .iter()
            .find(|t| t.from == state && t.trigger.matches(edge))
            .map_or(state, |t| t.to)
    }

    /// States reachable from the initial state over any trigger
    pub fn reachable_states(&self) -> Vec<bool> {
        let mut seen = vec![false; self.states.len()];
        let mut stack = vec![self.initial];
        while let Some(s) = stack.pop() {
            if std::mem::replace(&mut seen[s], true) {
                continue;
            }
            for t in self.transitions.iter().filter(|t| t.from == s) {
                if !seen[t.to] {
                    stack.push(t.to);
                }
            }
        }
        seen
    }
}

/// Automaton builder (fluent API)
///
/// States are declared on first use. `build` runs the same validation as the
/// parser.
///
/// # Example
/// ```
/// use cpa_engine::features::domains::automaton::{AutomatonBuilder, Trigger};
///
/// let automaton = AutomatonBuilder::new("Once")
///     .initial_state("Idle")
///     .transition("Idle", Trigger::call("start"), "Running")
///     .transition("Running", Trigger::call("start"), "Error")
///     .error_state("Error")
///     .build()
///     .unwrap();
/// assert_eq!(automaton.states.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct AutomatonBuilder {
    description: super::parser::AutomatonDescription,
}

impl AutomatonBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            description: super::parser::AutomatonDescription {
                automaton: name.into(),
                ..Default::default()
            },
        }
    }

    fn declare(&mut self, state: &str) {
        if !self.description.states.iter().any(|s| s == state) {
            self.description.states.push(state.to_string());
        }
    }

    pub fn initial_state(mut self, state: impl Into<String>) -> Self {
        let state = state.into();
        self.declare(&state);
        self.description.initial_state = state;
        self
    }

    pub fn transition(
        mut self,
        from: impl Into<String>,
        trigger: Trigger,
        to: impl Into<String>,
    ) -> Self {
        let (from, to) = (from.into(), to.into());
        self.declare(&from);
        self.declare(&to);
        self.description
            .transitions
            .push(super::parser::TransitionDescription { from, trigger, to });
        self
    }

    pub fn error_state(mut self, state: impl Into<String>) -> Self {
        let state = state.into();
        self.declare(&state);
        self.description.error_states.push(state);
        self
    }

    pub fn sink_state(mut self, state: impl Into<String>) -> Self {
        let state = state.into();
        self.declare(&state);
        self.description.sink_states.push(state);
        self
    }

    pub fn build(self) -> Result<SpecificationAutomaton, super::parser::AutomatonParseError> {
        super::parser::AutomatonParser::from_description(self.description)
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

    #[test]
    fn test_trigger_matching() {
        let call = edge(EdgeKind::Call {
            function: "lock".to_string(),
            args: vec![],
            result: Some("r".to_string()),
        });
        assert!(Trigger::call("lock").matches(&call));
        assert!(!Trigger::call("unlock").matches(&call));
        assert!(Trigger::Assign {
            variable: "r".to_string()
        }
        .matches(&call));
        assert!(Trigger::Any.matches(&call));
        assert!(!Trigger::Any.matches(&edge(EdgeKind::Blank)));

        let branch = edge(EdgeKind::Assume {
            condition: Expr::parse("x > 0").unwrap(),
            truth: false,
        });
        let trigger = Trigger::Assume {
            condition: Expr::parse("x > 0").unwrap(),
            truth: false,
        };
        assert!(trigger.matches(&branch));
    }

    #[test]
    fn test_first_matching_transition_fires() {
        let automaton = AutomatonBuilder::new("Order")
            .initial_state("A")
            .transition("A", Trigger::call("f"), "B")
            .transition("A", Trigger::Any, "C")
            .build()
            .unwrap();
        let f = edge(EdgeKind::Call {
            function: "f".to_string(),
            args: vec![],
            result: None,
        });
        let g = edge(EdgeKind::Call {
            function: "g".to_string(),
            args: vec![],
            result: None,
        });
        assert_eq!(automaton.state_name(automaton.step(0, &f)), "B");
        assert_eq!(automaton.state_name(automaton.step(0, &g)), "C");
        // No transition out of B: stays
        assert_eq!(automaton.step(1, &g), 1);
    }
}
