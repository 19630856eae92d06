//! Automaton domain: synchronous product of specification monitors, plus the
//! set of currently held locks.

use std::collections::{BTreeMap, BTreeSet};

use super::built_in::{BuiltinAutomaton, LockDisciplineAutomaton};
use super::model::SpecificationAutomaton;
use super::parser::{AutomatonParseError, AutomatonParser};
use crate::config::AutomatonConfig;
use crate::features::domains::ports::{AbstractDomain, TargetReason, Transfer};
use crate::features::precision::Precision;
use crate::shared::models::{Cfa, CfaEdge, EdgeKind, Expr};

/// Lock key used when a lock call has no argument
const ANONYMOUS_LOCK: &str = "<lock>";

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AutomatonState {
    /// Current state index of each monitor, in domain order
    pub monitors: Vec<usize>,
    /// Locks held, keyed by the text of the lock argument
    pub held_locks: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct AutomatonDomain {
    automata: Vec<SpecificationAutomaton>,
    lock_functions: BTreeSet<String>,
    unlock_functions: BTreeSet<String>,
}

impl AutomatonDomain {
    pub fn new(config: &AutomatonConfig) -> Result<Self, AutomatonParseError> {
        let mut automata = Vec::new();
        for builtin in &config.builtin {
            let automaton = match builtin {
                BuiltinAutomaton::LockDiscipline => LockDisciplineAutomaton::with_functions(
                    config.init_functions.as_slice(),
                    config.lock_functions.as_slice(),
                    config.unlock_functions.as_slice(),
                )?,
                other => other.define()?,
            };
            automata.push(automaton);
        }
        for description in &config.specifications {
            automata.push(AutomatonParser::from_description(description.clone())?);
        }
        Ok(Self::with_automata(automata, config))
    }

    pub fn with_automata(automata: Vec<SpecificationAutomaton>, config: &AutomatonConfig) -> Self {
        Self {
            automata,
            lock_functions: config.lock_functions.iter().cloned().collect(),
            unlock_functions: config.unlock_functions.iter().cloned().collect(),
        }
    }

    pub fn automata(&self) -> &[SpecificationAutomaton] {
        &self.automata
    }

    fn lock_key(args: Option<&Expr>) -> String {
        args.map_or_else(|| ANONYMOUS_LOCK.to_string(), |e| e.to_string())
    }

    fn update_locks(&self, locks: &mut BTreeSet<String>, edge: &CfaEdge) {
        let (function, first) = match &edge.kind {
            EdgeKind::Call { function, args, .. } => (function, args.first()),
            EdgeKind::FunctionCall {
                function, bindings, ..
            } => (function, bindings.first().map(|(_, v)| v)),
            _ => return,
        };
        if self.lock_functions.contains(function) {
            locks.insert(Self::lock_key(first));
        } else if self.unlock_functions.contains(function) {
            locks.remove(&Self::lock_key(first));
        }
    }
}

impl AbstractDomain for AutomatonDomain {
    type State = AutomatonState;

    fn name(&self) -> &'static str {
        "automaton"
    }

    fn initial_state(&self, _cfa: &Cfa, _precision: &Precision) -> AutomatonState {
        AutomatonState {
            monitors: self.automata.iter().map(|a| a.initial).collect(),
            held_locks: BTreeSet::new(),
        }
    }

    fn transfer(
        &self,
        state: &AutomatonState,
        edge: &CfaEdge,
        _precision: &Precision,
    ) -> Transfer<AutomatonState> {
        let mut monitors = Vec::with_capacity(self.automata.len());
        for (automaton, current) in self.automata.iter().zip(&state.monitors) {
            let next = if automaton.is_error(*current) {
                *current
            } else {
                automaton.step(*current, edge)
            };
            if automaton.is_sink(next) {
                tracing::debug!(
                    "Automaton '{}' entered sink state '{}' on '{}'",
                    automaton.name,
                    automaton.state_name(next),
                    edge
                );
                return Transfer::Bottom;
            }
            monitors.push(next);
        }
        let mut held_locks = state.held_locks.clone();
        self.update_locks(&mut held_locks, edge);
        Transfer::Next(AutomatonState {
            monitors,
            held_locks,
        })
    }

    fn is_less_or_equal(&self, lhs: &AutomatonState, rhs: &AutomatonState) -> bool {
        lhs == rhs
    }

    fn target_reason(&self, state: &AutomatonState) -> Option<TargetReason> {
        self.automata
            .iter()
            .zip(&state.monitors)
            .find(|(a, s)| a.is_error(**s))
            .map(|(a, s)| TargetReason::AutomatonError {
                automaton: a.name.clone(),
                state: a.state_name(*s).to_string(),
            })
    }

    fn valuation(&self, state: &AutomatonState) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = self
            .automata
            .iter()
            .zip(&state.monitors)
            .map(|(a, s)| (a.name.clone(), a.state_name(*s).to_string()))
            .collect();
        if !state.held_locks.is_empty() {
            let locks: Vec<&str> = state.held_locks.iter().map(|l| l.as_str()).collect();
            out.insert("held_locks".to_string(), format!("{{{}}}", locks.join(", ")));
        }
        out
    }
}
