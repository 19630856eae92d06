/*
 * Abstract Domain Port
 *
 * Capability interface every analysis domain implements:
 * - initial_state / transfer: successor computation along one CFA edge
 * - merge / is_less_or_equal / stop: lattice operations for exploration
 * - adjust_precision: re-abstraction after refinement
 * - target_reason: property violation detected by the domain itself
 *
 * Domains are pure: they never touch the reached set, waitlist or ARG.
 */

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use super::shape::MemoryProperty;
use crate::features::precision::Precision;
use crate::shared::models::{Cfa, CfaEdge, CfaNode, CfaNodeId};

/// Result of a transfer along one edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transfer<S> {
    /// Successor state
    Next(S),
    /// No concrete execution can take the edge (path pruned)
    Bottom,
    /// A resource bound cut the path; the run can no longer prove safety
    Truncated(String),
}

impl<S> Transfer<S> {
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Transfer<T> {
        match self {
            Transfer::Next(s) => Transfer::Next(f(s)),
            Transfer::Bottom => Transfer::Bottom,
            Transfer::Truncated(reason) => Transfer::Truncated(reason),
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Transfer::Bottom)
    }
}

/// Why a state is a target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetReason {
    /// Declared target location reached
    Location {
        node: CfaNodeId,
        label: Option<String>,
    },
    /// Specification automaton entered an error state
    AutomatonError { automaton: String, state: String },
    /// Memory-safety property violated
    MemorySafety {
        property: MemoryProperty,
        detail: String,
    },
    /// Secret data reached a public sink
    TaintLeak { sink: String, detail: String },
}

impl fmt::Display for TargetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetReason::Location { node, label } => match label {
                Some(l) => write!(f, "target location {} ({})", node, l),
                None => write!(f, "target location {}", node),
            },
            TargetReason::AutomatonError { automaton, state } => {
                write!(f, "automaton '{}' entered error state '{}'", automaton, state)
            }
            TargetReason::MemorySafety { property, detail } => {
                write!(f, "{}: {}", property, detail)
            }
            TargetReason::TaintLeak { sink, detail } => {
                write!(f, "secret data reaches '{}': {}", sink, detail)
            }
        }
    }
}

/// Abstract domain capability interface
pub trait AbstractDomain: Send + Sync {
    type State: Clone + fmt::Debug + PartialEq + Eq + Hash + Send + Sync;

    /// Domain name (used in logs and counterexample valuations)
    fn name(&self) -> &'static str;

    /// State at the program entry
    fn initial_state(&self, cfa: &Cfa, precision: &Precision) -> Self::State;

    /// Successor along `edge`
    fn transfer(
        &self,
        state: &Self::State,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Transfer<Self::State>;

    /// Combine `new` with `existing` at `location`.
    /// `None` keeps both states apart.
    fn merge(
        &self,
        new: &Self::State,
        existing: &Self::State,
        _location: &CfaNode,
    ) -> Option<Self::State> {
        if self.is_less_or_equal(new, existing) {
            Some(existing.clone())
        } else if self.is_less_or_equal(existing, new) {
            Some(new.clone())
        } else {
            None
        }
    }

    /// `lhs ⊑ rhs`: every concrete state of `lhs` is one of `rhs`
    fn is_less_or_equal(&self, lhs: &Self::State, rhs: &Self::State) -> bool;

    /// Is `state` covered by one of the reached states at its location?
    fn stop(&self, state: &Self::State, reached: &[&Self::State]) -> bool {
        reached.iter().any(|r| self.is_less_or_equal(state, r))
    }

    /// Re-abstract `state` under `precision`
    fn adjust_precision(&self, state: &Self::State, _precision: &Precision) -> Self::State {
        state.clone()
    }

    /// Property violation carried by `state`
    fn target_reason(&self, _state: &Self::State) -> Option<TargetReason> {
        None
    }

    /// Human-readable valuation for counterexamples
    fn valuation(&self, state: &Self::State) -> BTreeMap<String, String>;
}
