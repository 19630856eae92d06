//! Composite states: closed sum of domain states, tupled per location

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::{ConfigError, ConfigResult};
use crate::features::domains::{AutomatonState, CallStackState, ShapeState, TaintState, ValueState};
use crate::shared::models::CfaNodeId;

/// Configurable domain kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    Value,
    Shape,
    Automaton,
    Taint,
    CallStack,
}

impl DomainKind {
    pub const ALL: [DomainKind; 5] = [
        DomainKind::Value,
        DomainKind::Shape,
        DomainKind::Automaton,
        DomainKind::Taint,
        DomainKind::CallStack,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainKind::Value => "value",
            DomainKind::Shape => "shape",
            DomainKind::Automaton => "automaton",
            DomainKind::Taint => "taint",
            DomainKind::CallStack => "callstack",
        }
    }

    /// Parse a domain name, suggesting the closest valid one on failure
    pub fn parse(name: &str) -> ConfigResult<Self> {
        let lower = name.trim().to_lowercase();
        Self::ALL
            .iter()
            .find(|k| k.as_str() == lower)
            .copied()
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|k| k.as_str()).collect();
                ConfigError::unknown_domain_with_suggestion(name, &valid)
            })
    }
}

impl fmt::Display for DomainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component of a composite state
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DomainState {
    Value(ValueState),
    Shape(ShapeState),
    Automaton(AutomatonState),
    Taint(TaintState),
    CallStack(CallStackState),
}

impl DomainState {
    pub fn kind(&self) -> DomainKind {
        match self {
            DomainState::Value(_) => DomainKind::Value,
            DomainState::Shape(_) => DomainKind::Shape,
            DomainState::Automaton(_) => DomainKind::Automaton,
            DomainState::Taint(_) => DomainKind::Taint,
            DomainState::CallStack(_) => DomainKind::CallStack,
        }
    }
}

/// CFA location plus one state per configured domain (in builder order)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeState {
    pub location: CfaNodeId,
    pub components: Vec<DomainState>,
}

impl CompositeState {
    pub fn new(location: CfaNodeId, components: Vec<DomainState>) -> Self {
        Self {
            location,
            components,
        }
    }

    pub fn component(&self, kind: DomainKind) -> Option<&DomainState> {
        self.components.iter().find(|c| c.kind() == kind)
    }

    pub fn value(&self) -> Option<&ValueState> {
        match self.component(DomainKind::Value) {
            Some(DomainState::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn shape(&self) -> Option<&ShapeState> {
        match self.component(DomainKind::Shape) {
            Some(DomainState::Shape(s)) => Some(s),
            _ => None,
        }
    }

    pub fn call_stack(&self) -> Option<&CallStackState> {
        match self.component(DomainKind::CallStack) {
            Some(DomainState::CallStack(s)) => Some(s),
            _ => None,
        }
    }
}
