/*
 * Automaton Definition Parser
 *
 * Parse specification automata from YAML/JSON.
 *
 * # Schema
 * ```yaml
 * automaton: LockDiscipline
 * states: [Unlocked, Locked, Error]
 * initial_state: Unlocked
 * error_states: [Error]
 * sink_states: []
 * transitions:
 *   - from: Unlocked
 *     trigger: { kind: call, function: lock }
 *     to: Locked
 *   - from: Locked
 *     trigger: { kind: call, function: unlock }
 *     to: Unlocked
 * ```
 *
 * # Validation
 * - Name and state list must be non-empty, without duplicates
 * - Initial, error and sink states must be declared
 * - All states in transitions must be declared
 * - A state cannot be both an error state and a sink state
 * - Every error state must be reachable from the initial state
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use super::model::{SpecificationAutomaton, Transition, Trigger};

/// Automaton description (YAML/JSON schema)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomatonDescription {
    /// Automaton name
    pub automaton: String,

    /// Declared states; states used by transitions are added implicitly
    #[serde(default)]
    pub states: Vec<String>,

    pub initial_state: String,

    #[serde(default)]
    pub error_states: Vec<String>,

    #[serde(default)]
    pub sink_states: Vec<String>,

    pub transitions: Vec<TransitionDescription>,
}

/// Transition description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionDescription {
    pub from: String,
    pub trigger: Trigger,
    pub to: String,
}

/// Parse error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AutomatonParseError {
    /// YAML/JSON syntax error
    #[error("Syntax error: {0}")]
    Syntax(String),

    /// Schema validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Semantic error (unreachable error states, etc.)
    #[error("Semantic error: {0}")]
    Semantic(String),
}

/// Automaton parser
pub struct AutomatonParser;

impl AutomatonParser {
    /// Parse an automaton from YAML
    ///
    /// # Example
    /// ```
    /// use cpa_engine::features::domains::automaton::AutomatonParser;
    ///
    /// let yaml = r#"
    /// automaton: File
    /// initial_state: Closed
    /// error_states: [Error]
    /// transitions:
    ///   - from: Closed
    ///     trigger: { kind: call, function: open }
    ///     to: Open
    ///   - from: Open
    ///     trigger: { kind: call, function: open }
    ///     to: Error
    /// "#;
    /// let automaton = AutomatonParser::from_yaml(yaml).unwrap();
    /// assert_eq!(automaton.name, "File");
    /// ```
    pub fn from_yaml(yaml: &str) -> Result<SpecificationAutomaton, AutomatonParseError> {
        let description: AutomatonDescription = serde_yaml::from_str(yaml)
            .map_err(|e| AutomatonParseError::Syntax(format!("YAML parse error: {}", e)))?;
        Self::from_description(description)
    }

    /// Parse an automaton from JSON
    pub fn from_json(json: &str) -> Result<SpecificationAutomaton, AutomatonParseError> {
        let description: AutomatonDescription = serde_json::from_str(json)
            .map_err(|e| AutomatonParseError::Syntax(format!("JSON parse error: {}", e)))?;
        Self::from_description(description)
    }

    /// Validate a description and resolve state names to indices
    pub fn from_description(
        description: AutomatonDescription,
    ) -> Result<SpecificationAutomaton, AutomatonParseError> {
        if description.automaton.trim().is_empty() {
            return Err(AutomatonParseError::Validation(
                "automaton name must not be empty".to_string(),
            ));
        }

        let mut states: Vec<String> = Vec::new();
        let mut seen = BTreeSet::new();
        for s in &description.states {
            if !seen.insert(s.clone()) {
                return Err(AutomatonParseError::Validation(format!(
                    "State '{}' declared twice",
                    s
                )));
            }
            states.push(s.clone());
        }
        for t in &description.transitions {
            for s in [&t.from, &t.to] {
                if seen.insert(s.clone()) {
                    states.push(s.clone());
                }
            }
        }
        if states.is_empty() {
            return Err(AutomatonParseError::Validation(format!(
                "Automaton '{}' has no states",
                description.automaton
            )));
        }

        let index = |name: &str, role: &str| {
            states.iter().position(|s| s == name).ok_or_else(|| {
                AutomatonParseError::Validation(format!(
                    "{} '{}' is not a declared state",
                    role, name
                ))
            })
        };

        let initial = index(&description.initial_state, "Initial state")?;
        let error_states = description
            .error_states
            .iter()
            .map(|s| index(s, "Error state"))
            .collect::<Result<Vec<_>, _>>()?;
        let sink_states = description
            .sink_states
            .iter()
            .map(|s| index(s, "Sink state"))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(both) = error_states.iter().find(|s| sink_states.contains(s)) {
            return Err(AutomatonParseError::Validation(format!(
                "State '{}' is both an error state and a sink state",
                states[*both]
            )));
        }
        let transitions = description
            .transitions
            .iter()
            .map(|t| {
                Ok(Transition {
                    from: index(&t.from, "Transition source")?,
                    to: index(&t.to, "Transition target")?,
                    trigger: t.trigger.clone(),
                })
            })
            .collect::<Result<Vec<_>, AutomatonParseError>>()?;

        let automaton = SpecificationAutomaton {
            name: description.automaton,
            states,
            initial,
            error_states,
            sink_states,
            transitions,
        };
        Self::validate_semantics(&automaton)?;
        Ok(automaton)
    }

    fn validate_semantics(automaton: &SpecificationAutomaton) -> Result<(), AutomatonParseError> {
        let reachable = automaton.reachable_states();
        for e in &automaton.error_states {
            if !reachable[*e] {
                return Err(AutomatonParseError::Semantic(format!(
                    "Error state '{}' is unreachable from initial state '{}'",
                    automaton.state_name(*e),
                    automaton.state_name(automaton.initial)
                )));
            }
        }
        Ok(())
    }
}
