//! Verification verdicts and counterexamples

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::features::domains::TargetReason;
use crate::features::oracle::Model;
use crate::shared::models::CfaNodeId;

/// Why a run ended without a definite answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnknownReason {
    StepLimit { steps: u64 },
    TimeLimit { elapsed_ms: u64 },
    OracleTimeout { timeout_ms: u64 },
    OracleUnknown { detail: String },
    /// Refinement made no progress or hit its bound
    PrecisionDivergence { detail: String },
    /// Parts of the state space were skipped (truncation, dropped targets)
    Incomplete { reasons: Vec<String> },
}

impl fmt::Display for UnknownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownReason::StepLimit { steps } => write!(f, "step limit reached after {} steps", steps),
            UnknownReason::TimeLimit { elapsed_ms } => {
                write!(f, "time limit reached after {} ms", elapsed_ms)
            }
            UnknownReason::OracleTimeout { timeout_ms } => {
                write!(f, "feasibility oracle timed out ({} ms)", timeout_ms)
            }
            UnknownReason::OracleUnknown { detail } => {
                write!(f, "feasibility oracle undecided: {}", detail)
            }
            UnknownReason::PrecisionDivergence { detail } => {
                write!(f, "precision divergence: {}", detail)
            }
            UnknownReason::Incomplete { reasons } => {
                write!(f, "incomplete exploration: {}", reasons.join("; "))
            }
        }
    }
}

/// One location on a counterexample path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterexampleStep {
    pub node: CfaNodeId,
    pub function: String,
    pub label: Option<String>,
    /// Edge executed to reach this location (`None` at the entry)
    pub edge: Option<String>,
    /// Abstract valuation per domain
    pub valuation: BTreeMap<String, BTreeMap<String, String>>,
    /// Concrete variable values from the oracle model, when available
    pub concrete: BTreeMap<String, i64>,
}

/// Root-to-target path witnessing a violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    pub steps: Vec<CounterexampleStep>,
    pub target: CfaNodeId,
    pub reasons: Vec<TargetReason>,
    /// SSA model of the path (`None` when counterexample checking is off)
    pub model: Option<Model>,
}

impl Counterexample {
    /// Text of the executed edges, in order
    pub fn edge_descriptions(&self) -> Vec<String> {
        self.steps.iter().filter_map(|s| s.edge.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_confirmed(&self) -> bool {
        self.model.is_some()
    }
}

impl fmt::Display for Counterexample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Counterexample to {}:", self.target)?;
        for step in &self.steps {
            match &step.edge {
                Some(edge) => writeln!(f, "  {:<24} -> {}", edge, step.node)?,
                None => writeln!(f, "  {:<24} -> {}", "<entry>", step.node)?,
            }
        }
        for reason in &self.reasons {
            writeln!(f, "  violated: {}", reason)?;
        }
        Ok(())
    }
}

/// Final answer of a verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum Verdict {
    Safe,
    Unsafe(Box<Counterexample>),
    Unknown(UnknownReason),
}

impl Verdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, Verdict::Safe)
    }

    pub fn is_unsafe(&self) -> bool {
        matches!(self, Verdict::Unsafe(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Verdict::Unknown(_))
    }

    pub fn counterexample(&self) -> Option<&Counterexample> {
        match self {
            Verdict::Unsafe(cex) => Some(cex),
            _ => None,
        }
    }

    pub fn unknown_reason(&self) -> Option<&UnknownReason> {
        match self {
            Verdict::Unknown(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Safe => write!(f, "SAFE"),
            Verdict::Unsafe(cex) => write!(f, "UNSAFE ({} steps)", cex.len()),
            Verdict::Unknown(reason) => write!(f, "UNKNOWN ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(node: u32, edge: Option<&str>) -> CounterexampleStep {
        CounterexampleStep {
            node: CfaNodeId(node),
            function: "main".to_string(),
            label: None,
            edge: edge.map(|e| e.to_string()),
            valuation: BTreeMap::new(),
            concrete: BTreeMap::new(),
        }
    }

    #[test]
    fn test_counterexample_edges() {
        let cex = Counterexample {
            steps: vec![step(0, None), step(1, Some("init()")), step(2, Some("unlock()"))],
            target: CfaNodeId(2),
            reasons: vec![],
            model: None,
        };
        assert_eq!(cex.edge_descriptions(), vec!["init()", "unlock()"]);
        assert_eq!(cex.len(), 2);
        assert!(!cex.is_confirmed());
        assert!(cex.to_string().contains("unlock()"));
    }

    #[test]
    fn test_verdict_serialization() {
        let json = serde_json::to_string(&Verdict::Safe).unwrap();
        assert_eq!(json, r#"{"verdict":"safe"}"#);

        let unknown = Verdict::Unknown(UnknownReason::StepLimit { steps: 9 });
        let json = serde_json::to_value(&unknown).unwrap();
        assert_eq!(json["verdict"], "unknown");
        assert_eq!(json["detail"]["kind"], "step_limit");
        assert_eq!(json["detail"]["steps"], 9);
        assert!(unknown.to_string().contains("9 steps"));
    }
}
