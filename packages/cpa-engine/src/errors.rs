//! Error types for cpa-engine
//!
//! Only boundary failures are errors. Everything that happens during a run
//! (bottom successors, infeasible paths, oracle timeouts, divergence) is
//! recovered internally and folded into the final `Verdict`.

use thiserror::Error;

use crate::config::ConfigError;
use crate::features::domains::automaton::AutomatonParseError;
use crate::shared::models::ExprParseError;

/// Main error type for cpa-engine operations
#[derive(Debug, Error)]
pub enum CpaError {
    /// Malformed CFA, target list or domain assembly (rejected before analysis starts)
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Invalid analysis configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid specification automaton
    #[error("Automaton error: {0}")]
    Automaton(#[from] AutomatonParseError),

    /// Expression text that does not parse
    #[error("Expression error: {0}")]
    Expression(#[from] ExprParseError),

    /// Feasibility oracle exceeded its deadline
    #[error("Feasibility oracle timed out after {0} ms")]
    OracleTimeout(u64),

    /// Refinement did not make progress or exceeded its iteration bound
    #[error("Precision divergence: {0}")]
    PrecisionDivergence(String),

    /// Serialization error while loading external descriptions
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CpaError {
    /// Create a malformed-input error
    pub fn malformed(msg: impl Into<String>) -> Self {
        CpaError::MalformedInput(msg.into())
    }

    /// Create a divergence error
    pub fn divergence(msg: impl Into<String>) -> Self {
        CpaError::PrecisionDivergence(msg.into())
    }
}

impl From<serde_json::Error> for CpaError {
    fn from(err: serde_json::Error) -> Self {
        CpaError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for CpaError {
    fn from(err: serde_yaml::Error) -> Self {
        CpaError::Serialization(err.to_string())
    }
}

/// Result type alias for cpa-engine operations
pub type Result<T> = std::result::Result<T, CpaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CpaError::malformed("edge references unknown node 7");
        assert!(err.to_string().contains("unknown node 7"));

        let err = CpaError::OracleTimeout(250);
        assert!(err.to_string().contains("250 ms"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: CpaError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, CpaError::Serialization(_)));
    }
}
