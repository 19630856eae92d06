//! Verifier - entry point of a verification run
//!
//! Validates the inputs (configuration, targets, automata), assembles the
//! composite domain and the initial precision, and drives the CEGAR loop to a
//! verdict. Malformed input is the only error; everything that goes wrong
//! during the run ends up in the verdict.
//!
//! ```ignore
//! let report = Verifier::new(&cfa)
//!     .config(AnalysisConfig::preset(Preset::Thorough))
//!     .target_label("ERROR")
//!     .run()?;
//! println!("{}", report.verdict);
//! ```

use serde::Serialize;
use std::sync::Arc;

use crate::config::AnalysisConfig;
use crate::errors::{CpaError, Result};
use crate::features::algorithm::{AnalysisContext, AnalysisStats};
use crate::features::composite::CompositeDomain;
use crate::features::oracle::{FeasibilityOracle, LinearArithmeticOracle};
use crate::features::precision::Precision;
use crate::features::refinement::{CegarLoop, Verdict};
use crate::shared::models::{Cfa, CfaNodeId};

// ═══════════════════════════════════════════════════════════════════════════
// Report
// ═══════════════════════════════════════════════════════════════════════════

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub verdict: Verdict,
    pub stats: AnalysisStats,
    /// Precision reached by the last refinement
    pub precision: Precision,
}

// ═══════════════════════════════════════════════════════════════════════════
// Verifier
// ═══════════════════════════════════════════════════════════════════════════

pub struct Verifier<'a> {
    cfa: &'a Cfa,
    config: AnalysisConfig,
    targets: Vec<CfaNodeId>,
    labels: Vec<String>,
    oracle: Arc<dyn FeasibilityOracle>,
}

impl<'a> Verifier<'a> {
    pub fn new(cfa: &'a Cfa) -> Self {
        Self {
            cfa,
            config: AnalysisConfig::default(),
            targets: Vec::new(),
            labels: Vec::new(),
            oracle: Arc::new(LinearArithmeticOracle::new()),
        }
    }

    /// Builder: Set the analysis configuration
    pub fn config(mut self, config: AnalysisConfig) -> Self {
        self.config = config;
        self
    }

    /// Builder: Add a target location
    pub fn target(mut self, node: CfaNodeId) -> Self {
        self.targets.push(node);
        self
    }

    /// Builder: Add several target locations
    pub fn targets(mut self, nodes: &[CfaNodeId]) -> Self {
        self.targets.extend_from_slice(nodes);
        self
    }

    /// Builder: Add the location carrying `label` as a target
    pub fn target_label(mut self, label: &str) -> Self {
        self.labels.push(label.to_string());
        self
    }

    /// Builder: Replace the built-in linear-arithmetic oracle
    pub fn oracle(mut self, oracle: Arc<dyn FeasibilityOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    fn resolve_targets(&self) -> Result<Vec<CfaNodeId>> {
        let mut targets = Vec::with_capacity(self.targets.len() + self.labels.len());
        for node in &self.targets {
            if !self.cfa.contains(*node) {
                return Err(CpaError::malformed(format!("target {} is not a CFA node", node)));
            }
            targets.push(*node);
        }
        for label in &self.labels {
            let node = self
                .cfa
                .labeled(label)
                .ok_or_else(|| CpaError::malformed(format!("no CFA node labeled '{}'", label)))?;
            targets.push(node);
        }
        targets.sort();
        targets.dedup();
        Ok(targets)
    }

    /// Run the analysis to a verdict
    pub fn run(self) -> Result<AnalysisReport> {
        self.config.validate()?;
        let targets = self.resolve_targets()?;
        let domain = CompositeDomain::from_config(&self.config, self.cfa)?;
        let precision = Precision::seeded(&self.config.value)?;

        tracing::info!(
            "Verifying {} targets over {} CFA nodes with [{}] (oracle '{}')",
            targets.len(),
            self.cfa.node_count(),
            domain
                .kinds()
                .iter()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            self.oracle.name()
        );

        let mut ctx = AnalysisContext::new(
            self.cfa,
            domain,
            &targets,
            precision,
            self.config.exploration.order,
        );
        let verdict = CegarLoop::new(&self.config, self.oracle.as_ref()).run(&mut ctx);

        Ok(AnalysisReport {
            verdict,
            stats: ctx.stats().clone(),
            precision: ctx.precision().as_ref().clone(),
        })
    }
}

/// Decide whether any of `targets` is reachable in `cfa`
pub fn verify(cfa: &Cfa, targets: &[CfaNodeId], config: &AnalysisConfig) -> Result<Verdict> {
    Verifier::new(cfa)
        .config(config.clone())
        .targets(targets)
        .run()
        .map(|report| report.verdict)
}
