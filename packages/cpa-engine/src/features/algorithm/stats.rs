//! Run statistics

use serde::Serialize;

/// Counters collected over one verification run (all refinement rounds)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisStats {
    /// Waitlist pops
    pub steps: u64,
    /// ARG nodes created
    pub states: u64,
    pub covered: u64,
    /// Successors discarded as Bottom
    pub pruned: u64,
    pub merged: u64,
    /// Successors cut by a resource bound
    pub truncated: u64,
    pub targets_found: u64,
    pub refinements: u64,
    pub oracle_calls: u64,
    pub max_waitlist: usize,
    pub elapsed_ms: u64,
}

impl AnalysisStats {
    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "{} steps, {} states ({} covered, {} merged, {} pruned), {} refinements, {} oracle calls, {} ms",
            self.steps,
            self.states,
            self.covered,
            self.merged,
            self.pruned,
            self.refinements,
            self.oracle_calls,
            self.elapsed_ms
        )
    }
}
