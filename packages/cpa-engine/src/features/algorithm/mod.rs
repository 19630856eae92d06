//! Exploration: analysis context, CPA algorithm, statistics

pub mod context;
pub mod cpa;
pub mod stats;

pub use context::AnalysisContext;
pub use cpa::{CpaAlgorithm, ExploreOutcome};
pub use stats::AnalysisStats;
