//! Public entry points
//!
//! `verify` for one-shot runs, `Verifier` when a custom oracle, label
//! targets or the run statistics are needed.

pub mod verifier;

pub use verifier::{verify, AnalysisReport, Verifier};
