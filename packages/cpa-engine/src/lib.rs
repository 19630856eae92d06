/*
 * CPA Engine - Configurable Reachability Analysis
 *
 * Feature-First Architecture:
 * - shared/      : Program model (CFA, expressions, builder)
 * - features/    : Vertical slices (domains → composite → reached/ARG → algorithm → oracle → refinement)
 * - config/      : AnalysisConfig, presets, YAML I/O
 * - api/         : verify / Verifier entry points
 *
 * Analysis:
 * - CPA exploration over a product of abstract domains
 *   (value, shape, specification automata, taint, call stack)
 * - CEGAR with a pluggable feasibility oracle and interpolation-driven refinement
 * - Optional rayon-parallel per-domain transfer (feature `parallel`)
 */

#![allow(clippy::too_many_arguments)] // Context plumbing in the exploration loop
#![allow(clippy::module_inception)] // Module naming intentional
#![allow(clippy::new_without_default)] // Default impl not always needed

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared program model
pub mod shared;

/// Feature modules (domains, exploration, refinement)
pub mod features;

/// Configuration system
pub mod config;

/// Verification entry points
pub mod api;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use api::{verify, AnalysisReport, Verifier};
pub use config::{AnalysisConfig, Preset};
pub use errors::{CpaError, Result};
pub use features::algorithm::AnalysisStats;
pub use features::composite::DomainKind;
pub use features::domains::TargetReason;
pub use features::oracle::{FeasibilityOracle, LinearArithmeticOracle, OracleVerdict, PathFormula};
pub use features::refinement::{Counterexample, CounterexampleStep, UnknownReason, Verdict};
pub use shared::models::{Cfa, CfaBuilder, CfaDescription, CfaNodeId};
