//! Per-concern configuration types
//!
//! Each domain and each phase of the algorithm has its own configuration
//! struct with validation and builder methods.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::validation::{check_range, Validatable};
use crate::features::domains::automaton::{AutomatonDescription, AutomatonParser, BuiltinAutomaton};
use crate::features::domains::shape::MemoryProperty;
use crate::features::oracle::domain::Formula;
use crate::shared::models::Expr;

fn default_true() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn overlap<'a>(a: &'a [String], b: &'a [String]) -> Option<&'a String> {
    let b: BTreeSet<&String> = b.iter().collect();
    a.iter().find(|x| b.contains(x))
}

// ============================================================================
// Value Domain Configuration
// ============================================================================

/// Value domain (intervals + predicates)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueConfig {
    /// Variables tracked with explicit intervals from the start
    pub tracked_variables: Vec<String>,

    /// Initial predicates, as condition text (`"i < n"`)
    pub predicates: Vec<String>,

    /// Widen intervals at loop heads when states are joined
    #[serde(default = "default_true")]
    pub widening: bool,

    /// Solver DNF expansion bound (1..=100000)
    pub solver_max_disjuncts: usize,

    /// Solver `!=` case splits per cube (1..=100000)
    pub solver_max_branches: usize,

    /// Solver constraint bound during elimination (1..=1000000)
    pub solver_max_constraints: usize,
}

impl Default for ValueConfig {
    fn default() -> Self {
        Self {
            tracked_variables: Vec::new(),
            predicates: Vec::new(),
            widening: true,
            solver_max_disjuncts: 256,
            solver_max_branches: 256,
            solver_max_constraints: 2000,
        }
    }
}

impl ValueConfig {
    /// Builder: add a tracked variable
    pub fn track(mut self, var: impl Into<String>) -> Self {
        self.tracked_variables.push(var.into());
        self
    }

    /// Builder: add an initial predicate
    pub fn predicate(mut self, text: impl Into<String>) -> Self {
        self.predicates.push(text.into());
        self
    }

    /// Builder: Set widening
    pub fn widening(mut self, v: bool) -> Self {
        self.widening = v;
        self
    }

    /// Builder: Set solver_max_disjuncts
    pub fn solver_max_disjuncts(mut self, v: usize) -> Self {
        self.solver_max_disjuncts = v;
        self
    }

    /// Builder: Set solver_max_branches
    pub fn solver_max_branches(mut self, v: usize) -> Self {
        self.solver_max_branches = v;
        self
    }

    /// Builder: Set solver_max_constraints
    pub fn solver_max_constraints(mut self, v: usize) -> Self {
        self.solver_max_constraints = v;
        self
    }
}

impl Validatable for ValueConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "solver_max_disjuncts",
            self.solver_max_disjuncts,
            1,
            100_000,
            "The solver needs at least one case",
        )?;
        check_range(
            "solver_max_branches",
            self.solver_max_branches,
            1,
            100_000,
            "A disequality needs at least one case split",
        )?;
        check_range(
            "solver_max_constraints",
            self.solver_max_constraints,
            1,
            1_000_000,
            "Elimination must be allowed to keep some constraints",
        )?;
        for text in &self.predicates {
            let expr = Expr::parse(text).map_err(|e| {
                ConfigError::Validation(format!("predicate '{}' does not parse: {}", text, e))
            })?;
            if Formula::from_condition(&expr, true).is_none() {
                return Err(ConfigError::Validation(format!(
                    "predicate '{}' is not linear",
                    text
                )));
            }
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "value"
    }
}

// ============================================================================
// Shape Domain Configuration
// ============================================================================

/// Shape / memory-safety domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    /// Properties reported as targets. Unchecked undefined behavior prunes
    /// the path; unchecked leaks are ignored.
    pub properties: Vec<MemoryProperty>,

    /// Functions returning a fresh heap region
    pub allocators: Vec<String>,

    /// Functions releasing the region passed as first argument
    pub deallocators: Vec<String>,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            properties: vec![
                MemoryProperty::DoubleFree,
                MemoryProperty::InvalidFree,
                MemoryProperty::InvalidDeref,
            ],
            allocators: strings(&["malloc", "calloc", "alloca", "valloc"]),
            deallocators: strings(&["free"]),
        }
    }
}

impl ShapeConfig {
    /// Builder: Set checked properties
    pub fn properties(mut self, v: Vec<MemoryProperty>) -> Self {
        self.properties = v;
        self
    }

    /// Builder: Check every property, leaks included
    pub fn check_all(mut self) -> Self {
        self.properties = MemoryProperty::all();
        self
    }
}

impl Validatable for ShapeConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(f) = overlap(&self.allocators, &self.deallocators) {
            return Err(ConfigError::Validation(format!(
                "'{}' cannot be both an allocator and a deallocator",
                f
            )));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "shape"
    }
}

// ============================================================================
// Taint Domain Configuration
// ============================================================================

/// Taint policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaintConfig {
    /// Variables that always hold secret data
    pub secret_variables: Vec<String>,

    /// Functions returning secret data
    pub secret_sources: Vec<String>,

    /// Functions whose result is public regardless of arguments
    pub sanitizers: Vec<String>,

    /// Variables that must never receive secret data
    pub public_sinks: Vec<String>,

    /// Functions that must never receive secret arguments
    pub sink_functions: Vec<String>,
}

impl TaintConfig {
    /// Builder: add a secret variable
    pub fn secret(mut self, var: impl Into<String>) -> Self {
        self.secret_variables.push(var.into());
        self
    }

    /// Builder: add a public sink variable
    pub fn public_sink(mut self, var: impl Into<String>) -> Self {
        self.public_sinks.push(var.into());
        self
    }

    /// Builder: add a sink function
    pub fn sink_function(mut self, function: impl Into<String>) -> Self {
        self.sink_functions.push(function.into());
        self
    }

    /// Builder: add a secret source
    pub fn source(mut self, function: impl Into<String>) -> Self {
        self.secret_sources.push(function.into());
        self
    }

    /// Builder: add a sanitizer
    pub fn sanitizer(mut self, function: impl Into<String>) -> Self {
        self.sanitizers.push(function.into());
        self
    }
}

impl Validatable for TaintConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(v) = overlap(&self.secret_variables, &self.public_sinks) {
            return Err(ConfigError::Validation(format!(
                "'{}' cannot be both a secret variable and a public sink",
                v
            )));
        }
        if let Some(f) = overlap(&self.secret_sources, &self.sanitizers) {
            return Err(ConfigError::Validation(format!(
                "'{}' cannot be both a secret source and a sanitizer",
                f
            )));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "taint"
    }
}

// ============================================================================
// Automaton Domain Configuration
// ============================================================================

/// Specification automata and lock functions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutomatonConfig {
    /// Built-in monitors
    pub builtin: Vec<BuiltinAutomaton>,

    /// Inline automaton definitions
    pub specifications: Vec<AutomatonDescription>,

    /// Lock initialization functions (lock discipline)
    pub init_functions: Vec<String>,

    /// Lock acquisition functions
    pub lock_functions: Vec<String>,

    /// Lock release functions
    pub unlock_functions: Vec<String>,
}

impl Default for AutomatonConfig {
    fn default() -> Self {
        Self {
            builtin: Vec::new(),
            specifications: Vec::new(),
            init_functions: strings(&["init", "pthread_mutex_init"]),
            lock_functions: strings(&["lock", "pthread_mutex_lock"]),
            unlock_functions: strings(&["unlock", "pthread_mutex_unlock"]),
        }
    }
}

impl AutomatonConfig {
    /// Builder: enable a built-in automaton
    pub fn builtin(mut self, automaton: BuiltinAutomaton) -> Self {
        if !self.builtin.contains(&automaton) {
            self.builtin.push(automaton);
        }
        self
    }

    /// Builder: add an inline automaton definition
    pub fn specification(mut self, description: AutomatonDescription) -> Self {
        self.specifications.push(description);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.builtin.is_empty() && self.specifications.is_empty()
    }
}

impl Validatable for AutomatonConfig {
    fn validate(&self) -> ConfigResult<()> {
        if let Some(f) = overlap(&self.lock_functions, &self.unlock_functions) {
            return Err(ConfigError::Validation(format!(
                "'{}' cannot both lock and unlock",
                f
            )));
        }
        for description in &self.specifications {
            AutomatonParser::from_description(description.clone()).map_err(|e| {
                ConfigError::Validation(format!(
                    "automaton '{}': {}",
                    description.automaton, e
                ))
            })?;
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "automata"
    }
}

// ============================================================================
// Call-Stack Configuration
// ============================================================================

/// Interprocedural context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallStackConfig {
    /// Maximum number of active calls (1..=10000). Deeper calls truncate the
    /// branch and make the run incomplete.
    pub max_depth: usize,
}

impl Default for CallStackConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl CallStackConfig {
    pub fn from_preset(preset: Preset) -> Self {
        let max_depth = match preset {
            Preset::Fast => 4,
            Preset::Balanced => 8,
            Preset::Thorough => 32,
        };
        Self { max_depth }
    }

    /// Builder: Set max_depth
    pub fn max_depth(mut self, v: usize) -> Self {
        self.max_depth = v;
        self
    }
}

impl Validatable for CallStackConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "max_depth",
            self.max_depth,
            1,
            10_000,
            "Call depth must allow at least one frame",
        )
    }

    fn config_name(&self) -> &'static str {
        "callstack"
    }
}

// ============================================================================
// Exploration Configuration
// ============================================================================

/// Waitlist ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitlistOrder {
    /// Breadth first (shortest counterexamples first)
    #[default]
    Bfs,
    /// Depth first
    Dfs,
    /// CFA reverse postorder, ties in insertion order
    ReversePostorder,
    /// Deepest loop nesting first
    LoopDepthFirst,
}

/// How a new state is combined with reached states at the same location
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Never merge
    #[default]
    Sep,
    /// Join when every domain agrees
    Join,
}

/// When a new state is discarded as covered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Covered by a single reached state
    #[default]
    Sep,
    /// Never covered (explores the full tree; only terminates on acyclic programs)
    Never,
}

/// Exploration budgets and policies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    pub order: WaitlistOrder,
    pub merge: MergePolicy,
    pub stop: StopPolicy,

    /// Waitlist pops across all refinements (1..=100000000)
    pub max_steps: u64,

    /// Wall-clock budget in milliseconds (0 = unlimited)
    pub time_limit_ms: u64,

    /// Evaluate domain transfers in parallel (requires the `parallel` feature)
    pub parallel_transfer: bool,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl ExplorationConfig {
    pub fn from_preset(preset: Preset) -> Self {
        let (max_steps, time_limit_ms) = match preset {
            Preset::Fast => (10_000, 10_000),
            Preset::Balanced => (200_000, 60_000),
            Preset::Thorough => (5_000_000, 600_000),
        };
        Self {
            order: WaitlistOrder::Bfs,
            merge: MergePolicy::Sep,
            stop: StopPolicy::Sep,
            max_steps,
            time_limit_ms,
            parallel_transfer: false,
        }
    }

    /// Builder: Set order
    pub fn order(mut self, v: WaitlistOrder) -> Self {
        self.order = v;
        self
    }

    /// Builder: Set merge
    pub fn merge(mut self, v: MergePolicy) -> Self {
        self.merge = v;
        self
    }

    /// Builder: Set stop
    pub fn stop(mut self, v: StopPolicy) -> Self {
        self.stop = v;
        self
    }

    /// Builder: Set max_steps
    pub fn max_steps(mut self, v: u64) -> Self {
        self.max_steps = v;
        self
    }

    /// Builder: Set time_limit_ms
    pub fn time_limit_ms(mut self, v: u64) -> Self {
        self.time_limit_ms = v;
        self
    }

    /// Builder: Set parallel_transfer
    pub fn parallel_transfer(mut self, v: bool) -> Self {
        self.parallel_transfer = v;
        self
    }
}

impl Validatable for ExplorationConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "max_steps",
            self.max_steps,
            1,
            100_000_000,
            "Exploration needs at least one step",
        )?;
        check_range(
            "time_limit_ms",
            self.time_limit_ms,
            0,
            86_400_000,
            "Use 0 for no limit; at most one day",
        )
    }

    fn config_name(&self) -> &'static str {
        "exploration"
    }
}

// ============================================================================
// Refinement Configuration
// ============================================================================

/// What an interpolant adds to the precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStrategy {
    /// Interpolant atoms become value-domain predicates
    #[default]
    Predicates,
    /// Variables of interpolant atoms become tracked variables
    TrackedVariables,
}

/// Where exploration restarts after a refinement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartPolicy {
    /// Remove the subtree below the pivot and re-queue its parent
    #[default]
    Pivot,
    /// Discard the whole ARG and restart from the initial state
    Root,
}

/// Reaction to an oracle timeout or undecided query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleTimeoutPolicy {
    /// Stop with an Unknown verdict
    #[default]
    Abort,
    /// Drop the target, mark the run incomplete and keep exploring
    Continue,
}

/// CEGAR loop settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Check targets with the feasibility oracle before reporting them
    #[serde(default = "default_true")]
    pub check_counterexamples: bool,

    /// Refinement rounds before giving up (1..=100000)
    pub max_refinements: usize,

    pub strategy: RefinementStrategy,
    pub restart: RestartPolicy,

    /// Oracle deadline per query in milliseconds (0 = none)
    pub oracle_timeout_ms: u64,

    pub on_oracle_timeout: OracleTimeoutPolicy,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self::from_preset(Preset::Balanced)
    }
}

impl RefinementConfig {
    pub fn from_preset(preset: Preset) -> Self {
        let (max_refinements, oracle_timeout_ms) = match preset {
            Preset::Fast => (10, 1_000),
            Preset::Balanced => (50, 10_000),
            Preset::Thorough => (500, 60_000),
        };
        Self {
            check_counterexamples: true,
            max_refinements,
            strategy: RefinementStrategy::Predicates,
            restart: RestartPolicy::Pivot,
            oracle_timeout_ms,
            on_oracle_timeout: OracleTimeoutPolicy::Abort,
        }
    }

    /// Builder: Set check_counterexamples
    pub fn check_counterexamples(mut self, v: bool) -> Self {
        self.check_counterexamples = v;
        self
    }

    /// Builder: Set max_refinements
    pub fn max_refinements(mut self, v: usize) -> Self {
        self.max_refinements = v;
        self
    }

    /// Builder: Set strategy
    pub fn strategy(mut self, v: RefinementStrategy) -> Self {
        self.strategy = v;
        self
    }

    /// Builder: Set restart
    pub fn restart(mut self, v: RestartPolicy) -> Self {
        self.restart = v;
        self
    }

    /// Builder: Set oracle_timeout_ms
    pub fn oracle_timeout_ms(mut self, v: u64) -> Self {
        self.oracle_timeout_ms = v;
        self
    }

    /// Builder: Set on_oracle_timeout
    pub fn on_oracle_timeout(mut self, v: OracleTimeoutPolicy) -> Self {
        self.on_oracle_timeout = v;
        self
    }
}

impl Validatable for RefinementConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "max_refinements",
            self.max_refinements,
            1,
            100_000,
            "Refinement bound must be finite and positive",
        )?;
        check_range(
            "oracle_timeout_ms",
            self.oracle_timeout_ms,
            0,
            3_600_000,
            "Use 0 for no deadline; at most one hour",
        )
    }

    fn config_name(&self) -> &'static str {
        "refinement"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ValueConfig::default().validate().is_ok());
        assert!(ShapeConfig::default().validate().is_ok());
        assert!(TaintConfig::default().validate().is_ok());
        assert!(AutomatonConfig::default().validate().is_ok());
        assert!(CallStackConfig::default().validate().is_ok());
        assert!(ExplorationConfig::default().validate().is_ok());
        assert!(RefinementConfig::default().validate().is_ok());
    }

    #[test]
    fn test_presets_scale_budgets() {
        let fast = ExplorationConfig::from_preset(Preset::Fast);
        let thorough = ExplorationConfig::from_preset(Preset::Thorough);
        assert!(fast.max_steps < thorough.max_steps);
        assert!(
            RefinementConfig::from_preset(Preset::Fast).max_refinements
                < RefinementConfig::from_preset(Preset::Thorough).max_refinements
        );
    }

    #[test]
    fn test_range_errors() {
        let err = ExplorationConfig::default().max_steps(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Range { ref field, .. } if field == "max_steps"));

        let err = RefinementConfig::default()
            .max_refinements(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_refinements"));

        let err = ValueConfig::default()
            .solver_max_branches(0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Range { ref field, .. } if field == "solver_max_branches"));
    }

    #[test]
    fn test_value_predicates_must_be_linear() {
        assert!(ValueConfig::default().predicate("i < n").validate().is_ok());
        assert!(ValueConfig::default().predicate("i * j < n").validate().is_err());
        assert!(ValueConfig::default().predicate("i <").validate().is_err());
    }

    #[test]
    fn test_overlapping_roles_rejected() {
        let taint = TaintConfig::default().secret("x").public_sink("x");
        assert!(taint.validate().is_err());

        let shape = ShapeConfig {
            deallocators: vec!["malloc".to_string()],
            ..ShapeConfig::default()
        };
        assert!(shape.validate().is_err());
    }
}
