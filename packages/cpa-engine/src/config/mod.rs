//! Configuration
//!
//! Three levels of control:
//! - Preset: budgets for the common cases (`Fast`, `Balanced`, `Thorough`)
//! - Overrides: closures per concern on top of a preset
//! - YAML: complete control, schema version 1
//!
//! # Examples
//!
//! ```
//! use cpa_engine::config::{AnalysisConfig, MergePolicy, Preset};
//! use cpa_engine::features::composite::DomainKind;
//!
//! let config = AnalysisConfig::preset(Preset::Fast)
//!     .with_domain(DomainKind::Shape)
//!     .exploration(|e| e.merge(MergePolicy::Join))
//!     .refinement(|r| r.max_refinements(20));
//! assert!(config.validate().is_ok());
//! ```

pub mod analysis_config;
pub mod error;
pub mod preset;
pub mod stage_configs;
pub mod validation;

pub use analysis_config::{AnalysisConfig, SUPPORTED_VERSIONS};
pub use error::{ConfigError, ConfigResult};
pub use preset::Preset;
pub use stage_configs::{
    AutomatonConfig, CallStackConfig, ExplorationConfig, MergePolicy, OracleTimeoutPolicy,
    RefinementConfig, RefinementStrategy, RestartPolicy, ShapeConfig, StopPolicy, TaintConfig,
    ValueConfig, WaitlistOrder,
};
pub use validation::{Validatable, ValidatableCollection};
