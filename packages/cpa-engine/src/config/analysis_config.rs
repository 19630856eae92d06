//! Analysis configuration
//!
//! Preset-based defaults, closure overrides per concern, YAML I/O.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use super::error::{ConfigError, ConfigResult};
use super::preset::Preset;
use super::stage_configs::*;
use super::validation::Validatable;
use crate::features::composite::DomainKind;

/// Supported YAML schema versions
pub const SUPPORTED_VERSIONS: &[u32] = &[1];

/// Complete configuration of one verification run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub version: u32,
    pub preset: Preset,

    /// Enabled domains in composite order. The call-stack domain is added
    /// automatically when the program enters function bodies.
    pub domains: Vec<DomainKind>,

    pub value: ValueConfig,
    pub shape: ShapeConfig,
    pub taint: TaintConfig,
    pub automata: AutomatonConfig,
    pub callstack: CallStackConfig,
    pub exploration: ExplorationConfig,
    pub refinement: RefinementConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::preset(Preset::Balanced)
    }
}

/// YAML schema v1 (every section optional, preset fills the rest)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFileV1 {
    version: Option<u32>,
    #[serde(default)]
    preset: Option<String>,
    #[serde(default)]
    domains: Option<Vec<String>>,
    #[serde(default)]
    value: Option<ValueConfig>,
    #[serde(default)]
    shape: Option<ShapeConfig>,
    #[serde(default)]
    taint: Option<TaintConfig>,
    #[serde(default)]
    automata: Option<AutomatonConfig>,
    #[serde(default)]
    callstack: Option<CallStackConfig>,
    #[serde(default)]
    exploration: Option<ExplorationConfig>,
    #[serde(default)]
    refinement: Option<RefinementConfig>,
}

impl AnalysisConfig {
    /// Value analysis only, budgets from `preset`
    pub fn preset(preset: Preset) -> Self {
        Self {
            version: 1,
            preset,
            domains: vec![DomainKind::Value],
            value: ValueConfig::default(),
            shape: ShapeConfig::default(),
            taint: TaintConfig::default(),
            automata: AutomatonConfig::default(),
            callstack: CallStackConfig::from_preset(preset),
            exploration: ExplorationConfig::from_preset(preset),
            refinement: RefinementConfig::from_preset(preset),
        }
    }

    /// Builder: replace the domain list
    pub fn domains(mut self, domains: &[DomainKind]) -> Self {
        self.domains = domains.to_vec();
        self
    }

    /// Builder: append a domain if absent
    pub fn with_domain(mut self, domain: DomainKind) -> Self {
        if !self.domains.contains(&domain) {
            self.domains.push(domain);
        }
        self
    }

    /// Builder: override value settings
    pub fn value(mut self, f: impl FnOnce(ValueConfig) -> ValueConfig) -> Self {
        self.value = f(self.value);
        self
    }

    /// Builder: override shape settings
    pub fn shape(mut self, f: impl FnOnce(ShapeConfig) -> ShapeConfig) -> Self {
        self.shape = f(self.shape);
        self
    }

    /// Builder: override taint policy
    pub fn taint(mut self, f: impl FnOnce(TaintConfig) -> TaintConfig) -> Self {
        self.taint = f(self.taint);
        self
    }

    /// Builder: override automata
    pub fn automata(mut self, f: impl FnOnce(AutomatonConfig) -> AutomatonConfig) -> Self {
        self.automata = f(self.automata);
        self
    }

    /// Builder: override call-stack settings
    pub fn callstack(mut self, f: impl FnOnce(CallStackConfig) -> CallStackConfig) -> Self {
        self.callstack = f(self.callstack);
        self
    }

    /// Builder: override exploration settings
    pub fn exploration(mut self, f: impl FnOnce(ExplorationConfig) -> ExplorationConfig) -> Self {
        self.exploration = f(self.exploration);
        self
    }

    /// Builder: override refinement settings
    pub fn refinement(mut self, f: impl FnOnce(RefinementConfig) -> RefinementConfig) -> Self {
        self.refinement = f(self.refinement);
        self
    }

    /// Validate every section plus cross-section consistency
    pub fn validate(&self) -> ConfigResult<()> {
        if !SUPPORTED_VERSIONS.contains(&self.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: self.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }
        self.value.validate()?;
        self.shape.validate()?;
        self.taint.validate()?;
        self.automata.validate()?;
        self.callstack.validate()?;
        self.exploration.validate()?;
        self.refinement.validate()?;

        if self.domains.is_empty() {
            return Err(ConfigError::conflict(
                "no domains enabled",
                "enable at least one domain, e.g. 'domains: [value]'",
            ));
        }
        let mut seen = BTreeSet::new();
        for d in &self.domains {
            if !seen.insert(*d) {
                return Err(ConfigError::Validation(format!(
                    "domain '{}' listed twice",
                    d
                )));
            }
        }
        if self.domains.contains(&DomainKind::Automaton) && self.automata.is_empty() {
            return Err(ConfigError::conflict(
                "automaton domain enabled without automata",
                "add 'automata.builtin' or 'automata.specifications'",
            ));
        }
        if !self.domains.contains(&DomainKind::Automaton) && !self.automata.is_empty() {
            tracing::warn!("Automata configured but the automaton domain is not enabled");
        }
        if self.exploration.parallel_transfer && !cfg!(feature = "parallel") {
            tracing::warn!("parallel_transfer requested but the 'parallel' feature is disabled");
        }
        Ok(())
    }

    /// Load from YAML text
    ///
    /// # Example
    /// ```
    /// use cpa_engine::config::{AnalysisConfig, Preset};
    ///
    /// let config = AnalysisConfig::from_yaml_str("version: 1\npreset: fast\ndomains: [value, taint]\n").unwrap();
    /// assert_eq!(config.preset, Preset::Fast);
    /// assert_eq!(config.domains.len(), 2);
    /// ```
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(yaml)?;
        let version = file.version.ok_or(ConfigError::MissingVersion)?;
        let preset = match &file.preset {
            Some(p) => Preset::from_str(p)?,
            None => Preset::default(),
        };

        let mut config = Self::preset(preset);
        config.version = version;
        if let Some(domains) = file.domains {
            config.domains = domains
                .iter()
                .map(|d| DomainKind::parse(d))
                .collect::<ConfigResult<Vec<_>>>()?;
        }
        if let Some(v) = file.value {
            config.value = v;
        }
        if let Some(v) = file.shape {
            config.shape = v;
        }
        if let Some(v) = file.taint {
            config.taint = v;
        }
        if let Some(v) = file.automata {
            config.automata = v;
        }
        if let Some(v) = file.callstack {
            config.callstack = v;
        }
        if let Some(v) = file.exploration {
            config.exploration = v;
        }
        if let Some(v) = file.refinement {
            config.refinement = v;
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Export as YAML (schema v1)
    pub fn to_yaml(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: Some(self.version),
            preset: Some(self.preset.to_string()),
            domains: Some(self.domains.iter().map(|d| d.to_string()).collect()),
            value: Some(self.value.clone()),
            shape: Some(self.shape.clone()),
            taint: Some(self.taint.clone()),
            automata: Some(self.automata.clone()),
            callstack: Some(self.callstack.clone()),
            exploration: Some(self.exploration.clone()),
            refinement: Some(self.refinement.clone()),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}
