/*
 * Composite Domain
 *
 * Closed set of domains combined into one product analysis:
 * - transfer: every component independently (optionally in parallel);
 *   any Bottom prunes, any Truncated truncates
 * - merge-agree: joined only if every component merge succeeds
 * - stop: a single reached state must cover every component
 *
 * Component order is fixed by the builder and shared by every state.
 */

use std::collections::BTreeMap;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::state::{CompositeState, DomainKind, DomainState};
use crate::config::AnalysisConfig;
use crate::errors::{CpaError, Result};
use crate::features::domains::{
    AbstractDomain, AutomatonDomain, CallStackDomain, ShapeDomain, TargetReason, TaintDomain,
    Transfer, ValueDomain,
};
use crate::features::precision::Precision;
use crate::shared::models::{Cfa, CfaEdge, CfaNode};

/// One configured domain
#[derive(Debug, Clone)]
pub enum Domain {
    Value(ValueDomain),
    Shape(ShapeDomain),
    Automaton(AutomatonDomain),
    Taint(TaintDomain),
    CallStack(CallStackDomain),
}

/// Pair a domain with its own state variant; `$wrap` rebuilds the variant
macro_rules! dispatch {
    ($domain:expr, $state:expr, |$d:ident, $s:ident, $wrap:ident| $body:expr, $mismatch:expr) => {
        match ($domain, $state) {
            (Domain::Value($d), DomainState::Value($s)) => {
                let $wrap = DomainState::Value;
                $body
            }
            (Domain::Shape($d), DomainState::Shape($s)) => {
                let $wrap = DomainState::Shape;
                $body
            }
            (Domain::Automaton($d), DomainState::Automaton($s)) => {
                let $wrap = DomainState::Automaton;
                $body
            }
            (Domain::Taint($d), DomainState::Taint($s)) => {
                let $wrap = DomainState::Taint;
                $body
            }
            (Domain::CallStack($d), DomainState::CallStack($s)) => {
                let $wrap = DomainState::CallStack;
                $body
            }
            _ => $mismatch,
        }
    };
}

/// Same as `dispatch!` for operations over two states of one domain
macro_rules! dispatch2 {
    ($domain:expr, $a:expr, $b:expr, |$d:ident, $x:ident, $y:ident, $wrap:ident| $body:expr, $mismatch:expr) => {
        match ($domain, $a, $b) {
            (Domain::Value($d), DomainState::Value($x), DomainState::Value($y)) => {
                let $wrap = DomainState::Value;
                $body
            }
            (Domain::Shape($d), DomainState::Shape($x), DomainState::Shape($y)) => {
                let $wrap = DomainState::Shape;
                $body
            }
            (Domain::Automaton($d), DomainState::Automaton($x), DomainState::Automaton($y)) => {
                let $wrap = DomainState::Automaton;
                $body
            }
            (Domain::Taint($d), DomainState::Taint($x), DomainState::Taint($y)) => {
                let $wrap = DomainState::Taint;
                $body
            }
            (Domain::CallStack($d), DomainState::CallStack($x), DomainState::CallStack($y)) => {
                let $wrap = DomainState::CallStack;
                $body
            }
            _ => $mismatch,
        }
    };
}

impl Domain {
    pub fn kind(&self) -> DomainKind {
        match self {
            Domain::Value(_) => DomainKind::Value,
            Domain::Shape(_) => DomainKind::Shape,
            Domain::Automaton(_) => DomainKind::Automaton,
            Domain::Taint(_) => DomainKind::Taint,
            Domain::CallStack(_) => DomainKind::CallStack,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Domain::Value(d) => d.name(),
            Domain::Shape(d) => d.name(),
            Domain::Automaton(d) => d.name(),
            Domain::Taint(d) => d.name(),
            Domain::CallStack(d) => d.name(),
        }
    }

    pub fn initial_state(&self, cfa: &Cfa, precision: &Precision) -> DomainState {
        match self {
            Domain::Value(d) => DomainState::Value(d.initial_state(cfa, precision)),
            Domain::Shape(d) => DomainState::Shape(d.initial_state(cfa, precision)),
            Domain::Automaton(d) => DomainState::Automaton(d.initial_state(cfa, precision)),
            Domain::Taint(d) => DomainState::Taint(d.initial_state(cfa, precision)),
            Domain::CallStack(d) => DomainState::CallStack(d.initial_state(cfa, precision)),
        }
    }

    /// A state of another domain has no successor
    pub fn transfer(
        &self,
        state: &DomainState,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Transfer<DomainState> {
        dispatch!(
            self,
            state,
            |d, s, wrap| d.transfer(s, edge, precision).map(wrap),
            Transfer::Bottom
        )
    }

    pub fn merge(
        &self,
        new: &DomainState,
        existing: &DomainState,
        location: &CfaNode,
    ) -> Option<DomainState> {
        dispatch2!(
            self,
            new,
            existing,
            |d, x, y, wrap| d.merge(x, y, location).map(wrap),
            None
        )
    }

    pub fn is_less_or_equal(&self, lhs: &DomainState, rhs: &DomainState) -> bool {
        dispatch2!(
            self,
            lhs,
            rhs,
            |d, x, y, _wrap| d.is_less_or_equal(x, y),
            false
        )
    }

    pub fn adjust_precision(&self, state: &DomainState, precision: &Precision) -> DomainState {
        dispatch!(
            self,
            state,
            |d, s, wrap| wrap(d.adjust_precision(s, precision)),
            state.clone()
        )
    }

    pub fn target_reason(&self, state: &DomainState) -> Option<TargetReason> {
        dispatch!(self, state, |d, s, _wrap| d.target_reason(s), None)
    }

    pub fn valuation(&self, state: &DomainState) -> BTreeMap<String, String> {
        dispatch!(self, state, |d, s, _wrap| d.valuation(s), BTreeMap::new())
    }
}

/// Product of the configured domains
#[derive(Debug, Clone)]
pub struct CompositeDomain {
    domains: Vec<Domain>,
    parallel: bool,
}

impl CompositeDomain {
    pub fn builder() -> CompositeDomainBuilder {
        CompositeDomainBuilder::new()
    }

    /// Domains for `config`, with the call-stack domain added when the
    /// program enters function bodies
    pub fn from_config(config: &AnalysisConfig, cfa: &Cfa) -> Result<Self> {
        let mut builder = CompositeDomainBuilder::new().parallel(config.exploration.parallel_transfer);
        for kind in &config.domains {
            builder = builder.domain(match kind {
                DomainKind::Value => Domain::Value(ValueDomain::new(&config.value)),
                DomainKind::Shape => Domain::Shape(ShapeDomain::new(&config.shape)),
                DomainKind::Automaton => {
                    Domain::Automaton(AutomatonDomain::new(&config.automata)?)
                }
                DomainKind::Taint => Domain::Taint(TaintDomain::new(&config.taint)),
                DomainKind::CallStack => Domain::CallStack(CallStackDomain::new(&config.callstack)),
            });
        }
        if cfa.has_function_calls() && !config.domains.contains(&DomainKind::CallStack) {
            tracing::debug!("Program enters function bodies, adding call-stack domain");
            builder = builder.domain(Domain::CallStack(CallStackDomain::new(&config.callstack)));
        }
        builder.build()
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn kinds(&self) -> Vec<DomainKind> {
        self.domains.iter().map(|d| d.kind()).collect()
    }

    /// Parallel transfer requested (effective only with the `parallel` feature)
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    pub fn has(&self, kind: DomainKind) -> bool {
        self.domains.iter().any(|d| d.kind() == kind)
    }

    pub fn initial_state(&self, cfa: &Cfa, precision: &Precision) -> CompositeState {
        CompositeState::new(
            cfa.entry(),
            self.domains
                .iter()
                .map(|d| d.initial_state(cfa, precision))
                .collect(),
        )
    }

    /// Successor of `state` along `edge`
    pub fn successor(
        &self,
        state: &CompositeState,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Transfer<CompositeState> {
        let results = self.transfer_components(state, edge, precision);

        let mut components = Vec::with_capacity(results.len());
        let mut truncated = None;
        for result in results {
            match result {
                Transfer::Next(s) => components.push(s),
                Transfer::Bottom => return Transfer::Bottom,
                Transfer::Truncated(reason) => {
                    truncated.get_or_insert(reason);
                }
            }
        }
        match truncated {
            Some(reason) => Transfer::Truncated(reason),
            None => Transfer::Next(CompositeState::new(edge.target, components)),
        }
    }

    fn transfer_components(
        &self,
        state: &CompositeState,
        edge: &CfaEdge,
        precision: &Precision,
    ) -> Vec<Transfer<DomainState>> {
        #[cfg(feature = "parallel")]
        {
            if self.parallel && self.domains.len() > 1 {
                return self
                    .domains
                    .par_iter()
                    .zip(state.components.par_iter())
                    .map(|(d, s)| d.transfer(s, edge, precision))
                    .collect();
            }
        }
        self.domains
            .iter()
            .zip(&state.components)
            .map(|(d, s)| d.transfer(s, edge, precision))
            .collect()
    }

    /// Merge-agree: `Some` only if every component merge succeeds.
    /// The result equals `existing` when nothing was gained.
    pub fn merge(
        &self,
        new: &CompositeState,
        existing: &CompositeState,
        location: &CfaNode,
    ) -> Option<CompositeState> {
        if new.location != existing.location {
            return None;
        }
        let components = self
            .domains
            .iter()
            .zip(new.components.iter().zip(&existing.components))
            .map(|(d, (n, e))| d.merge(n, e, location))
            .collect::<Option<Vec<_>>>()?;
        Some(CompositeState::new(existing.location, components))
    }

    pub fn is_less_or_equal(&self, lhs: &CompositeState, rhs: &CompositeState) -> bool {
        lhs.location == rhs.location
            && self
                .domains
                .iter()
                .zip(lhs.components.iter().zip(&rhs.components))
                .all(|(d, (l, r))| d.is_less_or_equal(l, r))
    }

    /// Index of the first reached state covering `state`
    pub fn stop(&self, state: &CompositeState, reached: &[&CompositeState]) -> Option<usize> {
        reached
            .iter()
            .position(|r| self.is_less_or_equal(state, r))
    }

    pub fn adjust_precision(&self, state: &CompositeState, precision: &Precision) -> CompositeState {
        CompositeState::new(
            state.location,
            self.domains
                .iter()
                .zip(&state.components)
                .map(|(d, s)| d.adjust_precision(s, precision))
                .collect(),
        )
    }

    /// Property violations reported by the components
    pub fn target_reasons(&self, state: &CompositeState) -> Vec<TargetReason> {
        self.domains
            .iter()
            .zip(&state.components)
            .filter_map(|(d, s)| d.target_reason(s))
            .collect()
    }

    /// Per-domain valuations, keyed by domain name
    pub fn valuations(&self, state: &CompositeState) -> BTreeMap<String, BTreeMap<String, String>> {
        self.domains
            .iter()
            .zip(&state.components)
            .map(|(d, s)| (d.name().to_string(), d.valuation(s)))
            .collect()
    }
}

/// Assembles a [`CompositeDomain`]; rejects empty and duplicate domain lists
#[derive(Debug, Default)]
pub struct CompositeDomainBuilder {
    domains: Vec<Domain>,
    parallel: bool,
}

impl CompositeDomainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn domain(mut self, domain: Domain) -> Self {
        self.domains.push(domain);
        self
    }

    pub fn parallel(mut self, enabled: bool) -> Self {
        self.parallel = enabled;
        self
    }

    pub fn build(self) -> Result<CompositeDomain> {
        if self.domains.is_empty() {
            return Err(CpaError::malformed("composite domain needs at least one domain"));
        }
        let mut kinds: Vec<DomainKind> = Vec::with_capacity(self.domains.len());
        for d in &self.domains {
            if kinds.contains(&d.kind()) {
                return Err(CpaError::malformed(format!(
                    "domain '{}' configured twice",
                    d.kind()
                )));
            }
            kinds.push(d.kind());
        }
        tracing::debug!(
            "Composite domain: [{}]",
            kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(", ")
        );
        Ok(CompositeDomain {
            domains: self.domains,
            parallel: self.parallel,
        })
    }
}
