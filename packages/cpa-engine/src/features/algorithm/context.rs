//! Analysis context
//!
//! Sole owner of the mutable analysis data of one run: ARG, reached set,
//! waitlist, precision, pending targets and statistics. Every component
//! receives it explicitly; nothing is global.

use rustc_hash::FxHashSet;
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use super::stats::AnalysisStats;
use crate::config::WaitlistOrder;
use crate::features::arg::{Arg, ArgNodeId, Pruned};
use crate::features::composite::CompositeDomain;
use crate::features::domains::TargetReason;
use crate::features::precision::Precision;
use crate::features::reached::{ReachedSet, Waitlist};
use crate::shared::models::{Cfa, CfaNodeId};

pub struct AnalysisContext<'a> {
    cfa: &'a Cfa,
    domain: CompositeDomain,
    targets: FxHashSet<CfaNodeId>,
    precision: Arc<Precision>,
    pub(crate) arg: Arg,
    pub(crate) reached: ReachedSet,
    pub(crate) waitlist: Waitlist,
    pending: VecDeque<ArgNodeId>,
    pub(crate) stats: AnalysisStats,
    incomplete: BTreeSet<String>,
    started: Instant,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(
        cfa: &'a Cfa,
        domain: CompositeDomain,
        targets: &[CfaNodeId],
        precision: Precision,
        order: WaitlistOrder,
    ) -> Self {
        Self {
            cfa,
            domain,
            targets: targets.iter().copied().collect(),
            precision: Arc::new(precision),
            arg: Arg::new(),
            reached: ReachedSet::new(),
            waitlist: Waitlist::new(order),
            pending: VecDeque::new(),
            stats: AnalysisStats::default(),
            incomplete: BTreeSet::new(),
            started: Instant::now(),
        }
    }

    /// Reset exploration to the initial state under the current precision
    pub fn initialize(&mut self) {
        let initial = self.domain.initial_state(self.cfa, &self.precision);
        let initial = self.domain.adjust_precision(&initial, &self.precision);
        self.reached.clear();
        self.waitlist.clear();
        self.pending.clear();
        let root = self.arg.set_root(initial, Arc::clone(&self.precision));
        self.stats.states += 1;
        tracing::debug!("Initialized exploration at {} ({})", self.cfa.entry(), self.precision);
        self.register(root);
    }

    pub fn cfa(&self) -> &'a Cfa {
        self.cfa
    }

    pub fn domain(&self) -> &CompositeDomain {
        &self.domain
    }

    pub fn precision(&self) -> &Arc<Precision> {
        &self.precision
    }

    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = Arc::new(precision);
    }

    pub fn arg(&self) -> &Arg {
        &self.arg
    }

    pub fn reached(&self) -> &ReachedSet {
        &self.reached
    }

    pub fn waitlist_len(&self) -> usize {
        self.waitlist.len()
    }

    pub fn stats(&self) -> &AnalysisStats {
        &self.stats
    }

    pub fn is_target_location(&self, location: CfaNodeId) -> bool {
        self.targets.contains(&location)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Admit a freshly created ARG node: targets are set aside for
    /// verification, everything else is queued for expansion
    pub(crate) fn register(&mut self, id: ArgNodeId) {
        let state = &self.arg.node(id).state;
        let location = state.location;

        let mut reasons = Vec::new();
        if self.targets.contains(&location) {
            reasons.push(TargetReason::Location {
                node: location,
                label: self.cfa.node(location).label.clone(),
            });
        }
        reasons.extend(self.domain.target_reasons(state));

        self.reached.add(location, id);
        if reasons.is_empty() {
            self.waitlist.push(id, self.cfa.node(location));
            self.stats.max_waitlist = self.stats.max_waitlist.max(self.waitlist.len());
        } else {
            tracing::debug!(
                "Target {} at {}: {}",
                id,
                location,
                reasons
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            );
            self.arg.mark_target(id, reasons);
            self.pending.push_back(id);
            self.stats.targets_found += 1;
        }
    }

    /// Oldest target that is still part of the ARG
    pub(crate) fn next_pending_target(&mut self) -> Option<ArgNodeId> {
        while let Some(id) = self.pending.pop_front() {
            let node = self.arg.node(id);
            if node.is_active() && node.is_target() {
                return Some(id);
            }
        }
        None
    }

    /// Give up on a target without a verdict for it
    pub(crate) fn drop_target(&mut self, id: ArgNodeId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!("Dropping target {}: {}", id, reason);
        self.mark_incomplete(reason);
    }

    pub(crate) fn mark_incomplete(&mut self, reason: impl Into<String>) {
        self.incomplete.insert(reason.into());
    }

    pub fn is_incomplete(&self) -> bool {
        !self.incomplete.is_empty()
    }

    pub fn incomplete_reasons(&self) -> Vec<String> {
        self.incomplete.iter().cloned().collect()
    }

    /// Remove the subtree below `top` from ARG, reached set and waitlist;
    /// surviving parents and uncovered nodes are expanded again
    pub(crate) fn prune(&mut self, top: ArgNodeId) -> Pruned {
        let pruned = self.arg.remove_subtree(top);
        for &id in &pruned.removed {
            let location = self.arg.node(id).state.location;
            self.reached.remove(location, id);
            self.waitlist.remove(id);
        }
        for &id in &pruned.requeue {
            let location = self.arg.node(id).state.location;
            self.waitlist.push(id, self.cfa.node(location));
        }
        for &id in &pruned.uncovered {
            self.register(id);
        }
        tracing::debug!(
            "Pruned {} nodes below {}, re-queued {}, uncovered {}",
            pruned.removed.len(),
            top,
            pruned.requeue.len(),
            pruned.uncovered.len()
        );
        pruned
    }
}
