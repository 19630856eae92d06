/*
 * CPA Algorithm (Explore phase)
 *
 * Worklist exploration over composite states:
 * 1. pop a node (budget checked at every pop)
 * 2. compute every successor of the popped state
 *    - Bottom: discard
 *    - Truncated: discard, run becomes incomplete
 *    - covered by one reached state: keep as covered ARG node
 *    - merge-join into a reached state (MergePolicy::Join)
 *    - otherwise: new ARG node; targets are set aside, never expanded
 * 3. hand off the oldest target after the step completes
 */

use std::sync::Arc;

use super::context::AnalysisContext;
use crate::config::{ExplorationConfig, MergePolicy, StopPolicy};
use crate::features::arg::ArgNodeId;
use crate::features::composite::CompositeState;
use crate::features::domains::Transfer;
use crate::features::precision::Precision;
use crate::features::refinement::UnknownReason;
use crate::shared::models::CfaEdgeId;

/// How an exploration phase ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExploreOutcome {
    /// A target node waits for verification
    Target(ArgNodeId),
    /// Waitlist empty, no pending target
    Exhausted,
    /// Step or time budget used up
    OutOfBudget(UnknownReason),
}

#[derive(Debug, Clone)]
pub struct CpaAlgorithm {
    config: ExplorationConfig,
}

impl CpaAlgorithm {
    pub fn new(config: &ExplorationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Explore until a target is pending, the frontier is empty or the
    /// budget is exhausted
    pub fn explore(&self, ctx: &mut AnalysisContext<'_>) -> ExploreOutcome {
        loop {
            if let Some(target) = ctx.next_pending_target() {
                return ExploreOutcome::Target(target);
            }
            if ctx.waitlist.is_empty() {
                return ExploreOutcome::Exhausted;
            }
            if let Some(reason) = self.budget_exceeded(ctx) {
                tracing::warn!("Exploration budget exhausted: {}", reason);
                return ExploreOutcome::OutOfBudget(reason);
            }
            let Some(id) = ctx.waitlist.pop() else {
                return ExploreOutcome::Exhausted;
            };
            if !ctx.arg.node(id).is_active() {
                continue;
            }
            ctx.stats.steps += 1;
            self.expand(ctx, id);
        }
    }

    fn budget_exceeded(&self, ctx: &AnalysisContext<'_>) -> Option<UnknownReason> {
        if ctx.stats.steps >= self.config.max_steps {
            return Some(UnknownReason::StepLimit {
                steps: ctx.stats.steps,
            });
        }
        if self.config.time_limit_ms > 0 {
            let elapsed_ms = ctx.elapsed_ms();
            if elapsed_ms >= self.config.time_limit_ms {
                return Some(UnknownReason::TimeLimit { elapsed_ms });
            }
        }
        None
    }

    /// Compute and admit every successor of `id`
    fn expand(&self, ctx: &mut AnalysisContext<'_>, id: ArgNodeId) {
        let cfa = ctx.cfa();
        let precision = Arc::clone(ctx.precision());
        let state = ctx.arg.node(id).state.clone();
        tracing::trace!("Expanding {} at {}", id, state.location);

        for edge in cfa.outgoing(state.location) {
            match ctx.domain().successor(&state, edge, &precision) {
                Transfer::Bottom => {
                    ctx.stats.pruned += 1;
                    tracing::trace!("Bottom along '{}' from {}", edge, id);
                }
                Transfer::Truncated(reason) => {
                    ctx.stats.truncated += 1;
                    tracing::warn!("Truncated along '{}' from {}: {}", edge, id, reason);
                    ctx.mark_incomplete(reason);
                }
                Transfer::Next(successor) => {
                    let successor = ctx.domain().adjust_precision(&successor, &precision);
                    self.admit(ctx, id, edge.id, successor, &precision);
                }
            }
        }
    }

    fn admit(
        &self,
        ctx: &mut AnalysisContext<'_>,
        parent: ArgNodeId,
        edge: CfaEdgeId,
        successor: CompositeState,
        precision: &Arc<Precision>,
    ) {
        let location = successor.location;
        let candidates: Vec<ArgNodeId> = ctx.reached.at(location).to_vec();

        if self.config.stop == StopPolicy::Sep {
            let coverer = {
                let states: Vec<&CompositeState> =
                    candidates.iter().map(|c| &ctx.arg.node(*c).state).collect();
                ctx.domain().stop(&successor, &states).map(|i| candidates[i])
            };
            if let Some(coverer) = coverer {
                let covered = ctx
                    .arg
                    .add_child(parent, edge, successor, Arc::clone(precision));
                ctx.arg.mark_covered(covered, coverer);
                ctx.stats.states += 1;
                ctx.stats.covered += 1;
                tracing::debug!("{} covered by {} at {}", covered, coverer, location);
                return;
            }
        }

        if self.config.merge == MergePolicy::Join {
            let cfa_node = ctx.cfa().node(location);
            for existing in candidates {
                let node = ctx.arg.node(existing);
                if !node.is_active() || node.is_target() {
                    continue;
                }
                let Some(merged) = ctx.domain().merge(&successor, &node.state, cfa_node) else {
                    continue;
                };
                if merged == node.state {
                    continue;
                }
                let id = ctx.arg.replace_merged(
                    existing,
                    merged,
                    Arc::clone(precision),
                    parent,
                    edge,
                );
                ctx.reached.remove(location, existing);
                ctx.waitlist.remove(existing);
                ctx.stats.states += 1;
                ctx.stats.merged += 1;
                tracing::debug!("Merged into {} (replaces {}) at {}", id, existing, location);
                ctx.register(id);
                return;
            }
        }

        let id = ctx
            .arg
            .add_child(parent, edge, successor, Arc::clone(precision));
        ctx.stats.states += 1;
        ctx.register(id);
    }
}
