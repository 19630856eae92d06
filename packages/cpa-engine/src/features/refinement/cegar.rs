/*
 * CEGAR Loop
 *
 * Initialize -> Explore <-> Verify <-> Refine -> Done(Verdict)
 *
 * - Explore: CPA algorithm until a target, an empty frontier or the budget
 * - Verify: SSA path formula of the ARG path, decided by the oracle
 *   - feasible: Unsafe with counterexample
 *   - infeasible: Refine
 *   - timeout / undecided: OracleTimeoutPolicy (abort, or drop the target)
 * - Refine: grow precision, prune, back to Explore
 *
 * Safe is only reported for complete runs; truncated branches and dropped
 * targets turn it into Unknown.
 */

use std::time::Duration;

use super::refiner::Refiner;
use super::verdict::{Counterexample, CounterexampleStep, UnknownReason, Verdict};
use crate::config::{AnalysisConfig, OracleTimeoutPolicy};
use crate::errors::CpaError;
use crate::features::algorithm::{AnalysisContext, CpaAlgorithm, ExploreOutcome};
use crate::features::arg::{ArgNodeId, ArgPath};
use crate::features::oracle::{FeasibilityOracle, Interpolants, Model, OracleVerdict, PathFormula};

/// Phases of the loop
#[derive(Debug)]
pub enum CegarPhase {
    Initialize,
    Explore,
    Verify(ArgNodeId),
    Refine {
        path: ArgPath,
        interpolants: Interpolants,
    },
    Done(Verdict),
}

impl CegarPhase {
    fn name(&self) -> &'static str {
        match self {
            CegarPhase::Initialize => "initialize",
            CegarPhase::Explore => "explore",
            CegarPhase::Verify(_) => "verify",
            CegarPhase::Refine { .. } => "refine",
            CegarPhase::Done(_) => "done",
        }
    }
}

pub struct CegarLoop<'o> {
    oracle: &'o dyn FeasibilityOracle,
    algorithm: CpaAlgorithm,
    refiner: Refiner,
    check_counterexamples: bool,
    oracle_timeout: Option<Duration>,
    on_oracle_timeout: OracleTimeoutPolicy,
}

impl<'o> CegarLoop<'o> {
    pub fn new(config: &AnalysisConfig, oracle: &'o dyn FeasibilityOracle) -> Self {
        let refinement = &config.refinement;
        Self {
            oracle,
            algorithm: CpaAlgorithm::new(&config.exploration),
            refiner: Refiner::new(refinement),
            check_counterexamples: refinement.check_counterexamples,
            oracle_timeout: (refinement.oracle_timeout_ms > 0)
                .then(|| Duration::from_millis(refinement.oracle_timeout_ms)),
            on_oracle_timeout: refinement.on_oracle_timeout,
        }
    }

    /// Drive the phases to a verdict
    pub fn run(&mut self, ctx: &mut AnalysisContext<'_>) -> Verdict {
        let mut phase = CegarPhase::Initialize;
        loop {
            tracing::trace!("CEGAR phase: {}", phase.name());
            phase = match phase {
                CegarPhase::Initialize => {
                    ctx.initialize();
                    CegarPhase::Explore
                }
                CegarPhase::Explore => match self.algorithm.explore(ctx) {
                    ExploreOutcome::Target(target) => CegarPhase::Verify(target),
                    ExploreOutcome::Exhausted => CegarPhase::Done(if ctx.is_incomplete() {
                        Verdict::Unknown(UnknownReason::Incomplete {
                            reasons: ctx.incomplete_reasons(),
                        })
                    } else {
                        Verdict::Safe
                    }),
                    ExploreOutcome::OutOfBudget(reason) => CegarPhase::Done(Verdict::Unknown(reason)),
                },
                CegarPhase::Verify(target) => self.verify(ctx, target),
                CegarPhase::Refine { path, interpolants } => {
                    match self.refiner.refine(ctx, &path, &interpolants) {
                        Ok(_) => CegarPhase::Explore,
                        Err(CpaError::PrecisionDivergence(detail)) => {
                            tracing::warn!("Refinement failed: {}", detail);
                            CegarPhase::Done(Verdict::Unknown(UnknownReason::PrecisionDivergence {
                                detail,
                            }))
                        }
                        Err(other) => CegarPhase::Done(Verdict::Unknown(
                            UnknownReason::PrecisionDivergence {
                                detail: other.to_string(),
                            },
                        )),
                    }
                }
                CegarPhase::Done(verdict) => {
                    ctx.stats.elapsed_ms = ctx.elapsed_ms();
                    tracing::info!("Verdict {} ({})", verdict, ctx.stats().summary());
                    return verdict;
                }
            };
        }
    }

    fn verify(&self, ctx: &mut AnalysisContext<'_>, target: ArgNodeId) -> CegarPhase {
        let Some(path) = ctx.arg().path_to(target) else {
            ctx.drop_target(target, format!("target {} is detached from the root", target));
            return CegarPhase::Explore;
        };

        if !self.check_counterexamples {
            return CegarPhase::Done(Verdict::Unsafe(Box::new(counterexample(
                ctx, &path, None, None,
            ))));
        }

        let formula = PathFormula::from_path(ctx.cfa(), &path.edges);
        ctx.stats.oracle_calls += 1;
        tracing::debug!(
            "Checking path of {} edges to {} with '{}'",
            path.len(),
            target,
            self.oracle.name()
        );

        match self.oracle.check_feasible(&formula, self.oracle_timeout) {
            OracleVerdict::Feasible(model) => {
                tracing::info!("Feasible counterexample of {} edges", path.len());
                CegarPhase::Done(Verdict::Unsafe(Box::new(counterexample(
                    ctx,
                    &path,
                    Some(&formula),
                    Some(model),
                ))))
            }
            OracleVerdict::Infeasible(interpolants) => {
                tracing::debug!("Path to {} is spurious", target);
                CegarPhase::Refine { path, interpolants }
            }
            OracleVerdict::Timeout => {
                let timeout_ms = self.oracle_timeout.map_or(0, |t| t.as_millis() as u64);
                tracing::warn!("Oracle timed out on path to {}", target);
                self.undecided(
                    ctx,
                    target,
                    UnknownReason::OracleTimeout { timeout_ms },
                    format!("oracle timed out on target {}", target),
                )
            }
            OracleVerdict::Unknown(detail) => {
                tracing::warn!("Oracle undecided on path to {}: {}", target, detail);
                let note = format!("oracle undecided on target {}: {}", target, detail);
                self.undecided(ctx, target, UnknownReason::OracleUnknown { detail }, note)
            }
        }
    }

    fn undecided(
        &self,
        ctx: &mut AnalysisContext<'_>,
        target: ArgNodeId,
        reason: UnknownReason,
        note: String,
    ) -> CegarPhase {
        match self.on_oracle_timeout {
            OracleTimeoutPolicy::Abort => CegarPhase::Done(Verdict::Unknown(reason)),
            OracleTimeoutPolicy::Continue => {
                ctx.drop_target(target, note);
                CegarPhase::Explore
            }
        }
    }
}

/// Counterexample for `path`, with concrete values when a model is given
fn counterexample(
    ctx: &AnalysisContext<'_>,
    path: &ArgPath,
    formula: Option<&PathFormula>,
    model: Option<Model>,
) -> Counterexample {
    let cfa = ctx.cfa();
    let steps = path
        .nodes
        .iter()
        .enumerate()
        .map(|(pos, id)| {
            let node = ctx.arg().node(*id);
            let location = cfa.node(node.state.location);
            let concrete = match (formula, &model) {
                (Some(f), Some(m)) => f.valuation_at(m, pos),
                _ => Default::default(),
            };
            CounterexampleStep {
                node: location.id,
                function: location.function.clone(),
                label: location.label.clone(),
                edge: pos
                    .checked_sub(1)
                    .map(|i| cfa.edge(path.edges[i]).to_string()),
                valuation: ctx.domain().valuations(&node.state),
                concrete,
            }
        })
        .collect();

    let (target, reasons) = match path.last() {
        Some(last) => {
            let node = ctx.arg().node(last);
            (node.state.location, node.targets.clone())
        }
        None => (cfa.entry(), Vec::new()),
    };
    Counterexample {
        steps,
        target,
        reasons,
        model,
    }
}
