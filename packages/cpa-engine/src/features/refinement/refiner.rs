//! Precision refiner
//!
//! Turns the interpolants of a refuted path into a larger precision and
//! prunes the part of the ARG that was computed under a precision lacking
//! them.
//!
//! Predicates are tracked one atom at a time, so a disjunctive interpolant
//! can leave every atom undecided and the same path comes back. The second
//! refutation of a path under `Predicates` therefore tracks the
//! interpolant's variables explicitly. Any further refutation, a missing
//! pivot or the refinement bound ends the run as divergent.

use rustc_hash::FxHashMap;
use std::collections::BTreeSet;

use crate::config::{RefinementConfig, RefinementStrategy, RestartPolicy};
use crate::errors::{CpaError, Result};
use crate::features::algorithm::AnalysisContext;
use crate::features::arg::ArgPath;
use crate::features::composite::DomainKind;
use crate::features::oracle::{Constraint, Interpolants};
use crate::shared::models::{CfaEdgeId, VarName};

/// Result of one successful refinement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    /// Path position (0 = root) below which exploration restarts
    pub pivot: usize,
    /// Predicates or variables new to the global precision
    pub added: usize,
    /// What this round added; may differ from the configured strategy
    pub strategy: RefinementStrategy,
    pub precision_version: u32,
}

#[derive(Debug)]
pub struct Refiner {
    strategy: RefinementStrategy,
    restart: RestartPolicy,
    max_refinements: usize,
    rounds: usize,
    /// Refuted edge sequences and the strategy last applied to each
    refuted: FxHashMap<Vec<CfaEdgeId>, RefinementStrategy>,
}

impl Refiner {
    pub fn new(config: &RefinementConfig) -> Self {
        Self {
            strategy: config.strategy,
            restart: config.restart,
            max_refinements: config.max_refinements,
            rounds: 0,
            refuted: FxHashMap::default(),
        }
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Variables mentioned by a set of interpolant atoms
    fn variables(atoms: &BTreeSet<Constraint>) -> BTreeSet<VarName> {
        atoms.iter().flat_map(|c| c.vars()).collect()
    }

    /// First path position whose node was computed under a precision
    /// lacking that position's interpolant
    fn pivot(
        ctx: &AnalysisContext<'_>,
        path: &ArgPath,
        interpolants: &Interpolants,
        strategy: RefinementStrategy,
    ) -> Option<usize> {
        path.nodes.iter().enumerate().position(|(pos, id)| {
            let Some(atoms) = interpolants.at(pos) else {
                return false;
            };
            if atoms.is_empty() {
                return false;
            }
            let node_precision = &ctx.arg().node(*id).precision;
            match strategy {
                RefinementStrategy::Predicates => !node_precision.includes_predicates(atoms),
                RefinementStrategy::TrackedVariables => {
                    !node_precision.includes_tracked(&Self::variables(atoms))
                }
            }
        })
    }

    /// Grow the precision so that `path` is excluded and restart exploration
    pub fn refine(
        &mut self,
        ctx: &mut AnalysisContext<'_>,
        path: &ArgPath,
        interpolants: &Interpolants,
    ) -> Result<Refinement> {
        if !ctx.domain().has(DomainKind::Value) {
            return Err(CpaError::divergence(
                "spurious counterexample but no value domain to refine",
            ));
        }
        if self.rounds >= self.max_refinements {
            return Err(CpaError::divergence(format!(
                "refinement bound of {} rounds reached",
                self.max_refinements
            )));
        }
        if interpolants.is_empty() {
            return Err(CpaError::divergence("oracle returned no interpolants"));
        }

        let mut strategy = match (self.strategy, self.refuted.get(&path.edges)) {
            (configured, None) => configured,
            (RefinementStrategy::Predicates, Some(RefinementStrategy::Predicates)) => {
                tracing::debug!(
                    "Path of {} edges refuted again under predicates, tracking its variables",
                    path.len()
                );
                RefinementStrategy::TrackedVariables
            }
            _ => {
                return Err(CpaError::divergence(format!(
                    "path of {} edges refuted twice",
                    path.len()
                )));
            }
        };

        let mut pivot = Self::pivot(ctx, path, interpolants, strategy);
        if pivot.is_none() && strategy == RefinementStrategy::Predicates {
            strategy = RefinementStrategy::TrackedVariables;
            pivot = Self::pivot(ctx, path, interpolants, strategy);
        }
        let Some(pivot) = pivot else {
            return Err(CpaError::divergence(
                "interpolants add nothing to the precision along the path",
            ));
        };
        self.refuted.insert(path.edges.clone(), strategy);

        let mut precision = ctx.precision().as_ref().clone();
        let added = match strategy {
            RefinementStrategy::Predicates => precision.add_predicates(interpolants.all().iter()),
            RefinementStrategy::TrackedVariables => {
                let vars = Self::variables(&interpolants.all());
                precision.add_tracked(vars.iter())
            }
        };
        let precision_version = precision.version();
        ctx.set_precision(precision);
        self.rounds += 1;
        ctx.stats.refinements += 1;

        tracing::info!(
            "Refinement {}: +{} ({:?}), pivot at position {} of {}, precision {}",
            self.rounds,
            added,
            strategy,
            pivot,
            path.len(),
            ctx.precision()
        );

        match self.restart {
            RestartPolicy::Pivot if pivot > 0 => {
                ctx.prune(path.nodes[pivot]);
            }
            _ => {
                tracing::debug!("Restarting exploration from the root");
                ctx.initialize();
            }
        }

        Ok(Refinement {
            pivot,
            added,
            strategy,
            precision_version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::features::algorithm::{CpaAlgorithm, ExploreOutcome};
    use crate::features::composite::CompositeDomain;
    use crate::features::oracle::{FeasibilityOracle, LinearArithmeticOracle, OracleVerdict, PathFormula};
    use crate::features::precision::Precision;
    use crate::shared::models::{Cfa, CfaBuilder};

    /// x = 5; if (x > 10) ERROR
    fn spurious() -> Cfa {
        let mut b = CfaBuilder::new();
        let n0 = b.function("main", &[]);
        let n1 = b.node("main");
        let err = b.labeled_node("main", "ERROR");
        let end = b.node("main");
        b.assign(n0, n1, "x", "5").unwrap();
        b.assume(n1, err, "x > 10", true).unwrap();
        b.assume(n1, end, "x > 10", false).unwrap();
        b.build().unwrap()
    }

    struct Refuted {
        first: Result<Refinement>,
        second: Result<Refinement>,
        third: Result<Refinement>,
        rounds: u64,
        exhausted: bool,
    }

    /// Refine the same spurious path three times, then explore again
    fn refute(config: &AnalysisConfig) -> Refuted {
        let cfa = spurious();
        let target = cfa.labeled("ERROR").unwrap();
        let domain = CompositeDomain::from_config(config, &cfa).unwrap();
        let mut ctx = AnalysisContext::new(
            &cfa,
            domain,
            &[target],
            Precision::seeded(&config.value).unwrap(),
            config.exploration.order,
        );
        ctx.initialize();
        let algorithm = CpaAlgorithm::new(&config.exploration);
        let ExploreOutcome::Target(t) = algorithm.explore(&mut ctx) else {
            panic!("expected a target");
        };
        let path = ctx.arg().path_to(t).unwrap();
        let formula = PathFormula::from_path(&cfa, &path.edges);
        let OracleVerdict::Infeasible(itp) = LinearArithmeticOracle::new().check_feasible(&formula, None)
        else {
            panic!("expected infeasible path");
        };

        let mut refiner = Refiner::new(&config.refinement);
        let first = refiner.refine(&mut ctx, &path, &itp);
        let second = refiner.refine(&mut ctx, &path, &itp);
        let third = refiner.refine(&mut ctx, &path, &itp);
        let exhausted = algorithm.explore(&mut ctx) == ExploreOutcome::Exhausted;
        Refuted {
            first,
            second,
            third,
            rounds: ctx.stats().refinements,
            exhausted,
        }
    }

    #[test]
    fn test_predicate_refinement_excludes_path() {
        let r = refute(&AnalysisConfig::default());
        let refinement = r.first.unwrap();
        assert!(refinement.added > 0);
        assert!(refinement.pivot > 0);
        assert_eq!(refinement.strategy, RefinementStrategy::Predicates);
        assert!(r.exhausted);
    }

    #[test]
    fn test_repeated_path_falls_back_to_tracking() {
        let r = refute(&AnalysisConfig::default());
        let fallback = r.second.unwrap();
        assert_eq!(fallback.strategy, RefinementStrategy::TrackedVariables);
        assert_eq!(fallback.added, 1);
        assert!(matches!(r.third, Err(CpaError::PrecisionDivergence(_))));
        assert_eq!(r.rounds, 2);
        assert!(r.exhausted);
    }

    #[test]
    fn test_tracked_variable_refinement() {
        let config = AnalysisConfig::default()
            .refinement(|r| r.strategy(RefinementStrategy::TrackedVariables));
        let r = refute(&config);
        assert_eq!(r.first.unwrap().added, 1);
        assert!(matches!(r.second, Err(CpaError::PrecisionDivergence(_))));
        assert_eq!(r.rounds, 1);
        assert!(r.exhausted);
    }

    #[test]
    fn test_root_restart() {
        let config = AnalysisConfig::default().refinement(|r| r.restart(RestartPolicy::Root));
        let r = refute(&config);
        assert!(r.first.is_ok());
        assert!(r.exhausted);
    }

    #[test]
    fn test_refinement_bound() {
        let config = AnalysisConfig::default().refinement(|r| r.max_refinements(0));
        let r = refute(&config);
        assert!(matches!(r.first, Err(CpaError::PrecisionDivergence(_))));
        assert_eq!(r.rounds, 0);
    }
}
