//! Property-based tests
//!
//! Invariants that should hold for ALL generated programs and configs:
//! - Determinism: the same run twice gives the same verdict
//! - Completeness: loop-free programs and bounded counter loops always get
//!   a definite verdict, and it matches concrete execution
//! - Order independence: waitlist orders never contradict each other
//! - Coverage soundness: stopping at covered states never changes a
//!   definite verdict
//! - Config roundtrip: YAML export parses back to the same config

mod common;

use common::{bounded_counter, consistent, is_definite};
use cpa_engine::config::*;
use cpa_engine::shared::models::{Cfa, CfaBuilder, CfaNodeId};
use cpa_engine::{verify, Verdict};
use proptest::prelude::*;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use std::collections::BTreeMap;

// ============================================================================
// Loop-free program generator
// ============================================================================

const VARS: [&str; 2] = ["x", "y"];

#[derive(Debug, Clone)]
enum Op {
    /// v = c
    Set(usize, i64),
    /// v = v + c
    Add(usize, i64),
    /// if (v < c) { v = v + 1 }
    Branch(usize, i64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..2usize, -3..4i64).prop_map(|(v, c)| Op::Set(v, c)),
        (0..2usize, -2..3i64).prop_map(|(v, c)| Op::Add(v, c)),
        (0..2usize, -3..4i64).prop_map(|(v, c)| Op::Branch(v, c)),
    ]
}

#[derive(Debug, Clone)]
struct Program {
    ops: Vec<Op>,
    /// ERROR guarded by `x == goal`
    goal: i64,
}

fn program_strategy() -> impl Strategy<Value = Program> {
    (prop::collection::vec(op_strategy(), 1..6), -3..5i64)
        .prop_map(|(ops, goal)| Program { ops, goal })
}

impl Program {
    fn build(&self) -> (Cfa, CfaNodeId) {
        let mut b = CfaBuilder::new();
        let n0 = b.function("main", &[]);
        let n1 = b.node("main");
        let mut at = b.node("main");
        b.assign(n0, n1, "x", "0").unwrap();
        b.assign(n1, at, "y", "0").unwrap();

        for op in &self.ops {
            let next = b.node("main");
            match op {
                Op::Set(v, c) => {
                    b.assign(at, next, VARS[*v], &c.to_string()).unwrap();
                }
                Op::Add(v, c) => {
                    b.assign(at, next, VARS[*v], &format!("{} + {}", VARS[*v], c))
                        .unwrap();
                }
                Op::Branch(v, c) => {
                    let then = b.node("main");
                    let cond = format!("{} < {}", VARS[*v], c);
                    b.assume(at, then, &cond, true).unwrap();
                    b.assign(then, next, VARS[*v], &format!("{} + 1", VARS[*v]))
                        .unwrap();
                    b.assume(at, next, &cond, false).unwrap();
                }
            }
            at = next;
        }

        let err = b.labeled_node("main", "ERROR");
        let end = b.node("main");
        let goal = format!("x == {}", self.goal);
        b.assume(at, err, &goal, true).unwrap();
        b.assume(at, end, &goal, false).unwrap();
        (b.build().unwrap(), err)
    }

    /// Concrete execution: the program is deterministic
    fn reaches_error(&self) -> bool {
        let mut env: BTreeMap<usize, i64> = BTreeMap::from([(0, 0), (1, 0)]);
        for op in &self.ops {
            match op {
                Op::Set(v, c) => {
                    env.insert(*v, *c);
                }
                Op::Add(v, c) => *env.entry(*v).or_default() += c,
                Op::Branch(v, c) => {
                    if env[v] < *c {
                        *env.entry(*v).or_default() += 1;
                    }
                }
            }
        }
        env[&0] == self.goal
    }
}

fn run(cfa: &Cfa, target: CfaNodeId, config: &AnalysisConfig) -> Verdict {
    verify(cfa, &[target], config).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_verdict_is_deterministic(program in program_strategy()) {
        let (cfa, target) = program.build();
        let config = AnalysisConfig::default();
        prop_assert_eq!(run(&cfa, target, &config), run(&cfa, target, &config));
    }

    #[test]
    fn prop_definite_verdicts_match_execution(program in program_strategy()) {
        let (cfa, target) = program.build();
        let verdict = run(&cfa, target, &AnalysisConfig::default());
        match verdict {
            Verdict::Safe => prop_assert!(!program.reaches_error()),
            Verdict::Unsafe(_) => prop_assert!(program.reaches_error()),
            Verdict::Unknown(reason) => prop_assert!(false, "undecided: {}", reason),
        }
    }

    #[test]
    fn prop_waitlist_orders_never_contradict(program in program_strategy()) {
        let (cfa, target) = program.build();
        let verdicts: Vec<Verdict> = [
            WaitlistOrder::Bfs,
            WaitlistOrder::Dfs,
            WaitlistOrder::ReversePostorder,
            WaitlistOrder::LoopDepthFirst,
        ]
        .into_iter()
        .map(|order| run(&cfa, target, &AnalysisConfig::default().exploration(|e| e.order(order))))
        .collect();
        for v in &verdicts {
            prop_assert!(is_definite(v), "undecided: {}", v);
            prop_assert!(consistent(&verdicts[0], v), "{} vs {}", verdicts[0], v);
        }
    }

    #[test]
    fn prop_coverage_is_sound(program in program_strategy()) {
        let (cfa, target) = program.build();
        let with_stop = run(&cfa, target, &AnalysisConfig::default());
        let without_stop = run(
            &cfa,
            target,
            &AnalysisConfig::default().exploration(|e| e.stop(StopPolicy::Never)),
        );
        prop_assert!(is_definite(&without_stop), "undecided: {}", without_stop);
        prop_assert!(consistent(&with_stop, &without_stop), "{} vs {}", with_stop, without_stop);
    }

    #[test]
    fn prop_bounded_loops_are_decided(bound in 0..8i64, offset in -2..3i64, exact in any::<bool>()) {
        // i == bound on loop exit
        let goal = bound + offset;
        let check = if exact {
            format!("i != {}", goal)
        } else {
            format!("i == {}", goal)
        };
        let cfa = bounded_counter(bound, &check);
        let target = cfa.labeled("ERROR").unwrap();
        let reaches_error = if exact { goal != bound } else { goal == bound };

        match run(&cfa, target, &AnalysisConfig::default()) {
            Verdict::Safe => prop_assert!(!reaches_error, "{} reported safe", check),
            Verdict::Unsafe(_) => prop_assert!(reaches_error, "{} reported unsafe", check),
            Verdict::Unknown(reason) => prop_assert!(false, "{}: undecided: {}", check, reason),
        }
    }
}

// ============================================================================
// QuickCheck: configuration
// ============================================================================

#[quickcheck]
fn qc_exploration_budget_ranges(max_steps: u64, time_limit_ms: u64) -> TestResult {
    if max_steps == 0 || max_steps > 100_000_000 || time_limit_ms > 86_400_000 {
        return TestResult::discard();
    }
    let config = ExplorationConfig::default()
        .max_steps(max_steps)
        .time_limit_ms(time_limit_ms);
    TestResult::from_bool(config.validate().is_ok())
}

#[quickcheck]
fn qc_yaml_roundtrip(preset_idx: u8, max_refinements: usize, parallel: bool) -> TestResult {
    if max_refinements == 0 || max_refinements > 100_000 {
        return TestResult::discard();
    }
    let preset = match preset_idx % 3 {
        0 => Preset::Fast,
        1 => Preset::Balanced,
        _ => Preset::Thorough,
    };
    let config = AnalysisConfig::preset(preset)
        .exploration(|e| e.parallel_transfer(parallel))
        .refinement(|r| r.max_refinements(max_refinements));

    let yaml = match config.to_yaml() {
        Ok(y) => y,
        Err(_) => return TestResult::failed(),
    };
    match AnalysisConfig::from_yaml_str(&yaml) {
        Ok(parsed) => TestResult::from_bool(
            parsed.preset == preset
                && parsed.refinement.max_refinements == max_refinements
                && parsed.exploration == config.exploration
                && parsed.to_yaml().ok() == Some(yaml),
        ),
        Err(_) => TestResult::failed(),
    }
}
