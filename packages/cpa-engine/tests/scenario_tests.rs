//! End-to-end verification scenarios
//!
//! One test per domain plus the interplay of exploration and refinement:
//! - lock discipline (built-in and YAML automata)
//! - lockstep counters proved by predicate refinement
//! - taint leak into a public sink
//! - double free
//! - interprocedural paths and recursion bounds

mod common;

use common::*;
use cpa_engine::config::{AnalysisConfig, MergePolicy, Preset, StopPolicy, WaitlistOrder};
use cpa_engine::features::domains::automaton::BuiltinAutomaton;
use cpa_engine::features::domains::shape::MemoryProperty;
use cpa_engine::{verify, DomainKind, TargetReason, UnknownReason, Verdict, Verifier};
use pretty_assertions::assert_eq;

fn lock_config() -> AnalysisConfig {
    AnalysisConfig::default()
        .domains(&[DomainKind::Automaton])
        .automata(|a| a.builtin(BuiltinAutomaton::LockDiscipline))
}

// ============================================================================
// Lock discipline
// ============================================================================

#[test]
fn test_unlock_without_lock_is_unsafe() {
    let cfa = lock_misuse();
    let verdict = verify(&cfa, &[], &lock_config()).unwrap();

    let cex = assert_unsafe(&verdict);
    assert_eq!(cex.edge_descriptions(), vec!["init()", "unlock()"]);
    assert!(has_reason(cex, |r| matches!(
        r,
        TargetReason::AutomatonError { automaton, .. } if automaton == "LockDiscipline"
    )));
    assert!(cex.is_confirmed());
}

#[test]
fn test_ending_locked_is_safe() {
    let cfa = lock_discipline();
    let verdict = verify(&cfa, &[], &lock_config()).unwrap();
    assert_safe(&verdict);
}

#[test]
fn test_yaml_automaton_matches_builtin() {
    let config = AnalysisConfig::from_yaml_str(
        r#"
version: 1
domains: [automaton]
automata:
  specifications:
    - automaton: NoUnlockAfterInit
      states: [Start, Ready, Error]
      initial_state: Start
      error_states: [Error]
      transitions:
        - from: Start
          trigger: { kind: call, function: init }
          to: Ready
        - from: Ready
          trigger: { kind: call, function: unlock }
          to: Error
"#,
    )
    .unwrap();

    let verdict = verify(&lock_misuse(), &[], &config).unwrap();
    let cex = assert_unsafe(&verdict);
    assert!(has_reason(cex, |r| matches!(
        r,
        TargetReason::AutomatonError { state, .. } if state == "Error"
    )));
}

// ============================================================================
// Value domain + refinement
// ============================================================================

#[test]
fn test_lockstep_counters_are_safe() {
    let cfa = lockstep_counters();
    let report = Verifier::new(&cfa).target_label("ERROR").run().unwrap();

    assert_safe(&report.verdict);
    assert!(report.stats.refinements >= 1);
    assert!(!report.precision.value.predicates.is_empty());
}

#[test]
fn test_drifting_counters_are_unsafe() {
    let cfa = drifting_counters();
    let report = Verifier::new(&cfa).target_label("ERROR").run().unwrap();

    let cex = assert_unsafe(&report.verdict);
    assert!(cex.edge_descriptions().contains(&"j = j + 2".to_string()));
    let last = cex.steps.last().unwrap();
    assert_eq!(last.label.as_deref(), Some("ERROR"));
    assert_ne!(last.concrete["i"], last.concrete["j"]);
}

#[test]
fn test_exact_exit_bounded_loops_are_safe() {
    for (bound, check) in [(2, "i != 2"), (3, "i != 3"), (10, "i != 10"), (5, "i > 5")] {
        let cfa = bounded_counter(bound, check);
        let report = Verifier::new(&cfa).target_label("ERROR").run().unwrap();
        assert!(report.verdict.is_safe(), "bound {}, {}: {}", bound, check, report.verdict);
    }
}

#[test]
fn test_off_by_one_loop_is_unsafe() {
    let cfa = bounded_counter(3, "i == 3");
    let report = Verifier::new(&cfa).target_label("ERROR").run().unwrap();
    let cex = assert_unsafe(&report.verdict);
    assert_eq!(cex.steps.last().unwrap().concrete["i"], 3);
}

#[test]
fn test_waitlist_orders_agree() {
    for cfa in [lockstep_counters(), drifting_counters()] {
        let verdicts: Vec<Verdict> = [
            WaitlistOrder::Bfs,
            WaitlistOrder::Dfs,
            WaitlistOrder::ReversePostorder,
            WaitlistOrder::LoopDepthFirst,
        ]
        .into_iter()
        .map(|order| {
            let config = AnalysisConfig::default().exploration(|e| e.order(order));
            Verifier::new(&cfa)
                .config(config)
                .target_label("ERROR")
                .run()
                .unwrap()
                .verdict
        })
        .collect();

        for v in &verdicts[1..] {
            assert_eq!(v.is_safe(), verdicts[0].is_safe());
            assert_eq!(v.is_unsafe(), verdicts[0].is_unsafe());
        }
    }
}

#[test]
fn test_join_merge_keeps_verdict() {
    let cfa = lockstep_counters();
    let config = AnalysisConfig::default().exploration(|e| e.merge(MergePolicy::Join));
    let report = Verifier::new(&cfa)
        .config(config)
        .target_label("ERROR")
        .run()
        .unwrap();
    assert!(!report.verdict.is_unsafe(), "{}", report.verdict);
}

#[test]
fn test_refinement_bound_is_unknown() {
    let cfa = lockstep_counters();
    // proving the counters takes two rounds
    let config = AnalysisConfig::default()
        .exploration(|e| e.order(WaitlistOrder::Bfs))
        .refinement(|r| r.max_refinements(1));
    let verdict = Verifier::new(&cfa)
        .config(config)
        .target_label("ERROR")
        .run()
        .unwrap()
        .verdict;
    assert!(matches!(
        assert_unknown(&verdict),
        UnknownReason::PrecisionDivergence { .. }
    ));
}

#[test]
fn test_step_budget_is_unknown() {
    let cfa = lockstep_counters();
    let config = AnalysisConfig::preset(Preset::Fast)
        .exploration(|e| e.max_steps(3).stop(StopPolicy::Never));
    let verdict = Verifier::new(&cfa)
        .config(config)
        .target_label("ERROR")
        .run()
        .unwrap()
        .verdict;
    assert!(matches!(
        assert_unknown(&verdict),
        UnknownReason::StepLimit { .. }
    ));
}

// ============================================================================
// Taint
// ============================================================================

#[test]
fn test_secret_flows_to_public() {
    let config = AnalysisConfig::default()
        .domains(&[DomainKind::Value, DomainKind::Taint])
        .taint(|t| t.secret("secret").public_sink("public"));
    let verdict = verify(&secret_to_public(), &[], &config).unwrap();

    let cex = assert_unsafe(&verdict);
    assert_eq!(cex.edge_descriptions().last().unwrap(), "public = secret");
    assert!(has_reason(cex, |r| matches!(
        r,
        TargetReason::TaintLeak { sink, .. } if sink == "public"
    )));
}

#[test]
fn test_secret_stored_in_memory_reaches_public() {
    let config = AnalysisConfig::default()
        .domains(&[DomainKind::Taint])
        .taint(|t| t.secret("secret").public_sink("public"));
    let verdict = verify(&secret_through_memory(), &[], &config).unwrap();

    let cex = assert_unsafe(&verdict);
    assert_eq!(cex.edge_descriptions().last().unwrap(), "public = *p");
    assert!(has_reason(cex, |r| matches!(
        r,
        TargetReason::TaintLeak { sink, .. } if sink == "public"
    )));
}

#[test]
fn test_public_computation_is_safe() {
    let config = AnalysisConfig::default()
        .domains(&[DomainKind::Taint])
        .taint(|t| t.secret("secret").public_sink("public"));
    let verdict = verify(&public_only(), &[], &config).unwrap();
    assert_safe(&verdict);
}

// ============================================================================
// Memory safety
// ============================================================================

#[test]
fn test_double_free_is_unsafe() {
    let config = AnalysisConfig::default().domains(&[DomainKind::Shape]);
    let verdict = verify(&double_free(), &[], &config).unwrap();

    let cex = assert_unsafe(&verdict);
    assert_eq!(cex.len(), 3);
    assert!(has_reason(cex, |r| matches!(
        r,
        TargetReason::MemorySafety {
            property: MemoryProperty::DoubleFree,
            ..
        }
    )));
}

#[test]
fn test_single_free_is_safe() {
    let config = AnalysisConfig::default()
        .domains(&[DomainKind::Shape])
        .shape(|s| s.check_all());
    let verdict = verify(&single_free(), &[], &config).unwrap();
    assert_safe(&verdict);
}

// ============================================================================
// Interprocedural
// ============================================================================

#[test]
fn test_call_result_reaches_target() {
    let cfa = call_then_check();
    let report = Verifier::new(&cfa).target_label("ERROR").run().unwrap();

    let cex = assert_unsafe(&report.verdict);
    let edges = cex.edge_descriptions();
    assert_eq!(edges[0], "f(1)");
    assert!(edges.contains(&"return from f".to_string()));
}

#[test]
fn test_recursion_bound_makes_run_incomplete() {
    let cfa = unbounded_recursion();
    let config = AnalysisConfig::default().callstack(|c| c.max_depth(3));
    let report = Verifier::new(&cfa).config(config).run().unwrap();

    assert!(matches!(
        assert_unknown(&report.verdict),
        UnknownReason::Incomplete { .. }
    ));
    assert!(report.stats.truncated >= 1);
}

#[test]
fn test_report_serializes() {
    let cfa = lock_misuse();
    let report = Verifier::new(&cfa).config(lock_config()).run().unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["verdict"]["verdict"], "unsafe");
    assert_eq!(json["verdict"]["detail"]["steps"].as_array().unwrap().len(), 3);
    assert!(json["stats"]["steps"].as_u64().unwrap() >= 1);
}
