//! Verification benchmarks
//!
//! - Straight-line programs of growing length (exploration cost)
//! - Lockstep counters (CEGAR with refinement)
//! - Waitlist orders on the same program
//! - Config presets from YAML

use cpa_engine::config::{AnalysisConfig, Preset, WaitlistOrder};
use cpa_engine::shared::models::{Cfa, CfaBuilder};
use cpa_engine::{verify, Verifier};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

// ============================================================================
// Programs
// ============================================================================

/// `x = 0; x = x + 1; ...; if (x != n) ERROR`
fn straight_line(n: usize) -> Cfa {
    let mut b = CfaBuilder::new();
    let mut at = b.function("main", &[]);
    let first = b.node("main");
    b.assign(at, first, "x", "0").unwrap();
    at = first;
    for _ in 0..n {
        let next = b.node("main");
        b.assign(at, next, "x", "x + 1").unwrap();
        at = next;
    }
    let err = b.labeled_node("main", "ERROR");
    let end = b.node("main");
    let cond = format!("x != {}", n);
    b.assume(at, err, &cond, true).unwrap();
    b.assume(at, end, &cond, false).unwrap();
    b.build().unwrap()
}

fn lockstep_counters() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    let head = b.node("main");
    let body = b.node("main");
    let step = b.node("main");
    let after = b.node("main");
    let err = b.labeled_node("main", "ERROR");
    let end = b.node("main");
    b.assign(n0, n1, "i", "0").unwrap();
    b.assign(n1, n2, "j", "0").unwrap();
    b.assign(n2, head, "n", "nondet()").unwrap();
    b.assume(head, body, "i < n", true).unwrap();
    b.assign(body, step, "i", "i + 1").unwrap();
    b.assign(step, head, "j", "j + 1").unwrap();
    b.assume(head, after, "i < n", false).unwrap();
    b.assume(after, err, "i != j", true).unwrap();
    b.assume(after, end, "i != j", false).unwrap();
    b.build().unwrap()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_straight_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("straight_line");

    for n in [8, 32, 128] {
        let cfa = straight_line(n);
        let target = cfa.labeled("ERROR").unwrap();
        let config = AnalysisConfig::default().value(|v| v.track("x"));
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &cfa, |b, cfa| {
            b.iter(|| black_box(verify(cfa, &[target], &config).unwrap()));
        });
    }

    group.finish();
}

fn bench_cegar_counters(c: &mut Criterion) {
    let cfa = lockstep_counters();
    c.bench_function("cegar_lockstep_counters", |b| {
        b.iter(|| {
            let report = Verifier::new(&cfa).target_label("ERROR").run().unwrap();
            black_box(report)
        });
    });
}

fn bench_waitlist_orders(c: &mut Criterion) {
    let mut group = c.benchmark_group("waitlist_order");
    let cfa = lockstep_counters();

    for order in [
        WaitlistOrder::Bfs,
        WaitlistOrder::Dfs,
        WaitlistOrder::ReversePostorder,
        WaitlistOrder::LoopDepthFirst,
    ] {
        let config = AnalysisConfig::default().exploration(|e| e.order(order));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", order)),
            &config,
            |b, config| {
                b.iter(|| {
                    let report = Verifier::new(&cfa)
                        .config(config.clone())
                        .target_label("ERROR")
                        .run()
                        .unwrap();
                    black_box(report.verdict)
                });
            },
        );
    }

    group.finish();
}

fn bench_config_yaml(c: &mut Criterion) {
    let yaml = AnalysisConfig::preset(Preset::Thorough).to_yaml().unwrap();
    c.bench_function("config_from_yaml", |b| {
        b.iter(|| black_box(AnalysisConfig::from_yaml_str(black_box(&yaml)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_straight_line,
    bench_cegar_counters,
    bench_waitlist_orders,
    bench_config_yaml
);
criterion_main!(benches);
