//! Verdict assertions

use cpa_engine::{Counterexample, TargetReason, UnknownReason, Verdict};

/// Assert an Unsafe verdict and return its counterexample
pub fn assert_unsafe(verdict: &Verdict) -> &Counterexample {
    match verdict {
        Verdict::Unsafe(cex) => cex,
        other => panic!("expected UNSAFE, got {}", other),
    }
}

pub fn assert_safe(verdict: &Verdict) {
    assert!(verdict.is_safe(), "expected SAFE, got {}", verdict);
}

/// Assert an Unknown verdict and return its reason
pub fn assert_unknown(verdict: &Verdict) -> &UnknownReason {
    match verdict {
        Verdict::Unknown(reason) => reason,
        other => panic!("expected UNKNOWN, got {}", other),
    }
}

/// Safe or Unsafe
pub fn is_definite(verdict: &Verdict) -> bool {
    verdict.is_safe() || verdict.is_unsafe()
}

/// Does the counterexample name a violation matching `pred`?
pub fn has_reason(cex: &Counterexample, pred: impl Fn(&TargetReason) -> bool) -> bool {
    cex.reasons.iter().any(pred)
}

/// Definite verdicts must agree; Unknown agrees with anything
pub fn consistent(a: &Verdict, b: &Verdict) -> bool {
    !(a.is_safe() && b.is_unsafe() || a.is_unsafe() && b.is_safe())
}
