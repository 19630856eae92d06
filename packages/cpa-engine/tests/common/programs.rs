//! Small programs used across the integration tests
//!
//! Every builder returns a validated CFA; target locations carry the label
//! `ERROR`.

use cpa_engine::shared::models::{Cfa, CfaBuilder};

/// `init(); unlock();`
pub fn lock_misuse() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    b.call(n0, n1, "init", &[], None).unwrap();
    b.call(n1, n2, "unlock", &[], None).unwrap();
    b.build().unwrap()
}

/// `init(); lock(); unlock(); lock();`
pub fn lock_discipline() -> Cfa {
    let mut b = CfaBuilder::new();
    let mut prev = b.function("main", &[]);
    for f in ["init", "lock", "unlock", "lock"] {
        let next = b.node("main");
        b.call(prev, next, f, &[], None).unwrap();
        prev = next;
    }
    b.build().unwrap()
}

/// ```text
/// i = 0; j = 0; n = nondet();
/// while (i < n) { i = i + 1; j = j + 1; }
/// if (i != j) ERROR;
/// ```
pub fn lockstep_counters() -> Cfa {
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

/// Same loop, but `j` advances by two, so the counters drift apart after
/// one iteration
pub fn drifting_counters() -> Cfa {
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
    b.assign(step, head, "j", "j + 2").unwrap();
    b.assume(head, after, "i < n", false).unwrap();
    b.assume(after, err, "i != j", true).unwrap();
    b.assume(after, end, "i != j", false).unwrap();
    b.build().unwrap()
}

/// ```text
/// i = 0;
/// while (i < bound) i = i + 1;
/// if (check) ERROR;
/// ```
pub fn bounded_counter(bound: i64, check: &str) -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let head = b.node("main");
    let body = b.node("main");
    let after = b.node("main");
    let err = b.labeled_node("main", "ERROR");
    let end = b.node("main");
    let guard = format!("i < {}", bound);
    b.assign(n0, head, "i", "0").unwrap();
    b.assume(head, body, &guard, true).unwrap();
    b.assign(body, head, "i", "i + 1").unwrap();
    b.assume(head, after, &guard, false).unwrap();
    b.assume(after, err, check, true).unwrap();
    b.assume(after, end, check, false).unwrap();
    b.build().unwrap()
}

/// `secret = nondet(); public = secret;`
pub fn secret_to_public() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    b.assign(n0, n1, "secret", "nondet()").unwrap();
    b.assign(n1, n2, "public", "secret").unwrap();
    b.build().unwrap()
}

/// `secret = nondet(); public = 0; public = public + 1;`
pub fn public_only() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    let n3 = b.node("main");
    b.assign(n0, n1, "secret", "nondet()").unwrap();
    b.assign(n1, n2, "public", "0").unwrap();
    b.assign(n2, n3, "public", "public + 1").unwrap();
    b.build().unwrap()
}

/// `p = malloc(4); *p = secret; public = *p;`
pub fn secret_through_memory() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    let n3 = b.node("main");
    b.call(n0, n1, "malloc", &["4"], Some("p")).unwrap();
    b.assign(n1, n2, "*p", "secret").unwrap();
    b.assign(n2, n3, "public", "*p").unwrap();
    b.build().unwrap()
}

/// `p = malloc(8); free(p); free(p);`
pub fn double_free() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    let n3 = b.node("main");
    b.call(n0, n1, "malloc", &["8"], Some("p")).unwrap();
    b.call(n1, n2, "free", &["p"], None).unwrap();
    b.call(n2, n3, "free", &["p"], None).unwrap();
    b.build().unwrap()
}

/// `p = malloc(8); free(p);`
pub fn single_free() -> Cfa {
    let mut b = CfaBuilder::new();
    let n0 = b.function("main", &[]);
    let n1 = b.node("main");
    let n2 = b.node("main");
    b.call(n0, n1, "malloc", &["8"], Some("p")).unwrap();
    b.call(n1, n2, "free", &["p"], None).unwrap();
    b.build().unwrap()
}

/// ```text
/// int f(int a) { return a + 1; }
/// f(1); if (f::__retval == 2) ERROR;
/// ```
pub fn call_then_check() -> Cfa {
    let mut b = CfaBuilder::new();
    let m0 = b.function("main", &[]);
    let f0 = b.function("f", &["f::a"]);
    let f1 = b.node("f");
    b.set_exit("f", f1);
    b.assign(f0, f1, "f::__retval", "f::a + 1").unwrap();
    let m1 = b.node("main");
    let err = b.labeled_node("main", "ERROR");
    b.function_call(m0, "f", &[("f::a", "1")], m1).unwrap();
    b.function_return(f1, "f", m1);
    b.assume(m1, err, "f::__retval == 2", true).unwrap();
    b.build().unwrap()
}

/// `void f() { f(); }  f();`
pub fn unbounded_recursion() -> Cfa {
    let mut b = CfaBuilder::new();
    let m0 = b.function("main", &[]);
    let f0 = b.function("f", &[]);
    let f1 = b.node("f");
    b.set_exit("f", f1);
    let m1 = b.node("main");
    b.function_call(m0, "f", &[], m1).unwrap();
    b.function_call(f0, "f", &[], f1).unwrap();
    b.function_return(f1, "f", m1);
    b.function_return(f1, "f", f1);
    b.build().unwrap()
}
