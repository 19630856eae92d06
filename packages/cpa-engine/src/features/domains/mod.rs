/*
 * Abstract Domains
 *
 * - ports: AbstractDomain capability interface, Transfer, TargetReason
 * - value: intervals + predicate abstraction (refined by CEGAR)
 * - shape: heap regions and memory safety
 * - automaton: specification monitors + held locks
 * - taint: explicit secret/public flows
 * - callstack: interprocedural context
 */

pub mod automaton;
pub mod callstack;
pub mod ports;
pub mod shape;
pub mod taint;
pub mod value;

pub use automaton::{AutomatonDomain, AutomatonState};
pub use callstack::{CallStackDomain, CallStackState};
pub use ports::{AbstractDomain, TargetReason, Transfer};
pub use shape::{MemoryProperty, ShapeDomain, ShapeState};
pub use taint::{SecurityLabel, TaintDomain, TaintState};
pub use value::{ValueDomain, ValueState};
