//! CEGAR: verdicts, counterexample verification and precision refinement

pub mod cegar;
pub mod refiner;
pub mod verdict;

pub use cegar::{CegarLoop, CegarPhase};
pub use refiner::{Refinement, Refiner};
pub use verdict::{Counterexample, CounterexampleStep, UnknownReason, Verdict};
