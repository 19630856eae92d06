//! Common test utilities for cpa-engine
//!
//! Program builders for the scenario tests and verdict assertions.

#![allow(dead_code)]

mod assertions;
mod programs;

pub use assertions::*;
pub use programs::*;
