//! Feature modules
//!
//! Leaves first:
//! - domains/     - AbstractDomain port + value, shape, automaton, taint, call-stack
//! - composite/   - Closed sum of domain states, composite transfer/merge/stop
//! - precision/   - Monotonic per-domain precision
//! - oracle/      - Path formulas, feasibility oracle port, linear-arithmetic oracle
//! - arg/         - Abstract reachability graph arena
//! - reached/     - Reached set and waitlist
//! - algorithm/   - Analysis context and CPA exploration
//! - refinement/  - Verdicts, refiner, CEGAR loop

pub mod algorithm;
pub mod arg;
pub mod composite;
pub mod domains;
pub mod oracle;
pub mod precision;
pub mod reached;
pub mod refinement;
