//! Value analysis (intervals + predicate abstraction)

pub mod domain;
pub mod interval;
pub mod state;

pub use domain::ValueDomain;
pub use interval::Interval;
pub use state::ValueState;
