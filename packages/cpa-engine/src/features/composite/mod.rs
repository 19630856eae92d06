//! Composite analysis: the product of the configured domains

pub mod domain;
pub mod state;

pub use domain::{CompositeDomain, CompositeDomainBuilder, Domain};
pub use state::{CompositeState, DomainKind, DomainState};
