/*
 * Specification Automata
 *
 * - model: automaton, transitions, triggers, builder
 * - parser: YAML/JSON definitions with validation
 * - built_in: lock discipline, malloc/free ordering
 * - domain: product of monitors as an abstract domain, held-lock set
 */

pub mod built_in;
pub mod domain;
pub mod model;
pub mod parser;

pub use built_in::{BuiltinAutomaton, LockDisciplineAutomaton, MallocFreeAutomaton};
pub use domain::{AutomatonDomain, AutomatonState};
pub use model::{AutomatonBuilder, SpecificationAutomaton, Transition, Trigger};
pub use parser::{AutomatonDescription, AutomatonParseError, AutomatonParser, TransitionDescription};
