/*
 * Built-in Automata
 *
 * Standard monitors usable without a definition file:
 * - LockDisciplineAutomaton: init / lock / unlock ordering
 * - MallocFreeAutomaton: allocation / release ordering
 */

use serde::{Deserialize, Serialize};

use super::model::{AutomatonBuilder, SpecificationAutomaton, Trigger};
use super::parser::AutomatonParseError;

/// Selectable built-in automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinAutomaton {
    LockDiscipline,
    MallocFree,
}

/// Lock discipline
///
/// States: Uninit → Unlocked ⇄ Locked, plus Error
///
/// Transitions:
/// - Uninit --init()--> Unlocked
/// - Unlocked --lock()--> Locked
/// - Locked --unlock()--> Unlocked
///
/// Violations (→ Error):
/// - lock() or unlock() before init()
/// - unlock() while Unlocked
/// - lock() while Locked
///
/// Ending in Locked is not a violation.
pub struct LockDisciplineAutomaton;

impl LockDisciplineAutomaton {
    pub const INIT: &'static [&'static str] = &["init", "pthread_mutex_init"];
    pub const LOCK: &'static [&'static str] = &["lock", "pthread_mutex_lock"];
    pub const UNLOCK: &'static [&'static str] = &["unlock", "pthread_mutex_unlock"];

    pub fn define() -> Result<SpecificationAutomaton, AutomatonParseError> {
        Self::with_functions(Self::INIT, Self::LOCK, Self::UNLOCK)
    }

    /// Lock discipline over custom function names
    pub fn with_functions<S: AsRef<str>>(
        init: &[S],
        lock: &[S],
        unlock: &[S],
    ) -> Result<SpecificationAutomaton, AutomatonParseError> {
        let mut builder = AutomatonBuilder::new("LockDiscipline")
            .initial_state("Uninit")
            .error_state("Error");
        for f in init {
            builder = builder.transition("Uninit", Trigger::call(f.as_ref()), "Unlocked");
        }
        for f in lock.iter().chain(unlock) {
            builder = builder.transition("Uninit", Trigger::call(f.as_ref()), "Error");
        }
        for f in lock {
            builder = builder
                .transition("Unlocked", Trigger::call(f.as_ref()), "Locked")
                .transition("Locked", Trigger::call(f.as_ref()), "Error");
        }
        for f in unlock {
            builder = builder
                .transition("Locked", Trigger::call(f.as_ref()), "Unlocked")
                .transition("Unlocked", Trigger::call(f.as_ref()), "Error");
        }
        builder.build()
    }
}

/// Allocation ordering for a single resource
///
/// States: Unallocated → Allocated → Freed, plus Error
///
/// Violations (→ Error):
/// - free() while Freed
pub struct MallocFreeAutomaton;

impl MallocFreeAutomaton {
    pub fn define() -> Result<SpecificationAutomaton, AutomatonParseError> {
        let mut builder = AutomatonBuilder::new("MallocFree")
            .initial_state("Unallocated")
            .error_state("Error");
        for alloc in ["malloc", "calloc"] {
            builder = builder
                .transition("Unallocated", Trigger::call(alloc), "Allocated")
                .transition("Freed", Trigger::call(alloc), "Allocated");
        }
        builder = builder
            .transition("Allocated", Trigger::call("free"), "Freed")
            .transition("Freed", Trigger::call("free"), "Error");
        builder.build()
    }
}

impl BuiltinAutomaton {
    pub fn define(&self) -> Result<SpecificationAutomaton, AutomatonParseError> {
        match self {
            BuiltinAutomaton::LockDiscipline => LockDisciplineAutomaton::define(),
            BuiltinAutomaton::MallocFree => MallocFreeAutomaton::define(),
        }
    }
}
