//! Reached set and waitlist
//!
//! The reached set indexes admitted ARG nodes by CFA location for Stop and
//! Merge lookups. The waitlist is the exploration frontier; its order only
//! decides which counterexample is found first.

pub mod waitlist;

pub use waitlist::Waitlist;

use rustc_hash::FxHashMap;

use crate::features::arg::ArgNodeId;
use crate::shared::models::CfaNodeId;

#[derive(Debug, Default)]
pub struct ReachedSet {
    by_location: FxHashMap<CfaNodeId, Vec<ArgNodeId>>,
    len: usize,
}

impl ReachedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, location: CfaNodeId, node: ArgNodeId) {
        let entries = self.by_location.entry(location).or_default();
        if !entries.contains(&node) {
            entries.push(node);
            self.len += 1;
        }
    }

    pub fn remove(&mut self, location: CfaNodeId, node: ArgNodeId) -> bool {
        let Some(entries) = self.by_location.get_mut(&location) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|n| *n != node);
        let removed = entries.len() < before;
        if removed {
            self.len -= 1;
        }
        if entries.is_empty() {
            self.by_location.remove(&location);
        }
        removed
    }

    /// Admitted nodes at `location`, oldest first
    pub fn at(&self, location: CfaNodeId) -> &[ArgNodeId] {
        self.by_location
            .get(&location)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, location: CfaNodeId, node: ArgNodeId) -> bool {
        self.at(location).contains(&node)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn locations(&self) -> usize {
        self.by_location.len()
    }

    pub fn clear(&mut self) {
        self.by_location.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reached_set_indexing() {
        let mut reached = ReachedSet::new();
        reached.add(CfaNodeId(1), ArgNodeId(0));
        reached.add(CfaNodeId(1), ArgNodeId(3));
        reached.add(CfaNodeId(2), ArgNodeId(4));
        reached.add(CfaNodeId(1), ArgNodeId(3));
        assert_eq!(reached.len(), 3);
        assert_eq!(reached.at(CfaNodeId(1)), &[ArgNodeId(0), ArgNodeId(3)]);
        assert!(reached.at(CfaNodeId(9)).is_empty());

        assert!(reached.remove(CfaNodeId(2), ArgNodeId(4)));
        assert!(!reached.remove(CfaNodeId(2), ArgNodeId(4)));
        assert_eq!(reached.locations(), 1);
        assert_eq!(reached.len(), 2);
    }
}
