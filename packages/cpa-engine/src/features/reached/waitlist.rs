//! Ordered exploration frontier

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

use crate::config::WaitlistOrder;
use crate::features::arg::ArgNodeId;
use crate::shared::models::CfaNode;

/// Priority queue over ARG nodes. Keys are `(primary, insertion)` so every
/// order is total and deterministic.
#[derive(Debug)]
pub struct Waitlist {
    order: WaitlistOrder,
    queue: BTreeMap<(i64, i64), ArgNodeId>,
    keys: FxHashMap<ArgNodeId, (i64, i64)>,
    seq: i64,
}

impl Waitlist {
    pub fn new(order: WaitlistOrder) -> Self {
        Self {
            order,
            queue: BTreeMap::new(),
            keys: FxHashMap::default(),
            seq: 0,
        }
    }

    pub fn order(&self) -> WaitlistOrder {
        self.order
    }

    fn key(&self, location: &CfaNode) -> (i64, i64) {
        let seq = self.seq;
        match self.order {
            WaitlistOrder::Bfs => (0, seq),
            WaitlistOrder::Dfs => (0, -seq),
            WaitlistOrder::ReversePostorder => (i64::from(location.rpo), seq),
            WaitlistOrder::LoopDepthFirst => (-i64::from(location.loop_depth), -seq),
        }
    }

    /// Queue `node` (no-op if already queued)
    pub fn push(&mut self, node: ArgNodeId, location: &CfaNode) {
        if self.keys.contains_key(&node) {
            return;
        }
        let key = self.key(location);
        self.seq += 1;
        self.queue.insert(key, node);
        self.keys.insert(node, key);
    }

    pub fn pop(&mut self) -> Option<ArgNodeId> {
        let (_, node) = self.queue.pop_first()?;
        self.keys.remove(&node);
        Some(node)
    }

    pub fn remove(&mut self, node: ArgNodeId) -> bool {
        match self.keys.remove(&node) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, node: ArgNodeId) -> bool {
        self.keys.contains_key(&node)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::models::CfaNodeId;

    fn loc(rpo: u32, depth: u32) -> CfaNode {
        CfaNode {
            id: CfaNodeId(rpo),
            function: "main".to_string(),
            label: None,
            is_loop_head: false,
            loop_depth: depth,
            rpo,
        }
    }

    fn drain(w: &mut Waitlist) -> Vec<u32> {
        std::iter::from_fn(|| w.pop()).map(|n| n.0).collect()
    }

    fn fill(order: WaitlistOrder) -> Waitlist {
        let mut w = Waitlist::new(order);
        w.push(ArgNodeId(0), &loc(2, 0));
        w.push(ArgNodeId(1), &loc(0, 1));
        w.push(ArgNodeId(2), &loc(1, 2));
        w.push(ArgNodeId(3), &loc(0, 1));
        w
    }

    #[test]
    fn test_orders() {
        assert_eq!(drain(&mut fill(WaitlistOrder::Bfs)), vec![0, 1, 2, 3]);
        assert_eq!(drain(&mut fill(WaitlistOrder::Dfs)), vec![3, 2, 1, 0]);
        assert_eq!(drain(&mut fill(WaitlistOrder::ReversePostorder)), vec![1, 3, 2, 0]);
        assert_eq!(drain(&mut fill(WaitlistOrder::LoopDepthFirst)), vec![2, 3, 1, 0]);
    }

    #[test]
    fn test_push_is_idempotent_and_remove() {
        let mut w = fill(WaitlistOrder::Bfs);
        w.push(ArgNodeId(1), &loc(0, 0));
        assert_eq!(w.len(), 4);
        assert!(w.remove(ArgNodeId(1)));
        assert!(!w.contains(ArgNodeId(1)));
        assert_eq!(drain(&mut w), vec![0, 2, 3]);
        assert!(w.is_empty());
    }
}
