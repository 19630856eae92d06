/*
 * Abstract Reachability Graph
 *
 * Arena of explored composite states. Nodes are addressed by `ArgNodeId`;
 * parent, child and cover relations are index lists, so revisiting a
 * location or a merge that closes a loop never creates owning cycles.
 *
 * Node lifecycle:
 *   Active  -> Covered (subsumed at creation, never expanded)
 *   Active  -> Merged  (replaced by a joined node that inherits its links)
 *   any     -> Removed (pruned by refinement)
 */

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::features::composite::CompositeState;
use crate::features::domains::TargetReason;
use crate::features::precision::Precision;
use crate::shared::models::CfaEdgeId;

/// ARG node identifier (index into the arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ArgNodeId(pub u32);

impl ArgNodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ArgNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Active,
    /// Subsumed by the given node
    Covered(ArgNodeId),
    /// Replaced by the given joined node
    Merged(ArgNodeId),
    Removed,
}

#[derive(Debug, Clone)]
pub struct ArgNode {
    pub id: ArgNodeId,
    pub state: CompositeState,
    /// Precision the state was computed under
    pub precision: Arc<Precision>,
    /// Incoming ARG edges, labeled by the CFA edge taken
    pub parents: Vec<(ArgNodeId, CfaEdgeId)>,
    pub children: Vec<ArgNodeId>,
    pub status: NodeStatus,
    /// Non-empty iff the node is a target
    pub targets: Vec<TargetReason>,
}

impl ArgNode {
    pub fn is_active(&self) -> bool {
        self.status == NodeStatus::Active
    }

    pub fn is_target(&self) -> bool {
        !self.targets.is_empty()
    }
}

/// Root-to-node path: `nodes[0]` is the root, `edges[i]` leads from
/// `nodes[i]` to `nodes[i + 1]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgPath {
    pub nodes: Vec<ArgNodeId>,
    pub edges: Vec<CfaEdgeId>,
}

impl ArgPath {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn last(&self) -> Option<ArgNodeId> {
        self.nodes.last().copied()
    }
}

/// Effect of pruning a subtree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pruned {
    /// Nodes that were removed (root of the subtree first)
    pub removed: Vec<ArgNodeId>,
    /// Surviving active parents of removed nodes, to be expanded again
    pub requeue: Vec<ArgNodeId>,
    /// Surviving nodes that lost their coverer and are active again
    pub uncovered: Vec<ArgNodeId>,
}

#[derive(Debug, Default)]
pub struct Arg {
    nodes: Vec<ArgNode>,
    root: Option<ArgNodeId>,
    /// coverer -> nodes it covers
    covering: FxHashMap<ArgNodeId, Vec<ArgNodeId>>,
}

impl Arg {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(&self) -> Option<ArgNodeId> {
        self.root
    }

    pub fn node(&self, id: ArgNodeId) -> &ArgNode {
        &self.nodes[id.index()]
    }

    /// Nodes ever created (including removed ones)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ArgNode> {
        self.nodes.iter()
    }

    pub fn live_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.status, NodeStatus::Active | NodeStatus::Covered(_)))
            .count()
    }

    fn push(&mut self, state: CompositeState, precision: Arc<Precision>) -> ArgNodeId {
        let id = ArgNodeId(self.nodes.len() as u32);
        self.nodes.push(ArgNode {
            id,
            state,
            precision,
            parents: Vec::new(),
            children: Vec::new(),
            status: NodeStatus::Active,
            targets: Vec::new(),
        });
        id
    }

    /// Start a fresh graph at `state`
    pub fn set_root(&mut self, state: CompositeState, precision: Arc<Precision>) -> ArgNodeId {
        self.nodes.clear();
        self.covering.clear();
        let id = self.push(state, precision);
        self.root = Some(id);
        id
    }

    pub fn add_child(
        &mut self,
        parent: ArgNodeId,
        edge: CfaEdgeId,
        state: CompositeState,
        precision: Arc<Precision>,
    ) -> ArgNodeId {
        let id = self.push(state, precision);
        self.nodes[id.index()].parents.push((parent, edge));
        self.nodes[parent.index()].children.push(id);
        id
    }

    pub fn mark_covered(&mut self, node: ArgNodeId, coverer: ArgNodeId) {
        self.nodes[node.index()].status = NodeStatus::Covered(coverer);
        self.covering.entry(coverer).or_default().push(node);
    }

    pub fn mark_target(&mut self, node: ArgNodeId, reasons: Vec<TargetReason>) {
        self.nodes[node.index()].targets = reasons;
    }

    /// Replace `old` by a joined node reached additionally through
    /// `(parent, edge)`. The new node takes over every link of `old`.
    pub fn replace_merged(
        &mut self,
        old: ArgNodeId,
        state: CompositeState,
        precision: Arc<Precision>,
        parent: ArgNodeId,
        edge: CfaEdgeId,
    ) -> ArgNodeId {
        let id = self.push(state, precision);
        let parents = std::mem::take(&mut self.nodes[old.index()].parents);
        let children = std::mem::take(&mut self.nodes[old.index()].children);

        for (p, _) in &parents {
            for c in &mut self.nodes[p.index()].children {
                if *c == old {
                    *c = id;
                }
            }
        }
        for c in &children {
            for (p, _) in &mut self.nodes[c.index()].parents {
                if *p == old {
                    *p = id;
                }
            }
        }
        if let Some(covered) = self.covering.remove(&old) {
            for n in &covered {
                self.nodes[n.index()].status = NodeStatus::Covered(id);
            }
            self.covering.insert(id, covered);
        }

        let node = &mut self.nodes[id.index()];
        node.parents = parents;
        node.parents.push((parent, edge));
        node.children = children;
        self.nodes[parent.index()].children.push(id);
        self.nodes[old.index()].status = NodeStatus::Merged(id);
        id
    }

    /// Shortest parent chain from the root to `target`
    pub fn path_to(&self, target: ArgNodeId) -> Option<ArgPath> {
        let root = self.root?;
        let mut via: FxHashMap<ArgNodeId, (ArgNodeId, CfaEdgeId)> = FxHashMap::default();
        let mut queue = VecDeque::from([target]);
        let mut seen = FxHashSet::default();
        seen.insert(target);

        while let Some(n) = queue.pop_front() {
            if n == root {
                let mut nodes = vec![root];
                let mut edges = Vec::new();
                let mut cur = root;
                while cur != target {
                    let (next, edge) = via[&cur];
                    edges.push(edge);
                    nodes.push(next);
                    cur = next;
                }
                return Some(ArgPath { nodes, edges });
            }
            for &(p, e) in &self.nodes[n.index()].parents {
                if self.nodes[p.index()].status == NodeStatus::Removed {
                    continue;
                }
                if seen.insert(p) {
                    via.insert(p, (n, e));
                    queue.push_back(p);
                }
            }
        }
        None
    }

    /// Remove `top` and everything reachable below it
    pub fn remove_subtree(&mut self, top: ArgNodeId) -> Pruned {
        let mut doomed: Vec<ArgNodeId> = Vec::new();
        let mut in_doomed = FxHashSet::default();
        let mut stack = vec![top];
        while let Some(n) = stack.pop() {
            if !in_doomed.insert(n) {
                continue;
            }
            doomed.push(n);
            for &c in self.nodes[n.index()].children.iter().rev() {
                stack.push(c);
            }
        }

        let mut pruned = Pruned::default();
        let mut requeue = FxHashSet::default();
        for &n in &doomed {
            let parents = std::mem::take(&mut self.nodes[n.index()].parents);
            for (p, _) in parents {
                if in_doomed.contains(&p) {
                    continue;
                }
                self.nodes[p.index()].children.retain(|c| *c != n);
                if self.nodes[p.index()].is_active()
                    && !self.nodes[p.index()].is_target()
                    && requeue.insert(p)
                {
                    pruned.requeue.push(p);
                }
            }
            if let NodeStatus::Covered(coverer) = self.nodes[n.index()].status {
                if let Some(list) = self.covering.get_mut(&coverer) {
                    list.retain(|c| *c != n);
                }
            }
            if let Some(covered) = self.covering.remove(&n) {
                for c in covered {
                    if !in_doomed.contains(&c) {
                        self.nodes[c.index()].status = NodeStatus::Active;
                        pruned.uncovered.push(c);
                    }
                }
            }
            self.nodes[n.index()].children.clear();
            self.nodes[n.index()].status = NodeStatus::Removed;
        }
        if self.root == Some(top) {
            self.root = None;
        }
        pruned.removed = doomed;
        pruned
    }
}
