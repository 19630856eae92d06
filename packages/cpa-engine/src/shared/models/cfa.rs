//! Control-flow automaton
//!
//! Immutable program model handed to the engine by a frontend. Nodes are
//! program locations, edges are labeled transitions. Everything is validated
//! once in [`CfaBuilder::build`]; the analysis never sees a malformed CFA.
//!
//! Loop structure (loop heads, nesting depth, reverse postorder) is computed at
//! build time on an intraprocedural view of the graph where each call is
//! replaced by a summary edge from the call site to its return site.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, DfsEvent};
use petgraph::Direction;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use super::expr::{Expr, LValue, VarName};
use crate::errors::{CpaError, Result};

/// CFA node identifier (index into the node arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfaNodeId(pub u32);

impl CfaNodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for CfaNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// CFA edge identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CfaEdgeId(pub u32);

impl CfaEdgeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Program location
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CfaNode {
    pub id: CfaNodeId,
    /// Function the location belongs to
    pub function: String,
    /// Source label (e.g. `ERROR`)
    pub label: Option<String>,
    /// Target of a back edge
    pub is_loop_head: bool,
    /// Number of loops containing this node
    pub loop_depth: u32,
    /// Reverse-postorder index (entry function first)
    pub rpo: u32,
}

/// Edge label
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// No effect
    Blank,
    /// Branch condition; `truth = false` takes the else branch
    Assume { condition: Expr, truth: bool },
    /// `target = value`
    Assign { target: LValue, value: Expr },
    /// Call to a function without a body in the CFA (library, intrinsic)
    Call {
        function: String,
        args: Vec<Expr>,
        result: Option<VarName>,
    },
    /// Enter a function body. Binding values are evaluated left to right in
    /// the caller's state, then bound to the callee's parameters.
    FunctionCall {
        function: String,
        bindings: Vec<(VarName, Expr)>,
        return_site: CfaNodeId,
    },
    /// Leave a function body
    FunctionReturn { function: String },
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Blank => write!(f, "skip"),
            EdgeKind::Assume { condition, truth } => {
                if *truth {
                    write!(f, "[{}]", condition)
                } else {
                    write!(f, "[!({})]", condition)
                }
            }
            EdgeKind::Assign { target, value } => write!(f, "{} = {}", target, value),
            EdgeKind::Call {
                function,
                args,
                result,
            } => {
                if let Some(r) = result {
                    write!(f, "{} = ", r)?;
                }
                let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            EdgeKind::FunctionCall {
                function, bindings, ..
            } => {
                let args: Vec<String> = bindings.iter().map(|(_, v)| v.to_string()).collect();
                write!(f, "{}({})", function, args.join(", "))
            }
            EdgeKind::FunctionReturn { function } => write!(f, "return from {}", function),
        }
    }
}

/// Labeled transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CfaEdge {
    pub id: CfaEdgeId,
    pub source: CfaNodeId,
    pub target: CfaNodeId,
    pub kind: EdgeKind,
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

/// Function with a body in the CFA
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    pub entry: CfaNodeId,
    pub exit: Option<CfaNodeId>,
    pub params: Vec<VarName>,
}

/// Validated control-flow automaton
#[derive(Debug, Clone)]
pub struct Cfa {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    outgoing: Vec<Vec<CfaEdgeId>>,
    functions: BTreeMap<String, FunctionInfo>,
    entry: CfaNodeId,
    labels: BTreeMap<String, CfaNodeId>,
    /// Intraprocedural view used for loop analysis
    graph: DiGraph<CfaNodeId, ()>,
}

impl Cfa {
    /// Program entry (entry node of the entry function)
    pub fn entry(&self) -> CfaNodeId {
        self.entry
    }

    pub fn node(&self, id: CfaNodeId) -> &CfaNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfaNode> {
        self.nodes.iter()
    }

    pub fn edge(&self, id: CfaEdgeId) -> &CfaEdge {
        &self.edges[id.index()]
    }

    pub fn edges(&self) -> impl Iterator<Item = &CfaEdge> {
        self.edges.iter()
    }

    /// Outgoing edges in insertion order
    pub fn outgoing(&self, node: CfaNodeId) -> impl Iterator<Item = &CfaEdge> {
        self.outgoing[node.index()]
            .iter()
            .map(move |id| &self.edges[id.index()])
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains(&self, node: CfaNodeId) -> bool {
        node.index() < self.nodes.len()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionInfo> {
        self.functions.get(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionInfo> {
        self.functions.values()
    }

    /// Node carrying `label`
    pub fn labeled(&self, label: &str) -> Option<CfaNodeId> {
        self.labels.get(label).copied()
    }

    /// Does the program enter any function body?
    pub fn has_function_calls(&self) -> bool {
        self.edges
            .iter()
            .any(|e| matches!(e.kind, EdgeKind::FunctionCall { .. }))
    }

    /// Return edge that lands back inside the returning function
    /// (the caller's locals were overwritten by the recursive callee)
    pub fn is_recursive_return(&self, edge: &CfaEdge) -> bool {
        match &edge.kind {
            EdgeKind::FunctionReturn { function } => self.node(edge.target).function == *function,
            _ => false,
        }
    }

    /// Loop heads in node order
    pub fn loop_heads(&self) -> Vec<CfaNodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_loop_head)
            .map(|n| n.id)
            .collect()
    }

    /// Every variable read or written by some edge
    pub fn variables(&self) -> BTreeSet<VarName> {
        let mut vars = BTreeSet::new();
        for edge in &self.edges {
            match &edge.kind {
                EdgeKind::Blank | EdgeKind::FunctionReturn { .. } => {}
                EdgeKind::Assume { condition, .. } => vars.extend(condition.vars()),
                EdgeKind::Assign { target, value } => {
                    vars.insert(target.name().to_string());
                    vars.extend(value.vars());
                }
                EdgeKind::Call { args, result, .. } => {
                    for arg in args {
                        vars.extend(arg.vars());
                    }
                    if let Some(r) = result {
                        vars.insert(r.clone());
                    }
                }
                EdgeKind::FunctionCall { bindings, .. } => {
                    for (param, value) in bindings {
                        vars.insert(param.clone());
                        vars.extend(value.vars());
                    }
                }
            }
        }
        vars
    }

    /// Intraprocedural graph (calls summarized) used for loop structure
    pub fn loop_graph(&self) -> &DiGraph<CfaNodeId, ()> {
        &self.graph
    }
}

/// Incremental CFA construction with validation at [`CfaBuilder::build`]
///
/// # Example
/// ```
/// use cpa_engine::shared::models::CfaBuilder;
///
/// let mut b = CfaBuilder::new();
/// let entry = b.function("main", &[]);
/// let err = b.labeled_node("main", "ERROR");
/// b.assume(entry, err, "x > 0", true).unwrap();
/// let cfa = b.build().unwrap();
/// assert_eq!(cfa.labeled("ERROR"), Some(err));
/// ```
#[derive(Debug, Default)]
pub struct CfaBuilder {
    nodes: Vec<CfaNode>,
    edges: Vec<CfaEdge>,
    functions: BTreeMap<String, FunctionInfo>,
    entry_function: Option<String>,
    errors: Vec<String>,
}

impl CfaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function and create its entry node.
    /// The first registered function is the program entry.
    pub fn function(&mut self, name: &str, params: &[&str]) -> CfaNodeId {
        let entry = self.node(name);
        if self.functions.contains_key(name) {
            self.errors
                .push(format!("function '{}' registered twice", name));
        } else {
            self.functions.insert(
                name.to_string(),
                FunctionInfo {
                    name: name.to_string(),
                    entry,
                    exit: None,
                    params: params.iter().map(|p| p.to_string()).collect(),
                },
            );
        }
        if self.entry_function.is_none() {
            self.entry_function = Some(name.to_string());
        }
        entry
    }

    /// Make `name` the program entry
    pub fn set_entry_function(&mut self, name: &str) {
        self.entry_function = Some(name.to_string());
    }

    /// Mark the exit node of a function
    pub fn set_exit(&mut self, function: &str, exit: CfaNodeId) {
        match self.functions.get_mut(function) {
            Some(info) => info.exit = Some(exit),
            None => self
                .errors
                .push(format!("exit set for unknown function '{}'", function)),
        }
    }

    /// New location inside `function`
    pub fn node(&mut self, function: &str) -> CfaNodeId {
        let id = CfaNodeId(self.nodes.len() as u32);
        self.nodes.push(CfaNode {
            id,
            function: function.to_string(),
            label: None,
            is_loop_head: false,
            loop_depth: 0,
            rpo: 0,
        });
        id
    }

    /// New labeled location
    pub fn labeled_node(&mut self, function: &str, label: &str) -> CfaNodeId {
        let id = self.node(function);
        self.nodes[id.index()].label = Some(label.to_string());
        id
    }

    /// Attach a label to an existing node
    pub fn label(&mut self, node: CfaNodeId, label: &str) {
        match self.nodes.get_mut(node.index()) {
            Some(n) => n.label = Some(label.to_string()),
            None => self.errors.push(format!("label on unknown node {}", node)),
        }
    }

    /// Raw edge
    pub fn edge(&mut self, source: CfaNodeId, target: CfaNodeId, kind: EdgeKind) -> CfaEdgeId {
        let id = CfaEdgeId(self.edges.len() as u32);
        self.edges.push(CfaEdge {
            id,
            source,
            target,
            kind,
        });
        id
    }

    pub fn blank(&mut self, source: CfaNodeId, target: CfaNodeId) -> CfaEdgeId {
        self.edge(source, target, EdgeKind::Blank)
    }

    /// `[condition]` (or its negation when `truth` is false)
    pub fn assume(
        &mut self,
        source: CfaNodeId,
        target: CfaNodeId,
        condition: &str,
        truth: bool,
    ) -> Result<CfaEdgeId> {
        let condition = Expr::parse(condition)?;
        Ok(self.edge(source, target, EdgeKind::Assume { condition, truth }))
    }

    /// `target = value`
    pub fn assign(
        &mut self,
        source: CfaNodeId,
        target: CfaNodeId,
        lhs: &str,
        value: &str,
    ) -> Result<CfaEdgeId> {
        let kind = EdgeKind::Assign {
            target: LValue::parse(lhs)?,
            value: Expr::parse(value)?,
        };
        Ok(self.edge(source, target, kind))
    }

    /// `[result =] function(args)` for a function without a body
    pub fn call(
        &mut self,
        source: CfaNodeId,
        target: CfaNodeId,
        function: &str,
        args: &[&str],
        result: Option<&str>,
    ) -> Result<CfaEdgeId> {
        let args = args
            .iter()
            .map(|a| Expr::parse(a))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let kind = EdgeKind::Call {
            function: function.to_string(),
            args,
            result: result.map(|r| r.to_string()),
        };
        Ok(self.edge(source, target, kind))
    }

    /// Enter the body of `callee` (which must be registered already)
    pub fn function_call(
        &mut self,
        source: CfaNodeId,
        callee: &str,
        bindings: &[(&str, &str)],
        return_site: CfaNodeId,
    ) -> Result<CfaEdgeId> {
        let entry = self
            .functions
            .get(callee)
            .map(|f| f.entry)
            .ok_or_else(|| CpaError::malformed(format!("call to unknown function '{}'", callee)))?;
        let bindings = bindings
            .iter()
            .map(|(param, value)| -> Result<(VarName, Expr)> {
                Ok((param.to_string(), Expr::parse(value)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let kind = EdgeKind::FunctionCall {
            function: callee.to_string(),
            bindings,
            return_site,
        };
        Ok(self.edge(source, entry, kind))
    }

    /// Leave `function` from `source` back to `return_site`
    pub fn function_return(
        &mut self,
        source: CfaNodeId,
        function: &str,
        return_site: CfaNodeId,
    ) -> CfaEdgeId {
        self.edge(
            source,
            return_site,
            EdgeKind::FunctionReturn {
                function: function.to_string(),
            },
        )
    }

    /// Validate and freeze
    pub fn build(self) -> Result<Cfa> {
        if let Some(first) = self.errors.first() {
            return Err(CpaError::malformed(first.clone()));
        }
        if self.nodes.is_empty() {
            return Err(CpaError::malformed("CFA has no nodes"));
        }
        let entry_function = self
            .entry_function
            .clone()
            .ok_or_else(|| CpaError::malformed("CFA has no functions"))?;
        let entry = self
            .functions
            .get(&entry_function)
            .map(|f| f.entry)
            .ok_or_else(|| {
                CpaError::malformed(format!("entry function '{}' is not defined", entry_function))
            })?;

        self.validate()?;

        let mut labels = BTreeMap::new();
        for node in &self.nodes {
            if let Some(label) = &node.label {
                if labels.insert(label.clone(), node.id).is_some() {
                    return Err(CpaError::malformed(format!("duplicate label '{}'", label)));
                }
            }
        }

        let mut outgoing = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            outgoing[edge.source.index()].push(edge.id);
        }

        let mut nodes = self.nodes;
        let graph = loop_view(&nodes, &self.edges);

        // Other functions are started first so the entry function ends up
        // first in reverse postorder.
        let mut starts: Vec<NodeIndex> = self
            .functions
            .values()
            .filter(|f| f.name != entry_function)
            .map(|f| NodeIndex::new(f.entry.index()))
            .collect();
        starts.push(NodeIndex::new(entry.index()));
        let structure = analyze_loops(&graph, starts);

        for node in &mut nodes {
            let i = node.id.index();
            node.is_loop_head = structure.heads.contains(&i);
            node.loop_depth = structure.depth[i];
            node.rpo = structure.rpo[i];
        }

        tracing::debug!(
            "Built CFA: {} nodes, {} edges, {} loop heads",
            nodes.len(),
            self.edges.len(),
            structure.heads.len()
        );

        Ok(Cfa {
            nodes,
            edges: self.edges,
            outgoing,
            functions: self.functions,
            entry,
            labels,
            graph,
        })
    }

    fn validate(&self) -> Result<()> {
        let count = self.nodes.len();
        let node_fn = |id: CfaNodeId| self.nodes[id.index()].function.as_str();

        for node in &self.nodes {
            if !self.functions.contains_key(&node.function) {
                return Err(CpaError::malformed(format!(
                    "node {} belongs to undefined function '{}'",
                    node.id, node.function
                )));
            }
        }
        for info in self.functions.values() {
            if let Some(exit) = info.exit {
                if exit.index() >= count || node_fn(exit) != info.name {
                    return Err(CpaError::malformed(format!(
                        "exit node {} is not inside function '{}'",
                        exit, info.name
                    )));
                }
            }
        }

        let mut return_sites: FxHashSet<(String, CfaNodeId)> = FxHashSet::default();
        for edge in &self.edges {
            if edge.source.index() >= count || edge.target.index() >= count {
                return Err(CpaError::malformed(format!(
                    "edge {} -> {} references an unknown node",
                    edge.source, edge.target
                )));
            }
            if let EdgeKind::FunctionCall {
                function,
                return_site,
                ..
            } = &edge.kind
            {
                let callee = self.functions.get(function).ok_or_else(|| {
                    CpaError::malformed(format!("call to unknown function '{}'", function))
                })?;
                if edge.target != callee.entry {
                    return Err(CpaError::malformed(format!(
                        "call edge to '{}' must target its entry {}",
                        function, callee.entry
                    )));
                }
                if return_site.index() >= count || node_fn(*return_site) != node_fn(edge.source) {
                    return Err(CpaError::malformed(format!(
                        "return site {} of call to '{}' is not in the caller",
                        return_site, function
                    )));
                }
                return_sites.insert((function.clone(), *return_site));
            }
        }

        for edge in &self.edges {
            match &edge.kind {
                EdgeKind::FunctionCall { .. } => {}
                EdgeKind::FunctionReturn { function } => {
                    if node_fn(edge.source) != function {
                        return Err(CpaError::malformed(format!(
                            "return from '{}' starts outside that function",
                            function
                        )));
                    }
                    if !return_sites.contains(&(function.clone(), edge.target)) {
                        return Err(CpaError::malformed(format!(
                            "return from '{}' targets {} which is not a return site",
                            function, edge.target
                        )));
                    }
                }
                _ => {
                    if node_fn(edge.source) != node_fn(edge.target) {
                        return Err(CpaError::malformed(format!(
                            "edge '{}' crosses from '{}' to '{}'",
                            edge.kind,
                            node_fn(edge.source),
                            node_fn(edge.target)
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Graph with call edges replaced by call-site → return-site summaries
fn loop_view(nodes: &[CfaNode], edges: &[CfaEdge]) -> DiGraph<CfaNodeId, ()> {
    let mut graph = DiGraph::with_capacity(nodes.len(), edges.len());
    for node in nodes {
        graph.add_node(node.id);
    }
    for edge in edges {
        let source = NodeIndex::new(edge.source.index());
        match &edge.kind {
            EdgeKind::FunctionCall { return_site, .. } => {
                graph.add_edge(source, NodeIndex::new(return_site.index()), ());
            }
            EdgeKind::FunctionReturn { .. } => {}
            _ => {
                graph.add_edge(source, NodeIndex::new(edge.target.index()), ());
            }
        }
    }
    graph
}

struct LoopStructure {
    heads: FxHashSet<usize>,
    depth: Vec<u32>,
    rpo: Vec<u32>,
}

/// Back edges, natural-loop nesting depth and reverse postorder
fn analyze_loops(graph: &DiGraph<CfaNodeId, ()>, starts: Vec<NodeIndex>) -> LoopStructure {
    let n = graph.node_count();
    let mut back_edges = Vec::new();
    let mut postorder = Vec::with_capacity(n);

    depth_first_search(graph, starts, |event| match event {
        DfsEvent::BackEdge(u, h) => back_edges.push((u, h)),
        DfsEvent::Finish(u, _) => postorder.push(u.index()),
        _ => {}
    });

    let mut rpo = vec![u32::MAX; n];
    let visited = postorder.len();
    for (pos, node) in postorder.iter().rev().enumerate() {
        rpo[*node] = pos as u32;
    }
    let mut next = visited as u32;
    for slot in rpo.iter_mut().filter(|r| **r == u32::MAX) {
        *slot = next;
        next += 1;
    }

    // Natural loop of back edge u -> h: h plus everything reaching u without passing h
    let mut bodies: BTreeMap<usize, FxHashSet<usize>> = BTreeMap::new();
    for (u, h) in &back_edges {
        let body = bodies.entry(h.index()).or_default();
        body.insert(h.index());
        let mut stack = vec![*u];
        while let Some(v) = stack.pop() {
            if !body.insert(v.index()) && v != *u {
                continue;
            }
            if v == *h {
                continue;
            }
            for pred in graph.neighbors_directed(v, Direction::Incoming) {
                if !body.contains(&pred.index()) {
                    stack.push(pred);
                }
            }
        }
    }

    let mut depth = vec![0u32; n];
    for body in bodies.values() {
        for v in body {
            depth[*v] += 1;
        }
    }

    LoopStructure {
        heads: bodies.keys().copied().collect(),
        depth,
        rpo,
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Serializable description
// ═══════════════════════════════════════════════════════════════════════════

/// CFA in a frontend-neutral text form (YAML or JSON)
///
/// ```yaml
/// functions:
///   - name: main
///     entry: start
/// nodes:
///   - { name: start, function: main }
///   - { name: err, function: main, label: ERROR }
/// edges:
///   - { from: start, to: err, kind: assume, condition: "x > 0" }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CfaDescription {
    #[serde(default)]
    pub entry_function: Option<String>,
    pub functions: Vec<FunctionDescription>,
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDescription {
    pub name: String,
    pub entry: String,
    #[serde(default)]
    pub exit: Option<String>,
    #[serde(default)]
    pub params: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescription {
    pub name: String,
    pub function: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub from: String,
    pub to: String,
    #[serde(flatten)]
    pub kind: EdgeSpec,
}

fn default_truth() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingDescription {
    pub param: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeSpec {
    Blank,
    Assume {
        condition: Expr,
        #[serde(default = "default_truth")]
        truth: bool,
    },
    Assign {
        target: LValue,
        value: Expr,
    },
    Call {
        function: String,
        #[serde(default)]
        args: Vec<Expr>,
        #[serde(default)]
        result: Option<String>,
    },
    FunctionCall {
        function: String,
        #[serde(default)]
        bindings: Vec<BindingDescription>,
        return_site: String,
    },
    FunctionReturn {
        function: String,
    },
}

impl CfaDescription {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build through the validating builder
    pub fn build(&self) -> Result<Cfa> {
        let mut builder = CfaBuilder::new();
        let mut ids: BTreeMap<&str, CfaNodeId> = BTreeMap::new();

        let entries: BTreeMap<&str, &FunctionDescription> = self
            .functions
            .iter()
            .map(|f| (f.entry.as_str(), f))
            .collect();

        // Register in description order so the first function is the default entry
        for function in &self.functions {
            let node = self
                .nodes
                .iter()
                .find(|n| n.name == function.entry)
                .ok_or_else(|| {
                    CpaError::malformed(format!(
                        "entry node '{}' of '{}' is not declared",
                        function.entry, function.name
                    ))
                })?;
            let params: Vec<&str> = function.params.iter().map(|p| p.as_str()).collect();
            let id = builder.function(&function.name, &params);
            if let Some(label) = &node.label {
                builder.label(id, label);
            }
            ids.insert(node.name.as_str(), id);
        }
        for node in &self.nodes {
            if entries.contains_key(node.name.as_str()) {
                continue;
            }
            if ids.contains_key(node.name.as_str()) {
                return Err(CpaError::malformed(format!("duplicate node '{}'", node.name)));
            }
            let id = match &node.label {
                Some(label) => builder.labeled_node(&node.function, label),
                None => builder.node(&node.function),
            };
            ids.insert(node.name.as_str(), id);
        }

        let lookup = |name: &str| {
            ids.get(name)
                .copied()
                .ok_or_else(|| CpaError::malformed(format!("unknown node '{}'", name)))
        };

        for function in &self.functions {
            if let Some(exit) = &function.exit {
                builder.set_exit(&function.name, lookup(exit)?);
            }
        }
        if let Some(entry) = &self.entry_function {
            builder.set_entry_function(entry);
        }

        for edge in &self.edges {
            let from = lookup(&edge.from)?;
            let to = lookup(&edge.to)?;
            let kind = match &edge.kind {
                EdgeSpec::Blank => EdgeKind::Blank,
                EdgeSpec::Assume { condition, truth } => EdgeKind::Assume {
                    condition: condition.clone(),
                    truth: *truth,
                },
                EdgeSpec::Assign { target, value } => EdgeKind::Assign {
                    target: target.clone(),
                    value: value.clone(),
                },
                EdgeSpec::Call {
                    function,
                    args,
                    result,
                } => EdgeKind::Call {
                    function: function.clone(),
                    args: args.clone(),
                    result: result.clone(),
                },
                EdgeSpec::FunctionCall {
                    function,
                    bindings,
                    return_site,
                } => EdgeKind::FunctionCall {
                    function: function.clone(),
                    bindings: bindings
                        .iter()
                        .map(|b| (b.param.clone(), b.value.clone()))
                        .collect(),
                    return_site: lookup(return_site)?,
                },
                EdgeSpec::FunctionReturn { function } => EdgeKind::FunctionReturn {
                    function: function.clone(),
                },
            };
            builder.edge(from, to, kind);
        }

        builder.build()
    }
}
