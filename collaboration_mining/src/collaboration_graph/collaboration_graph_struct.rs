use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::{
    discovery::message_correlation::ActivityKey, process_tree::process_tree_struct::OperatorType,
};

/// Label of the synthetic root node connecting all parties
pub const GLOBAL_START_LABEL: &str = "GlobalStart";

///
/// Identity of a [`CollaborationGraphNode`]
///
/// Two nodes with equal keys are the same node.
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    /// Label (activity name, or a generated name for operators, starts and silent nodes)
    pub label: String,
    /// Operator of operator nodes
    pub operator: Option<OperatorType>,
    /// Owning process (`None` only for the global start)
    pub process: Option<String>,
}

impl NodeKey {
    /// Key of the activity node of `activity` in `process`
    pub fn activity<S: Into<String>, P: Into<String>>(activity: S, process: P) -> Self {
        Self {
            label: activity.into(),
            operator: None,
            process: Some(process.into()),
        }
    }

    /// Key of the start node of `process`
    pub fn start(process: &str) -> Self {
        Self {
            label: format!("Start_{process}"),
            operator: None,
            process: Some(process.to_string()),
        }
    }

    /// Key of the global start node
    pub fn global_start() -> Self {
        Self {
            label: GLOBAL_START_LABEL.to_string(),
            operator: Some(OperatorType::Concurrency),
            process: None,
        }
    }
}

impl From<&ActivityKey> for NodeKey {
    fn from(key: &ActivityKey) -> Self {
        NodeKey::activity(key.activity.clone(), key.process.clone())
    }
}

impl Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.process {
            Some(p) => write!(f, "{}@{}", self.label, p),
            None => write!(f, "{}", self.label),
        }
    }
}

///
/// Role of a node in the collaboration graph
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    /// Synthetic root of all parties
    GlobalStart,
    /// Start node of one party
    Start,
    /// Control-flow operator
    Operator,
    /// Activity
    Activity,
    /// Silent step
    Silent,
}

///
/// Node in a [`CollaborationGraph`]
///
/// Adjacency lists hold keys of other nodes. `children`/`parents` only contain control-flow
/// edges (inside one process or from the global start), `incoming`/`outgoing` all edges.
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationGraphNode {
    /// Identity
    pub key: NodeKey,
    /// Role
    pub role: NodeRole,
    /// Position among the children of its control-flow parent
    pub index: usize,
    /// Control-flow parents
    pub parents: Vec<NodeKey>,
    /// Control-flow children, in order
    pub children: Vec<NodeKey>,
    /// Sources of all incoming edges
    pub incoming: Vec<NodeKey>,
    /// Targets of all outgoing edges
    pub outgoing: Vec<NodeKey>,
}

impl CollaborationGraphNode {
    /// New node without any adjacency
    pub fn new(key: NodeKey, role: NodeRole, index: usize) -> Self {
        Self {
            key,
            role,
            index,
            parents: Vec::new(),
            children: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
        }
    }

    /// `true` for silent nodes
    pub fn is_silent(&self) -> bool {
        self.role == NodeRole::Silent
    }
}

///
/// Directed graph combining the process trees of all parties and the messages between them
///
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaborationGraph {
    /// Nodes (may contain duplicates until [`CollaborationGraph::deduplicate`])
    pub nodes: Vec<CollaborationGraphNode>,
    /// Edges as pairs of node keys
    pub edges: Vec<(NodeKey, NodeKey)>,
}

impl CollaborationGraph {
    /// Empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node (duplicates are only removed by [`CollaborationGraph::deduplicate`])
    pub fn add_node(&mut self, node: CollaborationGraphNode) {
        self.nodes.push(node);
    }

    /// Add an edge
    pub fn add_edge(&mut self, from: NodeKey, to: NodeKey) {
        self.edges.push((from, to));
    }

    /// Lookup a node by key
    pub fn node(&self, key: &NodeKey) -> Option<&CollaborationGraphNode> {
        self.nodes.iter().find(|n| &n.key == key)
    }

    /// `true` if a node with this key exists
    pub fn contains_node(&self, key: &NodeKey) -> bool {
        self.node(key).is_some()
    }

    /// `true` if the edge exists
    pub fn contains_edge(&self, from: &NodeKey, to: &NodeKey) -> bool {
        self.edges.iter().any(|(f, t)| f == from && t == to)
    }

    /// The global start node, if present
    pub fn global_root(&self) -> Option<&CollaborationGraphNode> {
        self.nodes.iter().find(|n| n.role == NodeRole::GlobalStart)
    }

    /// Names of all processes, in order of the children of the global start
    pub fn processes(&self) -> Vec<String> {
        match self.global_root() {
            Some(root) => root
                .children
                .iter()
                .filter_map(|k| k.process.clone())
                .collect(),
            None => Vec::new(),
        }
    }

    ///
    /// `true` if the edge is a control-flow edge (both ends in the same process, or leaving the
    /// global start); all other edges are messages
    ///
    pub fn is_control_flow_edge(from: &NodeKey, to: &NodeKey) -> bool {
        from.process.is_none() || from.process == to.process
    }

    /// All message edges
    pub fn message_edges(&self) -> impl Iterator<Item = &(NodeKey, NodeKey)> + '_ {
        self.edges
            .iter()
            .filter(|(f, t)| !Self::is_control_flow_edge(f, t))
    }

    ///
    /// Remove duplicate nodes and edges, edges with a missing endpoint and self-loops
    ///
    /// The first occurrence of a node is kept. Afterwards the adjacency of all nodes is rebuilt
    /// from the edges. Applying this twice gives the same graph as applying it once.
    ///
    pub fn deduplicate(&mut self) {
        let mut seen: HashSet<NodeKey> = HashSet::new();
        self.nodes.retain(|n| seen.insert(n.key.clone()));
        let mut seen_edges: HashSet<(NodeKey, NodeKey)> = HashSet::new();
        self.edges.retain(|(f, t)| {
            f != t
                && seen.contains(f)
                && seen.contains(t)
                && seen_edges.insert((f.clone(), t.clone()))
        });
        self.rebuild_adjacency();
    }

    ///
    /// Rebuild adjacency lists of all nodes from the edges and set sibling indices
    ///
    pub fn rebuild_adjacency(&mut self) {
        let position: HashMap<NodeKey, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.key.clone(), i))
            .collect();
        for n in &mut self.nodes {
            n.parents.clear();
            n.children.clear();
            n.incoming.clear();
            n.outgoing.clear();
        }
        for (from, to) in &self.edges {
            let (Some(&f), Some(&t)) = (position.get(from), position.get(to)) else {
                continue;
            };
            self.nodes[f].outgoing.push(to.clone());
            self.nodes[t].incoming.push(from.clone());
            if Self::is_control_flow_edge(from, to) {
                self.nodes[f].children.push(to.clone());
                self.nodes[t].parents.push(from.clone());
            }
        }
        self.fix_child_indexes(&position);
    }

    fn fix_child_indexes(&mut self, position: &HashMap<NodeKey, usize>) {
        let updates: Vec<(usize, usize)> = self
            .nodes
            .iter()
            .flat_map(|n| {
                n.children
                    .iter()
                    .enumerate()
                    .filter_map(|(i, c)| position.get(c).map(|p| (*p, i)))
            })
            .collect();
        for (p, i) in updates {
            self.nodes[p].index = i;
        }
        for n in &mut self.nodes {
            if n.role == NodeRole::GlobalStart {
                n.index = 0;
            }
        }
    }

    ///
    /// Control-flow children of a node, sorted by their sibling index
    ///
    pub fn ordered_children(&self, key: &NodeKey) -> Vec<&CollaborationGraphNode> {
        let mut res: Vec<&CollaborationGraphNode> = self
            .node(key)
            .map(|n| n.children.iter().filter_map(|c| self.node(c)).collect())
            .unwrap_or_default();
        res.sort_by_key(|n| n.index);
        res
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(key: &NodeKey, role: NodeRole) -> CollaborationGraphNode {
        CollaborationGraphNode::new(key.clone(), role, 0)
    }

    fn sample() -> CollaborationGraph {
        let root = NodeKey::global_start();
        let start = NodeKey::start("A");
        let a = NodeKey::activity("a", "A");
        let b = NodeKey::activity("b", "B");
        let mut g = CollaborationGraph::new();
        g.add_node(node(&root, NodeRole::GlobalStart));
        g.add_node(node(&start, NodeRole::Start));
        g.add_node(node(&a, NodeRole::Activity));
        g.add_node(node(&a, NodeRole::Activity));
        g.add_node(node(&b, NodeRole::Activity));
        g.add_edge(root.clone(), start.clone());
        g.add_edge(start.clone(), a.clone());
        g.add_edge(start.clone(), a.clone());
        g.add_edge(a.clone(), a.clone());
        g.add_edge(a.clone(), b.clone());
        g.add_edge(a.clone(), NodeKey::activity("missing", "A"));
        g
    }

    #[test]
    fn deduplicate_removes_duplicates_loops_and_dangling_edges() {
        let mut g = sample();
        g.deduplicate();
        assert_eq!(g.nodes.len(), 4);
        assert_eq!(g.edges.len(), 3);
        let a = g.node(&NodeKey::activity("a", "A")).unwrap();
        assert_eq!(a.parents, vec![NodeKey::start("A")]);
        assert!(a.children.is_empty());
        assert_eq!(a.outgoing, vec![NodeKey::activity("b", "B")]);
        assert_eq!(g.message_edges().count(), 1);
        assert_eq!(g.processes(), vec!["A".to_string()]);
    }

    #[test]
    fn deduplicate_is_idempotent() {
        let mut once = sample();
        once.deduplicate();
        let mut twice = once.clone();
        twice.deduplicate();
        assert_eq!(once, twice);
    }

    #[test]
    fn sibling_indices_follow_edge_order() {
        let start = NodeKey::start("A");
        let a = NodeKey::activity("a", "A");
        let b = NodeKey::activity("b", "A");
        let mut g = CollaborationGraph::new();
        g.add_node(node(&start, NodeRole::Start));
        g.add_node(node(&b, NodeRole::Activity));
        g.add_node(node(&a, NodeRole::Activity));
        g.add_edge(start.clone(), a.clone());
        g.add_edge(start.clone(), b.clone());
        g.deduplicate();
        let kids: Vec<&str> = g
            .ordered_children(&start)
            .iter()
            .map(|n| n.key.label.as_str())
            .collect();
        assert_eq!(kids, vec!["a", "b"]);
    }
}
