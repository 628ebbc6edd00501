use std::fmt::Display;

use crate::{
    discovery::message_correlation::ActivityKey,
    process_tree::process_tree_struct::{LeafLabel, Node, NodeId, OperatorType, ProcessTree},
};

use super::collaboration_graph_struct::{
    CollaborationGraph, CollaborationGraphNode, NodeKey, NodeRole,
};

///
/// Error while building a [`CollaborationGraph`]
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaborationGraphError {
    /// Endpoint of a message edge not found after all parties were merged
    NodeNotFound {
        /// Process of the missing node
        process: String,
        /// Label of the missing node
        label: String,
    },
    /// The global start node is missing
    MissingStartNode,
}

impl Display for CollaborationGraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to build collaboration graph: {:?}", self)
    }
}

impl std::error::Error for CollaborationGraphError {}

/// Message edge that can only be added once the graphs of all parties are merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEdge {
    /// Sending activity
    pub from: ActivityKey,
    /// Receiving activity
    pub to: ActivityKey,
}

struct PartyGraphBuilder<'a> {
    tree: &'a ProcessTree,
    process: &'a str,
    start: NodeKey,
    graph: CollaborationGraph,
    pending: Vec<PendingEdge>,
    operator_count: usize,
    silent_count: usize,
}

impl<'a> PartyGraphBuilder<'a> {
    fn new(tree: &'a ProcessTree) -> Self {
        let process = tree.process.as_str();
        let start = NodeKey::start(process);
        let mut graph = CollaborationGraph::new();
        graph.add_node(CollaborationGraphNode::new(start.clone(), NodeRole::Start, 0));
        Self {
            tree,
            process,
            start,
            graph,
            pending: Vec::new(),
            operator_count: 0,
            silent_count: 0,
        }
    }

    fn build(mut self) -> (CollaborationGraph, Vec<PendingEdge>) {
        if !self.tree.is_empty() {
            let start = self.start.clone();
            self.visit(self.tree.root(), &start, 0);
        }
        (self.graph, self.pending)
    }

    fn add(&mut self, key: NodeKey, role: NodeRole, parent: &NodeKey, index: usize) {
        self.graph
            .add_node(CollaborationGraphNode::new(key.clone(), role, index));
        self.graph.add_edge(parent.clone(), key);
    }

    fn visit(&mut self, id: NodeId, parent: &NodeKey, index: usize) {
        let tree = self.tree;
        match tree.node(id) {
            Node::Operator(op) if op.is_message() => self.visit_message(id, *op, parent, index),
            Node::Operator(op) => {
                let key = NodeKey {
                    label: format!("{}_{}_{}", op.name(), self.process, self.operator_count),
                    operator: Some(*op),
                    process: Some(self.process.to_string()),
                };
                self.operator_count += 1;
                self.add(key.clone(), NodeRole::Operator, parent, index);
                for (i, &c) in tree.children(id).iter().enumerate() {
                    self.visit(c, &key, i);
                }
            }
            Node::Leaf(leaf) => match &leaf.label {
                LeafLabel::Tau => {
                    let key = NodeKey {
                        label: format!("tau_{}", self.silent_count),
                        operator: None,
                        process: Some(self.process.to_string()),
                    };
                    self.silent_count += 1;
                    self.add(key, NodeRole::Silent, parent, index);
                }
                LeafLabel::Activity(a) => {
                    let process = leaf.partner_process.as_deref().unwrap_or(self.process);
                    let key = NodeKey::activity(a.clone(), process);
                    if key != self.start {
                        self.add(key, NodeRole::Activity, parent, index);
                    }
                }
            },
        }
    }

    fn visit_message(&mut self, id: NodeId, op: OperatorType, parent: &NodeKey, index: usize) {
        let tree = self.tree;
        let Some((local, partners)) = tree.message_endpoints(id) else {
            tracing::warn!(process = self.process, node = id, "malformed message node");
            return;
        };
        self.visit(local, parent, index);
        let Some(local_activity) = leaf_activity(tree, local) else {
            return;
        };
        let local_key = ActivityKey::new(self.process, local_activity);
        for p in partners {
            let Node::Leaf(leaf) = tree.node(p) else {
                continue;
            };
            let (Some(activity), Some(process)) = (leaf.activity_name(), &leaf.partner_process)
            else {
                continue;
            };
            let partner_key = ActivityKey::new(process.as_str(), activity);
            let edge = if op == OperatorType::ReceiveMessage {
                PendingEdge {
                    from: partner_key,
                    to: local_key.clone(),
                }
            } else {
                PendingEdge {
                    from: local_key.clone(),
                    to: partner_key,
                }
            };
            self.pending.push(edge);
        }
    }
}

fn leaf_activity(tree: &ProcessTree, id: NodeId) -> Option<&str> {
    match tree.node(id) {
        Node::Leaf(leaf) => leaf.activity_name(),
        Node::Operator(_) => None,
    }
}

///
/// Convert the process tree of one party into a graph
///
/// Returns the graph (rooted in the start node of the party) and the message edges to other
/// parties that have to be resolved after merging.
///
pub fn tree_to_graph(tree: &ProcessTree) -> (CollaborationGraph, Vec<PendingEdge>) {
    PartyGraphBuilder::new(tree).build()
}

///
/// Merge party graphs: all nodes and edges plus a global start node connected to the start node
/// of every party
///
pub fn merge_graphs(graphs: Vec<CollaborationGraph>) -> CollaborationGraph {
    let mut merged = CollaborationGraph::new();
    let root = NodeKey::global_start();
    merged.add_node(CollaborationGraphNode::new(
        root.clone(),
        NodeRole::GlobalStart,
        0,
    ));
    for graph in graphs {
        let starts: Vec<NodeKey> = graph
            .nodes
            .iter()
            .filter(|n| n.role == NodeRole::Start)
            .map(|n| n.key.clone())
            .collect();
        merged.nodes.extend(graph.nodes);
        merged.edges.extend(graph.edges);
        for start in starts {
            merged.add_edge(root.clone(), start);
        }
    }
    merged
}

///
/// Add all pending message edges to the merged graph
///
/// Both endpoints have to exist by now; edges already present are not added again.
///
pub fn resolve_pending_edges(
    graph: &mut CollaborationGraph,
    pending: &[PendingEdge],
) -> Result<(), CollaborationGraphError> {
    for edge in pending {
        let from = NodeKey::from(&edge.from);
        let to = NodeKey::from(&edge.to);
        for key in [&from, &to] {
            if !graph.contains_node(key) {
                return Err(CollaborationGraphError::NodeNotFound {
                    process: key.process.clone().unwrap_or_default(),
                    label: key.label.clone(),
                });
            }
        }
        if !graph.contains_edge(&from, &to) {
            graph.add_edge(from, to);
        }
    }
    Ok(())
}

///
/// Build the [`CollaborationGraph`] of the process trees of all parties
///
/// Each tree is converted on its own, the graphs are merged below a global start node, message
/// edges are resolved and the result is de-duplicated.
///
pub fn build_collaboration_graph(
    trees: &[&ProcessTree],
) -> Result<CollaborationGraph, CollaborationGraphError> {
    let mut graphs = Vec::with_capacity(trees.len());
    let mut pending = Vec::new();
    for tree in trees {
        let (graph, edges) = tree_to_graph(tree);
        graphs.push(graph);
        pending.extend(edges);
    }
    let mut graph = merge_graphs(graphs);
    resolve_pending_edges(&mut graph, &pending)?;
    graph.deduplicate();
    if graph.global_root().is_none() {
        return Err(CollaborationGraphError::MissingStartNode);
    }
    tracing::info!(
        nodes = graph.nodes.len(),
        edges = graph.edges.len(),
        messages = graph.message_edges().count(),
        "built collaboration graph"
    );
    Ok(graph)
}
