use std::{collections::HashMap, fmt::Display};

use crate::{
    collaboration_graph::collaboration_graph_struct::{
        CollaborationGraph, CollaborationGraphNode, NodeKey, NodeRole,
    },
    process_tree::process_tree_struct::OperatorType,
};

use super::{
    bpmn_struct::{BpmnDiagram, BpmnNodeKind, FlowKind, GatewayDirection, NodeID},
    promotion::{cleanup_duplicates, promote_message_elements},
};

///
/// Error while lowering a [`CollaborationGraph`] into a [`BpmnDiagram`]
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoweringError {
    /// A loop does not have exactly two children (body and redo)
    InvalidLoop {
        /// Label of the loop node
        label: String,
        /// Number of children found
        children: usize,
    },
    /// Message operators must have been unwrapped when building the graph
    UnexpectedMessageOperator(String),
    /// A child of the global root is not the start node of a party
    RootNotStart(String),
    /// An endpoint of a graph edge was never turned into a diagram node
    MissingEndpoint {
        /// Source of the edge
        from: String,
        /// Target of the edge
        to: String,
    },
    /// A node referenced as child does not exist in the graph
    UnknownNode(String),
}

impl Display for LoweringError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoweringError::InvalidLoop { label, children } => {
                write!(f, "Loop {label} has {children} children (expected 2)")
            }
            LoweringError::UnexpectedMessageOperator(label) => {
                write!(f, "Unexpected message operator {label}")
            }
            LoweringError::RootNotStart(label) => {
                write!(f, "Root child {label} is not a start node")
            }
            LoweringError::MissingEndpoint { from, to } => {
                write!(f, "Endpoint of edge {from} -> {to} was not lowered")
            }
            LoweringError::UnknownNode(label) => write!(f, "Unknown node {label}"),
        }
    }
}

impl std::error::Error for LoweringError {}

/// Entry and exit element of a lowered subgraph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Lowered {
    first: NodeID,
    last: NodeID,
}

impl Lowered {
    fn single(id: NodeID) -> Self {
        Self {
            first: id,
            last: id,
        }
    }
}

struct Lowering<'a> {
    graph: &'a CollaborationGraph,
    diagram: BpmnDiagram,
    /// Lowered graph nodes; `None` for silent subgraphs
    lowered: HashMap<&'a NodeKey, Option<Lowered>>,
    /// Exit element of each process chain below a start node
    exits: Vec<NodeID>,
}

impl<'a> Lowering<'a> {
    fn new(graph: &'a CollaborationGraph) -> Self {
        Self {
            graph,
            diagram: BpmnDiagram::new(),
            lowered: HashMap::new(),
            exits: Vec::new(),
        }
    }

    fn graph_node(&self, key: &NodeKey) -> Result<&'a CollaborationGraphNode, LoweringError> {
        let graph = self.graph;
        graph
            .node(key)
            .ok_or_else(|| LoweringError::UnknownNode(key.to_string()))
    }

    fn ordered_children(&self, node: &CollaborationGraphNode) -> Vec<&'a CollaborationGraphNode> {
        let graph = self.graph;
        graph.ordered_children(&node.key)
    }

    fn participant(node: &CollaborationGraphNode) -> &str {
        node.key.process.as_deref().unwrap_or_default()
    }

    fn lower_root(&mut self) -> Result<(), LoweringError> {
        let graph = self.graph;
        let root = graph
            .global_root()
            .ok_or_else(|| LoweringError::RootNotStart("<none>".to_string()))?;
        for start in self.ordered_children(root) {
            if start.role != NodeRole::Start {
                return Err(LoweringError::RootNotStart(start.key.to_string()));
            }
            self.lower(start)?;
        }
        Ok(())
    }

    /// Connect `from` to every child and every child to `to` (silent children connect both directly)
    fn lower_branches(
        &mut self,
        children: &[&'a CollaborationGraphNode],
        from: NodeID,
        to: NodeID,
    ) -> Result<(), LoweringError> {
        for child in children {
            match self.lower(child)? {
                Some(l) => {
                    self.diagram.add_flow_if_absent(FlowKind::Sequence, from, l.first);
                    self.diagram.add_flow_if_absent(FlowKind::Sequence, l.last, to);
                }
                None => self.diagram.add_flow_if_absent(FlowKind::Sequence, from, to),
            }
        }
        Ok(())
    }

    fn gateway_pair(
        &mut self,
        kind: fn(GatewayDirection) -> BpmnNodeKind,
        participant: &str,
    ) -> (NodeID, NodeID) {
        let split = self
            .diagram
            .add_node(kind(GatewayDirection::Diverging), "", participant);
        let join = self
            .diagram
            .add_node(kind(GatewayDirection::Converging), "", participant);
        (split, join)
    }

    fn lower(&mut self, node: &'a CollaborationGraphNode) -> Result<Option<Lowered>, LoweringError> {
        if let Some(done) = self.lowered.get(&node.key) {
            return Ok(*done);
        }
        let participant = Self::participant(node).to_string();
        let children = self.ordered_children(node);
        let res = match node.role {
            NodeRole::GlobalStart => return Err(LoweringError::RootNotStart(node.key.to_string())),
            NodeRole::Silent => None,
            NodeRole::Activity => Some(Lowered::single(self.diagram.add_node(
                BpmnNodeKind::Task,
                node.key.label.clone(),
                &participant,
            ))),
            NodeRole::Start => {
                let start = self
                    .diagram
                    .add_node(BpmnNodeKind::StartEvent, "", &participant);
                self.lowered.insert(&node.key, Some(Lowered::single(start)));
                for child in children {
                    if let Some(l) = self.lower(child)? {
                        self.diagram
                            .add_flow_if_absent(FlowKind::Sequence, start, l.first);
                        self.exits.push(l.last);
                    }
                }
                Some(Lowered::single(start))
            }
            NodeRole::Operator => match node.key.operator {
                Some(OperatorType::Sequence) => {
                    let mut chain: Option<Lowered> = None;
                    for child in children {
                        let Some(l) = self.lower(child)? else {
                            continue;
                        };
                        chain = match chain {
                            Some(c) => {
                                self.diagram
                                    .add_flow_if_absent(FlowKind::Sequence, c.last, l.first);
                                Some(Lowered {
                                    first: c.first,
                                    last: l.last,
                                })
                            }
                            None => Some(l),
                        };
                    }
                    chain
                }
                Some(OperatorType::ExclusiveChoice) => {
                    let (split, join) =
                        self.gateway_pair(BpmnNodeKind::ExclusiveGateway, &participant);
                    self.lower_branches(&children, split, join)?;
                    Some(Lowered {
                        first: split,
                        last: join,
                    })
                }
                Some(OperatorType::Concurrency | OperatorType::Interleaving) => {
                    let (split, join) =
                        self.gateway_pair(BpmnNodeKind::ParallelGateway, &participant);
                    self.lower_branches(&children, split, join)?;
                    Some(Lowered {
                        first: split,
                        last: join,
                    })
                }
                Some(OperatorType::Or) => {
                    let (split, join) =
                        self.gateway_pair(BpmnNodeKind::InclusiveGateway, &participant);
                    self.lower_branches(&children, split, join)?;
                    Some(Lowered {
                        first: split,
                        last: join,
                    })
                }
                Some(OperatorType::Loop) => {
                    let &[body, redo] = children.as_slice() else {
                        return Err(LoweringError::InvalidLoop {
                            label: node.key.label.clone(),
                            children: children.len(),
                        });
                    };
                    let (split, join) =
                        self.gateway_pair(BpmnNodeKind::ExclusiveGateway, &participant);
                    // join -> body -> split, split -> redo -> join
                    self.lower_branches(&[body], join, split)?;
                    self.lower_branches(&[redo], split, join)?;
                    Some(Lowered {
                        first: join,
                        last: split,
                    })
                }
                Some(OperatorType::ReceiveMessage | OperatorType::SendMessage) => {
                    return Err(LoweringError::UnexpectedMessageOperator(
                        node.key.to_string(),
                    ))
                }
                None => return Err(LoweringError::UnknownNode(node.key.to_string())),
            },
        };
        self.lowered.insert(&node.key, res);
        Ok(res)
    }

    /// Every node without outgoing flow and every process exit gets an end event
    ///
    /// A loop exits through its splitting gateway, which also carries the redo flow.
    fn add_end_events(&mut self) {
        let diagram = &self.diagram;
        let ends_here = |id: NodeID| {
            diagram
                .outgoing(id)
                .any(|f| diagram.node(f.target).map(|n| n.kind) == Some(BpmnNodeKind::EndEvent))
        };
        let open: Vec<(NodeID, String)> = diagram
            .nodes
            .iter()
            .filter(|n| {
                diagram.outgoing(n.id).next().is_none()
                    || (self.exits.contains(&n.id) && !ends_here(n.id))
            })
            .map(|n| (n.id, n.participant.clone()))
            .collect();
        for (id, participant) in open {
            let end = self.diagram.add_node(BpmnNodeKind::EndEvent, "", &participant);
            self.diagram.add_flow(FlowKind::Sequence, id, end);
        }
    }

    /// Turn the remaining graph edges between lowered elements into flows
    fn add_edge_flows(&mut self) -> Result<(), LoweringError> {
        let graph = self.graph;
        for (from, to) in &graph.edges {
            let from_node = self.graph_node(from)?;
            let to_node = self.graph_node(to)?;
            let carries_flow =
                |n: &CollaborationGraphNode| matches!(n.role, NodeRole::Activity | NodeRole::Start);
            if !carries_flow(from_node) || !carries_flow(to_node) {
                continue;
            }
            let endpoints = (
                self.lowered.get(from).copied().flatten(),
                self.lowered.get(to).copied().flatten(),
            );
            let (Some(source), Some(target)) = endpoints else {
                return Err(LoweringError::MissingEndpoint {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            };
            let kind = if from.process == to.process {
                FlowKind::Sequence
            } else {
                FlowKind::Message
            };
            // a lowered activity starts and ends with itself
            if source.last != target.first {
                self.diagram
                    .add_flow_if_absent(kind, source.last, target.first);
            }
        }
        Ok(())
    }
}

///
/// Lower a [`CollaborationGraph`] into a [`BpmnDiagram`] with one participant per party
///
/// Start nodes become start events, activities tasks and operators pairs of splitting/joining
/// gateways; sequences are chained without gateways. Loops become an entry (joining) and an exit
/// (splitting) exclusive gateway with the body between entry and exit and the redo part leading
/// back from exit to entry. Silent nodes are not materialized. Nodes without outgoing flow and the
/// exit of every process get an end event and message edges become message flows. Finally message-specific elements are
/// introduced (see [`promote_message_elements`]).
///
pub fn lower_collaboration_graph(
    graph: &CollaborationGraph,
) -> Result<BpmnDiagram, LoweringError> {
    let mut lowering = Lowering::new(graph);
    for process in graph.processes() {
        lowering.diagram.add_participant(&process);
    }
    lowering.lower_root()?;
    lowering.add_end_events();
    lowering.add_edge_flows()?;
    let mut diagram = lowering.diagram;
    promote_message_elements(&mut diagram);
    cleanup_duplicates(&mut diagram);
    tracing::info!(
        participants = diagram.participants.len(),
        nodes = diagram.nodes.len(),
        sequence_flows = diagram.count_flows(FlowKind::Sequence),
        message_flows = diagram.count_flows(FlowKind::Message),
        "lowered collaboration graph"
    );
    Ok(diagram)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaboration_graph::build_collaboration_graph::build_collaboration_graph;
    use crate::process_tree::process_tree_struct::{Leaf, Node, ProcessTree};

    fn kinds(diagram: &BpmnDiagram, participant: &str) -> Vec<BpmnNodeKind> {
        diagram.nodes_of(participant).map(|n| n.kind).collect()
    }

    fn names(diagram: &BpmnDiagram) -> Vec<&str> {
        let mut res: Vec<&str> = diagram
            .nodes
            .iter()
            .filter(|n| n.kind.is_task())
            .map(|n| n.name.as_str())
            .collect();
        res.sort();
        res
    }

    fn sequence_tree() -> ProcessTree {
        let mut t = ProcessTree::new("A", Node::Operator(OperatorType::Sequence));
        for a in ["a", "b", "c"] {
            let leaf = t.add_node(Node::Leaf(Leaf::activity(a)));
            t.push_child(0, leaf);
        }
        t
    }

    #[test]
    fn sequence_is_chained_without_gateways() {
        let t = sequence_tree();
        let graph = build_collaboration_graph(&[&t]).unwrap();
        let diagram = lower_collaboration_graph(&graph).unwrap();
        assert_eq!(names(&diagram), vec!["a", "b", "c"]);
        assert!(!diagram.nodes.iter().any(|n| n.kind.is_gateway()));
        assert_eq!(diagram.nodes_of_kind(BpmnNodeKind::StartEvent).count(), 1);
        assert_eq!(diagram.nodes_of_kind(BpmnNodeKind::EndEvent).count(), 1);
        // start -> a -> b -> c -> end
        assert_eq!(diagram.count_flows(FlowKind::Sequence), 4);
        for n in &diagram.nodes {
            if n.kind != BpmnNodeKind::EndEvent {
                assert_eq!(diagram.outgoing(n.id).count(), 1);
            }
        }
    }

    #[test]
    fn exclusive_choice_with_silent_branch() {
        let mut t = ProcessTree::new("A", Node::Operator(OperatorType::ExclusiveChoice));
        let a = t.add_node(Node::Leaf(Leaf::activity("a")));
        t.push_child(0, a);
        let tau = t.add_node(Node::Leaf(Leaf::tau()));
        t.push_child(0, tau);
        let graph = build_collaboration_graph(&[&t]).unwrap();
        let diagram = lower_collaboration_graph(&graph).unwrap();
        let k = kinds(&diagram, "A");
        assert!(k.contains(&BpmnNodeKind::ExclusiveGateway(GatewayDirection::Diverging)));
        assert!(k.contains(&BpmnNodeKind::ExclusiveGateway(GatewayDirection::Converging)));
        // start->split, split->a, a->join, split->join, join->end
        assert_eq!(diagram.count_flows(FlowKind::Sequence), 5);
    }

    #[test]
    fn loop_has_back_edge() {
        let mut t = ProcessTree::new("A", Node::Operator(OperatorType::Loop));
        let a = t.add_node(Node::Leaf(Leaf::activity("a")));
        t.push_child(0, a);
        let b = t.add_node(Node::Leaf(Leaf::activity("b")));
        t.push_child(0, b);
        let graph = build_collaboration_graph(&[&t]).unwrap();
        let diagram = lower_collaboration_graph(&graph).unwrap();
        let join = diagram
            .nodes_of_kind(BpmnNodeKind::ExclusiveGateway(GatewayDirection::Converging))
            .next()
            .unwrap()
            .id;
        let split = diagram
            .nodes_of_kind(BpmnNodeKind::ExclusiveGateway(GatewayDirection::Diverging))
            .next()
            .unwrap()
            .id;
        let task = |name: &str| diagram.nodes.iter().find(|n| n.name == name).unwrap().id;
        assert!(diagram.find_flow(join, task("a")).is_some());
        assert!(diagram.find_flow(task("a"), split).is_some());
        assert!(diagram.find_flow(split, task("b")).is_some());
        assert!(diagram.find_flow(task("b"), join).is_some());
        // redo branch and end event
        assert_eq!(diagram.outgoing(split).count(), 2);
    }

    fn loop_tree(prefix: Option<&str>) -> ProcessTree {
        let (mut t, parent) = match prefix {
            Some(x) => {
                let mut t = ProcessTree::new("A", Node::Operator(OperatorType::Sequence));
                let leaf = t.add_node(Node::Leaf(Leaf::activity(x)));
                t.push_child(0, leaf);
                let lp = t.add_node(Node::Operator(OperatorType::Loop));
                t.push_child(0, lp);
                (t, lp)
            }
            None => (ProcessTree::new("A", Node::Operator(OperatorType::Loop)), 0),
        };
        for a in ["a", "b"] {
            let leaf = t.add_node(Node::Leaf(Leaf::activity(a)));
            t.push_child(parent, leaf);
        }
        t
    }

    fn assert_single_end_and_no_sinks(diagram: &BpmnDiagram) {
        assert_eq!(diagram.nodes_of_kind(BpmnNodeKind::EndEvent).count(), 1);
        for n in &diagram.nodes {
            if n.kind != BpmnNodeKind::EndEvent {
                assert!(
                    diagram.outgoing(n.id).next().is_some(),
                    "{:?} {} has no outgoing flow",
                    n.kind,
                    n.name
                );
            }
        }
    }

    #[test]
    fn process_consisting_of_a_loop_ends() {
        let t = loop_tree(None);
        assert_eq!(t.to_string(), "*( 'a', 'b' )");
        let graph = build_collaboration_graph(&[&t]).unwrap();
        let diagram = lower_collaboration_graph(&graph).unwrap();
        assert_single_end_and_no_sinks(&diagram);
        let split = diagram
            .nodes_of_kind(BpmnNodeKind::ExclusiveGateway(GatewayDirection::Diverging))
            .next()
            .unwrap()
            .id;
        let end = diagram
            .nodes_of_kind(BpmnNodeKind::EndEvent)
            .next()
            .unwrap()
            .id;
        assert!(diagram.find_flow(split, end).is_some());
    }

    #[test]
    fn sequence_ending_in_a_loop_ends() {
        let t = loop_tree(Some("x"));
        assert_eq!(t.to_string(), "->( 'x', *( 'a', 'b' ) )");
        let graph = build_collaboration_graph(&[&t]).unwrap();
        let diagram = lower_collaboration_graph(&graph).unwrap();
        assert_single_end_and_no_sinks(&diagram);
        assert_eq!(names(&diagram), vec!["a", "b", "x"]);
    }

    #[test]
    fn loop_with_three_children_is_rejected() {
        let mut t = ProcessTree::new("A", Node::Operator(OperatorType::Loop));
        for a in ["a", "b", "c"] {
            let leaf = t.add_node(Node::Leaf(Leaf::activity(a)));
            t.push_child(0, leaf);
        }
        let graph = build_collaboration_graph(&[&t]).unwrap();
        assert_eq!(
            lower_collaboration_graph(&graph),
            Err(LoweringError::InvalidLoop {
                label: "LOOP_A_0".into(),
                children: 3
            })
        );
    }

    #[test]
    fn parallel_and_or_gateways() {
        let mut t = ProcessTree::new("A", Node::Operator(OperatorType::Concurrency));
        let a = t.add_node(Node::Leaf(Leaf::activity("a")));
        t.push_child(0, a);
        let or = t.add_node(Node::Operator(OperatorType::Or));
        t.push_child(0, or);
        for x in ["b", "c"] {
            let leaf = t.add_node(Node::Leaf(Leaf::activity(x)));
            t.push_child(or, leaf);
        }
        let graph = build_collaboration_graph(&[&t]).unwrap();
        let diagram = lower_collaboration_graph(&graph).unwrap();
        let k = kinds(&diagram, "A");
        assert_eq!(
            k.iter()
                .filter(|k| matches!(k, BpmnNodeKind::ParallelGateway(_)))
                .count(),
            2
        );
        assert_eq!(
            k.iter()
                .filter(|k| matches!(k, BpmnNodeKind::InclusiveGateway(_)))
                .count(),
            2
        );
    }

    #[test]
    fn message_operator_in_graph_is_rejected() {
        let mut graph = CollaborationGraph::new();
        let root = NodeKey::global_start();
        let start = NodeKey::start("A");
        let rcv = NodeKey {
            label: "RECEIVE_MESSAGE_A_0".into(),
            operator: Some(OperatorType::ReceiveMessage),
            process: Some("A".into()),
        };
        graph.add_node(CollaborationGraphNode::new(root.clone(), NodeRole::GlobalStart, 0));
        graph.add_node(CollaborationGraphNode::new(start.clone(), NodeRole::Start, 0));
        graph.add_node(CollaborationGraphNode::new(rcv.clone(), NodeRole::Operator, 0));
        graph.add_edge(root, start.clone());
        graph.add_edge(start, rcv);
        graph.deduplicate();
        assert!(matches!(
            lower_collaboration_graph(&graph),
            Err(LoweringError::UnexpectedMessageOperator(_))
        ));
    }

    #[test]
    fn root_child_must_be_start() {
        let mut graph = CollaborationGraph::new();
        let root = NodeKey::global_start();
        let a = NodeKey::activity("a", "A");
        graph.add_node(CollaborationGraphNode::new(root.clone(), NodeRole::GlobalStart, 0));
        graph.add_node(CollaborationGraphNode::new(a.clone(), NodeRole::Activity, 0));
        graph.add_edge(root, a);
        graph.deduplicate();
        assert_eq!(
            lower_collaboration_graph(&graph),
            Err(LoweringError::RootNotStart("a@A".into()))
        );
    }
}
