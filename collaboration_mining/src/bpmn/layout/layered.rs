use std::collections::{HashMap, HashSet};

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    visit::{depth_first_search, DfsEvent},
    Direction,
};

use crate::{bpmn::bpmn_struct::FlowKind, config::LayoutConfig};

use super::layouter::{LayoutBackend, LayoutError, LayoutGraph};

///
/// Built-in layered layout
///
/// Every cluster (participant) is laid out on its own, left to right: nodes are ranked by the
/// longest path over sequence flows (after removing the back edges found by a depth-first search)
/// and nodes of equal rank are stacked. Clusters are stacked vertically in participant order.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct LayeredLayoutBackend;

/// Longest-path rank of every cluster node
fn cluster_ranks(graph: &LayoutGraph, cluster: &[NodeIndex]) -> HashMap<NodeIndex, usize> {
    let members: HashSet<NodeIndex> = cluster.iter().copied().collect();
    let mut sub: DiGraph<NodeIndex, ()> = DiGraph::new();
    let local: HashMap<NodeIndex, NodeIndex> =
        cluster.iter().map(|&n| (n, sub.add_node(n))).collect();
    for e in graph.graph.edge_indices() {
        let Some((s, t)) = graph.graph.edge_endpoints(e) else {
            continue;
        };
        if graph.graph[e] == FlowKind::Sequence && members.contains(&s) && members.contains(&t) {
            sub.add_edge(local[&s], local[&t], ());
        }
    }

    // roots (no incoming flow) first, so back edges point to the end of loops
    let mut starts: Vec<NodeIndex> = sub
        .node_indices()
        .filter(|&n| sub.neighbors_directed(n, Direction::Incoming).next().is_none())
        .collect();
    starts.extend(sub.node_indices());
    let mut back_edges: HashSet<(NodeIndex, NodeIndex)> = HashSet::new();
    depth_first_search(&sub, starts, |event| {
        if let DfsEvent::BackEdge(u, v) = event {
            back_edges.insert((u, v));
        }
    });

    let mut dag: DiGraph<NodeIndex, ()> = DiGraph::new();
    for n in sub.node_indices() {
        dag.add_node(sub[n]);
    }
    for e in sub.edge_indices() {
        if let Some((s, t)) = sub.edge_endpoints(e) {
            if !back_edges.contains(&(s, t)) {
                dag.add_edge(s, t, ());
            }
        }
    }

    let order = toposort(&dag, None).unwrap_or_else(|_| dag.node_indices().collect());
    let mut rank: HashMap<NodeIndex, usize> = HashMap::new();
    for n in order {
        let r = rank.get(&n).copied().unwrap_or_default();
        for succ in dag.neighbors_directed(n, Direction::Outgoing) {
            let entry = rank.entry(succ).or_default();
            *entry = (*entry).max(r + 1);
        }
        rank.entry(n).or_insert(r);
    }
    rank.into_iter().map(|(n, r)| (dag[n], r)).collect()
}

impl LayoutBackend for LayeredLayoutBackend {
    fn name(&self) -> &'static str {
        "layered"
    }

    fn place(
        &self,
        graph: &LayoutGraph,
        config: &LayoutConfig,
    ) -> Result<HashMap<NodeIndex, (f64, f64)>, LayoutError> {
        let mut positions = HashMap::new();
        let mut offset = config.node_gap;
        for (participant, cluster) in &graph.clusters {
            let ranks = cluster_ranks(graph, cluster);
            let mut rows: HashMap<usize, usize> = HashMap::new();
            for n in cluster {
                let r = ranks.get(n).copied().unwrap_or_default();
                let row = rows.entry(r).or_default();
                positions.insert(
                    *n,
                    (
                        (r + 1) as f64 * config.rank_gap,
                        offset + *row as f64 * config.node_gap,
                    ),
                );
                *row += 1;
            }
            let height = rows.values().copied().max().unwrap_or_default();
            tracing::debug!(
                participant = participant.as_str(),
                nodes = cluster.len(),
                ranks = rows.len(),
                "placed cluster"
            );
            offset += (height + 1) as f64 * config.node_gap;
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bpmn::bpmn_struct::{BpmnDiagram, BpmnNodeKind, GatewayDirection};

    fn x_of(
        positions: &HashMap<NodeIndex, (f64, f64)>,
        graph: &LayoutGraph,
        i: usize,
    ) -> f64 {
        positions[&graph.graph.node_indices().nth(i).unwrap()].0
    }

    #[test]
    fn ranks_follow_sequence_flows() {
        let mut d = BpmnDiagram::new();
        let s = d.add_node(BpmnNodeKind::StartEvent, "", "A");
        let a = d.add_node(BpmnNodeKind::Task, "a", "A");
        let b = d.add_node(BpmnNodeKind::Task, "b", "A");
        d.add_flow(FlowKind::Sequence, s, a);
        d.add_flow(FlowKind::Sequence, a, b);
        let graph = LayoutGraph::from_diagram(&d);
        let config = LayoutConfig::default();
        let positions = LayeredLayoutBackend.place(&graph, &config).unwrap();
        assert_eq!(positions.len(), 3);
        assert!(x_of(&positions, &graph, 0) < x_of(&positions, &graph, 1));
        assert!(x_of(&positions, &graph, 1) < x_of(&positions, &graph, 2));
    }

    #[test]
    fn loops_do_not_break_ranking() {
        let mut d = BpmnDiagram::new();
        let s = d.add_node(BpmnNodeKind::StartEvent, "", "A");
        let join = d.add_node(
            BpmnNodeKind::ExclusiveGateway(GatewayDirection::Converging),
            "",
            "A",
        );
        let a = d.add_node(BpmnNodeKind::Task, "a", "A");
        let split = d.add_node(
            BpmnNodeKind::ExclusiveGateway(GatewayDirection::Diverging),
            "",
            "A",
        );
        d.add_flow(FlowKind::Sequence, s, join);
        d.add_flow(FlowKind::Sequence, join, a);
        d.add_flow(FlowKind::Sequence, a, split);
        d.add_flow(FlowKind::Sequence, split, join);
        let graph = LayoutGraph::from_diagram(&d);
        let positions = LayeredLayoutBackend
            .place(&graph, &LayoutConfig::default())
            .unwrap();
        let xs: Vec<f64> = (0..4).map(|i| x_of(&positions, &graph, i)).collect();
        assert!(xs[0] < xs[1] && xs[1] < xs[2] && xs[2] < xs[3]);
    }

    #[test]
    fn participants_are_stacked() {
        let mut d = BpmnDiagram::new();
        let a = d.add_node(BpmnNodeKind::Task, "a", "A");
        let b = d.add_node(BpmnNodeKind::Task, "b", "B");
        d.add_flow(FlowKind::Message, a, b);
        let graph = LayoutGraph::from_diagram(&d);
        let positions = LayeredLayoutBackend
            .place(&graph, &LayoutConfig::default())
            .unwrap();
        let ia = graph.graph.node_indices().next().unwrap();
        let ib = graph.graph.node_indices().nth(1).unwrap();
        // message flows do not influence ranks
        assert_eq!(positions[&ia].0, positions[&ib].0);
        assert!(positions[&ia].1 < positions[&ib].1);
    }
}
