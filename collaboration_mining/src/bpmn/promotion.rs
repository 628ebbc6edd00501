use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::bpmn_struct::{BpmnDiagram, BpmnNodeKind, FlowKind, GatewayDirection, NodeID};

///
/// Replace a node by a new node of another kind
///
/// The replacement keeps name, participant and bounds; all incident flows are relinked to it.
/// Returns the ID of the replacement.
///
fn replace_node(diagram: &mut BpmnDiagram, id: NodeID, kind: BpmnNodeKind) -> Option<NodeID> {
    let pos = diagram.nodes.iter().position(|n| n.id == id)?;
    let mut replacement = diagram.nodes[pos].clone();
    replacement.id = NodeID(Uuid::new_v4());
    replacement.kind = kind;
    let new_id = replacement.id;
    diagram.nodes[pos] = replacement;
    for flow in &mut diagram.flows {
        if flow.source == id {
            flow.source = new_id;
        }
        if flow.target == id {
            flow.target = new_id;
        }
    }
    Some(new_id)
}

/// Replace all nodes matching `predicate` (evaluated on a snapshot) by nodes of kind `to`
fn promote<F>(diagram: &mut BpmnDiagram, to: BpmnNodeKind, predicate: F) -> usize
where
    F: Fn(&BpmnDiagram, NodeID) -> bool,
{
    let candidates: Vec<NodeID> = diagram
        .nodes
        .iter()
        .filter(|n| n.kind != to && predicate(diagram, n.id))
        .map(|n| n.id)
        .collect();
    let mut promoted = 0;
    for id in candidates {
        if let Some(new_id) = replace_node(diagram, id, to) {
            tracing::debug!(from = %id.get_uuid(), to = %new_id.get_uuid(), kind = ?to, "promoted node");
            promoted += 1;
        }
    }
    promoted
}

fn kind_of(diagram: &BpmnDiagram, id: NodeID) -> Option<BpmnNodeKind> {
    diagram.node(id).map(|n| n.kind)
}

/// Plain tasks with an incoming message flow become receive tasks
pub fn promote_receive_tasks(diagram: &mut BpmnDiagram) -> usize {
    promote(diagram, BpmnNodeKind::ReceiveTask, |d, id| {
        kind_of(d, id) == Some(BpmnNodeKind::Task)
            && d.incoming(id).any(|f| f.kind == FlowKind::Message)
    })
}

/// Plain tasks with an outgoing message flow become send tasks
pub fn promote_send_tasks(diagram: &mut BpmnDiagram) -> usize {
    promote(diagram, BpmnNodeKind::SendTask, |d, id| {
        kind_of(d, id) == Some(BpmnNodeKind::Task)
            && d.outgoing(id).any(|f| f.kind == FlowKind::Message)
    })
}

/// Start events directly followed by receive tasks only become message start events
pub fn promote_message_start_events(diagram: &mut BpmnDiagram) -> usize {
    promote(diagram, BpmnNodeKind::MessageStartEvent, |d, id| {
        let mut successors = d
            .outgoing(id)
            .filter(|f| f.kind == FlowKind::Sequence)
            .map(|f| kind_of(d, f.target))
            .peekable();
        kind_of(d, id) == Some(BpmnNodeKind::StartEvent)
            && successors.peek().is_some()
            && successors.all(|k| k == Some(BpmnNodeKind::ReceiveTask))
    })
}

///
/// Splitting exclusive gateways whose branches all start by receiving a message become
/// event-based gateways
///
pub fn promote_event_based_gateways(diagram: &mut BpmnDiagram) -> usize {
    promote(
        diagram,
        BpmnNodeKind::EventBasedGateway(GatewayDirection::Diverging),
        |d, id| {
            let targets: Vec<Option<BpmnNodeKind>> = d
                .outgoing(id)
                .filter(|f| f.kind == FlowKind::Sequence)
                .map(|f| kind_of(d, f.target))
                .collect();
            kind_of(d, id) == Some(BpmnNodeKind::ExclusiveGateway(GatewayDirection::Diverging))
                && targets.len() >= 2
                && targets.iter().all(|k| {
                    matches!(
                        k,
                        Some(BpmnNodeKind::ReceiveTask | BpmnNodeKind::MessageStartEvent)
                    )
                })
        },
    )
}

///
/// Run all promotion passes: receive tasks, send tasks, message start events and event-based
/// gateways (in this order)
///
/// Every pass only touches nodes that do not have the target kind yet, so running this again
/// does not change the diagram.
///
pub fn promote_message_elements(diagram: &mut BpmnDiagram) -> usize {
    let promoted = promote_receive_tasks(diagram)
        + promote_send_tasks(diagram)
        + promote_message_start_events(diagram)
        + promote_event_based_gateways(diagram);
    tracing::debug!(promoted, "promoted message elements");
    promoted
}

///
/// Remove duplicate nodes and flows
///
/// Named nodes with equal `(name, participant)` are the same logical activity: the most specific
/// one is kept (the first one on ties) and the flows of the others are moved to it. Afterwards
/// flows with a removed endpoint, self-loops created by merging and duplicate flows are dropped.
/// Works on snapshots of the node and flow lists. Returns the number of removed nodes and flows.
///
pub fn cleanup_duplicates(diagram: &mut BpmnDiagram) -> (usize, usize) {
    let mut keeper: HashMap<(&str, &str), NodeID> = HashMap::new();
    for n in diagram.nodes.iter().filter(|n| !n.name.is_empty()) {
        let key = (n.name.as_str(), n.participant.as_str());
        match keeper.get(&key).and_then(|k| diagram.node(*k)) {
            Some(kept) if kept.kind.specificity() >= n.kind.specificity() => {}
            _ => {
                keeper.insert(key, n.id);
            }
        }
    }
    let replace: HashMap<NodeID, NodeID> = diagram
        .nodes
        .iter()
        .filter(|n| !n.name.is_empty())
        .filter_map(|n| {
            let kept = keeper.get(&(n.name.as_str(), n.participant.as_str()))?;
            (*kept != n.id).then_some((n.id, *kept))
        })
        .collect();

    let nodes_before = diagram.nodes.len();
    diagram.nodes.retain(|n| !replace.contains_key(&n.id));
    let removed_nodes = nodes_before - diagram.nodes.len();

    for flow in &mut diagram.flows {
        if let Some(k) = replace.get(&flow.source) {
            flow.source = *k;
        }
        if let Some(k) = replace.get(&flow.target) {
            flow.target = *k;
        }
    }
    let existing: HashSet<NodeID> = diagram.nodes.iter().map(|n| n.id).collect();
    let mut seen: HashSet<(NodeID, NodeID, FlowKind)> = HashSet::new();
    let flows_before = diagram.flows.len();
    diagram.flows.retain(|f| {
        f.source != f.target
            && existing.contains(&f.source)
            && existing.contains(&f.target)
            && seen.insert((f.source, f.target, f.kind))
    });
    let removed_flows = flows_before - diagram.flows.len();
    if removed_nodes + removed_flows > 0 {
        tracing::debug!(removed_nodes, removed_flows, "cleaned up diagram");
    }
    (removed_nodes, removed_flows)
}
