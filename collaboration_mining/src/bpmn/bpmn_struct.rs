use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord, Serialize, Deserialize)]
/// Node ID
pub struct NodeID(pub Uuid);
impl NodeID {
    /// Get UUID
    pub fn get_uuid(self) -> Uuid {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
/// Flow ID
pub struct FlowID(pub Uuid);
impl FlowID {
    /// Get UUID
    pub fn get_uuid(self) -> Uuid {
        self.0
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
/// Direction of a gateway
pub enum GatewayDirection {
    /// Neither splitting nor joining
    Unspecified,
    /// Joining
    Converging,
    /// Splitting
    Diverging,
}

impl GatewayDirection {
    /// Value of the `gatewayDirection` attribute
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayDirection::Unspecified => "Unspecified",
            GatewayDirection::Converging => "Converging",
            GatewayDirection::Diverging => "Diverging",
        }
    }
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(tag = "type", content = "direction")]
/// Kind of a [`BpmnNode`]
pub enum BpmnNodeKind {
    /// Plain start event
    StartEvent,
    /// Start event triggered by a message
    MessageStartEvent,
    /// End event
    EndEvent,
    /// Task
    Task,
    /// Task waiting for a message
    ReceiveTask,
    /// Task sending a message
    SendTask,
    /// Exclusive (XOR) gateway
    ExclusiveGateway(GatewayDirection),
    /// Parallel (AND) gateway
    ParallelGateway(GatewayDirection),
    /// Inclusive (OR) gateway
    InclusiveGateway(GatewayDirection),
    /// Gateway choosing by the first arriving message
    EventBasedGateway(GatewayDirection),
}

impl BpmnNodeKind {
    /// `true` for (receive/send) tasks
    pub fn is_task(&self) -> bool {
        matches!(
            self,
            BpmnNodeKind::Task | BpmnNodeKind::ReceiveTask | BpmnNodeKind::SendTask
        )
    }

    /// `true` for start and end events
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            BpmnNodeKind::StartEvent | BpmnNodeKind::MessageStartEvent | BpmnNodeKind::EndEvent
        )
    }

    /// `true` for all gateways
    pub fn is_gateway(&self) -> bool {
        !self.is_task() && !self.is_event()
    }

    /// `true` for the message-specific kinds
    pub fn is_message_kind(&self) -> bool {
        matches!(
            self,
            BpmnNodeKind::MessageStartEvent
                | BpmnNodeKind::ReceiveTask
                | BpmnNodeKind::SendTask
                | BpmnNodeKind::EventBasedGateway(_)
        )
    }

    ///
    /// How specific this kind is
    ///
    /// When two nodes represent the same activity, the one with the higher value is kept.
    ///
    pub fn specificity(&self) -> u8 {
        match self {
            BpmnNodeKind::ReceiveTask | BpmnNodeKind::MessageStartEvent => 3,
            BpmnNodeKind::SendTask | BpmnNodeKind::EventBasedGateway(_) => 2,
            BpmnNodeKind::Task | BpmnNodeKind::StartEvent => 1,
            _ => 0,
        }
    }

    /// XML element name (without namespace prefix)
    pub fn element_name(&self) -> &'static str {
        match self {
            BpmnNodeKind::StartEvent | BpmnNodeKind::MessageStartEvent => "startEvent",
            BpmnNodeKind::EndEvent => "endEvent",
            BpmnNodeKind::Task => "task",
            BpmnNodeKind::ReceiveTask => "receiveTask",
            BpmnNodeKind::SendTask => "sendTask",
            BpmnNodeKind::ExclusiveGateway(_) => "exclusiveGateway",
            BpmnNodeKind::ParallelGateway(_) => "parallelGateway",
            BpmnNodeKind::InclusiveGateway(_) => "inclusiveGateway",
            BpmnNodeKind::EventBasedGateway(_) => "eventBasedGateway",
        }
    }

    /// Direction of gateways
    pub fn gateway_direction(&self) -> Option<GatewayDirection> {
        match self {
            BpmnNodeKind::ExclusiveGateway(d)
            | BpmnNodeKind::ParallelGateway(d)
            | BpmnNodeKind::InclusiveGateway(d)
            | BpmnNodeKind::EventBasedGateway(d) => Some(*d),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Copy, Default, Serialize, Deserialize)]
/// Position (top-left corner) and size of a node
pub struct Bounds {
    /// Left
    pub x: f64,
    /// Top
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Bounds {
    /// Center point
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
/// Node (event, task or gateway) in a [`BpmnDiagram`]
pub struct BpmnNode {
    /// ID
    pub id: NodeID,
    /// Kind
    pub kind: BpmnNodeKind,
    /// Name (empty for events and gateways)
    pub name: String,
    /// Participant (pool) the node belongs to
    pub participant: String,
    /// Layout
    pub bounds: Bounds,
}

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
/// Kind of a [`BpmnFlow`]
pub enum FlowKind {
    /// Control flow inside one participant
    Sequence,
    /// Message between participants
    Message,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
/// Directed flow between two [`BpmnNode`]s
pub struct BpmnFlow {
    /// ID
    pub id: FlowID,
    /// Kind
    pub kind: FlowKind,
    /// Source node
    pub source: NodeID,
    /// Target node
    pub target: NodeID,
    /// Polyline of the flow (set by the layout)
    pub waypoints: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
///
/// A BPMN collaboration diagram
///
/// All participants share one node and flow list; every node names its participant.
/// Nodes and flows keep their insertion order, which is also the export order.
///
pub struct BpmnDiagram {
    /// Participants (pools), in order
    pub participants: Vec<String>,
    /// Nodes
    pub nodes: Vec<BpmnNode>,
    /// Sequence and message flows
    pub flows: Vec<BpmnFlow>,
}

impl BpmnDiagram {
    /// Create new [`BpmnDiagram`] with no nodes or flows
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant (if not present yet)
    pub fn add_participant(&mut self, participant: &str) {
        if !self.participants.iter().any(|p| p == participant) {
            self.participants.push(participant.to_string());
        }
    }

    /// Add a node to a participant
    pub fn add_node<S: Into<String>>(
        &mut self,
        kind: BpmnNodeKind,
        name: S,
        participant: &str,
    ) -> NodeID {
        self.add_participant(participant);
        let id = NodeID(Uuid::new_v4());
        self.nodes.push(BpmnNode {
            id,
            kind,
            name: name.into(),
            participant: participant.to_string(),
            bounds: Bounds::default(),
        });
        id
    }

    /// Add a flow
    pub fn add_flow(&mut self, kind: FlowKind, source: NodeID, target: NodeID) -> FlowID {
        let id = FlowID(Uuid::new_v4());
        self.flows.push(BpmnFlow {
            id,
            kind,
            source,
            target,
            waypoints: Vec::new(),
        });
        id
    }

    /// Add a flow unless the two nodes are already connected (in this direction)
    pub fn add_flow_if_absent(&mut self, kind: FlowKind, source: NodeID, target: NodeID) {
        if self.find_flow(source, target).is_none() {
            self.add_flow(kind, source, target);
        }
    }

    /// Lookup a node
    pub fn node(&self, id: NodeID) -> Option<&BpmnNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Lookup a node (mutable)
    pub fn node_mut(&mut self, id: NodeID) -> Option<&mut BpmnNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// The flow from `source` to `target`, if any
    pub fn find_flow(&self, source: NodeID, target: NodeID) -> Option<&BpmnFlow> {
        self.flows
            .iter()
            .find(|f| f.source == source && f.target == target)
    }

    /// Flows leaving a node
    pub fn outgoing(&self, id: NodeID) -> impl Iterator<Item = &BpmnFlow> + '_ {
        self.flows.iter().filter(move |f| f.source == id)
    }

    /// Flows entering a node
    pub fn incoming(&self, id: NodeID) -> impl Iterator<Item = &BpmnFlow> + '_ {
        self.flows.iter().filter(move |f| f.target == id)
    }

    /// Nodes of one participant
    pub fn nodes_of<'a>(&'a self, participant: &'a str) -> impl Iterator<Item = &'a BpmnNode> + 'a {
        self.nodes.iter().filter(move |n| n.participant == participant)
    }

    /// All nodes of a kind
    pub fn nodes_of_kind(&self, kind: BpmnNodeKind) -> impl Iterator<Item = &BpmnNode> + '_ {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Number of flows of a kind
    pub fn count_flows(&self, kind: FlowKind) -> usize {
        self.flows.iter().filter(|f| f.kind == kind).count()
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flows_are_not_duplicated() {
        let mut d = BpmnDiagram::new();
        let s = d.add_node(BpmnNodeKind::StartEvent, "", "A");
        let t = d.add_node(BpmnNodeKind::Task, "a", "A");
        d.add_flow_if_absent(FlowKind::Sequence, s, t);
        d.add_flow_if_absent(FlowKind::Sequence, s, t);
        assert_eq!(d.flows.len(), 1);
        assert_eq!(d.outgoing(s).count(), 1);
        assert_eq!(d.incoming(t).count(), 1);
        assert_eq!(d.participants, vec!["A".to_string()]);
    }

    #[test]
    fn kind_predicates() {
        let gw = BpmnNodeKind::EventBasedGateway(GatewayDirection::Diverging);
        assert!(gw.is_gateway());
        assert!(gw.is_message_kind());
        assert_eq!(gw.gateway_direction(), Some(GatewayDirection::Diverging));
        assert!(BpmnNodeKind::ReceiveTask.specificity() > BpmnNodeKind::Task.specificity());
        assert_eq!(BpmnNodeKind::MessageStartEvent.element_name(), "startEvent");
    }

    #[test]
    fn diagram_to_json() {
        let mut d = BpmnDiagram::new();
        d.add_node(BpmnNodeKind::ExclusiveGateway(GatewayDirection::Converging), "", "A");
        let json = d.to_json().unwrap();
        assert!(json.contains("ExclusiveGateway"));
        assert!(json.contains("Converging"));
    }
}
