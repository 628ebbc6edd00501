use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
};

use quick_xml::events::BytesText;
use uuid::Uuid;

use crate::utils::xml_utils::{write_xml_declaration, ExportError, XMLWriterWrapper};

use super::bpmn_struct::{BpmnDiagram, BpmnNode, BpmnNodeKind, Bounds, FlowKind, NodeID};

const OK: Result<(), std::io::Error> = Ok(());

/// Space between the nodes of a participant and the border of its pool
const POOL_PADDING: f64 = 30.0;
/// Width of the name band on the left of a pool
const POOL_LABEL_WIDTH: f64 = 30.0;

fn node_ref(id: NodeID) -> String {
    format!("Activity_{}", id.get_uuid())
}

fn num(v: f64) -> String {
    format!("{v}")
}

/// Bounds of the pool enclosing all nodes of a participant
fn pool_bounds<'a>(nodes: impl Iterator<Item = &'a BpmnNode>) -> Bounds {
    let mut res: Option<(f64, f64, f64, f64)> = None;
    for n in nodes {
        let b = n.bounds;
        res = Some(match res {
            None => (b.x, b.y, b.x + b.width, b.y + b.height),
            Some((x0, y0, x1, y1)) => (
                x0.min(b.x),
                y0.min(b.y),
                x1.max(b.x + b.width),
                y1.max(b.y + b.height),
            ),
        });
    }
    let (x0, y0, x1, y1) = res.unwrap_or_default();
    Bounds {
        x: x0 - POOL_PADDING - POOL_LABEL_WIDTH,
        y: y0 - POOL_PADDING,
        width: x1 - x0 + 2.0 * POOL_PADDING + POOL_LABEL_WIDTH,
        height: y1 - y0 + 2.0 * POOL_PADDING,
    }
}

fn write_bounds<W: Write>(w: &mut quick_xml::Writer<W>, b: &Bounds) -> Result<(), std::io::Error> {
    let (x, y, width, height) = (num(b.x), num(b.y), num(b.width), num(b.height));
    w.create_element("dc:Bounds")
        .with_attributes(vec![
            ("x", x.as_str()),
            ("y", y.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
        ])
        .write_empty()?;
    OK
}

///
/// Export a [`BpmnDiagram`] as BPMN 2.0 XML
///
/// Writes one `collaboration` with a `participant` per participant and all message flows, one
/// `process` per participant with its nodes and sequence flows, and a `BPMNDiagram` with one
/// `BPMNPlane` per participant containing the pool, node shapes and flow edges (message flows are
/// drawn on the plane of their source).
///
pub fn export_bpmn<'a, W>(
    diagram: &BpmnDiagram,
    into_writer: impl Into<XMLWriterWrapper<'a, W>>,
) -> Result<(), ExportError>
where
    W: Write + 'a,
{
    let nodes: HashMap<NodeID, &BpmnNode> = diagram.nodes.iter().map(|n| (n.id, n)).collect();
    for f in &diagram.flows {
        for end in [f.source, f.target] {
            if !nodes.contains_key(&end) {
                return Err(ExportError::InvalidModel(format!(
                    "flow {} references unknown node {}",
                    f.id.get_uuid(),
                    end.get_uuid()
                )));
            }
        }
    }
    let participant_of = |id: &NodeID| nodes.get(id).map(|n| n.participant.as_str());

    let collaboration_id = format!("Collaboration_{}", Uuid::new_v4());
    let definitions_id = format!("Definitions_{}", Uuid::new_v4());
    let diagram_id = format!("BPMNDiagram_{}", Uuid::new_v4());
    let participant_ids: Vec<(String, String)> = diagram
        .participants
        .iter()
        .map(|_| {
            (
                format!("Participant_{}", Uuid::new_v4()),
                format!("Process_{}", Uuid::new_v4()),
            )
        })
        .collect();
    let flow_ref = |kind: FlowKind, id: Uuid| match kind {
        FlowKind::Sequence => format!("Flow_{id}"),
        FlowKind::Message => format!("MessageFlow_{id}"),
    };

    let mut xml_writer: XMLWriterWrapper<'_, W> = into_writer.into();
    let writer = xml_writer.to_xml_writer();
    write_xml_declaration(writer)?;
    writer
        .create_element("bpmn:definitions")
        .with_attributes(vec![
            ("xmlns:bpmn", "http://www.omg.org/spec/BPMN/20100524/MODEL"),
            ("xmlns:bpmndi", "http://www.omg.org/spec/BPMN/20100524/DI"),
            ("xmlns:dc", "http://www.omg.org/spec/DD/20100524/DC"),
            ("xmlns:di", "http://www.omg.org/spec/DD/20100524/DI"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("id", definitions_id.as_str()),
            ("targetNamespace", "http://bpmn.io/schema/bpmn"),
            ("typeLanguage", "http://www.w3.org/2001/XMLSchema"),
            ("expressionLanguage", "http://www.w3.org/1999/XPath"),
        ])
        .write_inner_content(|w| {
            w.create_element("bpmn:collaboration")
                .with_attributes(vec![("id", collaboration_id.as_str())])
                .write_inner_content(|w| {
                    for (name, (participant_id, process_id)) in
                        diagram.participants.iter().zip(&participant_ids)
                    {
                        w.create_element("bpmn:participant")
                            .with_attributes(vec![
                                ("id", participant_id.as_str()),
                                ("name", name.as_str()),
                                ("processRef", process_id.as_str()),
                            ])
                            .write_empty()?;
                    }
                    for f in diagram.flows.iter().filter(|f| f.kind == FlowKind::Message) {
                        let id = flow_ref(f.kind, f.id.get_uuid());
                        let (source, target) = (node_ref(f.source), node_ref(f.target));
                        let name = nodes.get(&f.source).map(|n| n.name.as_str()).unwrap_or_default();
                        w.create_element("bpmn:messageFlow")
                            .with_attributes(vec![
                                ("id", id.as_str()),
                                ("name", name),
                                ("sourceRef", source.as_str()),
                                ("targetRef", target.as_str()),
                            ])
                            .write_empty()?;
                    }
                    OK
                })?;

            for (participant, (_, process_id)) in diagram.participants.iter().zip(&participant_ids) {
                w.create_element("bpmn:process")
                    .with_attributes(vec![
                        ("id", process_id.as_str()),
                        ("isClosed", "false"),
                        ("isExecutable", "false"),
                        ("processType", "None"),
                    ])
                    .write_inner_content(|w| {
                        for n in diagram.nodes_of(participant) {
                            write_node(w, diagram, n, &flow_ref)?;
                        }
                        for f in diagram.flows.iter().filter(|f| {
                            f.kind == FlowKind::Sequence
                                && participant_of(&f.source) == Some(participant.as_str())
                        }) {
                            let id = flow_ref(f.kind, f.id.get_uuid());
                            let (source, target) = (node_ref(f.source), node_ref(f.target));
                            w.create_element("bpmn:sequenceFlow")
                                .with_attributes(vec![
                                    ("id", id.as_str()),
                                    ("sourceRef", source.as_str()),
                                    ("targetRef", target.as_str()),
                                ])
                                .write_empty()?;
                        }
                        OK
                    })?;
            }

            w.create_element("bpmndi:BPMNDiagram")
                .with_attributes(vec![("id", diagram_id.as_str()), ("name", "diagram")])
                .write_inner_content(|w| {
                    for (i, (participant, (participant_id, _))) in
                        diagram.participants.iter().zip(&participant_ids).enumerate()
                    {
                        let plane_id = format!("BPMNPlane_{i}");
                        w.create_element("bpmndi:BPMNPlane")
                            .with_attributes(vec![
                                ("id", plane_id.as_str()),
                                ("bpmnElement", collaboration_id.as_str()),
                            ])
                            .write_inner_content(|w| {
                                let pool_id = format!("{participant_id}_di");
                                w.create_element("bpmndi:BPMNShape")
                                    .with_attributes(vec![
                                        ("id", pool_id.as_str()),
                                        ("bpmnElement", participant_id.as_str()),
                                        ("isHorizontal", "true"),
                                    ])
                                    .write_inner_content(|w| {
                                        write_bounds(w, &pool_bounds(diagram.nodes_of(participant)))
                                    })?;
                                for n in diagram.nodes_of(participant) {
                                    let element = node_ref(n.id);
                                    let shape_id = format!("{element}_di");
                                    w.create_element("bpmndi:BPMNShape")
                                        .with_attributes(vec![
                                            ("id", shape_id.as_str()),
                                            ("bpmnElement", element.as_str()),
                                        ])
                                        .write_inner_content(|w| write_bounds(w, &n.bounds))?;
                                }
                                for f in diagram
                                    .flows
                                    .iter()
                                    .filter(|f| participant_of(&f.source) == Some(participant.as_str()))
                                {
                                    let element = flow_ref(f.kind, f.id.get_uuid());
                                    let edge_id = format!("{element}_di");
                                    w.create_element("bpmndi:BPMNEdge")
                                        .with_attributes(vec![
                                            ("id", edge_id.as_str()),
                                            ("bpmnElement", element.as_str()),
                                        ])
                                        .write_inner_content(|w| {
                                            for (x, y) in &f.waypoints {
                                                let (x, y) = (num(*x), num(*y));
                                                w.create_element("di:waypoint")
                                                    .with_attributes(vec![
                                                        ("x", x.as_str()),
                                                        ("y", y.as_str()),
                                                    ])
                                                    .write_empty()?;
                                            }
                                            OK
                                        })?;
                                }
                                OK
                            })?;
                    }
                    OK
                })?;
            OK
        })?;
    Ok(())
}

/// Write one flow node with its incoming and outgoing sequence flows
fn write_node<W: Write>(
    w: &mut quick_xml::Writer<W>,
    diagram: &BpmnDiagram,
    n: &BpmnNode,
    flow_ref: &impl Fn(FlowKind, Uuid) -> String,
) -> Result<(), std::io::Error> {
    let id = node_ref(n.id);
    let mut attributes = vec![("id", id.as_str()), ("name", n.name.as_str())];
    let direction = n.kind.gateway_direction();
    if let Some(d) = &direction {
        attributes.push(("gatewayDirection", d.as_str()));
    }
    if matches!(
        n.kind,
        BpmnNodeKind::StartEvent | BpmnNodeKind::MessageStartEvent
    ) {
        attributes.push(("isInterrupting", "true"));
        attributes.push(("parallelMultiple", "false"));
    }
    let incoming: Vec<String> = diagram
        .incoming(n.id)
        .filter(|f| f.kind == FlowKind::Sequence)
        .map(|f| flow_ref(f.kind, f.id.get_uuid()))
        .collect();
    let outgoing: Vec<String> = diagram
        .outgoing(n.id)
        .filter(|f| f.kind == FlowKind::Sequence)
        .map(|f| flow_ref(f.kind, f.id.get_uuid()))
        .collect();
    let definition_id = format!("{id}_message");
    w.create_element(format!("bpmn:{}", n.kind.element_name()))
        .with_attributes(attributes)
        .write_inner_content(|w| {
            for f in &incoming {
                w.create_element("bpmn:incoming")
                    .write_text_content(BytesText::new(f))?;
            }
            for f in &outgoing {
                w.create_element("bpmn:outgoing")
                    .write_text_content(BytesText::new(f))?;
            }
            if n.kind == BpmnNodeKind::MessageStartEvent {
                w.create_element("bpmn:messageEventDefinition")
                    .with_attributes(vec![("id", definition_id.as_str())])
                    .write_empty()?;
            }
            OK
        })?;
    OK
}

///
/// Export a [`BpmnDiagram`] to a BPMN file at the specified path
///
pub fn export_bpmn_path<P: AsRef<std::path::Path>>(
    diagram: &BpmnDiagram,
    path: P,
) -> Result<(), ExportError> {
    let file = File::create(path)?;
    export_bpmn(diagram, BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use quick_xml::{events::Event, Reader};

    use super::*;
    use crate::bpmn::bpmn_struct::GatewayDirection;

    fn diagram() -> BpmnDiagram {
        let mut d = BpmnDiagram::new();
        let sa = d.add_node(BpmnNodeKind::StartEvent, "", "A");
        let a = d.add_node(BpmnNodeKind::SendTask, "a & b", "A");
        let ea = d.add_node(BpmnNodeKind::EndEvent, "", "A");
        let sb = d.add_node(BpmnNodeKind::MessageStartEvent, "", "B");
        let gw = d.add_node(
            BpmnNodeKind::ExclusiveGateway(GatewayDirection::Diverging),
            "",
            "B",
        );
        let c = d.add_node(BpmnNodeKind::ReceiveTask, "c", "B");
        d.add_flow(FlowKind::Sequence, sa, a);
        d.add_flow(FlowKind::Sequence, a, ea);
        d.add_flow(FlowKind::Sequence, sb, gw);
        d.add_flow(FlowKind::Sequence, gw, c);
        d.add_flow(FlowKind::Message, a, c);
        for f in &mut d.flows {
            f.waypoints = vec![(0.0, 0.0), (10.0, 0.0)];
        }
        d
    }

    fn export(d: &BpmnDiagram) -> String {
        let mut out = Vec::new();
        export_bpmn(d, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn collaboration_structure() {
        let xml = export(&diagram());
        assert!(xml.starts_with("<?xml"));
        assert_eq!(xml.matches("<bpmn:participant ").count(), 2);
        assert_eq!(xml.matches("<bpmn:process ").count(), 2);
        assert_eq!(xml.matches("<bpmn:messageFlow ").count(), 1);
        assert_eq!(xml.matches("<bpmn:sequenceFlow ").count(), 4);
        assert_eq!(xml.matches("<bpmndi:BPMNPlane ").count(), 2);
        // 6 nodes and 2 pools
        assert_eq!(xml.matches("<bpmndi:BPMNShape ").count(), 8);
        assert_eq!(xml.matches("<bpmndi:BPMNEdge ").count(), 5);
        assert_eq!(xml.matches("<di:waypoint ").count(), 10);
        assert!(xml.contains("<bpmn:sendTask "));
        assert!(xml.contains("<bpmn:receiveTask "));
        assert!(xml.contains("gatewayDirection=\"Diverging\""));
        assert!(xml.contains("<bpmn:messageEventDefinition "));
        assert!(xml.contains("a &amp; b"));
    }

    #[test]
    fn output_is_well_formed() {
        let xml = export(&diagram());
        let mut reader = Reader::from_str(&xml);
        let mut depth = 0i32;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(depth, 0);
    }

    #[test]
    fn dangling_flow_is_rejected() {
        let mut d = diagram();
        let ghost = NodeID(Uuid::new_v4());
        let a = d.nodes[0].id;
        d.add_flow(FlowKind::Sequence, a, ghost);
        let mut out = Vec::new();
        assert!(matches!(
            export_bpmn(&d, &mut out),
            Err(ExportError::InvalidModel(_))
        ));
    }

    #[test]
    fn file_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collaboration.bpmn");
        export_bpmn_path(&diagram(), &path).unwrap();
        let xml = std::fs::read_to_string(path).unwrap();
        assert!(xml.contains("<bpmn:collaboration "));
    }
}
