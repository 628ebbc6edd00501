use std::{collections::HashMap, sync::mpsc, thread, time::Duration};

use graphviz_rust::{
    cmd::Format,
    dot_generator::{attr, id, stmt},
    dot_structures::*,
    printer::PrinterContext,
};
use petgraph::graph::NodeIndex;

use crate::config::LayoutConfig;

use super::layouter::{LayoutBackend, LayoutError, LayoutGraph};

/// Points per inch in graphviz output
const POINTS_PER_INCH: f64 = 72.0;

///
/// Layout using graphviz `dot`
///
/// Every participant becomes a `cluster_` subgraph, the graph is laid out left to right and the
/// `plain` output is read back. Requires graphviz to be installed on the PATH. `dot` runs on a
/// worker thread and is abandoned after the configured timeout.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphvizLayoutBackend;

fn node_name(i: NodeIndex) -> String {
    format!("n{}", i.index())
}

fn plain_id(s: String) -> Id {
    Id::Plain(s)
}

/// Dot graph with one cluster per participant
fn to_dot(graph: &LayoutGraph) -> Graph {
    let mut stmts = vec![stmt!(attr!("rankdir", "LR"))];
    for (i, (participant, nodes)) in graph.clusters.iter().enumerate() {
        let mut cluster_stmts = vec![stmt!(attr!("label", esc participant))];
        for n in nodes {
            let (w, h) = graph.sizes.get(n).copied().unwrap_or((1.0, 1.0));
            cluster_stmts.push(Stmt::Node(Node {
                id: NodeId(plain_id(node_name(*n)), None),
                attributes: vec![
                    attr!("label", esc " "),
                    attr!("shape", "box"),
                    attr!("fixedsize", "true"),
                    Attribute(
                        plain_id("width".into()),
                        plain_id(format!("{:.3}", w / POINTS_PER_INCH)),
                    ),
                    Attribute(
                        plain_id("height".into()),
                        plain_id(format!("{:.3}", h / POINTS_PER_INCH)),
                    ),
                ],
            }));
        }
        stmts.push(Stmt::Subgraph(Subgraph {
            id: plain_id(format!("cluster_{i}")),
            stmts: cluster_stmts,
        }));
    }
    for e in graph.graph.edge_indices() {
        if let Some((s, t)) = graph.graph.edge_endpoints(e) {
            stmts.push(Stmt::Edge(Edge {
                ty: EdgeTy::Pair(
                    Vertex::N(NodeId(plain_id(node_name(s)), None)),
                    Vertex::N(NodeId(plain_id(node_name(t)), None)),
                ),
                attributes: Vec::new(),
            }));
        }
    }
    Graph::DiGraph {
        id: id!("collaboration"),
        strict: false,
        stmts,
    }
}

///
/// Parse the node lines of graphviz `plain` output
///
/// Returns node centers in points with `y` growing downwards.
///
fn parse_plain(output: &str) -> Result<HashMap<String, (f64, f64)>, LayoutError> {
    let parse = |s: Option<&str>| -> Result<f64, LayoutError> {
        s.and_then(|v| v.parse::<f64>().ok())
            .ok_or_else(|| LayoutError::Backend(format!("invalid plain output: {s:?}")))
    };
    let mut height = 0.0;
    let mut res = HashMap::new();
    for line in output.lines() {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("graph") => {
                let _scale = parse(parts.next())?;
                let _width = parse(parts.next())?;
                height = parse(parts.next())?;
            }
            Some("node") => {
                let name = parts
                    .next()
                    .map(|n| n.trim_matches('"').to_string())
                    .ok_or_else(|| LayoutError::Backend("node without name".into()))?;
                let x = parse(parts.next())?;
                let y = parse(parts.next())?;
                res.insert(name, (x * POINTS_PER_INCH, (height - y) * POINTS_PER_INCH));
            }
            _ => {}
        }
    }
    Ok(res)
}

impl LayoutBackend for GraphvizLayoutBackend {
    fn name(&self) -> &'static str {
        "graphviz"
    }

    fn place(
        &self,
        graph: &LayoutGraph,
        config: &LayoutConfig,
    ) -> Result<HashMap<NodeIndex, (f64, f64)>, LayoutError> {
        let dot = to_dot(graph);
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let out = graphviz_rust::exec(dot, &mut PrinterContext::default(), vec![Format::Plain.into()]);
            // receiver is gone after a timeout
            let _ = sender.send(out);
        });
        let timeout = Duration::from_millis(config.backend_timeout_ms);
        let out = match receiver.recv_timeout(timeout) {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return Err(LayoutError::Backend(e.to_string())),
            Err(mpsc::RecvTimeoutError::Timeout) => return Err(LayoutError::Timeout(timeout)),
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(LayoutError::Backend("graphviz worker stopped".into()))
            }
        };
        let positions = parse_plain(&String::from_utf8_lossy(&out))?;
        Ok(graph
            .graph
            .node_indices()
            .filter_map(|i| positions.get(&node_name(i)).map(|p| (i, *p)))
            .collect())
    }
}
