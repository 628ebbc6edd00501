use std::{
    collections::HashMap,
    fs::File,
    io::{BufWriter, Write},
};

use uuid::Uuid;

use crate::{
    process_tree::process_tree_struct::OperatorType,
    utils::xml_utils::{write_xml_declaration, ExportError, XMLWriterWrapper},
};

use super::collaboration_graph_struct::{CollaborationGraph, NodeKey, NodeRole};

const OK: Result<(), std::io::Error> = Ok(());

fn element_name(role: NodeRole, operator: Option<OperatorType>) -> &'static str {
    match (role, operator) {
        (NodeRole::Activity, _) => "manualTask",
        (_, Some(OperatorType::Sequence)) => "sequence",
        (_, Some(OperatorType::ExclusiveChoice)) => "xor",
        (_, Some(OperatorType::Concurrency | OperatorType::Interleaving)) => "and",
        (_, Some(OperatorType::Or)) => "or",
        (_, Some(OperatorType::Loop)) => "xorLoop",
        _ => "automaticTask",
    }
}

///
/// Export a [`CollaborationGraph`] as process tree in the PTML format
///
/// Activities become `manualTask`s, start and silent nodes `automaticTask`s. Loops are padded to
/// three children with an additional `automaticTask`. Every control-flow edge is written as a
/// `parentsNode`.
///
pub fn export_collaboration_graph_to_ptml<'a, W>(
    graph: &CollaborationGraph,
    into_writer: impl Into<XMLWriterWrapper<'a, W>>,
) -> Result<(), ExportError>
where
    W: Write + 'a,
{
    let root = graph
        .global_root()
        .ok_or_else(|| ExportError::InvalidModel("missing global start".to_string()))?;
    let ids: HashMap<&NodeKey, String> = graph
        .nodes
        .iter()
        .map(|n| (&n.key, Uuid::new_v4().to_string()))
        .collect();
    let mut edges: Vec<(String, String)> = Vec::new();
    let mut padding: Vec<String> = Vec::new();
    for n in &graph.nodes {
        for c in &n.children {
            if let (Some(f), Some(t)) = (ids.get(&n.key), ids.get(c)) {
                edges.push((f.clone(), t.clone()));
            }
        }
        if n.key.operator == Some(OperatorType::Loop) {
            for _ in n.children.len()..3 {
                let pad = Uuid::new_v4().to_string();
                if let Some(f) = ids.get(&n.key) {
                    edges.push((f.clone(), pad.clone()));
                }
                padding.push(pad);
            }
        }
    }
    let root_id = ids.get(&root.key).cloned().unwrap_or_default();
    let tree_name = Uuid::new_v4().to_string();
    let tree_id = Uuid::new_v4().to_string();

    let mut xml_writer: XMLWriterWrapper<'_, W> = into_writer.into();
    let writer = xml_writer.to_xml_writer();
    write_xml_declaration(writer)?;
    writer
        .create_element("ptml")
        .write_inner_content(|w| {
            w.create_element("processTree")
                .with_attributes(vec![
                    ("name", tree_name.as_str()),
                    ("root", root_id.as_str()),
                    ("id", tree_id.as_str()),
                ])
                .write_inner_content(|w| {
                    for n in &graph.nodes {
                        let name = match n.role {
                            NodeRole::Activity => n.key.label.as_str(),
                            _ => "",
                        };
                        let id = ids.get(&n.key).map(String::as_str).unwrap_or_default();
                        w.create_element(element_name(n.role, n.key.operator))
                            .with_attributes(vec![("name", name), ("id", id)])
                            .write_empty()?;
                    }
                    for pad in &padding {
                        w.create_element("automaticTask")
                            .with_attributes(vec![("name", ""), ("id", pad.as_str())])
                            .write_empty()?;
                    }
                    for (source, target) in &edges {
                        let id = Uuid::new_v4().to_string();
                        w.create_element("parentsNode")
                            .with_attributes(vec![
                                ("id", id.as_str()),
                                ("sourceId", source.as_str()),
                                ("targetId", target.as_str()),
                            ])
                            .write_empty()?;
                    }
                    OK
                })?;
            OK
        })?;
    Ok(())
}

///
/// Export a [`CollaborationGraph`] to a PTML file at the specified path
///
pub fn export_collaboration_graph_to_ptml_path<P: AsRef<std::path::Path>>(
    graph: &CollaborationGraph,
    path: P,
) -> Result<(), ExportError> {
    let file = File::create(path)?;
    export_collaboration_graph_to_ptml(graph, BufWriter::new(file))
}
