use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::{
    bpmn::{
        bpmn_struct::BpmnDiagram,
        layout::layouter::{layout_diagram, LayoutOutcome},
        lowering::lower_collaboration_graph,
    },
    collaboration_graph::{
        build_collaboration_graph::build_collaboration_graph,
        collaboration_graph_struct::CollaborationGraph,
    },
    config::CollaborationMiningConfig,
    dfg::DirectlyFollowsGraph,
    discovery::{
        inductive::{discover_process_trees, MiningReport},
        message_correlation::{correlate_messages, MessageCorrelation},
    },
    error::CollaborationMiningError,
    event_log::{
        activity_projection::ActivityLog,
        event_log_struct::Party,
        import_xes::{import_xes_file, XESImportOptions},
    },
    process_tree::process_tree_struct::ProcessTree,
};

///
/// Result of [`discover_collaboration`], keeping every intermediate stage
///
#[derive(Debug, Clone)]
pub struct CollaborationDiscovery {
    /// One mining report (with the process tree) per party, in party order
    pub reports: Vec<MiningReport>,
    /// Matched messages and the derived per-party injections
    pub correlation: MessageCorrelation,
    /// Merged collaboration graph of all process trees
    pub graph: CollaborationGraph,
    /// Laid out BPMN collaboration diagram
    pub diagram: BpmnDiagram,
    /// Whether the configured layout backend succeeded
    pub layout: LayoutOutcome,
}

impl CollaborationDiscovery {
    /// Process trees in party order
    pub fn trees(&self) -> Vec<&ProcessTree> {
        self.reports.iter().map(|r| &r.tree).collect()
    }
}

///
/// Import one XES log per party
///
/// `sources` holds `(party name, path)` pairs. Paths ending in `.gz` are decompressed.
///
pub fn load_parties<S: AsRef<str>, P: AsRef<str>>(
    sources: &[(S, P)],
    options: &XESImportOptions,
) -> Result<Vec<Party>, CollaborationMiningError> {
    sources
        .iter()
        .map(|(name, path)| {
            let name = name.as_ref();
            let log = import_xes_file(path.as_ref(), options).map_err(|error| {
                CollaborationMiningError::Import {
                    party: name.to_string(),
                    error,
                }
            })?;
            tracing::debug!(party = name, traces = log.traces.len(), "imported event log");
            Ok(Party::new(name, log))
        })
        .collect()
}

fn check_parties(parties: &[Party]) -> Result<(), CollaborationMiningError> {
    if parties.is_empty() {
        return Err(CollaborationMiningError::NoParties);
    }
    let mut seen = HashSet::new();
    for p in parties {
        if !seen.insert(p.name.as_str()) {
            return Err(CollaborationMiningError::DuplicateParty(p.name.clone()));
        }
    }
    Ok(())
}

///
/// Discover a BPMN collaboration diagram from the event logs of all parties
///
/// Runs every stage in order: activity projection and DFG per party, message correlation, process
/// tree mining, collaboration graph construction, lowering to BPMN and layout.
///
/// A failing layout backend does not fail discovery: the diagram then keeps a fallback layout and
/// [`CollaborationDiscovery::layout`] holds the error.
///
pub fn discover_collaboration(
    parties: &[Party],
    config: &CollaborationMiningConfig,
) -> Result<CollaborationDiscovery, CollaborationMiningError> {
    check_parties(parties)?;
    let logs: Vec<(String, ActivityLog)> = parties
        .par_iter()
        .map(|p| {
            (
                p.name.clone(),
                ActivityLog::from_event_log(&p.log, &config.mining),
            )
        })
        .collect();
    let dfgs: HashMap<String, DirectlyFollowsGraph> = logs
        .iter()
        .map(|(name, log)| (name.clone(), DirectlyFollowsGraph::create_from_log(log)))
        .collect();

    let correlation = correlate_messages(parties, &dfgs, &config.mining);
    let reports = discover_process_trees(&logs, &correlation.injections, &config.mining);
    let trees: Vec<&ProcessTree> = reports.iter().map(|r| &r.tree).collect();
    let graph = build_collaboration_graph(&trees)?;
    let mut diagram = lower_collaboration_graph(&graph)?;
    let layout = layout_diagram(&mut diagram, &config.layout);

    tracing::info!(
        parties = parties.len(),
        messages = correlation.matches.len(),
        nodes = diagram.nodes.len(),
        flows = diagram.flows.len(),
        "discovered collaboration"
    );
    Ok(CollaborationDiscovery {
        reports,
        correlation,
        graph,
        diagram,
        layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bpmn::bpmn_struct::{BpmnNodeKind, FlowKind},
        event_log::event_log_struct::{Event, EventLog, MessageKind, Trace},
    };

    fn party(name: &str, traces: Vec<Vec<Event>>) -> Party {
        Party::new(
            name,
            EventLog {
                traces: traces
                    .into_iter()
                    .enumerate()
                    .map(|(i, events)| Trace::new(i.to_string(), events))
                    .collect(),
                ..Default::default()
            },
        )
    }

    fn two_parties() -> Vec<Party> {
        vec![
            party(
                "A",
                vec![vec![
                    Event::new("a".into()),
                    Event::new_message("b".into(), MessageKind::Send, "M1".into()),
                ]],
            ),
            party(
                "B",
                vec![vec![Event::new_message(
                    "c".into(),
                    MessageKind::Receive,
                    "M1".into(),
                )]],
            ),
        ]
    }

    /// Every node except end events has an outgoing flow
    fn assert_only_end_events_are_sinks(diagram: &BpmnDiagram) {
        for n in &diagram.nodes {
            if n.kind != BpmnNodeKind::EndEvent {
                assert!(diagram.outgoing(n.id).next().is_some(), "{} has no outgoing flow", n.name);
            }
        }
    }

    fn kind_of(diagram: &BpmnDiagram, name: &str, participant: &str) -> BpmnNodeKind {
        diagram
            .nodes_of(participant)
            .find(|n| n.name == name)
            .map(|n| n.kind)
            .unwrap()
    }

    #[test]
    fn two_party_collaboration() {
        let discovery =
            discover_collaboration(&two_parties(), &CollaborationMiningConfig::default()).unwrap();
        assert_eq!(discovery.correlation.matches.len(), 1);
        assert_eq!(discovery.reports[1].tree.to_string(), "rcv( 'A:b', 'c' )");

        let d = &discovery.diagram;
        assert_eq!(d.participants, vec!["A".to_string(), "B".to_string()]);
        assert_eq!(d.count_flows(FlowKind::Message), 1);
        assert_eq!(d.count_flows(FlowKind::Sequence), 5);
        assert_eq!(kind_of(d, "a", "A"), BpmnNodeKind::Task);
        assert_eq!(kind_of(d, "b", "A"), BpmnNodeKind::SendTask);
        assert_eq!(kind_of(d, "c", "B"), BpmnNodeKind::ReceiveTask);
        assert_eq!(d.nodes_of_kind(BpmnNodeKind::StartEvent).count(), 1);
        assert_eq!(d.nodes_of_kind(BpmnNodeKind::MessageStartEvent).count(), 1);
        for p in ["A", "B"] {
            assert_eq!(
                d.nodes_of(p)
                    .filter(|n| n.kind == BpmnNodeKind::EndEvent)
                    .count(),
                1
            );
        }
        assert_only_end_events_are_sinks(d);
        assert!(matches!(discovery.layout, LayoutOutcome::LaidOut));
        assert!(d.nodes.iter().all(|n| n.bounds.width > 0.0));
    }

    #[test]
    fn party_order_does_not_change_messages() {
        let mut parties = two_parties();
        parties.reverse();
        let discovery =
            discover_collaboration(&parties, &CollaborationMiningConfig::default()).unwrap();
        assert_eq!(discovery.diagram.count_flows(FlowKind::Message), 1);
        assert_eq!(kind_of(&discovery.diagram, "c", "B"), BpmnNodeKind::ReceiveTask);
    }

    #[test]
    fn single_party_without_messages() {
        let parties = vec![party(
            "A",
            vec![
                vec![Event::new("a".into()), Event::new("b".into())],
                vec![Event::new("a".into()), Event::new("c".into())],
            ],
        )];
        let discovery =
            discover_collaboration(&parties, &CollaborationMiningConfig::default()).unwrap();
        assert!(discovery.reports[0]
            .tree
            .to_string()
            .starts_with("->( 'a', X("));
        let d = &discovery.diagram;
        assert_eq!(d.count_flows(FlowKind::Message), 0);
        assert_eq!(d.nodes.iter().filter(|n| n.kind.is_gateway()).count(), 2);
        assert!(d.nodes.iter().all(|n| !n.kind.is_message_kind()));
        assert_only_end_events_are_sinks(d);
    }

    #[test]
    fn process_ending_in_a_loop_gets_an_end_event() {
        let ev = |a: &str| Event::new(a.into());
        let parties = vec![party(
            "A",
            vec![vec![ev("a"), ev("b"), ev("a")], vec![ev("a")]],
        )];
        let discovery =
            discover_collaboration(&parties, &CollaborationMiningConfig::default()).unwrap();
        assert_eq!(discovery.reports[0].tree.to_string(), "*( 'a', 'b' )");
        let d = &discovery.diagram;
        assert_eq!(d.nodes_of_kind(BpmnNodeKind::EndEvent).count(), 1);
        assert_only_end_events_are_sinks(d);
    }

    #[test]
    fn rejects_empty_and_duplicate_parties() {
        let config = CollaborationMiningConfig::default();
        assert!(matches!(
            discover_collaboration(&[], &config),
            Err(CollaborationMiningError::NoParties)
        ));
        let parties = vec![party("A", vec![]), party("A", vec![])];
        assert!(matches!(
            discover_collaboration(&parties, &config),
            Err(CollaborationMiningError::DuplicateParty(name)) if name == "A"
        ));
    }

    #[test]
    fn missing_log_file() {
        let res = load_parties(
            &[("A", "/definitely/not/here.xes")],
            &XESImportOptions::default(),
        );
        assert!(matches!(
            res,
            Err(CollaborationMiningError::Import { party, .. }) if party == "A"
        ));
    }
}
