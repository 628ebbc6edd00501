//! Inductive mining of one process tree per party
//!
//! The recursion splits the log of a party along structural cuts of its directly-follows graph,
//! falls back to fixed-shape fall-throughs if no cut exists, and recognizes single activities that
//! send or receive messages to or from other parties.
use std::collections::{BTreeMap, HashMap};

use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;

use crate::{
    config::MiningConfig,
    discovery::message_correlation::MessageInjection,
    event_log::activity_projection::{Activity, ActivityLog},
    process_tree::process_tree_struct::ProcessTree,
};

use self::{
    cut_node::{CutNode, DetectedCut, MiningContext},
    tree_synthesis::synthesize_process_tree,
};

/// Structural cut detection on directly-follows graphs
pub mod cut_detection;
/// Recursion nodes of the miner
pub mod cut_node;
/// Fall-throughs for logs without structural cut
pub mod fall_through;
/// Splitting logs along a cut
pub mod log_splitting;
/// Turning the mining recursion into a [`ProcessTree`]
pub mod tree_synthesis;

///
/// Result of mining the process tree of one party
///
#[derive(Debug, Clone, Serialize)]
pub struct MiningReport {
    /// Name of the party
    pub process: String,
    /// Mined process tree
    pub tree: ProcessTree,
    /// Number of recursion nodes per detected cut
    pub cut_counts: BTreeMap<DetectedCut, usize>,
    /// Activities that qualified both as receiving and sending message activity
    /// (these were treated as receiving)
    pub ambiguous_message_activities: Vec<Activity>,
}

///
/// Mine the [`ProcessTree`] of one party
///
/// `injection` holds the message relations of this party to the other parties (see
/// [`crate::discovery::message_correlation::correlate_messages`]).
///
pub fn discover_process_tree(
    process: &str,
    log: &ActivityLog,
    injection: Option<&MessageInjection>,
    config: &MiningConfig,
) -> MiningReport {
    let mut ctx = MiningContext::new(config, log, injection);
    let root = CutNode::mine(log.clone(), &mut ctx);
    let mut cut_counts = BTreeMap::new();
    root.count_cuts(&mut cut_counts);
    let tree = synthesize_process_tree(process, &root);
    tracing::debug!(
        process,
        tree = %tree,
        recursion_nodes = cut_counts.values().sum::<usize>(),
        "mined process tree"
    );
    MiningReport {
        process: process.to_string(),
        tree,
        cut_counts,
        ambiguous_message_activities: ctx.ambiguous_message_activities,
    }
}

///
/// Mine the process trees of several parties in parallel
///
/// Reports are returned in the order of `logs`.
///
pub fn discover_process_trees(
    logs: &[(String, ActivityLog)],
    injections: &HashMap<String, MessageInjection>,
    config: &MiningConfig,
) -> Vec<MiningReport> {
    let reports: Vec<MiningReport> = logs
        .par_iter()
        .map(|(process, log)| discover_process_tree(process, log, injections.get(process), config))
        .collect();
    tracing::info!(parties = reports.len(), "mined process trees");
    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mines_every_party() {
        let logs = vec![
            (
                "A".to_string(),
                ActivityLog::from_str_traces(&[vec!["a", "b"]]),
            ),
            ("B".to_string(), ActivityLog::from_str_traces(&[vec!["c"]])),
        ];
        let reports = discover_process_trees(&logs, &HashMap::new(), &MiningConfig::default());
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].process, "A");
        assert_eq!(reports[0].tree.to_string(), "->( 'a', 'b' )");
        assert_eq!(reports[0].cut_counts[&DetectedCut::Sequential], 1);
        assert_eq!(reports[1].tree.to_string(), "'c'");
    }

    #[test]
    fn message_operators_in_tree() {
        let injection = MessageInjection {
            edges: vec![("b".into(), "c".into(), 1)],
            start_activities: vec!["b".into()],
            activity_frequencies: vec![("b".into(), 1)],
            foreign_owners: HashMap::from([("b".to_string(), vec!["A".to_string()])]),
            ..Default::default()
        };
        let report = discover_process_tree(
            "B",
            &ActivityLog::from_str_traces(&[vec!["c"]]),
            Some(&injection),
            &MiningConfig::default(),
        );
        assert_eq!(report.tree.to_string(), "rcv( 'A:b', 'c' )");
        assert!(report.tree.is_valid());
    }
}
