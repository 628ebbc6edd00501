use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    config::MiningConfig,
    dfg::DirectlyFollowsGraph,
    event_log::{
        activity_projection::Activity,
        event_log_struct::{EventLog, MessageKind, Party, Trace, XESEditableAttribute},
    },
};

///
/// Stable identity of an activity across parties: the owning process and the activity name
///
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivityKey {
    /// Owning process (party name)
    pub process: String,
    /// Activity name
    pub activity: Activity,
}

impl ActivityKey {
    /// Create a new key
    pub fn new<P: Into<String>, A: Into<String>>(process: P, activity: A) -> Self {
        Self {
            process: process.into(),
            activity: activity.into(),
        }
    }
}

///
/// A matched message: the sending activity of one party and the receiving activity of another
///
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMatch {
    /// Sending endpoint
    pub sender: ActivityKey,
    /// Receiving endpoint
    pub receiver: ActivityKey,
    /// Correlation id shared by both events
    pub correlation_id: String,
}

///
/// Synthetic directly-follows information added to the DFG of one party for its message endpoints
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInjection {
    /// Injected relations (from, to, frequency)
    pub edges: Vec<(Activity, Activity, u32)>,
    /// Foreign senders added as start activities
    pub start_activities: Vec<Activity>,
    /// Foreign receivers added as end activities
    pub end_activities: Vec<Activity>,
    /// Foreign activities with the frequency of their local counterpart
    pub activity_frequencies: Vec<(Activity, u32)>,
    /// Owning processes of every foreign activity
    pub foreign_owners: HashMap<Activity, Vec<String>>,
}

impl MessageInjection {
    /// `true` if nothing was injected
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Add the injected relations, activities and start/end activities to a [`DirectlyFollowsGraph`]
    pub fn apply(&self, dfg: &mut DirectlyFollowsGraph) {
        for (act, freq) in &self.activity_frequencies {
            dfg.add_activity(act.clone(), *freq);
        }
        for (from, to, freq) in &self.edges {
            dfg.add_df_relation(from.clone(), to.clone(), *freq);
        }
        for act in &self.start_activities {
            dfg.add_start_activity(act.clone());
        }
        for act in &self.end_activities {
            dfg.add_end_activity(act.clone());
        }
    }

    fn record_owner(&mut self, activity: &Activity, process: &str) {
        let owners = self.foreign_owners.entry(activity.clone()).or_default();
        if !owners.iter().any(|p| p == process) {
            owners.push(process.to_string());
        }
    }
}

///
/// Result of correlating the messages of all parties
///
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageCorrelation {
    /// All accepted message matches
    pub matches: Vec<MessageMatch>,
    /// Injection per process name
    pub injections: HashMap<String, MessageInjection>,
}

struct MessageEvent {
    activity: Activity,
    kind: MessageKind,
    correlation_id: String,
}

fn message_events(trace: &Trace, log: &EventLog, config: &MiningConfig) -> Vec<MessageEvent> {
    trace
        .events
        .iter()
        .filter_map(|e| {
            let activity = e.get_string(&config.activity_key, &log.global_event_attrs)?;
            let kind = e
                .get_string(&config.message_type_key, &log.global_event_attrs)
                .and_then(|k| MessageKind::parse(k))?;
            let correlation_id = e
                .attributes
                .get_by_key_or_global(&config.message_id_key, &log.global_event_attrs)
                .and_then(|a| a.value.as_key_string())?;
            Some(MessageEvent {
                activity: activity.clone(),
                kind,
                correlation_id,
            })
        })
        .collect()
}

///
/// Match send and receive events across all parties by their correlation id
///
/// Every ordered pair of distinct parties (sender party, receiver party) and every pair of their
/// traces is scanned. Each endpoint activity takes part in at most one match: later matches of an
/// already matched activity are dropped.
///
pub fn match_messages(parties: &[Party], config: &MiningConfig) -> Vec<MessageMatch> {
    let per_party: Vec<Vec<Vec<MessageEvent>>> = parties
        .iter()
        .map(|p| {
            p.log
                .traces
                .iter()
                .map(|t| message_events(t, &p.log, config))
                .collect()
        })
        .collect();

    let mut seen: HashSet<ActivityKey> = HashSet::new();
    let mut matches = Vec::new();
    for (si, sender_party) in parties.iter().enumerate() {
        for (ri, receiver_party) in parties.iter().enumerate() {
            if si == ri {
                continue;
            }
            for sender_trace in &per_party[si] {
                for receiver_trace in &per_party[ri] {
                    for send in sender_trace.iter().filter(|e| e.kind == MessageKind::Send) {
                        let sender = ActivityKey::new(&sender_party.name, &send.activity);
                        for receive in receiver_trace
                            .iter()
                            .filter(|e| e.kind == MessageKind::Receive)
                        {
                            if receive.correlation_id != send.correlation_id {
                                continue;
                            }
                            let receiver =
                                ActivityKey::new(&receiver_party.name, &receive.activity);
                            if seen.contains(&sender) || seen.contains(&receiver) {
                                tracing::trace!(
                                    sender = %sender.activity,
                                    receiver = %receiver.activity,
                                    correlation = %send.correlation_id,
                                    "dropping correlation of already matched activity"
                                );
                                continue;
                            }
                            seen.insert(sender.clone());
                            seen.insert(receiver.clone());
                            matches.push(MessageMatch {
                                sender: sender.clone(),
                                receiver,
                                correlation_id: send.correlation_id.clone(),
                            });
                        }
                    }
                }
            }
        }
    }
    matches
}

///
/// Derive the [`MessageInjection`] of every party from the message matches
///
/// For each match, the party owning the sender gets the relation `sender -> receiver` (with the
/// frequency of the sender) and the receiver as additional end activity; the party owning the
/// receiver gets the same relation (with the frequency of the receiver) and the sender as
/// additional start activity. If the local endpoint is missing from a party's DFG, that party's
/// injection is skipped.
///
pub fn inject_messages(
    matches: &[MessageMatch],
    dfgs: &HashMap<String, DirectlyFollowsGraph>,
) -> HashMap<String, MessageInjection> {
    let mut injections: HashMap<String, MessageInjection> = HashMap::new();
    for m in matches {
        for (local, foreign, foreign_is_receiver) in
            [(&m.sender, &m.receiver, true), (&m.receiver, &m.sender, false)]
        {
            let frequency = dfgs
                .get(&local.process)
                .map_or(0, |dfg| dfg.activity_frequency(&local.activity));
            if frequency == 0 {
                tracing::warn!(
                    party = %local.process,
                    activity = %local.activity,
                    "message endpoint not found in DFG, skipping injection"
                );
                continue;
            }
            let injection = injections.entry(local.process.clone()).or_default();
            let edge = (m.sender.activity.clone(), m.receiver.activity.clone(), frequency);
            if !injection
                .edges
                .iter()
                .any(|(f, t, _)| f == &edge.0 && t == &edge.1)
            {
                injection.edges.push(edge);
            }
            if !injection
                .activity_frequencies
                .iter()
                .any(|(a, _)| a == &foreign.activity)
            {
                injection
                    .activity_frequencies
                    .push((foreign.activity.clone(), frequency));
            }
            let endpoints = if foreign_is_receiver {
                &mut injection.end_activities
            } else {
                &mut injection.start_activities
            };
            if !endpoints.contains(&foreign.activity) {
                endpoints.push(foreign.activity.clone());
            }
            injection.record_owner(&foreign.activity, &foreign.process);
        }
    }
    injections
}

///
/// Correlate the messages of all parties: [`match_messages`] followed by [`inject_messages`]
///
/// `dfgs` maps every process name to the DFG of its (projected) log.
///
pub fn correlate_messages(
    parties: &[Party],
    dfgs: &HashMap<String, DirectlyFollowsGraph>,
    config: &MiningConfig,
) -> MessageCorrelation {
    let matches = match_messages(parties, config);
    let injections = inject_messages(&matches, dfgs);
    tracing::info!(
        matches = matches.len(),
        parties_with_messages = injections.len(),
        "correlated messages"
    );
    MessageCorrelation {
        matches,
        injections,
    }
}
