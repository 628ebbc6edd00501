use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    config::MiningConfig,
    dfg::DirectlyFollowsGraph,
    discovery::message_correlation::MessageInjection,
    event_log::activity_projection::{Activity, ActivityLog},
};

use super::{
    cut_detection::{detect_cut, Cut},
    fall_through::{filter_empty_traces, find_fall_through, EmptyTraces, FallThrough},
    log_splitting::split_log,
};

///
/// Reason a [`CutNode`] was split (or not split)
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedCut {
    /// Base case: no traces
    EmptyLog,
    /// Base case: every trace consists of the same single activity
    SingleActivity,
    /// Single activity receiving a message from another party
    ReceiveMessageActivity,
    /// Single activity sending a message to another party
    SendMessageActivity,
    /// Sequence cut
    Sequential,
    /// Exclusive choice cut
    Concurrent,
    /// Parallel cut
    Parallel,
    /// Loop cut
    LoopCut,
    /// Fall-through: some traces are empty
    EmptyTrace,
    /// Fall-through: an activity occurs once per trace
    ActivityOncePerTrace,
    /// Fall-through: an activity is concurrent to the rest
    ActivityConcurrent,
    /// Fall-through: strict tau loop
    StrictTauLoop,
    /// Fall-through: tau loop
    TauLoop,
    /// Fall-through: flower model
    Flower,
}

///
/// State shared by all [`CutNode`]s of one mining run
///
#[derive(Debug)]
pub struct MiningContext<'a> {
    /// Mining parameters
    pub config: &'a MiningConfig,
    /// DFG of the complete log of the party, including injected message relations
    pub initial_dfg: DirectlyFollowsGraph,
    /// All activities of the complete log of the party (without injected activities)
    pub original_log_activities: HashSet<Activity>,
    /// Owning processes of injected foreign activities
    pub foreign_owners: HashMap<Activity, Vec<String>>,
    /// Activities that qualified both as receiving and as sending message activity
    pub ambiguous_message_activities: Vec<Activity>,
    next_id: usize,
}

impl<'a> MiningContext<'a> {
    ///
    /// Create the context for mining `log`, with the message relations of `injection` added to the
    /// initial DFG
    ///
    pub fn new(
        config: &'a MiningConfig,
        log: &ActivityLog,
        injection: Option<&MessageInjection>,
    ) -> Self {
        let mut initial_dfg = DirectlyFollowsGraph::create_from_log(log);
        let mut foreign_owners = HashMap::new();
        if let Some(injection) = injection {
            injection.apply(&mut initial_dfg);
            foreign_owners = injection.foreign_owners.clone();
        }
        Self {
            config,
            initial_dfg,
            original_log_activities: log.activities().into_iter().collect(),
            foreign_owners,
            ambiguous_message_activities: Vec::new(),
            next_id: 0,
        }
    }

    /// Fresh node id
    pub fn next_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn foreign_sources(&self, activity: &str) -> Vec<&Activity> {
        self.initial_dfg
            .ingoing_activities(activity)
            .into_iter()
            .filter(|s| {
                self.initial_dfg.is_start_activity(s) && !self.original_log_activities.contains(*s)
            })
            .collect()
    }

    fn foreign_targets(&self, activity: &str) -> Vec<&Activity> {
        self.initial_dfg
            .outgoing_activities(activity)
            .into_iter()
            .filter(|t| {
                self.initial_dfg.is_end_activity(t) && !self.original_log_activities.contains(*t)
            })
            .collect()
    }
}

///
/// Node of the recursion of the inductive miner
///
/// Owns its log slice and the DFG computed from it. Children are only empty for base cases.
///
#[derive(Debug, Clone)]
pub struct CutNode {
    /// Unique id within the mining run
    pub id: usize,
    /// Log slice of this node
    pub log: ActivityLog,
    /// DFG of [`CutNode::log`]
    pub dfg: DirectlyFollowsGraph,
    /// Activity of single activity nodes
    pub activity: Option<Activity>,
    /// Owning process of single activity nodes synthesized for a message partner
    pub partner_process: Option<String>,
    /// How this node was split
    pub detected_cut: DetectedCut,
    /// Sub nodes in cut order
    pub children: Vec<CutNode>,
}

impl CutNode {
    ///
    /// Recursively mine a log slice
    ///
    pub fn mine(log: ActivityLog, ctx: &mut MiningContext<'_>) -> Self {
        let dfg = DirectlyFollowsGraph::create_from_log(&log);
        let mut node = Self {
            id: ctx.next_id(),
            log,
            dfg,
            activity: None,
            partner_process: None,
            detected_cut: DetectedCut::EmptyLog,
            children: Vec::new(),
        };
        node.detect(ctx);
        node
    }

    /// Synthesized single activity node
    fn leaf(activity: Activity, partner_process: Option<String>, ctx: &mut MiningContext<'_>) -> Self {
        let log = ActivityLog::new(vec![vec![activity.clone()]]);
        Self {
            id: ctx.next_id(),
            dfg: DirectlyFollowsGraph::create_from_log(&log),
            log,
            activity: Some(activity),
            partner_process,
            detected_cut: DetectedCut::SingleActivity,
            children: Vec::new(),
        }
    }

    /// Activity if every trace consists of exactly this one activity
    fn single_activity(&self) -> Option<&Activity> {
        let first = self.log.traces.first()?.first()?;
        self.log
            .traces
            .iter()
            .all(|t| t.len() == 1 && &t[0] == first)
            .then_some(first)
    }

    fn detect(&mut self, ctx: &mut MiningContext<'_>) {
        if self.log.is_empty() {
            self.detected_cut = DetectedCut::EmptyLog;
            return;
        }
        if let Some(activity) = self.single_activity().cloned() {
            self.classify_single_activity(activity, ctx);
            return;
        }
        let has_empty_trace = self.log.contains_empty_trace();
        if let Some(cut) = detect_cut(&self.dfg, has_empty_trace) {
            self.apply_cut(cut, false, ctx);
            return;
        }
        let threshold = ctx.config.effective_noise_threshold();
        if threshold > 0.0 {
            let filtered = self.dfg.filter_noise(threshold);
            if filtered.relation_count() < self.dfg.relation_count() {
                if let Some(cut) = detect_cut(&filtered, has_empty_trace) {
                    self.apply_cut(cut, true, ctx);
                    return;
                }
            }
        }
        self.apply_fall_through(ctx);
    }

    fn classify_single_activity(&mut self, activity: Activity, ctx: &mut MiningContext<'_>) {
        let senders: Vec<Activity> = ctx
            .foreign_sources(&activity)
            .into_iter()
            .cloned()
            .collect();
        let receivers: Vec<Activity> = ctx
            .foreign_targets(&activity)
            .into_iter()
            .cloned()
            .collect();
        self.activity = Some(activity.clone());
        if !senders.is_empty() && !receivers.is_empty() {
            tracing::warn!(
                activity = %activity,
                senders = ?senders,
                receivers = ?receivers,
                "activity both receives and sends messages, treating it as receiving"
            );
            ctx.ambiguous_message_activities.push(activity.clone());
        }
        if !senders.is_empty() {
            self.detected_cut = DetectedCut::ReceiveMessageActivity;
            self.children = Self::partner_leaves(&senders, ctx);
            let local = CutNode::leaf(activity, None, ctx);
            self.children.push(local);
        } else if !receivers.is_empty() {
            self.detected_cut = DetectedCut::SendMessageActivity;
            let local = CutNode::leaf(activity, None, ctx);
            self.children = vec![local];
            let partners = Self::partner_leaves(&receivers, ctx);
            self.children.extend(partners);
        } else {
            self.detected_cut = DetectedCut::SingleActivity;
            return;
        }
        tracing::debug!(
            node = self.id,
            cut = ?self.detected_cut,
            activity = ?self.activity,
            "message activity"
        );
    }

    fn partner_leaves(foreign: &[Activity], ctx: &mut MiningContext<'_>) -> Vec<CutNode> {
        let mut res = Vec::new();
        for activity in foreign {
            let owners = ctx.foreign_owners.get(activity).cloned().unwrap_or_default();
            if owners.is_empty() {
                res.push(CutNode::leaf(activity.clone(), None, ctx));
            }
            for owner in owners {
                res.push(CutNode::leaf(activity.clone(), Some(owner), ctx));
            }
        }
        res
    }

    fn apply_cut(&mut self, cut: Cut, infrequent: bool, ctx: &mut MiningContext<'_>) {
        self.detected_cut = match &cut {
            Cut::Sequence(_) => DetectedCut::Sequential,
            Cut::ExclusiveChoice(_) => DetectedCut::Concurrent,
            Cut::Parallel(_) => DetectedCut::Parallel,
            Cut::Loop(_) => DetectedCut::LoopCut,
        };
        tracing::debug!(
            node = self.id,
            cut = ?self.detected_cut,
            groups = ?cut.groups(),
            infrequent,
            "detected cut"
        );
        self.children = split_log(&self.log, &cut, &self.dfg, infrequent)
            .into_iter()
            .map(|log| CutNode::mine(log, ctx))
            .collect();
    }

    fn apply_fall_through(&mut self, ctx: &mut MiningContext<'_>) {
        let fall_throughs = ctx.config.fall_throughs;
        if fall_throughs.empty_trace {
            match filter_empty_traces(&self.log, ctx.config.effective_noise_threshold()) {
                EmptyTraces::Absent => {}
                EmptyTraces::Frequent(non_empty) => {
                    self.detected_cut = DetectedCut::EmptyTrace;
                    tracing::debug!(node = self.id, cut = ?self.detected_cut, "fall-through");
                    self.children = vec![CutNode::mine(non_empty, ctx)];
                    return;
                }
                EmptyTraces::Infrequent(non_empty) => {
                    tracing::debug!(node = self.id, "dropping infrequent empty traces");
                    self.dfg = DirectlyFollowsGraph::create_from_log(&non_empty);
                    self.log = non_empty;
                    self.detect(ctx);
                    return;
                }
            }
        }
        let fall_through = find_fall_through(&self.log, &self.dfg, &fall_throughs);
        self.children = match fall_through {
            FallThrough::ActivityOncePerTrace { activity, rest } => {
                self.detected_cut = DetectedCut::ActivityOncePerTrace;
                let only = self.log.project(|a| a == activity.as_str());
                vec![CutNode::mine(only, ctx), CutNode::mine(rest, ctx)]
            }
            FallThrough::ActivityConcurrent { activity, rest } => {
                self.detected_cut = DetectedCut::ActivityConcurrent;
                let only = self.log.project(|a| a == activity.as_str());
                vec![CutNode::mine(only, ctx), CutNode::mine(rest, ctx)]
            }
            FallThrough::StrictTauLoop(log) => {
                self.detected_cut = DetectedCut::StrictTauLoop;
                vec![CutNode::mine(log, ctx)]
            }
            FallThrough::TauLoop(log) => {
                self.detected_cut = DetectedCut::TauLoop;
                vec![CutNode::mine(log, ctx)]
            }
            FallThrough::Flower(activities) => {
                self.detected_cut = DetectedCut::Flower;
                activities
                    .into_iter()
                    .map(|a| CutNode::leaf(a, None, ctx))
                    .collect()
            }
        };
        tracing::debug!(node = self.id, cut = ?self.detected_cut, "fall-through");
    }

    /// Number of nodes per [`DetectedCut`] in this subtree
    pub fn count_cuts(&self, counts: &mut BTreeMap<DetectedCut, usize>) {
        *counts.entry(self.detected_cut).or_default() += 1;
        for c in &self.children {
            c.count_cuts(counts);
        }
    }
}
