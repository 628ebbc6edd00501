use crate::event_log::activity_projection::{Activity, ActivityLog};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;
use serde_with::serde_as;
use std::collections::{HashMap, HashSet};

/// A directly-follows graph of [`Activity`]s.
/// Graph containing a set of activities, a set of directly-follows relations, a list of start
/// activities, and a list of end activities.
/// Both, the number of occurrences of activities and of directly follows relations are annotated
/// with their frequency.
///
/// Iteration over activities and relations follows their insertion order, so that everything
/// derived from a graph is deterministic.
#[serde_as]
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DirectlyFollowsGraph {
    /// Activities
    activities: HashMap<Activity, u32>,
    /// Directly-follows relations
    #[serde_as(as = "Vec<(_, _)>")]
    directly_follows_relations: HashMap<(Activity, Activity), u32>,
    /// Start activities (first activity of a trace), in order of first occurrence
    pub start_activities: Vec<Activity>,
    /// End activities (last activity of a trace), in order of first occurrence
    pub end_activities: Vec<Activity>,
    #[serde(skip)]
    activity_order: Vec<Activity>,
    #[serde(skip)]
    relation_order: Vec<(Activity, Activity)>,
}

impl DirectlyFollowsGraph {
    /// Create new [`DirectlyFollowsGraph`] with no activities and directly-follows relations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a [`DirectlyFollowsGraph`] from an [`ActivityLog`]
    ///
    /// Empty traces contribute nothing.
    pub fn create_from_log(log: &ActivityLog) -> Self {
        let mut result = Self::new();
        for trace in &log.traces {
            let mut last: Option<&Activity> = None;
            for act in trace {
                result.add_activity(act.clone(), 1);
                match last {
                    Some(prev) => result.add_df_relation(prev.clone(), act.clone(), 1),
                    None => result.add_start_activity(act.clone()),
                }
                last = Some(act);
            }
            if let Some(last) = last {
                result.add_end_activity(last.clone());
            }
        }
        result
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Add an activity with a frequency.
    ///
    /// If the activity already exists, the frequency count is added to the existing activity.
    pub fn add_activity(&mut self, activity: Activity, frequency: u32) {
        if !self.activities.contains_key(&activity) {
            self.activity_order.push(activity.clone());
        }
        *self.activities.entry(activity).or_default() += frequency;
    }

    /// Adds an activity to the list of start activities (if not yet included).
    pub fn add_start_activity(&mut self, activity: Activity) {
        if !self.start_activities.contains(&activity) {
            self.start_activities.push(activity);
        }
    }

    /// Adds an activity to the list of end activities (if not yet included).
    pub fn add_end_activity(&mut self, activity: Activity) {
        if !self.end_activities.contains(&activity) {
            self.end_activities.push(activity);
        }
    }

    /// Checks if an activity is already contained in the directly-follows graph.
    pub fn contains_activity<S: AsRef<str>>(&self, activity: S) -> bool {
        self.activities.contains_key(activity.as_ref())
    }

    /// Checks if an activity is a start activity in the directly-follows graph.
    pub fn is_start_activity<S: AsRef<str>>(&self, activity: S) -> bool {
        self.start_activities.iter().any(|a| a == activity.as_ref())
    }

    /// Checks if an activity is an end activity in the directly-follows graph.
    pub fn is_end_activity<S: AsRef<str>>(&self, activity: S) -> bool {
        self.end_activities.iter().any(|a| a == activity.as_ref())
    }

    /// Frequency of an activity (`0` if not contained)
    pub fn activity_frequency<S: AsRef<str>>(&self, activity: S) -> u32 {
        self.activities.get(activity.as_ref()).copied().unwrap_or(0)
    }

    /// All activities in insertion order
    pub fn activities(&self) -> &[Activity] {
        &self.activity_order
    }

    /// Activity frequencies
    pub fn activity_frequencies(&self) -> &HashMap<Activity, u32> {
        &self.activities
    }

    /// Removes an activity (and all its relations) from the directly-follows graph.
    pub fn remove_activity<S: AsRef<str>>(&mut self, activity: S) {
        let activity = activity.as_ref();
        if self.activities.remove(activity).is_some() {
            self.activity_order.retain(|a| a != activity);
            self.start_activities.retain(|a| a != activity);
            self.end_activities.retain(|a| a != activity);
            self.directly_follows_relations
                .retain(|(from, to), _| from != activity && to != activity);
            self.relation_order
                .retain(|(from, to)| from != activity && to != activity);
        }
    }

    /// Add a directly-follows relation with a frequency.
    ///
    /// If the directly-follows relation already exists, the frequency count is added to the
    /// existing directly-follows relation. Unknown endpoints are added as activities with frequency `0`.
    pub fn add_df_relation(&mut self, from: Activity, to: Activity, frequency: u32) {
        for act in [&from, &to] {
            if !self.activities.contains_key(act) {
                self.add_activity(act.clone(), 0);
            }
        }
        let key = (from, to);
        if !self.directly_follows_relations.contains_key(&key) {
            self.relation_order.push(key.clone());
        }
        *self.directly_follows_relations.entry(key).or_default() += frequency;
    }

    /// Checks if a directly-follows relation is already contained in the directly-follows graph.
    pub fn contains_df_relation<S: AsRef<str>>(&self, (a, b): (S, S)) -> bool {
        self.directly_follows_relations
            .contains_key(&(a.as_ref().to_string(), b.as_ref().to_string()))
    }

    /// Number of times `b` directly follows `a`
    pub fn df_count<S: AsRef<str>>(&self, a: S, b: S) -> u32 {
        self.directly_follows_relations
            .get(&(a.as_ref().to_string(), b.as_ref().to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// All directly-follows relations with their frequency, in insertion order
    pub fn relations(&self) -> impl Iterator<Item = (&Activity, &Activity, u32)> + '_ {
        self.relation_order.iter().map(move |key| {
            (
                &key.0,
                &key.1,
                self.directly_follows_relations.get(key).copied().unwrap_or(0),
            )
        })
    }

    /// Number of distinct directly-follows relations
    pub fn relation_count(&self) -> usize {
        self.relation_order.len()
    }

    /// Returns the ingoing activities of an activity in the directly-follows graph.
    pub fn ingoing_activities<S: AsRef<str>>(&self, activity: S) -> Vec<&Activity> {
        self.relation_order
            .iter()
            .filter_map(|(x, y)| if y == activity.as_ref() { Some(x) } else { None })
            .collect()
    }

    /// Returns the outgoing activities of an activity in the directly-follows graph.
    pub fn outgoing_activities<S: AsRef<str>>(&self, activity: S) -> Vec<&Activity> {
        self.relation_order
            .iter()
            .filter_map(|(x, y)| if x == activity.as_ref() { Some(y) } else { None })
            .collect()
    }

    /// Activities which directly follow themselves
    pub fn self_loop_activities(&self) -> Vec<&Activity> {
        self.relation_order
            .iter()
            .filter_map(|(x, y)| if x == y { Some(x) } else { None })
            .collect()
    }

    ///
    /// Negated graph: all ordered pairs of distinct activities which are _not_ a directly-follows relation
    ///
    /// Two activities connected (in any direction) in the negated graph are not in a
    /// bidirectional directly-follows relation.
    ///
    pub fn negated_relations(&self) -> Vec<(&Activity, &Activity)> {
        let present: HashSet<(&str, &str)> = self
            .relation_order
            .iter()
            .map(|(a, b)| (a.as_str(), b.as_str()))
            .collect();
        let mut res = Vec::new();
        for a in &self.activity_order {
            for b in &self.activity_order {
                if a != b && !present.contains(&(a.as_str(), b.as_str())) {
                    res.push((a, b));
                }
            }
        }
        res
    }

    /// Frequency of the most frequent directly-follows relation (`0` if there is none)
    pub fn max_relation_count(&self) -> u32 {
        self.directly_follows_relations
            .values()
            .copied()
            .max()
            .unwrap_or(0)
    }

    ///
    /// Copy of the graph without all relations whose frequency is below `threshold * max_relation_count`
    ///
    /// Activities as well as start and end activities are kept.
    ///
    pub fn filter_noise(&self, threshold: f64) -> Self {
        let cutoff = threshold * self.max_relation_count() as f64;
        let mut res = self.clone();
        res.directly_follows_relations
            .retain(|_, count| (*count as f64) >= cutoff);
        let kept = &res.directly_follows_relations;
        res.relation_order.retain(|key| kept.contains_key(key));
        res
    }

    ///
    /// Convert to a [`petgraph`] graph
    ///
    /// Node weights are the activities; node indices follow [`DirectlyFollowsGraph::activities`].
    ///
    pub fn as_digraph(&self) -> DiGraph<Activity, u32> {
        let mut graph = DiGraph::new();
        let mut index: HashMap<&str, NodeIndex> = HashMap::new();
        for act in &self.activity_order {
            index.insert(act.as_str(), graph.add_node(act.clone()));
        }
        for (from, to, count) in self.relations() {
            if let (Some(f), Some(t)) = (index.get(from.as_str()), index.get(to.as_str())) {
                graph.add_edge(*f, *t, count);
            }
        }
        graph
    }
}
