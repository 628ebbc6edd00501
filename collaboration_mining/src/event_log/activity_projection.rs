use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::event_log_struct::{Event, EventLog, Trace, XESEditableAttribute};
use crate::config::MiningConfig;

/// Activity label
pub type Activity = String;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
/// Projection of an event log on just activity labels
///
/// Every trace is the ordered sequence of its activity labels. Events without an activity
/// label are dropped.
pub struct ActivityLog {
    /// Activity sequences
    pub traces: Vec<Vec<Activity>>,
}

impl ActivityLog {
    /// Create a projection directly from activity sequences
    pub fn new(traces: Vec<Vec<Activity>>) -> Self {
        Self { traces }
    }

    /// Convenience constructor from string slices
    pub fn from_str_traces<S: AsRef<str>>(traces: &[Vec<S>]) -> Self {
        Self::new(
            traces
                .iter()
                .map(|t| t.iter().map(|a| a.as_ref().to_string()).collect())
                .collect(),
        )
    }

    ///
    /// Project an [`EventLog`] using the activity (and optionally timestamp) key of the [`MiningConfig`]
    ///
    /// Traces are identified by their [`MiningConfig::case_id_key`] attribute. Traces sharing a
    /// case id are merged into one (in log order, at the position of the first of them). Traces
    /// without a case id are kept as they are.
    ///
    pub fn from_event_log(log: &EventLog, config: &MiningConfig) -> Self {
        let mut cases: Vec<Vec<&Event>> = Vec::new();
        let mut case_index: HashMap<String, usize> = HashMap::new();
        for t in &log.traces {
            match case_id(t, &config.case_id_key) {
                Some(id) => match case_index.get(&id) {
                    Some(&i) => cases[i].extend(t.events.iter()),
                    None => {
                        case_index.insert(id, cases.len());
                        cases.push(t.events.iter().collect());
                    }
                },
                None => cases.push(t.events.iter().collect()),
            }
        }
        if cases.len() < log.traces.len() {
            tracing::debug!(
                traces = log.traces.len(),
                cases = cases.len(),
                key = config.case_id_key.as_str(),
                "merged traces by case id"
            );
        }
        let traces = cases
            .into_iter()
            .map(|mut events| {
                if config.sort_events_by_timestamp {
                    events.sort_by_key(|e| {
                        e.attributes
                            .get_by_key_or_global(&config.timestamp_key, &log.global_event_attrs)
                            .and_then(|a| a.value.try_as_date())
                            .copied()
                    });
                }
                events
                    .into_iter()
                    .filter_map(|e| {
                        e.get_string(&config.activity_key, &log.global_event_attrs)
                            .cloned()
                    })
                    .collect()
            })
            .collect();
        Self { traces }
    }

    /// Number of traces
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// `true` if there are no traces at all
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// `true` if some trace contains no events
    pub fn contains_empty_trace(&self) -> bool {
        self.traces.iter().any(|t| t.is_empty())
    }

    /// Activities in order of first occurrence
    pub fn activities(&self) -> Vec<Activity> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut res = Vec::new();
        for a in self.traces.iter().flatten() {
            if seen.insert(a.as_str()) {
                res.push(a.clone());
            }
        }
        res
    }

    /// Number of occurrences of every activity
    pub fn activity_frequencies(&self) -> HashMap<Activity, u32> {
        let mut res: HashMap<Activity, u32> = HashMap::new();
        for a in self.traces.iter().flatten() {
            *res.entry(a.clone()).or_default() += 1;
        }
        res
    }

    /// Keep only the events whose activity satisfies the predicate (empty traces are kept)
    pub fn project<F: Fn(&str) -> bool>(&self, keep: F) -> Self {
        Self::new(
            self.traces
                .iter()
                .map(|t| t.iter().filter(|a| keep(a)).cloned().collect())
                .collect(),
        )
    }
}

/// Case id of a trace (global trace attributes are defaults, not identities)
fn case_id(trace: &Trace, key: &str) -> Option<String> {
    trace
        .attributes
        .get_by_key(key)
        .and_then(|a| a.value.as_key_string())
}
