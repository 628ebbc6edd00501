use crate::{
    config::FallThroughConfig,
    dfg::DirectlyFollowsGraph,
    event_log::activity_projection::{Activity, ActivityLog},
};

use super::cut_detection::detect_cut;

///
/// Outcome of checking a log for empty traces
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyTraces {
    /// The log has no empty trace
    Absent,
    /// Empty traces are frequent enough to be modelled as a silent alternative; holds all
    /// non-empty traces
    Frequent(ActivityLog),
    /// Empty traces are noise; holds all non-empty traces
    Infrequent(ActivityLog),
}

///
/// Separate the empty traces of a log
///
/// Empty traces count as noise if their share of all traces is below `noise_threshold`.
///
pub fn filter_empty_traces(log: &ActivityLog, noise_threshold: f64) -> EmptyTraces {
    let non_empty: Vec<Vec<Activity>> = log
        .traces
        .iter()
        .filter(|t| !t.is_empty())
        .cloned()
        .collect();
    let empty = log.len() - non_empty.len();
    if empty == 0 {
        return EmptyTraces::Absent;
    }
    if (empty as f64) < noise_threshold * log.len() as f64 {
        EmptyTraces::Infrequent(ActivityLog::new(non_empty))
    } else {
        EmptyTraces::Frequent(ActivityLog::new(non_empty))
    }
}

///
/// A fall-through applicable to a log without structural cut
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallThrough {
    /// `activity` occurs exactly once in every trace: `+(activity, rest)`
    ActivityOncePerTrace {
        /// Split off activity
        activity: Activity,
        /// Log without `activity`
        rest: ActivityLog,
    },
    /// Removing `activity` yields a structural cut: `+(activity, rest)`
    ActivityConcurrent {
        /// Split off activity
        activity: Activity,
        /// Log without `activity`
        rest: ActivityLog,
    },
    /// Traces split wherever an end activity is directly followed by a start activity: `*(log, tau)`
    StrictTauLoop(ActivityLog),
    /// Traces split before every start activity: `*(log, tau)`
    TauLoop(ActivityLog),
    /// Anything can happen: `*(X(activities), tau)`
    Flower(Vec<Activity>),
}

///
/// Find the first applicable fall-through (apart from the handling of empty traces)
///
/// Fall-throughs are tried in order: activity once per trace, concurrent activity, strict tau
/// loop, tau loop. Flower always applies.
///
pub fn find_fall_through(
    log: &ActivityLog,
    dfg: &DirectlyFollowsGraph,
    config: &FallThroughConfig,
) -> FallThrough {
    let applicable = config.activity_once_per_trace
        .then(|| activity_once_per_trace(log, dfg))
        .flatten()
        .or_else(|| {
            config.activity_concurrent
                .then(|| activity_concurrent(log, dfg))
                .flatten()
        })
        .or_else(|| {
            config.strict_tau_loop
                .then(|| strict_tau_loop(log, dfg))
                .flatten()
        })
        .or_else(|| config.tau_loop.then(|| tau_loop(log, dfg)).flatten());
    applicable.unwrap_or_else(|| FallThrough::Flower(dfg.activities().to_vec()))
}

///
/// First activity occurring exactly once in every trace
///
pub fn activity_once_per_trace(
    log: &ActivityLog,
    dfg: &DirectlyFollowsGraph,
) -> Option<FallThrough> {
    if dfg.activities().len() < 2 || log.is_empty() {
        return None;
    }
    let activity = dfg.activities().iter().find(|a| {
        log.traces
            .iter()
            .all(|t| t.iter().filter(|b| b == a).count() == 1)
    })?;
    Some(FallThrough::ActivityOncePerTrace {
        activity: activity.clone(),
        rest: log.project(|b| b != activity.as_str()),
    })
}

///
/// First activity whose removal from the log leaves a log with a structural cut
///
pub fn activity_concurrent(log: &ActivityLog, dfg: &DirectlyFollowsGraph) -> Option<FallThrough> {
    if dfg.activities().len() < 3 {
        return None;
    }
    dfg.activities().iter().find_map(|activity| {
        let rest = log.project(|b| b != activity.as_str());
        let rest_dfg = DirectlyFollowsGraph::create_from_log(&rest);
        detect_cut(&rest_dfg, rest.contains_empty_trace()).map(|_| FallThrough::ActivityConcurrent {
            activity: activity.clone(),
            rest,
        })
    })
}

///
/// Split traces where an end activity is directly followed by a start activity
///
pub fn strict_tau_loop(log: &ActivityLog, dfg: &DirectlyFollowsGraph) -> Option<FallThrough> {
    split_traces(log, |prev, next| {
        dfg.is_end_activity(prev) && dfg.is_start_activity(next)
    })
    .map(FallThrough::StrictTauLoop)
}

///
/// Split traces before every start activity that is not the first event of its trace
///
pub fn tau_loop(log: &ActivityLog, dfg: &DirectlyFollowsGraph) -> Option<FallThrough> {
    split_traces(log, |_, next| dfg.is_start_activity(next)).map(FallThrough::TauLoop)
}

/// Split every trace between two consecutive events satisfying `split_between`; `None` if no trace
/// was split
fn split_traces<F: Fn(&str, &str) -> bool>(
    log: &ActivityLog,
    split_between: F,
) -> Option<ActivityLog> {
    let mut split = false;
    let mut traces = Vec::new();
    for trace in &log.traces {
        let mut segment: Vec<Activity> = Vec::new();
        for a in trace {
            if segment.last().is_some_and(|prev| split_between(prev, a)) {
                traces.push(std::mem::take(&mut segment));
                split = true;
            }
            segment.push(a.clone());
        }
        traces.push(segment);
    }
    split.then(|| ActivityLog::new(traces))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(traces: &[Vec<&str>]) -> ActivityLog {
        ActivityLog::from_str_traces(traces)
    }

    fn find(l: &ActivityLog) -> FallThrough {
        find_fall_through(
            l,
            &DirectlyFollowsGraph::create_from_log(l),
            &FallThroughConfig::default(),
        )
    }

    #[test]
    fn empty_traces_by_threshold() {
        let l = log(&[vec!["a"], vec!["a"], vec!["a"], vec![]]);
        assert_eq!(filter_empty_traces(&log(&[vec!["a"]]), 0.5), EmptyTraces::Absent);
        assert_eq!(
            filter_empty_traces(&l, 0.0),
            EmptyTraces::Frequent(log(&[vec!["a"], vec!["a"], vec!["a"]]))
        );
        assert_eq!(
            filter_empty_traces(&l, 0.5),
            EmptyTraces::Infrequent(log(&[vec!["a"], vec!["a"], vec!["a"]]))
        );
    }

    #[test]
    fn once_per_trace() {
        let l = log(&[vec!["a", "b", "b", "c"], vec!["c", "a"]]);
        match find(&l) {
            FallThrough::ActivityOncePerTrace { activity, rest } => {
                assert_eq!(activity, "a");
                assert_eq!(rest, log(&[vec!["b", "b", "c"], vec!["c"]]));
            }
            other => panic!("unexpected fall-through {other:?}"),
        }
    }

    #[test]
    fn strict_tau_loop_splits_end_to_start() {
        let l = log(&[vec!["a", "b", "a", "b"], vec!["a", "b"]]);
        assert_eq!(
            strict_tau_loop(&l, &DirectlyFollowsGraph::create_from_log(&l)),
            Some(FallThrough::StrictTauLoop(log(&[
                vec!["a", "b"],
                vec!["a", "b"],
                vec!["a", "b"]
            ])))
        );
    }

    #[test]
    fn tau_loop_splits_before_start() {
        let l = log(&[vec!["a", "c", "b", "a"], vec!["b"]]);
        assert_eq!(
            tau_loop(&l, &DirectlyFollowsGraph::create_from_log(&l)),
            Some(FallThrough::TauLoop(log(&[
                vec!["a", "c"],
                vec!["b"],
                vec!["a"],
                vec!["b"]
            ])))
        );
    }

    #[test]
    fn flower_when_disabled() {
        let l = log(&[vec!["a", "b", "a"], vec!["b", "a", "b"]]);
        let config = FallThroughConfig {
            empty_trace: false,
            activity_once_per_trace: false,
            activity_concurrent: false,
            strict_tau_loop: false,
            tau_loop: false,
        };
        assert_eq!(
            find_fall_through(&l, &DirectlyFollowsGraph::create_from_log(&l), &config),
            FallThrough::Flower(vec!["a".to_string(), "b".to_string()])
        );
    }
}
