use std::collections::HashMap;

use crate::{
    dfg::DirectlyFollowsGraph,
    event_log::activity_projection::{Activity, ActivityLog},
};

use super::cut_detection::Cut;

fn group_index(groups: &[Vec<Activity>]) -> HashMap<&str, usize> {
    groups
        .iter()
        .enumerate()
        .flat_map(|(i, g)| g.iter().map(move |a| (a.as_str(), i)))
        .collect()
}

///
/// Split a log along a cut, one sub log per group of the cut
///
/// With `infrequent` set, the noise-tolerant variants are used (the cut was found on a
/// noise-filtered graph, so traces may contain behavior that contradicts it).
///
pub fn split_log(
    log: &ActivityLog,
    cut: &Cut,
    dfg: &DirectlyFollowsGraph,
    infrequent: bool,
) -> Vec<ActivityLog> {
    match (cut, infrequent) {
        (Cut::Sequence(groups), false) => split_sequence(log, groups),
        (Cut::Sequence(groups), true) => split_sequence_infrequent(log, groups),
        (Cut::ExclusiveChoice(groups), false) => split_exclusive_choice(log, groups),
        (Cut::ExclusiveChoice(groups), true) => split_exclusive_choice_infrequent(log, groups),
        (Cut::Parallel(groups), _) => split_parallel(log, groups),
        (Cut::Loop(groups), false) => split_loop(log, groups),
        (Cut::Loop(groups), true) => split_loop_infrequent(log, groups, dfg),
    }
}

///
/// Every (non-empty) trace goes to the group of its first activity
///
pub fn split_exclusive_choice(log: &ActivityLog, groups: &[Vec<Activity>]) -> Vec<ActivityLog> {
    let index = group_index(groups);
    let mut res = vec![ActivityLog::default(); groups.len()];
    for trace in &log.traces {
        let Some(g) = trace.first().and_then(|a| index.get(a.as_str())) else {
            continue;
        };
        res[*g].traces.push(
            trace
                .iter()
                .filter(|a| index.get(a.as_str()) == Some(g))
                .cloned()
                .collect(),
        );
    }
    res
}

///
/// Every (non-empty) trace goes to the group holding most of its events (earliest group on ties),
/// projected on that group
///
pub fn split_exclusive_choice_infrequent(
    log: &ActivityLog,
    groups: &[Vec<Activity>],
) -> Vec<ActivityLog> {
    let index = group_index(groups);
    let mut res = vec![ActivityLog::default(); groups.len()];
    for trace in &log.traces {
        let mut counts = vec![0usize; groups.len()];
        for a in trace {
            if let Some(g) = index.get(a.as_str()) {
                counts[*g] += 1;
            }
        }
        let mut best: Option<usize> = None;
        for (g, c) in counts.iter().enumerate() {
            if *c > 0 && best.map_or(true, |b| *c > counts[b]) {
                best = Some(g);
            }
        }
        if let Some(g) = best {
            res[g].traces.push(
                trace
                    .iter()
                    .filter(|a| index.get(a.as_str()) == Some(&g))
                    .cloned()
                    .collect(),
            );
        }
    }
    res
}

///
/// Project every trace on every group
///
pub fn split_sequence(log: &ActivityLog, groups: &[Vec<Activity>]) -> Vec<ActivityLog> {
    split_parallel(log, groups)
}

/// Position after `start` at which cutting the trace keeps most events of `group` and drops
/// fewest other events (earliest position on ties)
fn find_split_point(trace: &[Activity], group: &[Activity], start: usize) -> usize {
    let mut cost: i64 = 0;
    let mut least_cost: i64 = 0;
    let mut position = start;
    for (i, a) in trace.iter().enumerate().skip(start) {
        if group.contains(a) {
            cost -= 1;
        } else {
            cost += 1;
        }
        if cost < least_cost {
            least_cost = cost;
            position = i + 1;
        }
    }
    position
}

///
/// Cut every trace into consecutive segments, one per group, minimizing the number of events that
/// do not belong to the group of their segment; these events are dropped
///
pub fn split_sequence_infrequent(log: &ActivityLog, groups: &[Vec<Activity>]) -> Vec<ActivityLog> {
    let mut res = vec![ActivityLog::default(); groups.len()];
    for trace in &log.traces {
        let mut start = 0;
        for (g, group) in groups.iter().enumerate() {
            let end = if g + 1 == groups.len() {
                trace.len()
            } else {
                find_split_point(trace, group, start)
            };
            res[g].traces.push(
                trace[start..end]
                    .iter()
                    .filter(|a| group.contains(a))
                    .cloned()
                    .collect(),
            );
            start = end;
        }
    }
    res
}

///
/// Project every trace on every group
///
pub fn split_parallel(log: &ActivityLog, groups: &[Vec<Activity>]) -> Vec<ActivityLog> {
    let index = group_index(groups);
    (0..groups.len())
        .map(|g| log.project(|a| index.get(a) == Some(&g)))
        .collect()
}

///
/// Cut every trace into maximal segments of one group; segments are added to the log of their group
///
/// The body (first group) log receives an empty trace wherever two redo segments follow each other
/// directly and wherever a trace starts or ends in a redo group.
///
pub fn split_loop(log: &ActivityLog, groups: &[Vec<Activity>]) -> Vec<ActivityLog> {
    split_loop_segments(log, groups, |_, _| false)
}

///
/// [`split_loop`], additionally treating a start activity that directly follows an end activity
/// inside the body as a silent redo
///
pub fn split_loop_infrequent(
    log: &ActivityLog,
    groups: &[Vec<Activity>],
    dfg: &DirectlyFollowsGraph,
) -> Vec<ActivityLog> {
    split_loop_segments(log, groups, |prev, next| {
        dfg.is_end_activity(prev) && dfg.is_start_activity(next)
    })
}

fn split_loop_segments<F: Fn(&str, &str) -> bool>(
    log: &ActivityLog,
    groups: &[Vec<Activity>],
    silent_redo: F,
) -> Vec<ActivityLog> {
    let index = group_index(groups);
    let mut res = vec![ActivityLog::default(); groups.len()];
    for trace in &log.traces {
        let mut current: Option<usize> = None;
        let mut segment: Vec<Activity> = Vec::new();
        for a in trace {
            let Some(&g) = index.get(a.as_str()) else {
                continue;
            };
            match current {
                None => {
                    if g != 0 {
                        res[0].traces.push(Vec::new());
                    }
                }
                Some(c) if c != g => {
                    res[c].traces.push(std::mem::take(&mut segment));
                    if c != 0 && g != 0 {
                        res[0].traces.push(Vec::new());
                    }
                }
                Some(_) => {
                    let split = g == 0
                        && groups.len() > 1
                        && segment.last().is_some_and(|prev| silent_redo(prev, a));
                    if split {
                        res[0].traces.push(std::mem::take(&mut segment));
                        res[1].traces.push(Vec::new());
                    }
                }
            }
            current = Some(g);
            segment.push(a.clone());
        }
        match current {
            Some(c) => {
                res[c].traces.push(segment);
                if c != 0 {
                    res[0].traces.push(Vec::new());
                }
            }
            None => res[0].traces.push(Vec::new()),
        }
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(gs: &[&[&str]]) -> Vec<Vec<Activity>> {
        gs.iter()
            .map(|g| g.iter().map(|a| a.to_string()).collect())
            .collect()
    }

    fn log(traces: &[Vec<&str>]) -> ActivityLog {
        ActivityLog::from_str_traces(traces)
    }

    #[test]
    fn exclusive_choice_by_first_activity() {
        let res = split_exclusive_choice(
            &log(&[vec!["a", "b"], vec!["c"], vec![]]),
            &groups(&[&["a", "b"], &["c"]]),
        );
        assert_eq!(res[0], log(&[vec!["a", "b"]]));
        assert_eq!(res[1], log(&[vec!["c"]]));
    }

    #[test]
    fn exclusive_choice_infrequent_by_majority() {
        let res = split_exclusive_choice_infrequent(
            &log(&[vec!["c", "a", "b"]]),
            &groups(&[&["a", "b"], &["c"]]),
        );
        assert_eq!(res[0], log(&[vec!["a", "b"]]));
        assert!(res[1].is_empty());
    }

    #[test]
    fn sequence_projection_keeps_empty_parts() {
        let res = split_sequence(
            &log(&[vec!["a", "b", "c"], vec!["a", "c"]]),
            &groups(&[&["a"], &["b"], &["c"]]),
        );
        assert_eq!(res[1], log(&[vec!["b"], vec![]]));
    }

    #[test]
    fn sequence_infrequent_drops_misplaced_events() {
        // the trailing "a" does not fit the order a -> b
        let res = split_sequence_infrequent(
            &log(&[vec!["a", "b", "a"]]),
            &groups(&[&["a"], &["b"]]),
        );
        assert_eq!(res[0], log(&[vec!["a"]]));
        assert_eq!(res[1], log(&[vec!["b"]]));
    }

    #[test]
    fn loop_split_into_segments() {
        let res = split_loop(
            &log(&[vec!["a", "b", "c", "a", "b"], vec!["c"]]),
            &groups(&[&["a", "b"], &["c"]]),
        );
        assert_eq!(
            res[0],
            log(&[vec!["a", "b"], vec!["a", "b"], vec![], vec![]])
        );
        assert_eq!(res[1], log(&[vec!["c"], vec!["c"]]));
    }

    #[test]
    fn loop_split_infrequent_adds_silent_redo() {
        let l = log(&[vec!["a", "b", "a", "b"]]);
        let dfg = DirectlyFollowsGraph::create_from_log(&log(&[vec!["a", "b"]]));
        let gs = groups(&[&["a", "b"], &["c"]]);
        let res = split_loop_infrequent(&l, &gs, &dfg);
        assert_eq!(res[0], log(&[vec!["a", "b"], vec!["a", "b"]]));
        assert_eq!(res[1], log(&[vec![]]));
        assert_eq!(split_loop(&l, &gs)[0], log(&[vec!["a", "b", "a", "b"]]));
    }
}
